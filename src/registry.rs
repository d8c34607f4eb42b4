//! Process-wide cache of table handles, keyed by `database.table`.

use crate::config::ConnectionConfig;
use crate::error::AppError;
use crate::schema::{Connector, TableIdentity};
use crate::table::TableHandle;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

type Slot = Arc<OnceCell<Arc<TableHandle>>>;

/// Creates each handle on first access and returns the same instance afterwards.
/// Construction for one table runs at most once at a time; a failed construction is not
/// cached, so the next access introspects again. Opened handles are never evicted.
pub struct TableRegistry {
    connector: Arc<dyn Connector>,
    sample_size: u32,
    slots: Mutex<HashMap<String, Slot>>,
}

impl TableRegistry {
    pub fn new(connector: Arc<dyn Connector>, sample_size: u32) -> Self {
        TableRegistry {
            connector,
            sample_size,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub async fn get_or_create(
        &self,
        database: &str,
        table: &str,
        config: &ConnectionConfig,
    ) -> Result<Arc<TableHandle>, AppError> {
        if database.is_empty() || table.is_empty() {
            return Err(AppError::Configuration(
                "a database name and a table name are required".into(),
            ));
        }
        if config.schema != database {
            return Err(AppError::Configuration(format!(
                "connection is declared for database '{}', not '{}'",
                config.schema, database
            )));
        }
        let identity = TableIdentity::new(database, table);
        let key = identity.qualified_name();
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(key.clone()).or_default().clone()
        };
        let opened = slot
            .get_or_try_init(|| async {
                let backend = self.connector.connect(config).await?;
                match TableHandle::open(identity.clone(), backend, self.sample_size).await {
                    Ok(handle) => {
                        tracing::info!(
                            table = %identity,
                            key = ?handle.primary_key(),
                            "opened table handle"
                        );
                        Ok(Arc::new(handle))
                    }
                    Err(e) => {
                        tracing::warn!(
                            table = %identity,
                            error = %e,
                            "failed to open table handle"
                        );
                        Err(e)
                    }
                }
            })
            .await
            .map(Arc::clone);
        match opened {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.discard_empty_slot(&key, slot).await;
                Err(e)
            }
        }
    }

    /// Drop a slot whose construction failed, unless it got filled or another caller still
    /// holds it. Only tables that opened stay in the map.
    async fn discard_empty_slot(&self, key: &str, slot: Slot) {
        let ours = Arc::as_ptr(&slot) as usize;
        drop(slot);
        let mut slots = self.slots.lock().await;
        let unused = slots.get(key).is_some_and(|s| {
            Arc::as_ptr(s) as usize == ours && !s.initialized() && Arc::strong_count(s) == 1
        });
        if unused {
            slots.remove(key);
        }
    }

    /// Qualified names of the handles created so far, sorted.
    pub async fn cached_tables(&self) -> Vec<String> {
        let slots = self.slots.lock().await;
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.cached_tables().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    #[cfg(test)]
    async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingBackend, RecordingConnector};
    use std::time::Duration;

    fn registry(backend: RecordingBackend) -> (Arc<TableRegistry>, Arc<RecordingConnector>) {
        let connector = Arc::new(RecordingConnector::new(Arc::new(backend)));
        let registry = Arc::new(TableRegistry::new(connector.clone(), 5));
        (registry, connector)
    }

    fn people() -> RecordingBackend {
        RecordingBackend::new().with_table(
            "lahman",
            "people",
            &[("playerID", "varchar", "character varying(9)")],
            &["playerID"],
        )
    }

    fn conn(schema: &str) -> ConnectionConfig {
        ConnectionConfig::new("postgres://unused", schema)
    }

    #[tokio::test]
    async fn repeated_access_returns_same_handle() {
        let (registry, connector) = registry(people());
        let a = registry.get_or_create("lahman", "people", &conn("lahman")).await.unwrap();
        let b = registry.get_or_create("lahman", "people", &conn("lahman")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.backend().introspections(), 1);
        assert_eq!(registry.cached_tables().await, vec!["lahman.people".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_access_constructs_once() {
        let slow = people().with_introspection_delay(Duration::from_millis(50));
        let (registry, connector) = registry(slow);
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.get_or_create("lahman", "people", &conn("lahman")).await
            }));
        }
        let mut handles = Vec::new();
        for t in tasks {
            handles.push(t.await.unwrap().unwrap());
        }
        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(connector.backend().introspections(), 1);
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn mismatched_connection_is_configuration_error() {
        let (registry, _) = registry(people());
        let err = registry.get_or_create("lahman", "people", &conn("other")).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn empty_names_are_rejected() {
        let (registry, _) = registry(people());
        let err = registry.get_or_create("", "people", &conn("")).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[tokio::test]
    async fn failed_construction_is_retried() {
        let (registry, connector) = registry(people());
        for _ in 0..2 {
            let err = registry
                .get_or_create("lahman", "missing", &conn("lahman"))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Schema(_)));
        }
        assert_eq!(connector.backend().introspections(), 2);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn failed_lookups_leave_no_slots_behind() {
        let (registry, _) = registry(people());
        for i in 0..500 {
            let name = format!("missing_{}", i);
            assert!(registry.get_or_create("lahman", &name, &conn("lahman")).await.is_err());
        }
        assert_eq!(registry.slot_count().await, 0);
        registry.get_or_create("lahman", "people", &conn("lahman")).await.unwrap();
        assert_eq!(registry.slot_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failed_lookups_leave_no_slots_behind() {
        let slow = people().with_introspection_delay(Duration::from_millis(20));
        let (registry, _) = registry(slow);
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.get_or_create("lahman", "missing", &conn("lahman")).await
            }));
        }
        for t in tasks {
            assert!(t.await.unwrap().is_err());
        }
        assert_eq!(registry.slot_count().await, 0);
    }

    #[tokio::test]
    async fn distinct_tables_get_distinct_handles() {
        let backend = people().with_table(
            "lahman",
            "teams",
            &[("teamID", "bpchar", "character(3)")],
            &["teamID"],
        );
        let (registry, _) = registry(backend);
        let a = registry.get_or_create("lahman", "people", &conn("lahman")).await.unwrap();
        let b = registry.get_or_create("lahman", "teams", &conn("lahman")).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 2);
    }
}
