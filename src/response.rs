//! Response bodies: paginated search lists and write counts.

use crate::sql::Row;
use axum::{http::StatusCode, Json};
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;

/// Links around the current page. They are computed arithmetically; a link may point
/// past the end of the data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLinks {
    pub prev_page: String,
    pub current_page: String,
    pub next_page: String,
}

/// A search result. Serialized as a JSON list whose first element is the links object.
#[derive(Clone, Debug)]
pub struct Page {
    pub links: PageLinks,
    pub rows: Vec<Row>,
}

impl Serialize for Page {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len() + 1))?;
        seq.serialize_element(&self.links)?;
        for row in &self.rows {
            seq.serialize_element(row)?;
        }
        seq.end()
    }
}

pub const ENTRIES_INSERTED: &str = "Entries Inserted";
pub const ENTRIES_UPDATED: &str = "Entries Updated";
pub const ENTRIES_DELETED: &str = "Entries Deleted";

/// `{"<label>": n}` with 200, the body of every write.
pub fn entries(label: &str, n: u64) -> (StatusCode, Json<serde_json::Value>) {
    let mut body = serde_json::Map::new();
    body.insert(label.to_string(), n.into());
    (StatusCode::OK, Json(serde_json::Value::Object(body)))
}

pub fn success_ok<T: Serialize>(data: T) -> (StatusCode, Json<T>) {
    (StatusCode::OK, Json(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlValue;
    use serde_json::json;

    #[test]
    fn page_serializes_links_first() {
        let mut row = Row::new();
        row.insert("teamID", SqlValue::from("BOS"));
        let page = Page {
            links: PageLinks {
                prev_page: "p".into(),
                current_page: "c".into(),
                next_page: "n".into(),
            },
            rows: vec![row],
        };
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            json!([{"prevPage": "p", "currentPage": "c", "nextPage": "n"}, {"teamID": "BOS"}])
        );
    }

    #[test]
    fn entries_body_uses_label() {
        let (status, Json(body)) = entries(ENTRIES_UPDATED, 3);
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"Entries Updated": 3}));
    }
}
