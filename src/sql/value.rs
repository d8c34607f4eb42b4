//! Tagged column values: bound as query parameters, decoded from result rows, serialized to JSON.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::{Database, Type};

/// A single cell. Parameters are always written as `$n::<column type>` so the database
/// performs the final conversion; `Text` is the usual carrier for path and query values.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(Value),
}

impl SqlValue {
    /// Map a JSON body value. Arrays and objects are kept as JSON documents.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else if n.is_u64() {
                    // Above i64::MAX; let the database parse it.
                    SqlValue::Text(n.to_string())
                } else {
                    SqlValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => SqlValue::Json(v.clone()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(n) => Some(*n),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(n) => Value::Number((*n).into()),
            SqlValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            SqlValue::Timestamp(d) => Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            SqlValue::TimestampTz(d) => Value::String(d.to_rfc3339()),
            SqlValue::Json(v) => v.clone(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Int(n)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(b) => serializer.serialize_bool(*b),
            SqlValue::Int(n) => serializer.serialize_i64(*n),
            SqlValue::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            SqlValue::Float(_) => serializer.serialize_none(),
            SqlValue::Text(s) => serializer.serialize_str(s),
            SqlValue::Json(v) => v.serialize(serializer),
            other => other.to_json().serialize(serializer),
        }
    }
}

impl<'q> Encode<'q, Postgres> for SqlValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            SqlValue::Null => <Option<String> as Encode<Postgres>>::encode_by_ref(&None, buf)?,
            SqlValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            SqlValue::Int(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            SqlValue::Float(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            SqlValue::Text(s) => <String as Encode<Postgres>>::encode_by_ref(s, buf)?,
            SqlValue::Date(d) => <NaiveDate as Encode<Postgres>>::encode_by_ref(d, buf)?,
            SqlValue::Timestamp(d) => <NaiveDateTime as Encode<Postgres>>::encode_by_ref(d, buf)?,
            SqlValue::TimestampTz(d) => <DateTime<Utc> as Encode<Postgres>>::encode_by_ref(d, buf)?,
            SqlValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        // NULL travels as text: text casts to every column type, int4 does not.
        Some(match self {
            SqlValue::Null | SqlValue::Text(_) => <String as Type<Postgres>>::type_info(),
            SqlValue::Bool(_) => <bool as Type<Postgres>>::type_info(),
            SqlValue::Int(_) => <i64 as Type<Postgres>>::type_info(),
            SqlValue::Float(_) => <f64 as Type<Postgres>>::type_info(),
            SqlValue::Date(_) => <NaiveDate as Type<Postgres>>::type_info(),
            SqlValue::Timestamp(_) => <NaiveDateTime as Type<Postgres>>::type_info(),
            SqlValue::TimestampTz(_) => <DateTime<Utc> as Type<Postgres>>::type_info(),
            SqlValue::Json(_) => <Value as Type<Postgres>>::type_info(),
        })
    }
}

impl Type<Postgres> for SqlValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_keep_their_kind() {
        assert_eq!(SqlValue::from_json(&json!(1960)), SqlValue::Int(1960));
        assert_eq!(SqlValue::from_json(&json!(0.25)), SqlValue::Float(0.25));
        assert_eq!(
            SqlValue::from_json(&json!(u64::MAX)),
            SqlValue::Text(u64::MAX.to_string())
        );
    }

    #[test]
    fn documents_stay_json() {
        let doc = json!({"a": [1, 2]});
        assert_eq!(SqlValue::from_json(&doc), SqlValue::Json(doc.clone()));
    }

    #[test]
    fn serializes_dates_as_iso_strings() {
        let d = NaiveDate::from_ymd_opt(1960, 9, 28).unwrap();
        let out = serde_json::to_value(SqlValue::Date(d)).unwrap();
        assert_eq!(out, json!("1960-09-28"));
    }

    #[test]
    fn non_finite_floats_serialize_as_null() {
        let out = serde_json::to_value(SqlValue::Float(f64::NAN)).unwrap();
        assert_eq!(out, Value::Null);
    }
}
