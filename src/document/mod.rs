// Document primitives - JSON records, field access, value ordering

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// A stored record: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Field the store writes its generated identifier under.
pub const ID_FIELD: &str = "_id";

/// A field value, treating an explicit null the same as absent.
pub fn get<'a>(doc: &'a Document, field: &str) -> Option<&'a Value> {
    doc.get(field).filter(|v| !v.is_null())
}

pub fn get_str<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    get(doc, field).and_then(Value::as_str)
}

pub fn get_f64(doc: &Document, field: &str) -> Option<f64> {
    get(doc, field).and_then(Value::as_f64)
}

pub fn get_bool(doc: &Document, field: &str) -> Option<bool> {
    get(doc, field).and_then(Value::as_bool)
}

pub fn get_array<'a>(doc: &'a Document, field: &str) -> Option<&'a Vec<Value>> {
    get(doc, field).and_then(Value::as_array)
}

/// Parse an RFC 3339 date value into a UTC instant.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Render a UTC instant as the RFC 3339 string form documents carry.
pub fn format_date(instant: DateTime<Utc>) -> Value {
    Value::String(instant.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Render a value for violation reports: strings bare, everything else
/// as its JSON text.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coarse type label used in mismatch reports.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether two values are of the same comparison kind. Range conditions
/// only apply across like kinds.
pub fn comparable(a: &Value, b: &Value) -> bool {
    kind_rank(a) == kind_rank(b)
}

/// Total order over document values, used by filters and sorts.
///
/// Kinds order as null < boolean < number < string < array < object.
/// Strings that both parse as RFC 3339 compare as instants, so dates with
/// mixed offsets order correctly; other strings compare lexicographically.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let fx = x.as_f64().unwrap_or(f64::NAN);
            let fy = y.as_f64().unwrap_or(f64::NAN);
            fx.partial_cmp(&fy).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => {
            match (parse_date(a), parse_date(b)) {
                (Some(dx), Some(dy)) => dx.cmp(&dy),
                _ => x.cmp(y),
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            for (vx, vy) in x.iter().zip(y.iter()) {
                let ord = compare_values(vx, vy);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Serialize a typed record into a document.
pub fn to_document<T: Serialize>(record: &T) -> serde_json::Result<Document> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "expected an object, got {}",
            type_name(&other)
        ))),
    }
}

/// Deserialize a document into a typed record.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> serde_json::Result<T> {
    serde_json::from_value(Value::Object(doc))
}
