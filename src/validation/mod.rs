use crate::document::{self, Document};
use crate::error::Violation;
use crate::schema::{CollectionSchema, FieldSchema, FieldType, Pattern};
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Matches `local@domain.tld` shapes; anything stricter belongs upstream.
static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

/// Check a document against its collection schema.
///
/// Every violation is collected; an empty list means the document is
/// structurally valid. Undeclared fields are ignored, declared object
/// fields are checked one level of sub-fields deep, and array fields are
/// checked element-wise.
pub fn validate(schema: &CollectionSchema, doc: &Document) -> Vec<Violation> {
    let mut violations = Vec::new();
    for field in &schema.fields {
        check_field(field, doc.get(field.name.as_str()), None, &mut violations);
    }
    violations
}

fn check_field(
    field: &FieldSchema,
    value: Option<&Value>,
    parent: Option<&str>,
    out: &mut Vec<Violation>,
) {
    let path = match parent {
        Some(p) => format!("{p}.{}", field.name),
        None => field.name.clone(),
    };

    // An explicit null counts as absent.
    let value = match value {
        Some(v) if !v.is_null() => v,
        _ => {
            if field.required {
                out.push(Violation::MissingField { field: path });
            }
            return;
        }
    };

    if !type_matches(field.field_type, value) {
        out.push(Violation::TypeMismatch {
            field: path,
            expected: field.field_type.label().to_string(),
            actual: document::type_name(value).to_string(),
        });
        return;
    }

    match field.field_type {
        FieldType::String => {
            if let Some(s) = value.as_str() {
                if let Some(allowed) = &field.allowed {
                    if !allowed.iter().any(|a| a == s) {
                        out.push(Violation::InvalidEnumValue {
                            field: path.clone(),
                            value: s.to_string(),
                            allowed: allowed.clone(),
                        });
                    }
                }
                if let Some(pattern) = field.pattern {
                    if !pattern_matches(pattern, s) {
                        out.push(Violation::PatternMismatch { field: path });
                    }
                }
            }
        }
        FieldType::StringArray => {
            if let Some(items) = value.as_array() {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        out.push(Violation::TypeMismatch {
                            field: format!("{path}[{i}]"),
                            expected: "string".to_string(),
                            actual: document::type_name(item).to_string(),
                        });
                    }
                }
            }
        }
        FieldType::Object => {
            if let Some(obj) = value.as_object() {
                for sub in &field.fields {
                    check_field(sub, obj.get(sub.name.as_str()), Some(&path), out);
                }
            }
        }
        _ => {}
    }
}

fn type_matches(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
        FieldType::Float => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Date => value
            .as_str()
            .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false),
        FieldType::StringArray => value.is_array(),
        FieldType::Object => value.is_object(),
    }
}

fn pattern_matches(pattern: Pattern, value: &str) -> bool {
    match pattern {
        Pattern::Email => EMAIL.is_match(value),
    }
}
