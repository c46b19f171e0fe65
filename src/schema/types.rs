use serde::{Deserialize, Serialize};

/// Field type vocabulary for collection schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    /// Integral JSON numbers only.
    Integer,
    /// Any JSON number.
    Float,
    Boolean,
    /// RFC 3339 string.
    Date,
    /// Array whose elements are strings.
    StringArray,
    /// Nested object; declared sub-fields are checked when present.
    Object,
}

impl FieldType {
    /// Label used in type-mismatch reports.
    pub fn label(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::StringArray => "array",
            FieldType::Object => "object",
        }
    }
}

/// Named pattern a string field must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    Email,
}

/// Declared shape of a single document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Allowed values for enum-constrained string fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Sub-fields checked when this is an object field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSchema>,
}

impl FieldSchema {
    pub fn required(name: &str, field_type: FieldType) -> Self {
        Self::new(name, field_type, true)
    }

    pub fn optional(name: &str, field_type: FieldType) -> Self {
        Self::new(name, field_type, false)
    }

    fn new(name: &str, field_type: FieldType, required: bool) -> Self {
        FieldSchema {
            name: name.to_string(),
            field_type,
            required,
            allowed: None,
            pattern: None,
            fields: Vec::new(),
        }
    }

    pub fn with_allowed(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldSchema>) -> Self {
        self.fields = fields;
        self
    }
}

/// Declared shape of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl CollectionSchema {
    pub fn new(name: &str, fields: Vec<FieldSchema>) -> Self {
        CollectionSchema {
            name: name.to_string(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Single- or multi-field uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueKey {
    pub fields: Vec<String>,
}

impl UniqueKey {
    pub fn single(field: &str) -> Self {
        UniqueKey {
            fields: vec![field.to_string()],
        }
    }

    pub fn composite(fields: &[&str]) -> Self {
        UniqueKey {
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Declares that a field must point at an existing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub field: String,
    pub collection: String,
    pub target_field: String,
    /// Extra equality conditions the target must satisfy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<(String, String)>,
}

impl Reference {
    pub fn new(field: &str, collection: &str, target_field: &str) -> Self {
        Reference {
            field: field.to_string(),
            collection: collection.to_string(),
            target_field: target_field.to_string(),
            conditions: Vec::new(),
        }
    }

    /// Restrict the target to documents where `field` equals `value`.
    pub fn requiring(mut self, field: &str, value: &str) -> Self {
        self.conditions.push((field.to_string(), value.to_string()));
        self
    }
}

/// Named bound enforced by the integrity engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeRule {
    pub name: String,
    pub field: String,
    pub kind: RangeKind,
}

impl RangeRule {
    pub fn new(name: &str, field: &str, kind: RangeKind) -> Self {
        RangeRule {
            name: name.to_string(),
            field: field.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    /// Numeric value must be at least the bound.
    Min(f64),
    /// Numeric value must lie within the inclusive bounds.
    Between(f64, f64),
    /// Date value must not precede the named field's date.
    NotBefore(String),
}

/// Cross-document rules checked before a document is admitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityRules {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_keys: Vec<UniqueKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub range_rules: Vec<RangeRule>,
}
