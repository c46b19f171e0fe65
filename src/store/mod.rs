// Storage adapter boundary - the trait the data layer is written against,
// plus the filter/update vocabulary shared by every implementation.

mod memory;

pub use memory::{IdStrategy, MemoryStore};

use crate::document::{self, Document};
use crate::error::StoreError;
use crate::pipeline::Stage;
use crate::schema::CollectionSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Finite cursor over matching documents. Re-invoke the producing call to
/// read again from the start.
pub type DocumentStream<'a> = Box<dyn Iterator<Item = Document> + 'a>;

/// A single per-field condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cond {
    /// Exact equality. Null matches an absent field.
    Eq(Value),
    /// Membership; an array field matches when any element is in the set.
    In(Vec<Value>),
    /// At least the given value. Applies only across like kinds.
    Gte(Value),
    /// At most the given value. Applies only across like kinds.
    Lte(Value),
    /// Case-insensitive substring match on string fields. The needle is
    /// stored lowercased.
    Contains(String),
}

/// Conjunction of per-field conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    clauses: Vec<(String, Cond)>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, Cond::Eq(value.into()))
    }

    pub fn one_of(self, field: &str, values: Vec<Value>) -> Self {
        self.push(field, Cond::In(values))
    }

    pub fn gte(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, Cond::Gte(value.into()))
    }

    pub fn lte(self, field: &str, value: impl Into<Value>) -> Self {
        self.push(field, Cond::Lte(value.into()))
    }

    pub fn contains(self, field: &str, needle: &str) -> Self {
        self.push(field, Cond::Contains(needle.to_lowercase()))
    }

    fn push(mut self, field: &str, cond: Cond) -> Self {
        self.clauses.push((field.to_string(), cond));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|(field, cond)| {
            let value = doc.get(field.as_str());
            match cond {
                Cond::Eq(expected) => value.map_or(expected.is_null(), |v| v == expected),
                Cond::In(set) => match value {
                    Some(Value::Array(items)) => items.iter().any(|item| set.contains(item)),
                    Some(v) => set.contains(v),
                    None => false,
                },
                Cond::Gte(bound) => value.map_or(false, |v| {
                    document::comparable(v, bound)
                        && document::compare_values(v, bound) != Ordering::Less
                }),
                Cond::Lte(bound) => value.map_or(false, |v| {
                    document::comparable(v, bound)
                        && document::compare_values(v, bound) != Ordering::Greater
                }),
                Cond::Contains(needle) => value
                    .and_then(Value::as_str)
                    .map_or(false, |s| s.to_lowercase().contains(needle)),
            }
        })
    }
}

/// A single field mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOp {
    /// Overwrite the field.
    Set(Value),
    /// Append the values not already present in an array field. Creates
    /// the array when the field is absent; non-array fields are left alone.
    AddToSet(Vec<Value>),
}

/// Ordered list of field mutations applied by `update_one`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    ops: Vec<(String, UpdateOp)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push((field.to_string(), UpdateOp::Set(value.into())));
        self
    }

    pub fn add_to_set(mut self, field: &str, values: Vec<Value>) -> Self {
        self.ops.push((field.to_string(), UpdateOp::AddToSet(values)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply to a document in place. Reports whether anything changed;
    /// setting a field to its current value is not a change.
    pub fn apply(&self, doc: &mut Document) -> bool {
        let mut changed = false;
        for (field, op) in &self.ops {
            match op {
                UpdateOp::Set(value) => {
                    if doc.get(field.as_str()) != Some(value) {
                        doc.insert(field.clone(), value.clone());
                        changed = true;
                    }
                }
                UpdateOp::AddToSet(values) => {
                    let entry = doc
                        .entry(field.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(items) = entry {
                        for value in values {
                            if !items.contains(value) {
                                items.push(value.clone());
                                changed = true;
                            }
                        }
                    }
                }
            }
        }
        changed
    }
}

/// Index declaration handed to the adapter. Unique indexes are enforced;
/// plain ones are advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

impl IndexSpec {
    pub fn unique(name: &str, fields: &[&str]) -> Self {
        Self::build(name, fields, true)
    }

    pub fn plain(name: &str, fields: &[&str]) -> Self {
        Self::build(name, fields, false)
    }

    fn build(name: &str, fields: &[&str], unique: bool) -> Self {
        IndexSpec {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            unique,
        }
    }
}

/// Outcome of an update: how many documents matched and how many changed.
/// Zero matches is a result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub deleted: u64,
}

/// Storage adapter the data layer is written against.
///
/// Implementations are shared across threads. Reads on a collection that
/// was never created return nothing; writes to one are an error. Documents
/// come back in insertion order.
pub trait DocumentStore: Send + Sync {
    /// Insert a document and return its generated id.
    fn insert(&self, collection: &str, doc: Document) -> Result<String, StoreError>;

    /// First matching document.
    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError>;

    /// All matching documents.
    fn find<'a>(
        &'a self,
        collection: &str,
        filter: &Filter,
    ) -> Result<DocumentStream<'a>, StoreError>;

    /// Apply mutations to the first matching document.
    fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError>;

    /// Remove the first matching document.
    fn delete_one(&self, collection: &str, filter: &Filter) -> Result<DeleteResult, StoreError>;

    /// Run an aggregation pipeline over the collection.
    fn aggregate<'a>(
        &'a self,
        collection: &str,
        stages: &[Stage],
    ) -> Result<DocumentStream<'a>, StoreError>;

    /// Declare an index. Redeclaring an identical spec is a no-op; a
    /// different spec under the same name is a conflict.
    fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<(), StoreError>;

    /// Create a collection with its declared schema. Fails if it exists.
    fn create_collection(
        &self,
        collection: &str,
        schema: CollectionSchema,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::all().matches(&doc(json!({ "a": 1 }))));
        assert!(Filter::all().matches(&Document::new()));
    }

    #[test]
    fn test_eq_and_missing_fields() {
        let filter = Filter::all().eq("role", "student");
        assert!(filter.matches(&doc(json!({ "role": "student" }))));
        assert!(!filter.matches(&doc(json!({ "role": "instructor" }))));
        assert!(!filter.matches(&doc(json!({}))));

        // Null matches an absent field, as drivers do.
        let null_filter = Filter::all().eq("category", Value::Null);
        assert!(null_filter.matches(&doc(json!({}))));
        assert!(!null_filter.matches(&doc(json!({ "category": "design" }))));
    }

    #[test]
    fn test_in_matches_any_array_element() {
        let filter = Filter::all().one_of("tags", vec![json!("python"), json!("rust")]);
        assert!(filter.matches(&doc(json!({ "tags": ["web", "rust"] }))));
        assert!(!filter.matches(&doc(json!({ "tags": ["web"] }))));
        // Scalar fields still match by membership.
        assert!(filter.matches(&doc(json!({ "tags": "python" }))));
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let filter = Filter::all().contains("title", "PyThOn");
        assert!(filter.matches(&doc(json!({ "title": "Advanced Python Patterns" }))));
        assert!(!filter.matches(&doc(json!({ "title": "Rust Basics" }))));
        assert!(!filter.matches(&doc(json!({ "title": 7 }))));
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let filter = Filter::all().gte("price", 50.0).lte("price", 200.0);
        assert!(filter.matches(&doc(json!({ "price": 50.0 }))));
        assert!(filter.matches(&doc(json!({ "price": 200 }))));
        assert!(!filter.matches(&doc(json!({ "price": 200.01 }))));
        assert!(!filter.matches(&doc(json!({ "price": 49.99 }))));
    }

    #[test]
    fn test_range_ignores_unlike_kinds() {
        let filter = Filter::all().gte("price", 10.0);
        assert!(!filter.matches(&doc(json!({ "price": "expensive" }))));
        assert!(!filter.matches(&doc(json!({}))));
    }

    #[test]
    fn test_date_ranges_compare_as_instants() {
        let filter = Filter::all().gte("dueDate", "2024-06-01T00:00:00Z");
        assert!(filter.matches(&doc(json!({ "dueDate": "2024-06-01T02:00:00+01:00" }))));
        assert!(!filter.matches(&doc(json!({ "dueDate": "2024-05-31T23:59:59Z" }))));
    }

    #[test]
    fn test_update_set_reports_real_changes_only() {
        let mut target = doc(json!({ "isActive": true }));
        let update = Update::new().set("isActive", true);
        assert!(!update.apply(&mut target));

        let update = Update::new().set("isActive", false);
        assert!(update.apply(&mut target));
        assert_eq!(target["isActive"], json!(false));
    }

    #[test]
    fn test_add_to_set_deduplicates() {
        let mut target = doc(json!({ "tags": ["python"] }));
        let update = Update::new().add_to_set("tags", vec![json!("python"), json!("web")]);
        assert!(update.apply(&mut target));
        assert_eq!(target["tags"], json!(["python", "web"]));

        // Second application changes nothing.
        assert!(!update.apply(&mut target));
        assert_eq!(target["tags"], json!(["python", "web"]));
    }

    #[test]
    fn test_add_to_set_creates_missing_array() {
        let mut target = doc(json!({}));
        let update = Update::new().add_to_set("tags", vec![json!("new")]);
        assert!(update.apply(&mut target));
        assert_eq!(target["tags"], json!(["new"]));
    }

    #[test]
    fn test_add_to_set_leaves_non_arrays_alone() {
        let mut target = doc(json!({ "tags": "oops" }));
        let update = Update::new().add_to_set("tags", vec![json!("new")]);
        assert!(!update.apply(&mut target));
        assert_eq!(target["tags"], json!("oops"));
    }
}
