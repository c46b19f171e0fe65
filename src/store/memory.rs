use super::{
    DeleteResult, DocumentStore, DocumentStream, Filter, IndexSpec, Update, UpdateResult,
};
use crate::document::{self, Document};
use crate::error::StoreError;
use crate::pipeline::{self, CollectionSource, Stage};
use crate::schema::CollectionSchema;
use crate::validation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Strategy for generated document ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    #[default]
    Ulid,
    Uuid,
    Nanoid,
}

impl IdStrategy {
    fn generate(&self) -> String {
        match self {
            IdStrategy::Ulid => ulid::Ulid::new().to_string(),
            IdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            IdStrategy::Nanoid => nanoid::nanoid!(),
        }
    }
}

struct Collection {
    schema: CollectionSchema,
    docs: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

/// In-process `DocumentStore` holding collections behind a read-write lock.
///
/// The bundled reference adapter: it validates documents against the
/// collection schema on every write and enforces declared unique indexes,
/// making it the authoritative backstop behind the racy integrity
/// pre-checks. Insertion order is preserved.
pub struct MemoryStore {
    inner: RwLock<HashMap<String, Collection>>,
    id_strategy: IdStrategy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_ids(IdStrategy::default())
    }

    pub fn with_ids(id_strategy: IdStrategy) -> Self {
        MemoryStore {
            inner: RwLock::new(HashMap::new()),
            id_strategy,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

/// Values of an index's fields, or None when any field is absent (the
/// index then does not apply to the document).
fn index_key(index: &IndexSpec, doc: &Document) -> Option<Vec<Value>> {
    index
        .fields
        .iter()
        .map(|f| document::get(doc, f).cloned())
        .collect()
}

/// First unique index another document already occupies with this
/// document's key, skipping `skip` (the document's own slot on updates).
fn unique_violation(
    collection: &Collection,
    doc: &Document,
    skip: Option<usize>,
) -> Option<(Vec<String>, Vec<String>)> {
    for index in collection.indexes.iter().filter(|i| i.unique) {
        let key = match index_key(index, doc) {
            Some(k) => k,
            None => continue,
        };
        for (pos, existing) in collection.docs.iter().enumerate() {
            if skip == Some(pos) {
                continue;
            }
            if index_key(index, existing).as_ref() == Some(&key) {
                let values = key.iter().map(document::render).collect();
                return Some((index.fields.clone(), values));
            }
        }
    }
    None
}

impl DocumentStore for MemoryStore {
    fn insert(&self, collection: &str, mut doc: Document) -> Result<String, StoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let entry = inner
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let violations = validation::validate(&entry.schema, &doc);
        if !violations.is_empty() {
            return Err(StoreError::DocumentRejected(violations));
        }
        if let Some((fields, values)) = unique_violation(entry, &doc, None) {
            return Err(StoreError::DuplicateKey { fields, values });
        }

        let id = self.id_strategy.generate();
        doc.insert(document::ID_FIELD.to_string(), Value::String(id.clone()));
        entry.docs.push(doc);
        Ok(id)
    }

    fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .get(collection)
            .and_then(|c| c.docs.iter().find(|d| filter.matches(d)).cloned()))
    }

    fn find<'a>(
        &'a self,
        collection: &str,
        filter: &Filter,
    ) -> Result<DocumentStream<'a>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        let docs: Vec<Document> = match inner.get(collection) {
            Some(c) => c.docs.iter().filter(|d| filter.matches(d)).cloned().collect(),
            None => Vec::new(),
        };
        Ok(Box::new(docs.into_iter()))
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let entry = inner
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let pos = match entry.docs.iter().position(|d| filter.matches(d)) {
            Some(pos) => pos,
            None => {
                return Ok(UpdateResult {
                    matched: 0,
                    modified: 0,
                })
            }
        };

        let mut updated = entry.docs[pos].clone();
        let changed = update.apply(&mut updated);
        if changed {
            let violations = validation::validate(&entry.schema, &updated);
            if !violations.is_empty() {
                return Err(StoreError::DocumentRejected(violations));
            }
            if let Some((fields, values)) = unique_violation(entry, &updated, Some(pos)) {
                return Err(StoreError::DuplicateKey { fields, values });
            }
            entry.docs[pos] = updated;
        }

        Ok(UpdateResult {
            matched: 1,
            modified: u64::from(changed),
        })
    }

    fn delete_one(&self, collection: &str, filter: &Filter) -> Result<DeleteResult, StoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let entry = inner
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        match entry.docs.iter().position(|d| filter.matches(d)) {
            Some(pos) => {
                entry.docs.remove(pos);
                Ok(DeleteResult { deleted: 1 })
            }
            None => Ok(DeleteResult { deleted: 0 }),
        }
    }

    fn aggregate<'a>(
        &'a self,
        collection: &str,
        stages: &[Stage],
    ) -> Result<DocumentStream<'a>, StoreError> {
        let input = self.collection(collection)?;
        let rows = pipeline::run(stages, input, self)?;
        Ok(Box::new(rows.into_iter()))
    }

    fn create_index(&self, collection: &str, spec: IndexSpec) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let entry = inner
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        if let Some(existing) = entry.indexes.iter().find(|i| i.name == spec.name) {
            if *existing == spec {
                return Ok(());
            }
            return Err(StoreError::IndexConflict {
                collection: collection.to_string(),
                name: spec.name,
            });
        }

        // A unique index cannot be built over data that already breaks it.
        if spec.unique {
            let mut seen: Vec<Vec<Value>> = Vec::new();
            for doc in &entry.docs {
                let key = match index_key(&spec, doc) {
                    Some(k) => k,
                    None => continue,
                };
                if seen.contains(&key) {
                    return Err(StoreError::DuplicateKey {
                        fields: spec.fields.clone(),
                        values: key.iter().map(document::render).collect(),
                    });
                }
                seen.push(key);
            }
        }

        entry.indexes.push(spec);
        Ok(())
    }

    fn create_collection(
        &self,
        collection: &str,
        schema: CollectionSchema,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if inner.contains_key(collection) {
            return Err(StoreError::CollectionExists(collection.to_string()));
        }
        inner.insert(
            collection.to_string(),
            Collection {
                schema,
                docs: Vec::new(),
                indexes: Vec::new(),
            },
        );
        Ok(())
    }
}

impl CollectionSource for MemoryStore {
    fn collection(&self, name: &str) -> Result<Vec<Document>, StoreError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.get(name).map(|c| c.docs.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Violation;
    use crate::schema::{CollectionSchema, FieldSchema, FieldType};
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn people_schema() -> CollectionSchema {
        CollectionSchema::new(
            "people",
            vec![
                FieldSchema::required("personId", FieldType::String),
                FieldSchema::required("email", FieldType::String),
                FieldSchema::optional("tags", FieldType::StringArray),
            ],
        )
    }

    fn setup_test_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_collection("people", people_schema()).unwrap();
        store
            .create_index("people", IndexSpec::unique("people_email", &["email"]))
            .unwrap();
        store
    }

    fn person(id: &str, email: &str) -> Document {
        doc(json!({ "personId": id, "email": email }))
    }

    #[test]
    fn test_insert_assigns_id_and_find_one_returns_it() {
        let store = setup_test_store();
        let id = store.insert("people", person("P1", "p1@example.com")).unwrap();
        assert!(!id.is_empty());

        let found = store
            .find_one("people", &Filter::all().eq("personId", "P1"))
            .unwrap()
            .unwrap();
        assert_eq!(document::get_str(&found, "_id"), Some(id.as_str()));
    }

    #[test]
    fn test_reads_on_unknown_collection_are_empty() {
        let store = MemoryStore::new();
        assert!(store.find_one("ghosts", &Filter::all()).unwrap().is_none());
        assert_eq!(store.find("ghosts", &Filter::all()).unwrap().count(), 0);
        assert_eq!(store.aggregate("ghosts", &[]).unwrap().count(), 0);
    }

    #[test]
    fn test_writes_on_unknown_collection_fail() {
        let store = MemoryStore::new();
        let err = store.insert("ghosts", Document::new()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownCollection(_)));

        let err = store
            .update_one("ghosts", &Filter::all(), &Update::new().set("a", 1))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownCollection(_)));
    }

    #[test]
    fn test_schema_backstop_rejects_invalid_documents() {
        let store = setup_test_store();
        let err = store
            .insert("people", doc(json!({ "personId": "P1" })))
            .unwrap_err();
        match err {
            StoreError::DocumentRejected(violations) => {
                assert_eq!(
                    violations,
                    vec![Violation::MissingField {
                        field: "email".to_string()
                    }]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unique_index_blocks_duplicate_inserts() {
        let store = setup_test_store();
        store.insert("people", person("P1", "same@example.com")).unwrap();

        let err = store
            .insert("people", person("P2", "same@example.com"))
            .unwrap_err();
        match err {
            StoreError::DuplicateKey { fields, values } => {
                assert_eq!(fields, vec!["email".to_string()]);
                assert_eq!(values, vec!["same@example.com".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Exactly one document stored.
        assert_eq!(store.find("people", &Filter::all()).unwrap().count(), 1);
    }

    #[test]
    fn test_unique_index_applies_to_updates() {
        let store = setup_test_store();
        store.insert("people", person("P1", "a@example.com")).unwrap();
        store.insert("people", person("P2", "b@example.com")).unwrap();

        let err = store
            .update_one(
                "people",
                &Filter::all().eq("personId", "P2"),
                &Update::new().set("email", "a@example.com"),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[test]
    fn test_update_to_own_value_does_not_self_collide() {
        let store = setup_test_store();
        store.insert("people", person("P1", "a@example.com")).unwrap();

        let result = store
            .update_one(
                "people",
                &Filter::all().eq("personId", "P1"),
                &Update::new().set("email", "a@example.com"),
            )
            .unwrap();
        assert_eq!(
            result,
            UpdateResult {
                matched: 1,
                modified: 0
            }
        );
    }

    #[test]
    fn test_update_one_counts_matched_and_modified() {
        let store = setup_test_store();
        store.insert("people", person("P1", "a@example.com")).unwrap();

        let update = Update::new().set("email", "new@example.com");
        let first = store
            .update_one("people", &Filter::all().eq("personId", "P1"), &update)
            .unwrap();
        assert_eq!(
            first,
            UpdateResult {
                matched: 1,
                modified: 1
            }
        );

        let second = store
            .update_one("people", &Filter::all().eq("personId", "P1"), &update)
            .unwrap();
        assert_eq!(
            second,
            UpdateResult {
                matched: 1,
                modified: 0
            }
        );

        let none = store
            .update_one("people", &Filter::all().eq("personId", "P9"), &update)
            .unwrap();
        assert_eq!(
            none,
            UpdateResult {
                matched: 0,
                modified: 0
            }
        );
    }

    #[test]
    fn test_delete_one_removes_a_single_document() {
        let store = setup_test_store();
        store.insert("people", person("P1", "a@example.com")).unwrap();
        store.insert("people", person("P2", "b@example.com")).unwrap();

        let result = store
            .delete_one("people", &Filter::all().eq("personId", "P1"))
            .unwrap();
        assert_eq!(result, DeleteResult { deleted: 1 });

        let again = store
            .delete_one("people", &Filter::all().eq("personId", "P1"))
            .unwrap();
        assert_eq!(again, DeleteResult { deleted: 0 });
        assert_eq!(store.find("people", &Filter::all()).unwrap().count(), 1);
    }

    #[test]
    fn test_create_collection_twice_fails() {
        let store = setup_test_store();
        let err = store
            .create_collection("people", people_schema())
            .unwrap_err();
        assert!(matches!(err, StoreError::CollectionExists(_)));
    }

    #[test]
    fn test_create_index_is_idempotent_for_identical_specs() {
        let store = setup_test_store();
        store
            .create_index("people", IndexSpec::unique("people_email", &["email"]))
            .unwrap();

        let err = store
            .create_index("people", IndexSpec::plain("people_email", &["email"]))
            .unwrap_err();
        assert!(matches!(err, StoreError::IndexConflict { .. }));
    }

    #[test]
    fn test_unique_index_refuses_existing_duplicates() {
        let store = MemoryStore::new();
        store.create_collection("people", people_schema()).unwrap();
        store.insert("people", person("P1", "same@example.com")).unwrap();
        store.insert("people", person("P2", "same@example.com")).unwrap();

        let err = store
            .create_index("people", IndexSpec::unique("people_email", &["email"]))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[test]
    fn test_composite_unique_index() {
        let store = MemoryStore::new();
        store.create_collection("people", people_schema()).unwrap();
        store
            .create_index(
                "people",
                IndexSpec::unique("people_pair", &["personId", "email"]),
            )
            .unwrap();

        store.insert("people", person("P1", "a@example.com")).unwrap();
        store.insert("people", person("P1", "b@example.com")).unwrap();

        let err = store
            .insert("people", person("P1", "a@example.com"))
            .unwrap_err();
        match err {
            StoreError::DuplicateKey { fields, .. } => {
                assert_eq!(fields, vec!["personId".to_string(), "email".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_find_preserves_insertion_order() {
        let store = setup_test_store();
        for i in 0..5 {
            store
                .insert("people", person(&format!("P{i}"), &format!("p{i}@example.com")))
                .unwrap();
        }
        let ids: Vec<String> = store
            .find("people", &Filter::all())
            .unwrap()
            .filter_map(|d| document::get_str(&d, "personId").map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["P0", "P1", "P2", "P3", "P4"]);
    }

    #[test]
    fn test_id_strategies_produce_distinct_ids() {
        for strategy in [IdStrategy::Ulid, IdStrategy::Uuid, IdStrategy::Nanoid] {
            let store = MemoryStore::with_ids(strategy);
            store.create_collection("people", people_schema()).unwrap();
            let a = store.insert("people", person("P1", "a@example.com")).unwrap();
            let b = store.insert("people", person("P2", "b@example.com")).unwrap();
            assert_ne!(a, b);
        }
    }
}
