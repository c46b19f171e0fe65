pub mod catalog;
mod types;

pub use types::{
    CollectionSchema, FieldSchema, FieldType, IntegrityRules, Pattern, RangeKind, RangeRule,
    Reference, UniqueKey,
};

/// A collection's schema together with its integrity rules.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionEntry {
    pub schema: CollectionSchema,
    pub rules: IntegrityRules,
}

/// All declared collections, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    entries: Vec<CollectionEntry>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, schema: CollectionSchema, rules: IntegrityRules) {
        self.entries.push(CollectionEntry { schema, rules });
    }

    pub fn get(&self, collection: &str) -> Option<&CollectionEntry> {
        self.entries.iter().find(|e| e.schema.name == collection)
    }

    pub fn schema(&self, collection: &str) -> Option<&CollectionSchema> {
        self.get(collection).map(|e| &e.schema)
    }

    pub fn rules(&self, collection: &str) -> Option<&IntegrityRules> {
        self.get(collection).map(|e| &e.rules)
    }

    pub fn collections(&self) -> impl Iterator<Item = &CollectionEntry> {
        self.entries.iter()
    }
}
