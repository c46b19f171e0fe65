// Provisioning for a fresh store: one collection per catalog entry, a
// unique index behind every declared key, and the advisory indexes the
// read paths lean on.

use crate::error::Result;
use crate::schema::catalog;
use crate::store::{DocumentStore, IndexSpec};
use log::debug;

/// Create every platform collection with its declared schema and back each
/// unique key with a unique index. Running against a store that already
/// holds one of the collections fails.
pub fn provision(store: &dyn DocumentStore) -> Result<()> {
    let registry = catalog::registry();

    for entry in registry.collections() {
        let name = entry.schema.name.as_str();
        store.create_collection(name, entry.schema.clone())?;

        for key in &entry.rules.unique_keys {
            let fields: Vec<&str> = key.fields.iter().map(String::as_str).collect();
            let index_name = format!("{name}_{}_unique", fields.join("_"));
            store.create_index(name, IndexSpec::unique(&index_name, &fields))?;
        }
        debug!("provisioned collection '{name}'");
    }

    store.create_index(
        catalog::COURSES,
        IndexSpec::plain("courses_title_category", &["title", "category"]),
    )?;
    store.create_index(
        catalog::ASSIGNMENTS,
        IndexSpec::plain("assignments_due_date", &["dueDate"]),
    )?;
    Ok(())
}
