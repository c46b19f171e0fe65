pub mod schema;
pub mod document;
pub mod validation;
pub mod integrity;
pub mod store;
pub mod pipeline;
pub mod query;
pub mod analytics;
pub mod model;
pub mod setup;
pub mod error;

pub use error::{EduHubError, Result, StoreError, Violation};
pub use schema::SchemaRegistry;
pub use store::{DocumentStore, MemoryStore};
pub use document::Document;
