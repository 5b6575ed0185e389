//! The target database as an opaque schema-management capability.
//!
//! The engine never talks a wire protocol directly; it goes through
//! [`SchemaStore`]. [`memory::MemoryStore`] backs the test suite,
//! [`mongo::MongoStore`] adapts the MongoDB driver.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use bson::Document;
use thiserror::Error;

use crate::definition::IndexDefinition;
use crate::observe::ObservedIndex;

/// Errors at the store boundary, classified so the engine can tell an
/// unreachable database from a rejected operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The database refused the operation (bad validator, index conflict,
    /// missing permission).
    #[error("operation rejected: {0}")]
    Rejected(String),

    /// The referenced namespace does not exist.
    #[error("namespace not found: {0}")]
    NotFound(String),
}

/// Schema-management operations the engine needs from a document database.
///
/// Implementations must be safe to share across tasks; per-collection
/// ordering is the applier's responsibility, not the store's.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// The validator option currently attached to a collection, if any.
    async fn collection_validator(&self, collection: &str) -> Result<Option<Document>, StoreError>;

    async fn list_indexes(&self, collection: &str) -> Result<Vec<ObservedIndex>, StoreError>;

    /// Create a collection, optionally with a validator option document.
    async fn create_collection(&self, collection: &str, validator: Option<&Document>) -> Result<(), StoreError>;

    /// Replace the validator on an existing collection.
    async fn update_validator(&self, collection: &str, validator: &Document) -> Result<(), StoreError>;

    async fn create_index(&self, collection: &str, index: &IndexDefinition) -> Result<(), StoreError>;

    /// Drop an index by its database-side name.
    async fn drop_index(&self, collection: &str, index_name: &str) -> Result<(), StoreError>;
}
