//! In-process store used by the test suite and offline planning.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::Document;

use crate::definition::IndexDefinition;
use crate::observe::ObservedIndex;
use crate::store::{SchemaStore, StoreError};

#[derive(Debug, Clone, Default)]
struct MemoryCollection {
    validator: Option<Document>,
    indexes: Vec<ObservedIndex>,
}

/// A faithful little document database: collections with validators and
/// named indexes, plus failure injection for exercising degraded paths.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<BTreeMap<String, MemoryCollection>>,
    denied_reads: Mutex<HashSet<String>>,
    rejected_writes: Mutex<HashSet<String>>,
    poisoned: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a collection, bypassing the trait (test fixtures).
    pub fn seed(&self, name: &str, validator: Option<Document>) {
        self.collections.lock().unwrap().insert(
            name.to_string(),
            MemoryCollection {
                validator,
                indexes: Vec::new(),
            },
        );
    }

    /// Pre-create an index on a seeded collection.
    pub fn seed_index(&self, name: &str, index: &IndexDefinition) {
        let mut collections = self.collections.lock().unwrap();
        let collection = collections.entry(name.to_string()).or_default();
        collection.indexes.push(ObservedIndex {
            name: index.name(),
            keys: index.keys.clone(),
            unique: index.unique,
        });
    }

    /// Make reads (validator, index listing) on one collection fail, as a
    /// permission denial would.
    pub fn deny_reads_on(&self, name: &str) {
        self.denied_reads.lock().unwrap().insert(name.to_string());
    }

    /// Make mutations touching one collection fail, as the database
    /// rejecting a bad option document would.
    pub fn reject_writes_on(&self, name: &str) {
        self.rejected_writes.lock().unwrap().insert(name.to_string());
    }

    /// Simulate a dead connection: every call fails.
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }

    /// Structural dump of the whole store, for side-effect assertions.
    pub fn dump(&self) -> Vec<(String, Option<Document>, Vec<String>)> {
        self.collections
            .lock()
            .unwrap()
            .iter()
            .map(|(name, collection)| {
                (
                    name.clone(),
                    collection.validator.clone(),
                    collection.indexes.iter().map(|index| index.name.clone()).collect(),
                )
            })
            .collect()
    }

    fn check_connection(&self) -> Result<(), StoreError> {
        if self.poisoned.load(Ordering::SeqCst) {
            Err(StoreError::Connection("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn check_read(&self, name: &str) -> Result<(), StoreError> {
        self.check_connection()?;
        if self.denied_reads.lock().unwrap().contains(name) {
            Err(StoreError::Rejected(format!("not authorized to inspect '{name}'")))
        } else {
            Ok(())
        }
    }

    fn check_write(&self, name: &str) -> Result<(), StoreError> {
        self.check_connection()?;
        if self.rejected_writes.lock().unwrap().contains(name) {
            Err(StoreError::Rejected(format!("operation on '{name}' rejected")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SchemaStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.check_connection()?;
        Ok(self.collections.lock().unwrap().keys().cloned().collect())
    }

    async fn collection_validator(&self, collection: &str) -> Result<Option<Document>, StoreError> {
        self.check_read(collection)?;
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|c| c.validator.clone())
            .ok_or_else(|| StoreError::NotFound(collection.to_string()))
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<ObservedIndex>, StoreError> {
        self.check_read(collection)?;
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map(|c| c.indexes.clone())
            .ok_or_else(|| StoreError::NotFound(collection.to_string()))
    }

    async fn create_collection(&self, collection: &str, validator: Option<&Document>) -> Result<(), StoreError> {
        self.check_write(collection)?;
        let mut collections = self.collections.lock().unwrap();
        if collections.contains_key(collection) {
            return Err(StoreError::Rejected(format!("collection '{collection}' already exists")));
        }
        collections.insert(
            collection.to_string(),
            MemoryCollection {
                validator: validator.cloned(),
                indexes: Vec::new(),
            },
        );
        Ok(())
    }

    async fn update_validator(&self, collection: &str, validator: &Document) -> Result<(), StoreError> {
        self.check_write(collection)?;
        let mut collections = self.collections.lock().unwrap();
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound(collection.to_string()))?;
        entry.validator = Some(validator.clone());
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexDefinition) -> Result<(), StoreError> {
        self.check_write(collection)?;
        let mut collections = self.collections.lock().unwrap();
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound(collection.to_string()))?;

        let key_id = index.key_id();
        for existing in &entry.indexes {
            if existing.key_id() == key_id {
                // Same behavior as the real database: recreating an
                // identical index succeeds quietly, conflicting options on
                // the same keys do not.
                return if existing.unique == index.unique {
                    Ok(())
                } else {
                    Err(StoreError::Rejected(format!(
                        "an index already exists on ({key_id}) with different options"
                    )))
                };
            }
            if existing.name == index.name() {
                return Err(StoreError::Rejected(format!(
                    "index name '{}' already taken",
                    existing.name
                )));
            }
        }

        entry.indexes.push(ObservedIndex {
            name: index.name(),
            keys: index.keys.clone(),
            unique: index.unique,
        });
        Ok(())
    }

    async fn drop_index(&self, collection: &str, index_name: &str) -> Result<(), StoreError> {
        self.check_write(collection)?;
        let mut collections = self.collections.lock().unwrap();
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound(collection.to_string()))?;

        let before = entry.indexes.len();
        entry.indexes.retain(|index| index.name != index_name);
        if entry.indexes.len() == before {
            return Err(StoreError::NotFound(format!("index '{index_name}' on '{collection}'")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let store = MemoryStore::new();
        let validator = doc! { "$jsonSchema": { "bsonType": "object" } };

        store.create_collection("reports", Some(&validator)).await.unwrap();
        store
            .create_index("reports", &IndexDefinition::ascending("created_at"))
            .await
            .unwrap();

        assert_eq!(store.list_collections().await.unwrap(), ["reports"]);
        assert_eq!(store.collection_validator("reports").await.unwrap(), Some(validator));

        let indexes = store.list_indexes("reports").await.unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].name, "created_at_1");
    }

    #[tokio::test]
    async fn double_create_is_rejected() {
        let store = MemoryStore::new();
        store.create_collection("reports", None).await.unwrap();

        let err = store.create_collection("reports", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn identical_index_recreation_is_quiet_conflicting_is_not() {
        let store = MemoryStore::new();
        store.create_collection("reports", None).await.unwrap();

        let index = IndexDefinition::ascending("created_at");
        store.create_index("reports", &index).await.unwrap();
        store.create_index("reports", &index).await.unwrap();

        let mut unique = index.clone();
        unique.unique = true;
        let err = store.create_index("reports", &unique).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
    }

    #[tokio::test]
    async fn drop_index_removes_by_name() {
        let store = MemoryStore::new();
        store.create_collection("reports", None).await.unwrap();
        store
            .create_index("reports", &IndexDefinition::ascending("created_at"))
            .await
            .unwrap();

        store.drop_index("reports", "created_at_1").await.unwrap();
        assert!(store.list_indexes("reports").await.unwrap().is_empty());

        let err = store.drop_index("reports", "created_at_1").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_namespace_is_not_found() {
        let store = MemoryStore::new();
        let err = store.list_indexes("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
