//! Point-in-time introspection of the live database.

use std::collections::BTreeMap;

use bson::Document;
use chrono::{DateTime, Utc};

use crate::definition::{IndexDirection, key_id};
use crate::errors::SchemaError;
use crate::store::{SchemaStore, StoreError};

/// An index as reported by the live database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedIndex {
    pub name: String,
    pub keys: Vec<(String, IndexDirection)>,
    pub unique: bool,
}

impl ObservedIndex {
    /// Normalized key identity, comparable with
    /// [`IndexDefinition::key_id`](crate::definition::IndexDefinition::key_id).
    pub fn key_id(&self) -> String {
        key_id(&self.keys)
    }
}

/// What introspection learned about one collection.
#[derive(Debug, Clone)]
pub enum Observation {
    /// Validator and index list were read successfully.
    Inspected(ObservedCollection),
    /// The collection exists but could not be inspected (permissions,
    /// transient failure). Treated conservatively: it is never assumed
    /// absent, and no operations are planned against it.
    Unknown { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct ObservedCollection {
    pub validator: Option<Document>,
    pub indexes: Vec<ObservedIndex>,
}

/// Snapshot of live collections. Stale the moment it is captured; a plan
/// computed from it can be discarded and recomputed at any time before
/// application begins.
#[derive(Debug, Clone)]
pub struct ObservedState {
    collections: BTreeMap<String, Observation>,
    captured_at: DateTime<Utc>,
}

impl ObservedState {
    /// Capture the current collection/validator/index state.
    ///
    /// Fails with a connection error only when the collection listing itself
    /// is unusable. Per-collection read failures degrade that collection to
    /// [`Observation::Unknown`] instead of aborting the snapshot.
    pub async fn snapshot(store: &dyn SchemaStore) -> Result<Self, SchemaError> {
        let names = store.list_collections().await.map_err(|err| match err {
            StoreError::Connection(message) => SchemaError::Connection { message },
            other => SchemaError::Connection {
                message: other.to_string(),
            },
        })?;

        let mut collections = BTreeMap::new();
        for name in names {
            let observation = match inspect(store, &name).await {
                Ok(collection) => Observation::Inspected(collection),
                Err(err) => {
                    log::warn!("could not inspect collection '{name}': {err}");
                    Observation::Unknown {
                        reason: err.to_string(),
                    }
                }
            };
            collections.insert(name, observation);
        }

        Ok(Self {
            collections,
            captured_at: Utc::now(),
        })
    }

    /// Build a snapshot from already-known observations (tests, offline
    /// planning).
    pub fn from_observations<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = (String, Observation)>,
    {
        Self {
            collections: observations.into_iter().collect(),
            captured_at: Utc::now(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Observation> {
        self.collections.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Observation)> {
        self.collections.iter().map(|(name, obs)| (name.as_str(), obs))
    }

    /// True when at least one collection could not be inspected.
    pub fn is_partial(&self) -> bool {
        self.collections
            .values()
            .any(|obs| matches!(obs, Observation::Unknown { .. }))
    }

    /// Collections that degraded to `Unknown`, with the failure reason.
    pub fn unknown(&self) -> impl Iterator<Item = (&str, &str)> {
        self.collections.iter().filter_map(|(name, obs)| match obs {
            Observation::Unknown { reason } => Some((name.as_str(), reason.as_str())),
            Observation::Inspected(_) => None,
        })
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

async fn inspect(store: &dyn SchemaStore, name: &str) -> Result<ObservedCollection, StoreError> {
    let validator = store.collection_validator(name).await?;
    let indexes = store.list_indexes(name).await?;
    Ok(ObservedCollection { validator, indexes })
}
