//! MongoDB driver adapter for [`SchemaStore`].

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{CreateCollectionOptions, IndexOptions};
use mongodb::{Client, Database, IndexModel};

use crate::definition::{IndexDefinition, IndexDirection};
use crate::observe::ObservedIndex;
use crate::store::{SchemaStore, StoreError};

/// Schema-management operations over one MongoDB database.
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connect and bind to a database by name.
    pub async fn connect(url: &str, database: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(url).await.map_err(classify)?;
        Ok(Self {
            db: client.database(database),
        })
    }

    pub fn database_name(&self) -> &str {
        self.db.name()
    }
}

#[async_trait]
impl SchemaStore for MongoStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let mut names = self.db.list_collection_names(None).await.map_err(classify)?;
        names.sort();
        Ok(names)
    }

    async fn collection_validator(&self, collection: &str) -> Result<Option<Document>, StoreError> {
        let mut cursor = self
            .db
            .list_collections(doc! { "name": collection }, None)
            .await
            .map_err(classify)?;

        while cursor.advance().await.map_err(classify)? {
            let spec = cursor.deserialize_current().map_err(classify)?;
            if spec.name == collection {
                return Ok(spec.options.validator);
            }
        }

        Err(StoreError::NotFound(collection.to_string()))
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<ObservedIndex>, StoreError> {
        let mut cursor = self
            .db
            .collection::<Document>(collection)
            .list_indexes(None)
            .await
            .map_err(classify)?;

        let mut indexes = Vec::new();
        while cursor.advance().await.map_err(classify)? {
            let model = cursor.deserialize_current().map_err(classify)?;
            let Some(keys) = observed_keys(&model.keys) else {
                // Text, hashed, and other special index kinds are outside
                // the definition vocabulary; leave them untouched.
                log::debug!("ignoring non-btree index on '{collection}': {:?}", model.keys);
                continue;
            };
            let options = model.options.unwrap_or_default();
            indexes.push(ObservedIndex {
                name: options.name.unwrap_or_default(),
                keys,
                unique: options.unique.unwrap_or(false),
            });
        }

        Ok(indexes)
    }

    async fn create_collection(&self, collection: &str, validator: Option<&Document>) -> Result<(), StoreError> {
        let options = validator.map(|validator| {
            CreateCollectionOptions::builder()
                .validator(validator.clone())
                .build()
        });

        self.db
            .create_collection(collection, options)
            .await
            .map_err(classify)
    }

    async fn update_validator(&self, collection: &str, validator: &Document) -> Result<(), StoreError> {
        self.db
            .run_command(doc! { "collMod": collection, "validator": validator.clone() }, None)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn create_index(&self, collection: &str, index: &IndexDefinition) -> Result<(), StoreError> {
        let options = IndexOptions::builder()
            .name(index.name())
            .unique(index.unique)
            .build();
        let model = IndexModel::builder().keys(index.keys_document()).options(options).build();

        self.db
            .collection::<Document>(collection)
            .create_index(model, None)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn drop_index(&self, collection: &str, index_name: &str) -> Result<(), StoreError> {
        self.db
            .collection::<Document>(collection)
            .drop_index(index_name, None)
            .await
            .map_err(classify)
    }
}

/// Map a driver key document to the definition vocabulary. Returns `None`
/// when any key is not a plain `1`/`-1` direction.
fn observed_keys(keys: &Document) -> Option<Vec<(String, IndexDirection)>> {
    let mut observed = Vec::with_capacity(keys.len());
    for (field, direction) in keys {
        let direction = match direction {
            Bson::Int32(v) => IndexDirection::from_i64(*v as i64),
            Bson::Int64(v) => IndexDirection::from_i64(*v),
            Bson::Double(v) if v.fract() == 0.0 => IndexDirection::from_i64(*v as i64),
            _ => None,
        }?;
        observed.push((field.to_string(), direction));
    }
    Some(observed)
}

/// Split driver failures into "database unreachable" and "database said no";
/// the applier treats these very differently.
fn classify(err: MongoError) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::Authentication { .. } => StoreError::Connection(err.to_string()),
        ErrorKind::Command(command) if command.code == 26 => StoreError::NotFound(command.message.clone()),
        _ => StoreError::Rejected(err.to_string()),
    }
}
