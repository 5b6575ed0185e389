//! Desired-state model: collections, validator schemas, and index definitions.
//!
//! Definitions are immutable once loaded; a reload replaces them wholesale.
//! The wire shape mirrors the database's `$jsonSchema` validator documents,
//! with `bsonType` accepting either a single tag or a tag list for nullable
//! fields (`["string", "null"]`).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::errors::ValidationIssue;

/// BSON type tags usable in a field constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BsonType {
    #[serde(rename = "objectId")]
    ObjectId,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "object")]
    Object,
    #[serde(rename = "array")]
    Array,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "long")]
    Long,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "decimal")]
    Decimal,
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "null")]
    Null,
    #[serde(rename = "timestamp")]
    Timestamp,
    #[serde(rename = "binData")]
    BinData,
}

impl BsonType {
    /// The tag understood by the database's `$jsonSchema` dialect.
    pub fn tag(&self) -> &'static str {
        match self {
            BsonType::ObjectId => "objectId",
            BsonType::String => "string",
            BsonType::Object => "object",
            BsonType::Array => "array",
            BsonType::Date => "date",
            BsonType::Int => "int",
            BsonType::Long => "long",
            BsonType::Double => "double",
            BsonType::Decimal => "decimal",
            BsonType::Bool => "bool",
            BsonType::Null => "null",
            BsonType::Timestamp => "timestamp",
            BsonType::BinData => "binData",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "objectId" => BsonType::ObjectId,
            "string" => BsonType::String,
            "object" => BsonType::Object,
            "array" => BsonType::Array,
            "date" => BsonType::Date,
            "int" => BsonType::Int,
            "long" => BsonType::Long,
            "double" => BsonType::Double,
            "decimal" => BsonType::Decimal,
            "bool" => BsonType::Bool,
            "null" => BsonType::Null,
            "timestamp" => BsonType::Timestamp,
            "binData" => BsonType::BinData,
            _ => return None,
        })
    }
}

impl fmt::Display for BsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Index key direction. Serializes as the database's `1` / `-1` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexDirection {
    Ascending,
    Descending,
}

impl IndexDirection {
    pub fn as_i32(&self) -> i32 {
        match self {
            IndexDirection::Ascending => 1,
            IndexDirection::Descending => -1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(IndexDirection::Ascending),
            -1 => Some(IndexDirection::Descending),
            _ => None,
        }
    }
}

impl Serialize for IndexDirection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for IndexDirection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = i64::deserialize(deserializer)?;
        IndexDirection::from_i64(value)
            .ok_or_else(|| serde::de::Error::custom(format!("index direction must be 1 or -1, got {value}")))
    }
}

/// A single index on a collection.
///
/// Identity is the ordered key list: an index on `{a: 1, b: 1}` is a
/// different index from one on `{b: 1, a: 1}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Ordered `(field, direction)` pairs.
    pub keys: Vec<(String, IndexDirection)>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,
}

impl IndexDefinition {
    /// Ascending single-field index, the common case in practice.
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            keys: vec![(field.into(), IndexDirection::Ascending)],
            unique: false,
        }
    }

    /// Normalized identity string, e.g. `created_at:1,client:-1`.
    /// Key order is part of the identity; the unique flag is not.
    pub fn key_id(&self) -> String {
        key_id(&self.keys)
    }

    /// Index name following the database's default naming convention.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, dir)| format!("{field}_{}", dir.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// The key specification as a wire document, preserving key order.
    pub fn keys_document(&self) -> Document {
        let mut keys = Document::new();
        for (field, dir) in &self.keys {
            keys.insert(field.clone(), Bson::Int32(dir.as_i32()));
        }
        keys
    }
}

/// Normalized identity for an ordered key list.
pub(crate) fn key_id(keys: &[(String, IndexDirection)]) -> String {
    keys.iter()
        .map(|(field, dir)| format!("{field}:{}", dir.as_i32()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Constraint on a single document field.
///
/// Object-typed fields may carry their own nested `required` / `properties`
/// sets, mirroring the database's recursive validator shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldConstraint {
    pub name: String,

    /// Allowed BSON types. `Null` as a member marks a nullable field.
    /// An empty list leaves the type unconstrained.
    #[serde(
        rename = "bsonType",
        with = "bson_type_list",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub types: Vec<BsonType>,

    /// Nested constraints for object-typed fields.
    #[serde(flatten)]
    pub object: ValidatorSchema,
}

impl FieldConstraint {
    pub fn typed(name: impl Into<String>, types: impl IntoIterator<Item = BsonType>) -> Self {
        Self {
            name: name.into(),
            types: types.into_iter().collect(),
            object: ValidatorSchema::default(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.types.contains(&BsonType::Null)
    }

    fn to_bson(&self) -> Document {
        let mut doc = Document::new();
        match self.types.len() {
            0 => {}
            1 => {
                doc.insert("bsonType", self.types[0].tag());
            }
            _ => {
                let tags: Vec<Bson> = self.types.iter().map(|t| Bson::String(t.tag().to_string())).collect();
                doc.insert("bsonType", Bson::Array(tags));
            }
        }
        if !self.object.required.is_empty() {
            let required: Vec<Bson> = self.object.required.iter().map(|r| Bson::String(r.clone())).collect();
            doc.insert("required", Bson::Array(required));
        }
        if !self.object.properties.is_empty() {
            doc.insert("properties", self.object.properties_document());
        }
        doc
    }

    fn from_bson(name: &str, doc: &Document) -> Result<Self, String> {
        let types = match doc.get("bsonType") {
            None => Vec::new(),
            Some(Bson::String(tag)) => {
                vec![BsonType::from_tag(tag).ok_or_else(|| format!("unknown bson type tag '{tag}' on '{name}'"))?]
            }
            Some(Bson::Array(tags)) => {
                let mut types = Vec::with_capacity(tags.len());
                for tag in tags {
                    let Bson::String(tag) = tag else {
                        return Err(format!("non-string bson type tag on '{name}'"));
                    };
                    types.push(
                        BsonType::from_tag(tag).ok_or_else(|| format!("unknown bson type tag '{tag}' on '{name}'"))?,
                    );
                }
                types
            }
            Some(other) => {
                return Err(format!(
                    "bsonType on '{name}' must be a tag or tag list, got {:?}",
                    other.element_type()
                ));
            }
        };

        Ok(Self {
            name: name.to_string(),
            types,
            object: ValidatorSchema::from_schema_document(doc)?,
        })
    }
}

/// Validator schema for a collection: required field names plus per-field
/// constraints, recursively for nested objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorSchema {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<FieldConstraint>,
}

impl ValidatorSchema {
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.properties.is_empty()
    }

    /// Render the `$jsonSchema` body: `{bsonType: "object", required, properties}`.
    pub fn to_document(&self) -> Document {
        let mut doc = doc! { "bsonType": "object" };
        if !self.required.is_empty() {
            let required: Vec<Bson> = self.required.iter().map(|r| Bson::String(r.clone())).collect();
            doc.insert("required", Bson::Array(required));
        }
        if !self.properties.is_empty() {
            doc.insert("properties", self.properties_document());
        }
        doc
    }

    /// Render the full validator option as stored on a collection.
    pub fn wire_document(&self) -> Document {
        doc! { "$jsonSchema": self.to_document() }
    }

    /// Parse a live validator document, accepting either the full
    /// `{$jsonSchema: ...}` wrapper or a bare schema body.
    pub fn from_wire(validator: &Document) -> Result<Self, String> {
        let body = match validator.get("$jsonSchema") {
            Some(Bson::Document(body)) => body,
            Some(other) => {
                return Err(format!("$jsonSchema must be a document, got {:?}", other.element_type()));
            }
            None => validator,
        };
        Self::from_schema_document(body)
    }

    fn from_schema_document(body: &Document) -> Result<Self, String> {
        let required = match body.get("required") {
            None => Vec::new(),
            Some(Bson::Array(names)) => {
                let mut required = Vec::with_capacity(names.len());
                for name in names {
                    let Bson::String(name) = name else {
                        return Err("required entries must be strings".to_string());
                    };
                    required.push(name.clone());
                }
                required
            }
            Some(_) => return Err("required must be an array".to_string()),
        };

        let properties = match body.get("properties") {
            None => Vec::new(),
            Some(Bson::Document(props)) => {
                let mut properties = Vec::with_capacity(props.len());
                for (name, constraint) in props {
                    let Bson::Document(constraint) = constraint else {
                        return Err(format!("property '{name}' must be a document"));
                    };
                    properties.push(FieldConstraint::from_bson(name, constraint)?);
                }
                properties
            }
            Some(_) => return Err("properties must be a document".to_string()),
        };

        Ok(Self { required, properties })
    }

    fn properties_document(&self) -> Document {
        let mut props = Document::new();
        for constraint in &self.properties {
            props.insert(constraint.name.clone(), constraint.to_bson());
        }
        props
    }

    /// Structural equality: required sets and type constraints compared
    /// order-independently, recursively through nested objects.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }

    fn normalized(&self) -> NormalSchema {
        NormalSchema {
            required: self.required.iter().cloned().collect(),
            properties: self
                .properties
                .iter()
                .map(|c| {
                    (
                        c.name.clone(),
                        NormalConstraint {
                            types: c.types.iter().copied().collect(),
                            object: if c.object.is_empty() {
                                None
                            } else {
                                Some(Box::new(c.object.normalized()))
                            },
                        },
                    )
                })
                .collect(),
        }
    }

    /// Validation issues for this schema subtree, paths prefixed with `path`.
    pub(crate) fn issues(&self, path: &str) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut seen = BTreeSet::new();
        for constraint in &self.properties {
            if !seen.insert(constraint.name.as_str()) {
                issues.push(ValidationIssue::new(
                    format!("{path}.{}", constraint.name),
                    "duplicate_property",
                    format!("property '{}' is declared more than once", constraint.name),
                ));
            }
        }
        for required in &self.required {
            if !seen.contains(required.as_str()) {
                issues.push(ValidationIssue::new(
                    format!("{path}.{required}"),
                    "required_without_property",
                    format!("required field '{required}' has no property constraint"),
                ));
            }
        }
        for constraint in &self.properties {
            if !constraint.object.is_empty() && !constraint.types.contains(&BsonType::Object) {
                issues.push(ValidationIssue::new(
                    format!("{path}.{}", constraint.name),
                    "nested_schema_on_scalar",
                    format!("'{}' carries nested constraints but is not object-typed", constraint.name),
                ));
            }
            issues.extend(constraint.object.issues(&format!("{path}.{}", constraint.name)));
        }
        issues
    }
}

#[derive(Debug, PartialEq, Eq)]
struct NormalSchema {
    required: BTreeSet<String>,
    properties: BTreeMap<String, NormalConstraint>,
}

#[derive(Debug, PartialEq, Eq)]
struct NormalConstraint {
    types: BTreeSet<BsonType>,
    object: Option<Box<NormalSchema>>,
}

/// Desired state of one collection: validator plus ordered index list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionDefinition {
    pub name: String,

    #[serde(default)]
    pub validator: ValidatorSchema,

    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

impl CollectionDefinition {
    /// Per-collection validation issues (cross-collection checks live in the
    /// registry).
    pub fn issues(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.name.trim().is_empty() {
            issues.push(ValidationIssue::new(
                "<unnamed>",
                "empty_name",
                "collection name must not be empty",
            ));
            return issues;
        }

        let mut seen_keys = BTreeSet::new();
        for (position, index) in self.indexes.iter().enumerate() {
            let path = format!("{}.indexes[{position}]", self.name);
            if index.keys.is_empty() {
                issues.push(ValidationIssue::new(
                    path,
                    "index_without_keys",
                    "index must declare at least one key",
                ));
                continue;
            }
            if !seen_keys.insert(index.key_id()) {
                issues.push(ValidationIssue::new(
                    path,
                    "duplicate_index",
                    format!("index on ({}) is declared more than once", index.key_id()),
                ));
            }
        }

        issues.extend(self.validator.issues(&self.name));
        issues
    }
}

/// Serde adapter: `bsonType` accepts a single tag or a tag list and writes
/// the single-tag form back whenever possible.
mod bson_type_list {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::BsonType;

    pub fn serialize<S: Serializer>(types: &[BsonType], serializer: S) -> Result<S::Ok, S::Error> {
        if types.len() == 1 {
            types[0].serialize(serializer)
        } else {
            types.serialize(serializer)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<BsonType>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(BsonType),
            Many(Vec<BsonType>),
        }

        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(tag) => vec![tag],
            OneOrMany::Many(tags) => tags,
        })
    }
}
