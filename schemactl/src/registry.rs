//! Validated set of collection definitions.

use std::collections::HashMap;

use crate::definition::CollectionDefinition;
use crate::errors::{ValidationError, ValidationIssue};

/// The desired state of a whole database: every collection definition,
/// validated as a set. Construction is the only mutation; a reload builds a
/// fresh registry.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    collections: Vec<CollectionDefinition>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    /// Build a registry, rejecting internally inconsistent definitions.
    ///
    /// All issues across all definitions are aggregated into one
    /// [`ValidationError`] so the operator sees every defect in one pass.
    /// Definition order is preserved; it drives plan ordering later.
    pub fn new(definitions: Vec<CollectionDefinition>) -> Result<Self, ValidationError> {
        let mut issues: Vec<ValidationIssue> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for (position, definition) in definitions.iter().enumerate() {
            if let Some(first) = by_name.get(&definition.name) {
                issues.push(ValidationIssue::new(
                    definition.name.clone(),
                    "duplicate_collection",
                    format!(
                        "collection '{}' is defined more than once (definitions {} and {position})",
                        definition.name, first
                    ),
                ));
                continue;
            }
            by_name.insert(definition.name.clone(), position);
            issues.extend(definition.issues());
        }

        if !issues.is_empty() {
            return Err(ValidationError::new(issues));
        }

        Ok(Self {
            collections: definitions,
            by_name,
        })
    }

    pub fn get(&self, name: &str) -> Option<&CollectionDefinition> {
        self.by_name.get(name).map(|&position| &self.collections[position])
    }

    /// Definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &CollectionDefinition> {
        self.collections.iter()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::IndexDefinition;

    fn definition(name: &str) -> CollectionDefinition {
        serde_json::from_str(&format!(r#"{{"name": "{name}"}}"#)).unwrap()
    }

    #[test]
    fn preserves_declaration_order() {
        let registry = Registry::new(vec![definition("reports"), definition("files"), definition("action_plans")])
            .expect("valid registry");

        let names: Vec<&str> = registry.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["reports", "files", "action_plans"]);
        assert!(registry.get("files").is_some());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn duplicate_collection_names_are_rejected() {
        let err = Registry::new(vec![definition("files"), definition("files")]).unwrap_err();

        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].code, "duplicate_collection");
        assert_eq!(err.issues[0].path, "files");
    }

    #[test]
    fn issues_are_aggregated_across_definitions() {
        let mut bad_index = definition("reports");
        bad_index.indexes.push(IndexDefinition { keys: vec![], unique: false });

        let mut bad_validator = definition("files");
        bad_validator.validator.required.push("ghost".to_string());

        let err = Registry::new(vec![bad_index, bad_validator]).unwrap_err();
        let codes: Vec<&str> = err.issues.iter().map(|i| i.code.as_str()).collect();

        assert!(codes.contains(&"index_without_keys"));
        assert!(codes.contains(&"required_without_property"));
    }

    #[test]
    fn empty_registry_is_valid() {
        let registry = Registry::new(Vec::new()).expect("empty registry");
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }
}
