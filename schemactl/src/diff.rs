//! Plan computation: the minimal operation set moving observed state to
//! desired state.

use std::collections::HashMap;

use serde::Serialize;

use crate::definition::{CollectionDefinition, IndexDefinition, ValidatorSchema};
use crate::observe::{Observation, ObservedCollection, ObservedIndex, ObservedState};
use crate::registry::Registry;

/// One reconciliation step against the target database.
#[derive(Debug, Clone)]
pub enum Operation {
    CreateCollection {
        collection: String,
        validator: ValidatorSchema,
    },
    UpdateValidator {
        collection: String,
        validator: ValidatorSchema,
    },
    CreateIndex {
        collection: String,
        index: IndexDefinition,
    },
    DropIndex {
        collection: String,
        index: ObservedIndex,
    },
}

/// Machine-readable operation kind, used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateCollection,
    UpdateValidator,
    CreateIndex,
    DropIndex,
}

impl Operation {
    pub fn collection(&self) -> &str {
        match self {
            Operation::CreateCollection { collection, .. }
            | Operation::UpdateValidator { collection, .. }
            | Operation::CreateIndex { collection, .. }
            | Operation::DropIndex { collection, .. } => collection,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateCollection { .. } => OperationKind::CreateCollection,
            Operation::UpdateValidator { .. } => OperationKind::UpdateValidator,
            Operation::CreateIndex { .. } => OperationKind::CreateIndex,
            Operation::DropIndex { .. } => OperationKind::DropIndex,
        }
    }

    /// Human-readable effect, also the predicted effect in dry runs.
    pub fn describe(&self) -> String {
        match self {
            Operation::CreateCollection { collection, validator } => {
                if validator.is_empty() {
                    format!("create collection '{collection}'")
                } else {
                    format!(
                        "create collection '{collection}' with validator ({} required field(s))",
                        validator.required.len()
                    )
                }
            }
            Operation::UpdateValidator { collection, validator } => {
                format!(
                    "update validator on '{collection}' ({} required field(s))",
                    validator.required.len()
                )
            }
            Operation::CreateIndex { collection, index } => {
                if index.unique {
                    format!("create unique index ({}) on '{collection}'", index.key_id())
                } else {
                    format!("create index ({}) on '{collection}'", index.key_id())
                }
            }
            Operation::DropIndex { collection, index } => {
                format!("drop index '{}' ({}) on '{collection}'", index.name, index.key_id())
            }
        }
    }
}

/// Differ policy knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Permit operations that remove live state (index drops and
    /// drop-and-recreate for option drift). Off by default as a safety
    /// policy.
    pub allow_destructive: bool,
}

/// Operator-facing remark attached to a plan: things the differ saw but,
/// by policy, did not turn into operations.
#[derive(Debug, Clone, Serialize)]
pub struct PlanNote {
    pub collection: String,
    pub message: String,
}

/// Ordered operation sequence. Never persisted; recomputed from a fresh
/// snapshot whenever needed.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    pub operations: Vec<Operation>,
    pub notes: Vec<PlanNote>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

/// Compute the plan moving `observed` to the state described by `registry`.
///
/// Collections are handled in definition order; per collection the order is
/// create, validator update, index creations (definition order), then any
/// destructive drops. Collections whose observation is `Unknown` are
/// conservatively skipped so an inspection failure is never treated as
/// absence.
pub fn plan(registry: &Registry, observed: &ObservedState, options: &DiffOptions) -> ReconciliationPlan {
    let mut plan = ReconciliationPlan::default();

    for definition in registry.iter() {
        match observed.get(&definition.name) {
            None => plan_missing_collection(definition, &mut plan),
            Some(Observation::Unknown { reason }) => {
                plan.notes.push(PlanNote {
                    collection: definition.name.clone(),
                    message: format!("skipped: live state could not be inspected ({reason})"),
                });
            }
            Some(Observation::Inspected(live)) => plan_existing_collection(definition, live, options, &mut plan),
        }
    }

    plan
}

fn plan_missing_collection(definition: &CollectionDefinition, plan: &mut ReconciliationPlan) {
    plan.operations.push(Operation::CreateCollection {
        collection: definition.name.clone(),
        validator: definition.validator.clone(),
    });
    for index in &definition.indexes {
        plan.operations.push(Operation::CreateIndex {
            collection: definition.name.clone(),
            index: index.clone(),
        });
    }
}

fn plan_existing_collection(
    definition: &CollectionDefinition,
    live: &ObservedCollection,
    options: &DiffOptions,
    plan: &mut ReconciliationPlan,
) {
    if validator_differs(definition, live, plan) {
        plan.operations.push(Operation::UpdateValidator {
            collection: definition.name.clone(),
            validator: definition.validator.clone(),
        });
    }

    let live_by_id: HashMap<String, &ObservedIndex> =
        live.indexes.iter().map(|index| (index.key_id(), index)).collect();
    let mut desired_ids: Vec<String> = Vec::with_capacity(definition.indexes.len());

    for index in &definition.indexes {
        let key_id = index.key_id();
        match live_by_id.get(&key_id) {
            None => plan.operations.push(Operation::CreateIndex {
                collection: definition.name.clone(),
                index: index.clone(),
            }),
            Some(existing) if existing.unique != index.unique => {
                if options.allow_destructive {
                    plan.operations.push(Operation::DropIndex {
                        collection: definition.name.clone(),
                        index: (*existing).clone(),
                    });
                    plan.operations.push(Operation::CreateIndex {
                        collection: definition.name.clone(),
                        index: index.clone(),
                    });
                } else {
                    plan.notes.push(PlanNote {
                        collection: definition.name.clone(),
                        message: format!(
                            "index ({key_id}) exists with different options; \
                             recreating it requires --allow-destructive"
                        ),
                    });
                }
            }
            Some(_) => {}
        }
        desired_ids.push(key_id);
    }

    // Live indexes with no counterpart in the definition. The default index
    // on the primary key never counts.
    let strays: Vec<&ObservedIndex> = live
        .indexes
        .iter()
        .filter(|index| index.name != "_id_" && !desired_ids.contains(&index.key_id()))
        .collect();

    if strays.is_empty() {
        return;
    }

    if options.allow_destructive {
        for stray in strays {
            plan.operations.push(Operation::DropIndex {
                collection: definition.name.clone(),
                index: stray.clone(),
            });
        }
    } else {
        plan.notes.push(PlanNote {
            collection: definition.name.clone(),
            message: format!(
                "{} live index(es) not in the definition left in place; \
                 pass --allow-destructive to drop them",
                strays.len()
            ),
        });
    }
}

/// Structural comparison of the desired validator against the live one.
/// An unreadable live validator counts as drift and is noted.
fn validator_differs(definition: &CollectionDefinition, live: &ObservedCollection, plan: &mut ReconciliationPlan) -> bool {
    let live_schema = match &live.validator {
        None => ValidatorSchema::default(),
        Some(validator) => match ValidatorSchema::from_wire(validator) {
            Ok(schema) => schema,
            Err(reason) => {
                plan.notes.push(PlanNote {
                    collection: definition.name.clone(),
                    message: format!("live validator could not be interpreted ({reason}); replacing it"),
                });
                return true;
            }
        },
    };

    !definition.validator.structurally_eq(&live_schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::IndexDirection;
    use crate::observe::ObservedState;

    fn registry(json: &str) -> Registry {
        let definitions: Vec<CollectionDefinition> = serde_json::from_str(json).unwrap();
        Registry::new(definitions).unwrap()
    }

    fn empty_state() -> ObservedState {
        ObservedState::from_observations([])
    }

    fn inspected(validator: Option<bson::Document>, indexes: Vec<ObservedIndex>) -> Observation {
        Observation::Inspected(ObservedCollection { validator, indexes })
    }

    fn observed_ascending(field: &str) -> ObservedIndex {
        ObservedIndex {
            name: format!("{field}_1"),
            keys: vec![(field.to_string(), IndexDirection::Ascending)],
            unique: false,
        }
    }

    const REPORTS: &str = r#"[{
        "name": "reports",
        "validator": {
            "required": ["report_id"],
            "properties": [{"name": "report_id", "bsonType": "string"}]
        },
        "indexes": [{"keys": [["created_at", 1]]}]
    }]"#;

    #[test]
    fn empty_database_plans_creation_in_collection_then_index_order() {
        let registry = registry(
            r#"[
                {"name": "reports", "indexes": [{"keys": [["created_at", 1]]}]},
                {"name": "report_control", "indexes": [{"keys": [["extracted_at", 1]]}]}
            ]"#,
        );

        let plan = plan(&registry, &empty_state(), &DiffOptions::default());

        let shape: Vec<(OperationKind, &str)> = plan
            .operations
            .iter()
            .map(|op| (op.kind(), op.collection()))
            .collect();
        assert_eq!(
            shape,
            [
                (OperationKind::CreateCollection, "reports"),
                (OperationKind::CreateIndex, "reports"),
                (OperationKind::CreateCollection, "report_control"),
                (OperationKind::CreateIndex, "report_control"),
            ]
        );
        assert!(plan.notes.is_empty());
    }

    #[test]
    fn worked_reports_example() {
        let registry = registry(REPORTS);
        let plan = plan(&registry, &empty_state(), &DiffOptions::default());

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.operations[0].describe(), "create collection 'reports' with validator (1 required field(s))");
        assert_eq!(plan.operations[1].describe(), "create index (created_at:1) on 'reports'");
    }

    #[test]
    fn collection_without_indexes_still_gets_created() {
        let registry = registry(r#"[{"name": "realtime_files"}]"#);
        let plan = plan(&registry, &empty_state(), &DiffOptions::default());

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.operations[0].kind(), OperationKind::CreateCollection);
    }

    #[test]
    fn matching_state_yields_empty_plan() {
        let registry = registry(REPORTS);
        let desired = registry.get("reports").unwrap();
        let state = ObservedState::from_observations([(
            "reports".to_string(),
            inspected(
                Some(desired.validator.wire_document()),
                vec![observed_ascending("created_at")],
            ),
        )]);

        let plan = plan(&registry, &state, &DiffOptions::default());
        assert!(plan.is_empty());
        assert!(plan.notes.is_empty());
    }

    #[test]
    fn validator_drift_emits_update() {
        let registry = registry(REPORTS);
        let state = ObservedState::from_observations([(
            "reports".to_string(),
            inspected(
                Some(bson::doc! { "$jsonSchema": { "bsonType": "object", "required": ["other"] } }),
                vec![observed_ascending("created_at")],
            ),
        )]);

        let plan = plan(&registry, &state, &DiffOptions::default());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.operations[0].kind(), OperationKind::UpdateValidator);
    }

    #[test]
    fn unreadable_live_validator_is_replaced_with_a_note() {
        let registry = registry(REPORTS);
        let state = ObservedState::from_observations([(
            "reports".to_string(),
            inspected(
                Some(bson::doc! { "$jsonSchema": { "properties": { "x": { "bsonType": "varchar" } } } }),
                vec![observed_ascending("created_at")],
            ),
        )]);

        let plan = plan(&registry, &state, &DiffOptions::default());
        assert_eq!(plan.operations[0].kind(), OperationKind::UpdateValidator);
        assert_eq!(plan.notes.len(), 1);
    }

    #[test]
    fn missing_index_is_created() {
        let registry = registry(REPORTS);
        let desired = registry.get("reports").unwrap();
        let state = ObservedState::from_observations([(
            "reports".to_string(),
            inspected(Some(desired.validator.wire_document()), vec![]),
        )]);

        let plan = plan(&registry, &state, &DiffOptions::default());
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.operations[0].kind(), OperationKind::CreateIndex);
    }

    #[test]
    fn key_order_distinguishes_indexes() {
        let registry = registry(r#"[{"name": "files", "indexes": [{"keys": [["a", 1], ["b", 1]]}]}]"#);
        let state = ObservedState::from_observations([(
            "files".to_string(),
            inspected(
                None,
                vec![ObservedIndex {
                    name: "b_1_a_1".to_string(),
                    keys: vec![
                        ("b".to_string(), IndexDirection::Ascending),
                        ("a".to_string(), IndexDirection::Ascending),
                    ],
                    unique: false,
                }],
            ),
        )]);

        let plan = plan(&registry, &state, &DiffOptions::default());
        // The reversed live index does not satisfy the definition; the
        // desired one is created and the stray is merely noted.
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.operations[0].kind(), OperationKind::CreateIndex);
        assert_eq!(plan.notes.len(), 1);
    }

    #[test]
    fn stray_indexes_survive_without_the_destructive_flag() {
        let registry = registry(r#"[{"name": "files"}]"#);
        let state = ObservedState::from_observations([(
            "files".to_string(),
            inspected(None, vec![observed_ascending("legacy")]),
        )]);

        let plan = plan(&registry, &state, &DiffOptions::default());
        assert!(plan.is_empty());
        assert_eq!(plan.notes.len(), 1);
        assert!(plan.notes[0].message.contains("--allow-destructive"));
    }

    #[test]
    fn destructive_flag_drops_stray_indexes_but_never_the_id_index() {
        let registry = registry(r#"[{"name": "files"}]"#);
        let id_index = ObservedIndex {
            name: "_id_".to_string(),
            keys: vec![("_id".to_string(), IndexDirection::Ascending)],
            unique: false,
        };
        let state = ObservedState::from_observations([(
            "files".to_string(),
            inspected(None, vec![id_index, observed_ascending("legacy")]),
        )]);

        let plan = plan(&registry, &state, &DiffOptions { allow_destructive: true });
        assert_eq!(plan.len(), 1);
        let Operation::DropIndex { index, .. } = &plan.operations[0] else {
            panic!("expected a drop");
        };
        assert_eq!(index.name, "legacy_1");
    }

    #[test]
    fn option_drift_needs_the_destructive_flag_to_recreate() {
        let registry = registry(r#"[{"name": "files", "indexes": [{"keys": [["file_id", 1]], "unique": true}]}]"#);
        let state = ObservedState::from_observations([(
            "files".to_string(),
            inspected(None, vec![observed_ascending("file_id")]),
        )]);

        let safe = plan(&registry, &state, &DiffOptions::default());
        assert!(safe.is_empty());
        assert_eq!(safe.notes.len(), 1);

        let destructive = plan(&registry, &state, &DiffOptions { allow_destructive: true });
        let kinds: Vec<OperationKind> = destructive.operations.iter().map(|op| op.kind()).collect();
        assert_eq!(kinds, [OperationKind::DropIndex, OperationKind::CreateIndex]);
    }

    #[test]
    fn unknown_observation_is_conservatively_skipped() {
        let registry = registry(REPORTS);
        let state = ObservedState::from_observations([(
            "reports".to_string(),
            Observation::Unknown {
                reason: "not authorized".to_string(),
            },
        )]);

        let plan = plan(&registry, &state, &DiffOptions::default());
        assert!(plan.is_empty());
        assert_eq!(plan.notes.len(), 1);
        assert!(plan.notes[0].message.contains("not authorized"));
    }

    #[test]
    fn collections_outside_the_registry_are_untouched() {
        let registry = registry(REPORTS);
        let state = ObservedState::from_observations([
            ("legacy_stuff".to_string(), inspected(None, vec![])),
        ]);

        let plan = plan(&registry, &state, &DiffOptions { allow_destructive: true });
        // Only creation of the defined collection; nothing against the
        // unmanaged one, destructive flag or not.
        assert!(plan.operations.iter().all(|op| op.collection() == "reports"));
    }
}
