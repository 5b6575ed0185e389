//! Declarative schema reconciliation for document databases.
//!
//! Collections are described as data: a name, a validator schema, and an
//! ordered index list. The engine introspects the live database, computes
//! the minimal operation set moving it to the described state, and applies
//! that plan idempotently. Runs are reproducible: every plan is derived from
//! an explicit point-in-time snapshot instead of ad-hoc mutation order.

pub mod apply;
pub mod definition;
pub mod diff;
pub mod errors;
pub mod loader;
pub mod observe;
pub mod registry;
pub mod report;
pub mod store;

pub use apply::{ApplyOptions, CancelFlag, apply};
pub use definition::{BsonType, CollectionDefinition, FieldConstraint, IndexDefinition, IndexDirection, ValidatorSchema};
pub use diff::{DiffOptions, Operation, OperationKind, PlanNote, ReconciliationPlan, plan};
pub use errors::{ParseErrors, ParseIssue, SchemaError, ValidationError, ValidationIssue};
pub use loader::{load_registry, load_sources};
pub use observe::{Observation, ObservedCollection, ObservedIndex, ObservedState};
pub use registry::Registry;
pub use report::{ApplyReport, OperationOutcome, OperationStatus};
pub use store::{SchemaStore, StoreError, memory::MemoryStore, mongo::MongoStore};
