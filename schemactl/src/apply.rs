//! Plan execution: idempotent, best-effort, cancellable.
//!
//! Operations for the same collection run strictly in plan order; distinct
//! collections may proceed concurrently, bounded by the worker-pool size. A
//! failed operation is recorded and never aborts unrelated work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::diff::{Operation, ReconciliationPlan};
use crate::report::{ApplyReport, OperationOutcome, OperationStatus};
use crate::store::{SchemaStore, StoreError};

/// Cooperative cancellation handle. Cancelling stops new operations from
/// being issued; the operation in flight completes and nothing is rolled
/// back.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Report predicted effects without issuing any mutating call.
    pub dry_run: bool,
    /// Upper bound on collections reconciled concurrently.
    pub jobs: usize,
    pub cancel: CancelFlag,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            cancel: CancelFlag::new(),
        }
    }
}

/// Execute a plan against the store and report per-operation outcomes.
pub async fn apply(plan: &ReconciliationPlan, store: Arc<dyn SchemaStore>, options: &ApplyOptions) -> ApplyReport {
    let started_at = Utc::now();
    let start = Instant::now();

    let outcomes = if options.dry_run {
        plan.operations
            .iter()
            .map(|op| OperationOutcome {
                collection: op.collection().to_string(),
                kind: op.kind(),
                action: op.describe(),
                status: OperationStatus::Planned,
                duration_ms: 0,
            })
            .collect()
    } else {
        execute(plan, store, options).await
    };

    let success = !outcomes.iter().any(|outcome| outcome.status.is_failure());

    ApplyReport {
        outcomes,
        success,
        dry_run: options.dry_run,
        cancelled: options.cancel.is_cancelled(),
        started_at,
        elapsed_ms: start.elapsed().as_millis() as u64,
    }
}

async fn execute(plan: &ReconciliationPlan, store: Arc<dyn SchemaStore>, options: &ApplyOptions) -> Vec<OperationOutcome> {
    // Group by collection, preserving both first-appearance order of the
    // groups and plan order within each group. The original position keeps
    // the report in plan order afterwards.
    let mut groups: Vec<(String, Vec<(usize, Operation)>)> = Vec::new();
    for (position, operation) in plan.operations.iter().enumerate() {
        let collection = operation.collection();
        match groups.iter_mut().find(|(name, _)| name == collection) {
            Some((_, ops)) => ops.push((position, operation.clone())),
            None => groups.push((collection.to_string(), vec![(position, operation.clone())])),
        }
    }

    let semaphore = Arc::new(Semaphore::new(options.jobs.max(1)));
    let mut tasks: JoinSet<Vec<(usize, OperationOutcome)>> = JoinSet::new();

    for (collection, ops) in groups {
        let store = Arc::clone(&store);
        let semaphore = Arc::clone(&semaphore);
        let cancel = options.cancel.clone();

        tasks.spawn(async move {
            // Semaphore closes only on drop, which cannot happen while tasks
            // still hold a clone.
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            let mut outcomes = Vec::with_capacity(ops.len());

            for (position, operation) in ops {
                let outcome = if cancel.is_cancelled() {
                    OperationOutcome {
                        collection: collection.clone(),
                        kind: operation.kind(),
                        action: operation.describe(),
                        status: OperationStatus::Skipped("cancelled".to_string()),
                        duration_ms: 0,
                    }
                } else {
                    run_operation(store.as_ref(), &operation).await
                };
                outcomes.push((position, outcome));
            }

            outcomes
        });
    }

    let mut indexed: Vec<(usize, OperationOutcome)> = Vec::with_capacity(plan.operations.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(group) => indexed.extend(group),
            Err(err) => log::error!("apply worker panicked: {err}"),
        }
    }

    indexed.sort_by_key(|(position, _)| *position);
    indexed.into_iter().map(|(_, outcome)| outcome).collect()
}

/// Run one operation with its idempotency pre-check.
async fn run_operation(store: &dyn SchemaStore, operation: &Operation) -> OperationOutcome {
    let start = Instant::now();
    let status = match operation_status(store, operation).await {
        Ok(status) => status,
        Err(err) => OperationStatus::Failed(err.to_string()),
    };

    OperationOutcome {
        collection: operation.collection().to_string(),
        kind: operation.kind(),
        action: operation.describe(),
        status,
        duration_ms: start.elapsed().as_millis() as u64,
    }
}

async fn operation_status(store: &dyn SchemaStore, operation: &Operation) -> Result<OperationStatus, StoreError> {
    match operation {
        Operation::CreateCollection { collection, validator } => {
            // Pre-check instead of error suppression: re-running a plan on a
            // converged database reports a skip, not a masked failure.
            if store.list_collections().await?.iter().any(|name| name == collection) {
                return Ok(OperationStatus::Skipped("collection already exists".to_string()));
            }
            let wire = (!validator.is_empty()).then(|| validator.wire_document());
            store.create_collection(collection, wire.as_ref()).await?;
            Ok(OperationStatus::Applied)
        }
        Operation::UpdateValidator { collection, validator } => {
            store.update_validator(collection, &validator.wire_document()).await?;
            Ok(OperationStatus::Applied)
        }
        Operation::CreateIndex { collection, index } => {
            let live = store.list_indexes(collection).await?;
            if live
                .iter()
                .any(|existing| existing.key_id() == index.key_id() && existing.unique == index.unique)
            {
                return Ok(OperationStatus::Skipped("index already exists".to_string()));
            }
            store.create_index(collection, index).await?;
            Ok(OperationStatus::Applied)
        }
        Operation::DropIndex { collection, index } => {
            let live = store.list_indexes(collection).await?;
            if !live.iter().any(|existing| existing.name == index.name) {
                return Ok(OperationStatus::Skipped("index already absent".to_string()));
            }
            store.drop_index(collection, &index.name).await?;
            Ok(OperationStatus::Applied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::CollectionDefinition;
    use crate::diff::{DiffOptions, plan};
    use crate::observe::ObservedState;
    use crate::registry::Registry;
    use crate::store::memory::MemoryStore;

    const ETL_SUBSET: &str = r#"[
        {
            "name": "reports",
            "validator": {
                "required": ["report_id"],
                "properties": [{"name": "report_id", "bsonType": "string"}]
            },
            "indexes": [{"keys": [["created_at", 1]]}]
        },
        {
            "name": "report_control",
            "validator": {
                "required": ["extracted_at"],
                "properties": [{"name": "extracted_at", "bsonType": "date"}]
            },
            "indexes": [{"keys": [["extracted_at", 1]]}]
        }
    ]"#;

    fn registry(json: &str) -> Registry {
        let definitions: Vec<CollectionDefinition> = serde_json::from_str(json).unwrap();
        Registry::new(definitions).unwrap()
    }

    async fn plan_against(registry: &Registry, store: &MemoryStore, allow_destructive: bool) -> ReconciliationPlan {
        let observed = ObservedState::snapshot(store).await.unwrap();
        plan(registry, &observed, &DiffOptions { allow_destructive })
    }

    #[tokio::test]
    async fn apply_converges_to_a_fixed_point() {
        let registry = registry(ETL_SUBSET);
        let store = Arc::new(MemoryStore::new());

        let first = plan_against(&registry, &store, false).await;
        assert_eq!(first.len(), 4);

        let report = apply(&first, store.clone(), &ApplyOptions::default()).await;
        assert!(report.success);
        assert_eq!(report.applied(), 4);
        assert_eq!(report.failed(), 0);

        // Reconciliation reaches a fixed point: the next diff is empty.
        let second = plan_against(&registry, &store, false).await;
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn reapplying_a_stale_plan_skips_idempotently() {
        let registry = registry(ETL_SUBSET);
        let store = Arc::new(MemoryStore::new());

        let stale = plan_against(&registry, &store, false).await;
        apply(&stale, store.clone(), &ApplyOptions::default()).await;

        // The same plan again: everything exists, nothing fails.
        let report = apply(&stale, store.clone(), &ApplyOptions::default()).await;
        assert!(report.success);
        assert_eq!(report.applied(), 0);
        assert_eq!(report.skipped(), 4);
    }

    #[tokio::test]
    async fn failures_are_isolated_per_collection() {
        let registry = registry(ETL_SUBSET);
        let store = Arc::new(MemoryStore::new());
        store.reject_writes_on("reports");

        let plan = plan_against(&registry, &store, false).await;
        let report = apply(&plan, store.clone(), &ApplyOptions::default()).await;

        assert!(!report.success);
        // Both reports operations fail, both report_control operations land.
        assert_eq!(report.failed(), 2);
        assert_eq!(report.applied(), 2);
        assert!(
            report
                .failures()
                .all(|outcome| outcome.collection == "reports")
        );

        let created = store.list_collections().await.unwrap();
        assert_eq!(created, ["report_control"]);
    }

    #[tokio::test]
    async fn dry_run_has_zero_side_effects() {
        let registry = registry(ETL_SUBSET);
        let store = Arc::new(MemoryStore::new());
        store.seed("reports", None);

        let before = store.dump();
        let plan = plan_against(&registry, &store, false).await;

        let options = ApplyOptions {
            dry_run: true,
            ..ApplyOptions::default()
        };
        let report = apply(&plan, store.clone(), &options).await;

        assert!(report.success);
        assert!(report.dry_run);
        assert_eq!(report.planned(), plan.len());
        assert_eq!(report.applied(), 0);
        assert_eq!(store.dump(), before);
    }

    #[tokio::test]
    async fn cancellation_skips_unissued_operations() {
        let registry = registry(ETL_SUBSET);
        let store = Arc::new(MemoryStore::new());

        let plan = plan_against(&registry, &store, false).await;
        let options = ApplyOptions::default();
        options.cancel.cancel();

        let report = apply(&plan, store.clone(), &options).await;

        assert!(report.cancelled);
        assert_eq!(report.applied(), 0);
        assert_eq!(report.skipped(), plan.len());
        assert!(store.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_worker_runs_in_plan_order() {
        let registry = registry(ETL_SUBSET);
        let store = Arc::new(MemoryStore::new());

        let plan = plan_against(&registry, &store, false).await;
        let options = ApplyOptions {
            jobs: 1,
            ..ApplyOptions::default()
        };
        let report = apply(&plan, store.clone(), &options).await;

        assert!(report.success);
        let actions: Vec<&str> = report.outcomes.iter().map(|outcome| outcome.action.as_str()).collect();
        assert_eq!(
            actions,
            [
                "create collection 'reports' with validator (1 required field(s))",
                "create index (created_at:1) on 'reports'",
                "create collection 'report_control' with validator (1 required field(s))",
                "create index (extracted_at:1) on 'report_control'",
            ]
        );
    }

    #[tokio::test]
    async fn shipped_definitions_provision_an_empty_database() {
        let shipped = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("definitions/etl");
        let registry = crate::loader::load_registry(&[shipped]).unwrap();
        let store = Arc::new(MemoryStore::new());

        let first = plan_against(&registry, &store, false).await;
        // One creation per collection, one per declared timestamp index.
        let creations = first
            .operations
            .iter()
            .filter(|op| matches!(op, crate::diff::Operation::CreateCollection { .. }))
            .count();
        assert_eq!(creations, 9);

        let report = apply(&first, store.clone(), &ApplyOptions::default()).await;
        assert!(report.success);

        let live = store.list_collections().await.unwrap();
        assert_eq!(live.len(), 9);
        assert!(live.contains(&"reports".to_string()));

        let reports_indexes = store.list_indexes("reports").await.unwrap();
        assert_eq!(reports_indexes.len(), 1);
        assert_eq!(reports_indexes[0].key_id(), "created_at:1");

        let second = plan_against(&registry, &store, false).await;
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn destructive_apply_removes_stray_indexes() {
        let registry = registry(r#"[{"name": "files"}]"#);
        let store = Arc::new(MemoryStore::new());
        store.seed("files", None);
        store.seed_index("files", &crate::definition::IndexDefinition::ascending("legacy"));

        let plan = plan_against(&registry, &store, true).await;
        let report = apply(&plan, store.clone(), &ApplyOptions::default()).await;

        assert!(report.success);
        assert!(store.list_indexes("files").await.unwrap().is_empty());
    }
}
