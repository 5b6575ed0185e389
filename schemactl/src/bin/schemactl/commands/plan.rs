use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Table};
use schemactl::{DiffOptions, OperationKind, PlanNote, ReconciliationPlan, plan};
use serde::Serialize;

use crate::commands::{connect_and_snapshot, load_or_report};
use crate::context::Config;
use crate::examples::ExampleGroup;
use crate::output::{GlobalOptions, OutputFormat, OutputManager, TableDisplay, themed_table};

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Inspect pending changes",
        commands: &[
            "schemactl plan definitions/                      # Operations a reconciliation would run",
            "schemactl plan --allow-destructive definitions/  # Include index drops in the plan",
        ],
    },
    ExampleGroup {
        title: "Scripting",
        commands: &["schemactl --output json plan definitions/   # Machine-readable plan"],
    },
];

#[derive(Args)]
pub struct PlanArgs {
    /// Definition files or directories of *.json definitions
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Include operations that remove live state (index drops)
    #[arg(long)]
    pub allow_destructive: bool,

    /// Override the configured connection URL
    #[arg(long)]
    pub url: Option<String>,

    /// Override the configured database name
    #[arg(long)]
    pub database: Option<String>,
}

/// Serializable view of a computed plan.
#[derive(Serialize)]
struct PlanView {
    operations: Vec<PlanRow>,
    notes: Vec<PlanNote>,
}

#[derive(Serialize)]
struct PlanRow {
    collection: String,
    kind: OperationKind,
    action: String,
}

impl PlanView {
    fn new(plan: &ReconciliationPlan) -> Self {
        Self {
            operations: plan
                .operations
                .iter()
                .map(|op| PlanRow {
                    collection: op.collection().to_string(),
                    kind: op.kind(),
                    action: op.describe(),
                })
                .collect(),
            notes: plan.notes.clone(),
        }
    }
}

impl TableDisplay for PlanView {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["#", "Collection", "Operation"]);

        for (position, row) in self.operations.iter().enumerate() {
            table.add_row(vec![
                Cell::new(format!("{}", position + 1)),
                Cell::new(&row.collection),
                Cell::new(&row.action),
            ]);
        }

        table
    }

    fn to_compact(&self) -> String {
        format!("operations={} notes={}", self.operations.len(), self.notes.len())
    }
}

pub async fn handle_plan(args: PlanArgs, output: &OutputManager) -> Result<ExitCode> {
    output.heading("Reconciliation Plan");

    let registry = match load_or_report(&args.sources, output) {
        Ok(registry) => registry,
        Err(code) => return Ok(code),
    };

    if registry.is_empty() {
        output.warning("No collection definitions found in the given sources");
        return Ok(ExitCode::SUCCESS);
    }
    output.success(&format!("Loaded {} collection definition(s)", registry.len()));

    let config = Config::find()?;
    let (_store, observed) =
        match connect_and_snapshot(&config, args.url.as_deref(), args.database.as_deref(), output).await {
            Ok(connected) => connected,
            Err(code) => return Ok(code),
        };

    let diff_options = DiffOptions {
        allow_destructive: args.allow_destructive,
    };
    let reconciliation = plan(&registry, &observed, &diff_options);

    if reconciliation.is_empty() && matches!(output.options.output_format, OutputFormat::Table) {
        for note in &reconciliation.notes {
            output.warning(&format!("{}: {}", note.collection, note.message));
        }
        output.success("Database already matches the definitions; empty plan");
        return Ok(ExitCode::SUCCESS);
    }

    let view = PlanView::new(&reconciliation);
    output.display(&view)?;

    if !matches!(output.options.output_format, OutputFormat::Json) {
        for note in &reconciliation.notes {
            output.warning(&format!("{}: {}", note.collection, note.message));
        }
        output.info(&format!("{} operation(s) pending", reconciliation.len()));
    }

    Ok(ExitCode::SUCCESS)
}
