use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use schemactl::{ApplyOptions, CancelFlag, DiffOptions, apply, plan};

use crate::commands::{EXIT_FAILED_OPS, connect_and_snapshot, load_or_report};
use crate::context::Config;
use crate::examples::ExampleGroup;
use crate::output::{OutputFormat, OutputManager};

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Reconcile",
        commands: &[
            "schemactl apply definitions/              # Apply every definition in a directory",
            "schemactl apply reports.json files.json   # Apply specific definition files",
        ],
    },
    ExampleGroup {
        title: "Preview",
        commands: &[
            "schemactl apply --dry-run definitions/    # Show what would change, mutate nothing",
        ],
    },
    ExampleGroup {
        title: "Destructive changes",
        commands: &[
            "schemactl apply --allow-destructive definitions/   # Also drop undeclared indexes",
        ],
    },
];

#[derive(Args)]
pub struct ApplyArgs {
    /// Definition files or directories of *.json definitions
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Report predicted effects without issuing any mutating call
    #[arg(long)]
    pub dry_run: bool,

    /// Permit operations that remove live state (index drops)
    #[arg(long)]
    pub allow_destructive: bool,

    /// Collections reconciled concurrently (defaults from config)
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Override the configured connection URL
    #[arg(long)]
    pub url: Option<String>,

    /// Override the configured database name
    #[arg(long)]
    pub database: Option<String>,
}

pub async fn handle_apply(args: ApplyArgs, output: &OutputManager) -> Result<ExitCode> {
    output.heading("Reconcile Schema");

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
    let (store, observed) =
        match connect_and_snapshot(&config, args.url.as_deref(), args.database.as_deref(), output).await {
            Ok(connected) => connected,
            Err(code) => return Ok(code),
        };

    let diff_options = DiffOptions {
        allow_destructive: args.allow_destructive,
    };
    let reconciliation = plan(&registry, &observed, &diff_options);

    for note in &reconciliation.notes {
        output.warning(&format!("{}: {}", note.collection, note.message));
    }

    if reconciliation.is_empty() {
        output.success("Database already matches the definitions; nothing to do");
        return Ok(ExitCode::SUCCESS);
    }

    if args.dry_run {
        output.heading("Dry Run");
        output.warning("DRY RUN MODE - no changes will be made");
    } else {
        output.heading(&format!("Applying {} operation(s)", reconciliation.len()));
    }

    let cancel = CancelFlag::new();
    if !args.dry_run {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupt received; finishing the operation in flight");
                cancel.cancel();
            }
        });
    }

    let apply_options = ApplyOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.unwrap_or(config.apply.jobs),
        cancel,
    };
    let report = apply(&reconciliation, store, &apply_options).await;

    output.display(&report)?;

    if !matches!(output.options.output_format, OutputFormat::Json) {
        output.heading("Summary");
        output.key_value("Elapsed", &format!("{}ms", report.elapsed_ms));
        if report.cancelled {
            output.warning("Run cancelled; remaining operations were skipped");
        }
        if report.dry_run {
            output.info(&format!("{} operation(s) would be applied", report.planned()));
        } else {
            output.info(&format!(
                "{} applied, {} skipped, {} failed",
                report.applied(),
                report.skipped(),
                report.failed()
            ));
        }
        for failure in report.failures() {
            output.error(&format!("{}: {}", failure.collection, failure.action));
        }
    }

    if report.success {
        if !report.dry_run {
            output.success("Reconciliation complete");
        }
        Ok(ExitCode::SUCCESS)
    } else {
        output.error("Reconciliation finished with failures");
        Ok(ExitCode::from(EXIT_FAILED_OPS))
    }
}
