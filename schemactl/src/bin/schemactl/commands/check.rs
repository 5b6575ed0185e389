use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Table};
use schemactl::Registry;
use serde::Serialize;

use crate::commands::load_or_report;
use crate::examples::ExampleGroup;
use crate::output::{GlobalOptions, OutputFormat, OutputManager, TableDisplay, themed_table};

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Validate definitions",
    commands: &[
        "schemactl check definitions/          # Parse and validate, no database needed",
        "schemactl check reports.json          # Validate a single file",
    ],
}];

#[derive(Args)]
pub struct CheckArgs {
    /// Definition files or directories of *.json definitions
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,
}

/// Serializable per-collection summary.
#[derive(Serialize)]
struct CheckView {
    collections: Vec<CheckRow>,
}

#[derive(Serialize)]
struct CheckRow {
    name: String,
    required_fields: usize,
    properties: usize,
    indexes: usize,
}

impl CheckView {
    fn new(registry: &Registry) -> Self {
        Self {
            collections: registry
                .iter()
                .map(|definition| CheckRow {
                    name: definition.name.clone(),
                    required_fields: definition.validator.required.len(),
                    properties: definition.validator.properties.len(),
                    indexes: definition.indexes.len(),
                })
                .collect(),
        }
    }
}

impl TableDisplay for CheckView {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Collection", "Required", "Properties", "Indexes"]);

        for row in &self.collections {
            table.add_row(vec![
                Cell::new(&row.name),
                Cell::new(row.required_fields.to_string()),
                Cell::new(row.properties.to_string()),
                Cell::new(row.indexes.to_string()),
            ]);
        }

        table
    }

    fn to_compact(&self) -> String {
        format!("collections={}", self.collections.len())
    }
}

pub async fn handle_check(args: CheckArgs, output: &OutputManager) -> Result<ExitCode> {
    output.heading("Check Definitions");

    let registry = match load_or_report(&args.sources, output) {
        Ok(registry) => registry,
        Err(code) => return Ok(code),
    };

    if registry.is_empty() {
        output.warning("No collection definitions found in the given sources");
        return Ok(ExitCode::SUCCESS);
    }

    let view = CheckView::new(&registry);
    output.display(&view)?;

    if !matches!(output.options.output_format, OutputFormat::Json) {
        output.success(&format!("{} collection definition(s) are valid", registry.len()));
    }

    Ok(ExitCode::SUCCESS)
}
