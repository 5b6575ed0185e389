use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color as TableColor, Table};
use schemactl::{ApplyReport, OperationStatus};
use serde::Serialize;
use std::io::Write;

use crate::theme::{ICONS, THEME};

/// Output format options for CLI commands
#[derive(Clone, Copy, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
    /// Compact single-line output
    Compact,
}

/// Global CLI options that affect output and behavior
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
    pub no_color: bool,
}

/// Trait for data that can be displayed as a table
pub trait TableDisplay {
    fn to_table(&self, options: &GlobalOptions) -> Table;
    fn to_compact(&self) -> String;
}

/// Output manager handles formatting and display
pub struct OutputManager {
    pub options: GlobalOptions,
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        Self { options }
    }

    /// Display data according to the configured output format
    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay,
    {
        if self.options.quiet {
            return Ok(());
        }

        match self.options.output_format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                println!("{json}");
            }
            OutputFormat::Table => {
                let table = data.to_table(&self.options);
                println!("{table}");
            }
            OutputFormat::Compact => {
                println!("{}", data.to_compact());
            }
        }
        Ok(())
    }

    pub fn success(&self, message: &str) {
        if !self.options.quiet {
            println!("{} {}", ICONS.success.color(THEME.success), message.color(THEME.success));
        }
    }

    /// Errors always print, even in quiet mode.
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", ICONS.error.color(THEME.error), message.color(THEME.error));
    }

    pub fn warning(&self, message: &str) {
        if !self.options.quiet {
            println!("{} {}", ICONS.warning.color(THEME.warning), message.color(THEME.warning));
        }
    }

    pub fn info(&self, message: &str) {
        if !self.options.quiet {
            println!("{} {}", ICONS.info.color(THEME.info), message.color(THEME.info));
        }
    }

    /// Extra detail shown only with --verbose.
    pub fn verbose(&self, message: &str) {
        if self.options.verbose && !self.options.quiet {
            eprintln!("{} {}", ICONS.arrow.color(THEME.muted), message.color(THEME.muted));
        }
    }

    pub fn heading(&self, text: &str) {
        if !self.options.quiet {
            println!("\n{}", text.color(THEME.primary).bold());
        }
    }

    pub fn key_value(&self, key: &str, value: &str) {
        if !self.options.quiet {
            println!("{}: {}", key.color(THEME.key).bold(), value.color(THEME.value));
        }
    }

    pub fn bullet(&self, text: &str) {
        if !self.options.quiet {
            println!("  {} {text}", ICONS.bullet.color(THEME.muted));
        }
    }

    /// Display progress indicator on the current line.
    pub fn progress(&self, message: &str) {
        if self.options.quiet || matches!(self.options.output_format, OutputFormat::Json) {
            return;
        }

        print!("\r{} {}...", ICONS.loading.color(THEME.highlight).bold(), message.color(THEME.highlight));
        std::io::stdout().flush().ok();
    }

    /// Clear the current line (after a progress indicator).
    pub fn clear_line(&self) {
        if self.options.quiet || matches!(self.options.output_format, OutputFormat::Json) {
            return;
        }

        print!("\r{}\r", " ".repeat(80));
        std::io::stdout().flush().ok();
    }

}

/// Themed table with a bold header row, shared by the table views.
pub fn themed_table(options: &GlobalOptions, headers: &[&str]) -> Table {
    let mut table = Table::new();

    if options.no_color {
        table.load_preset(comfy_table::presets::ASCII_FULL);
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    } else {
        table.load_preset(comfy_table::presets::UTF8_FULL_CONDENSED);
        table.set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(TableColor::Cyan))
                .collect::<Vec<_>>(),
        );
    }

    table
}

impl TableDisplay for ApplyReport {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Collection", "Operation", "Status", "Time"]);

        for outcome in &self.outcomes {
            let (label, color) = match &outcome.status {
                OperationStatus::Applied => ("applied".to_string(), TableColor::Green),
                OperationStatus::Planned => ("planned".to_string(), TableColor::Cyan),
                OperationStatus::Skipped(reason) => (format!("skipped: {reason}"), TableColor::DarkGrey),
                OperationStatus::Failed(reason) => (format!("failed: {reason}"), TableColor::Red),
            };

            let status_cell = if options.no_color {
                Cell::new(&label)
            } else {
                Cell::new(&label).fg(color)
            };

            table.add_row(vec![
                Cell::new(&outcome.collection),
                Cell::new(&outcome.action),
                status_cell,
                Cell::new(format!("{}ms", outcome.duration_ms)),
            ]);
        }

        table
    }

    fn to_compact(&self) -> String {
        format!(
            "applied={} planned={} skipped={} failed={} elapsed={}ms success={}",
            self.applied(),
            self.planned(),
            self.skipped(),
            self.failed(),
            self.elapsed_ms,
            self.success
        )
    }
}
