pub mod apply;
pub mod check;
pub mod plan;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use schemactl::{MongoStore, ObservedState, Registry, SchemaError, load_registry};

use crate::context::Config;
use crate::output::OutputManager;

/// Exit code for definition load/validation failures: nothing was attempted
/// against the database.
pub const EXIT_BAD_INPUT: u8 = 2;
/// Exit code when at least one reconciliation operation failed.
pub const EXIT_FAILED_OPS: u8 = 1;

/// Load and validate definition sources, reporting every defect. Returns
/// the bad-input exit code instead of a registry when loading fails.
pub fn load_or_report(sources: &[PathBuf], output: &OutputManager) -> Result<Registry, ExitCode> {
    match load_registry(sources) {
        Ok(registry) => Ok(registry),
        Err(SchemaError::Parse(parse)) => {
            output.error(&format!("{} definition source(s) could not be parsed:", parse.errors.len()));
            for issue in &parse.errors {
                output.bullet(&format!("{}: {}", issue.location, issue.detail));
            }
            Err(ExitCode::from(EXIT_BAD_INPUT))
        }
        Err(SchemaError::Validation(validation)) => {
            output.error(&format!("{} definition issue(s) found:", validation.issues.len()));
            for issue in &validation.issues {
                output.bullet(&format!("{} [{}]: {}", issue.path, issue.code, issue.message));
            }
            Err(ExitCode::from(EXIT_BAD_INPUT))
        }
        Err(other) => {
            output.error(&other.to_string());
            Err(ExitCode::from(EXIT_BAD_INPUT))
        }
    }
}

/// Connect to the configured database and snapshot its schema state.
/// Prints progress and degradation warnings along the way.
pub async fn connect_and_snapshot(
    config: &Config,
    url_override: Option<&str>,
    database_override: Option<&str>,
    output: &OutputManager,
) -> Result<(Arc<MongoStore>, ObservedState), ExitCode> {
    let url = match url_override {
        Some(url) => url.to_string(),
        None => config.database_url().map_err(|err| {
            output.error(&format!("{err:#}"));
            ExitCode::from(EXIT_FAILED_OPS)
        })?,
    };
    let database = match database_override {
        Some(database) => database.to_string(),
        None => config.database_name().map_err(|err| {
            output.error(&format!("{err:#}"));
            ExitCode::from(EXIT_FAILED_OPS)
        })?,
    };

    output.progress("Connecting to database");
    let store = match MongoStore::connect(&url, &database).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            output.clear_line();
            output.error(&format!("Failed to connect: {err}"));
            return Err(ExitCode::from(EXIT_FAILED_OPS));
        }
    };
    output.clear_line();
    output.success(&format!("Connected to database '{database}'"));

    output.progress("Inspecting live schema state");
    let observed = match ObservedState::snapshot(store.as_ref()).await {
        Ok(observed) => observed,
        Err(err) => {
            output.clear_line();
            output.error(&format!("Failed to inspect database: {err}"));
            return Err(ExitCode::from(EXIT_FAILED_OPS));
        }
    };
    output.clear_line();
    output.info(&format!("Observed {} live collection(s)", observed.len()));
    output.verbose(&format!("snapshot captured at {}", observed.captured_at()));

    if observed.is_partial() {
        for (name, reason) in observed.unknown() {
            output.warning(&format!("Collection '{name}' could not be inspected: {reason}"));
        }
    }

    Ok((store, observed))
}
