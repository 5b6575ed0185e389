//! Definition-source loading: JSON files or directories of JSON files.

use std::path::{Path, PathBuf};

use serde_json::Value;
use walkdir::WalkDir;

use crate::definition::CollectionDefinition;
use crate::errors::{ParseErrors, ParseIssue, SchemaError};
use crate::registry::Registry;

/// Load definitions from the given files and directories.
///
/// A file holds either a single definition document or an array of them.
/// Directories are walked recursively for `*.json` files, sorted by path for
/// deterministic ordering. Parse errors are collected across every source
/// before failing, so one run reports every defect.
pub fn load_sources(sources: &[PathBuf]) -> Result<Vec<CollectionDefinition>, SchemaError> {
    let mut files = Vec::new();
    let mut issues = Vec::new();

    for source in sources {
        if source.is_dir() {
            files.extend(discover_definition_files(source));
        } else if source.is_file() {
            files.push(source.clone());
        } else {
            issues.push(ParseIssue::new(
                source.display().to_string(),
                "no such file or directory",
            ));
        }
    }

    let mut definitions = Vec::new();
    for file in &files {
        parse_file(file, &mut definitions, &mut issues);
    }

    if !issues.is_empty() {
        return Err(ParseErrors::new(issues).into());
    }

    Ok(definitions)
}

/// Load and validate: the common entry point for commands.
pub fn load_registry(sources: &[PathBuf]) -> Result<Registry, SchemaError> {
    let definitions = load_sources(sources)?;
    Ok(Registry::new(definitions)?)
}

fn discover_definition_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();

    files.sort();
    files
}

fn parse_file(path: &Path, definitions: &mut Vec<CollectionDefinition>, issues: &mut Vec<ParseIssue>) {
    let location = path.display().to_string();

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            issues.push(ParseIssue::new(location, err.to_string()));
            return;
        }
    };

    let value: Value = match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            issues.push(ParseIssue::new(location, err.to_string()));
            return;
        }
    };

    match value {
        Value::Object(_) => match serde_json::from_value::<CollectionDefinition>(value) {
            Ok(definition) => definitions.push(definition),
            Err(err) => issues.push(ParseIssue::new(location, err.to_string())),
        },
        Value::Array(entries) => {
            for (position, entry) in entries.into_iter().enumerate() {
                match serde_json::from_value::<CollectionDefinition>(entry) {
                    Ok(definition) => definitions.push(definition),
                    Err(err) => issues.push(ParseIssue::new(format!("{location}[{position}]"), err.to_string())),
                }
            }
        }
        _ => issues.push(ParseIssue::new(
            location,
            "expected a definition document or an array of them",
        )),
    }
}
