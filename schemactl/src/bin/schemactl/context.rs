use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the optional project configuration file.
const CONFIG_FILE: &str = "schemactl.toml";

/// Configuration loaded from `schemactl.toml`, searched upward from the
/// working directory. Everything has a default so the file is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub apply: ApplySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Connection URL; `${VAR}` values are expanded from the environment.
    #[serde(default = "default_url")]
    pub url: String,
    /// Database name; `${VAR}` values are expanded from the environment.
    #[serde(default = "default_database")]
    pub name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            name: default_database(),
        }
    }
}

fn default_url() -> String {
    "${MONGODB_URL}".to_string()
}

fn default_database() -> String {
    "${MONGODB_DB}".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplySettings {
    /// Collections reconciled concurrently.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl Default for ApplySettings {
    fn default() -> Self {
        Self { jobs: default_jobs() }
    }
}

fn default_jobs() -> usize {
    4
}

impl Config {
    /// Load configuration from the working directory or an ancestor,
    /// falling back to defaults when no file exists.
    pub fn find() -> Result<Self> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::find_from(&current_dir)
    }

    pub fn find_from(start: &Path) -> Result<Self> {
        match Self::locate(start) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn locate(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            let candidate = current.join(CONFIG_FILE);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Connection URL with environment expansion.
    pub fn database_url(&self) -> Result<String> {
        expand_env(&self.database.url)
    }

    /// Database name with environment expansion.
    pub fn database_name(&self) -> Result<String> {
        expand_env(&self.database.name)
    }
}

/// Expand a `${VAR}` reference from the environment; other values pass
/// through untouched.
fn expand_env(value: &str) -> Result<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).with_context(|| format!("Environment variable {var_name} not set"))
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_point_at_environment() {
        let config = Config::default();
        assert_eq!(config.database.url, "${MONGODB_URL}");
        assert_eq!(config.database.name, "${MONGODB_DB}");
        assert_eq!(config.apply.jobs, 4);
    }

    #[test]
    fn literal_values_pass_through_expansion() {
        assert_eq!(expand_env("mongodb://localhost:27017").unwrap(), "mongodb://localhost:27017");
        assert!(expand_env("${SCHEMACTL_TEST_UNSET_VAR}").is_err());
    }

    #[test]
    fn config_is_found_in_an_ancestor_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[database]\nurl = \"mongodb://db.internal:27017\"\nname = \"etl\"\n[apply]\njobs = 2\n",
        )
        .unwrap();

        let nested = dir.path().join("definitions/etl");
        std::fs::create_dir_all(&nested).unwrap();

        let config = Config::find_from(&nested).unwrap();
        assert_eq!(config.database_url().unwrap(), "mongodb://db.internal:27017");
        assert_eq!(config.database_name().unwrap(), "etl");
        assert_eq!(config.apply.jobs, 2);
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::find_from(dir.path()).unwrap();
        assert_eq!(config.database.url, "${MONGODB_URL}");
    }
}
