//! Stack fixture configuration.
//!
//! Configuration is built once from environment variables, optionally merged
//! with a `.env` file, and passed by reference to the components that need it.
//! Loading a `.env` file never mutates the process environment.

use crate::compose::ComposeFiles;
use crate::readiness::ReadinessPolicy;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default externally exposed application port.
pub const DEFAULT_TEST_PORT: u16 = 8002;

/// Default compose executable.
pub const DEFAULT_COMPOSE_BIN: &str = "docker";

/// Default base stack definition.
pub const DEFAULT_COMPOSE_FILE_BASE: &str = "docker-compose.dev.yml";

/// Default override stack definition.
pub const DEFAULT_COMPOSE_FILE_OVERRIDE: &str = "docker-compose.test.override.yml";

/// Default `.env` file name, resolved against the project root.
pub const DOTENV_FILE: &str = ".env";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid TEST_PORT: {0}")]
    InvalidPort(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Failed to read {path}: {message}")]
    DotenvFailed { path: PathBuf, message: String },
}

/// How values from a `.env` file combine with the process environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvMode {
    /// File values apply only to variables that are not already set.
    /// Used by unit tests.
    KeepExisting,

    /// File values replace variables that are already set.
    /// Used by end-to-end tests.
    Override,
}

/// Stack fixture configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    /// Executable that provides the `compose` subcommand (default: "docker").
    pub compose_bin: String,

    /// Base and override stack definitions, resolved against the project root.
    pub compose_files: ComposeFiles,

    /// Host port the application is exposed on (`TEST_PORT`, default: 8002).
    pub port: u16,

    /// Health polling budget.
    pub readiness: ReadinessPolicy,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            compose_bin: DEFAULT_COMPOSE_BIN.to_string(),
            compose_files: ComposeFiles::default(),
            port: DEFAULT_TEST_PORT,
            readiness: ReadinessPolicy::default(),
        }
    }
}

impl StackConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from the process environment merged with a `.env` file.
    ///
    /// A missing file is treated as empty.
    pub fn load(dotenv_path: &Path, mode: EnvMode) -> Result<Self, ConfigError> {
        let file_vars = read_dotenv(dotenv_path)?;
        let vars = merge_vars(env::vars().collect(), file_vars, mode);
        Self::from_vars(&vars)
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = match vars.get("TEST_PORT") {
            Some(value) => parse_port(value)?,
            None => DEFAULT_TEST_PORT,
        };

        let compose_bin = vars
            .get("COMPOSE_BIN")
            .cloned()
            .unwrap_or_else(|| DEFAULT_COMPOSE_BIN.to_string());

        let base = vars
            .get("COMPOSE_FILE_BASE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_COMPOSE_FILE_BASE.to_string());

        let override_file = vars
            .get("COMPOSE_FILE_OVERRIDE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_COMPOSE_FILE_OVERRIDE.to_string());

        let defaults = ReadinessPolicy::default();
        let readiness = ReadinessPolicy {
            timeout: parse_seconds(vars, "READY_TIMEOUT_SECONDS", defaults.timeout)?,
            interval: parse_seconds(vars, "READY_INTERVAL_SECONDS", defaults.interval)?,
            request_timeout: parse_seconds(
                vars,
                "READY_REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout,
            )?,
            expected_status: defaults.expected_status,
        };

        Ok(StackConfig {
            compose_bin,
            compose_files: ComposeFiles::new(base, override_file),
            port,
            readiness,
        })
    }

    /// Path of the `.env` file inside a project root.
    pub fn dotenv_path(project_root: &Path) -> PathBuf {
        project_root.join(DOTENV_FILE)
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    let port: u16 = value.trim().parse().map_err(|e| {
        ConfigError::InvalidPort(format!(
            "TEST_PORT must be a valid port number, got '{}': {}",
            value, e
        ))
    })?;

    if port == 0 {
        return Err(ConfigError::InvalidPort(
            "TEST_PORT must be greater than 0".to_string(),
        ));
    }

    Ok(port)
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(Duration::from_secs(value))
}

/// Parse a `.env` file into key/value pairs without touching the process environment.
fn read_dotenv(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => {
            tracing::debug!(path = %path.display(), "No .env file, using process environment only");
            return Ok(HashMap::new());
        }
        Err(e) => {
            return Err(ConfigError::DotenvFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };

    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| ConfigError::DotenvFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        vars.insert(key, value);
    }

    tracing::debug!(path = %path.display(), count = vars.len(), "Loaded .env file");
    Ok(vars)
}

fn merge_vars(
    mut process: HashMap<String, String>,
    file: HashMap<String, String>,
    mode: EnvMode,
) -> HashMap<String, String> {
    for (key, value) in file {
        match mode {
            EnvMode::Override => {
                process.insert(key, value);
            }
            EnvMode::KeepExisting => {
                process.entry(key).or_insert(value);
            }
        }
    }
    process
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = StackConfig::from_vars(&HashMap::new()).expect("defaults should load");

        assert_eq!(config.port, 8002);
        assert_eq!(config.compose_bin, "docker");
        assert_eq!(config.compose_files.base, "docker-compose.dev.yml");
        assert_eq!(
            config.compose_files.override_file,
            "docker-compose.test.override.yml"
        );
        assert_eq!(config.readiness.timeout, Duration::from_secs(120));
        assert_eq!(config.readiness.interval, Duration::from_secs(5));
        assert_eq!(config.readiness.request_timeout, Duration::from_secs(5));
        assert_eq!(config, StackConfig::default());
    }

    #[test]
    fn test_from_vars_custom_values() {
        let config = StackConfig::from_vars(&vars(&[
            ("TEST_PORT", "9100"),
            ("COMPOSE_BIN", "podman"),
            ("COMPOSE_FILE_BASE", "compose.yml"),
            ("COMPOSE_FILE_OVERRIDE", "compose.ci.yml"),
            ("READY_TIMEOUT_SECONDS", "30"),
            ("READY_INTERVAL_SECONDS", "2"),
            ("READY_REQUEST_TIMEOUT_SECONDS", "1"),
        ]))
        .expect("custom values should load");

        assert_eq!(config.port, 9100);
        assert_eq!(config.compose_bin, "podman");
        assert_eq!(config.compose_files.base, "compose.yml");
        assert_eq!(config.compose_files.override_file, "compose.ci.yml");
        assert_eq!(config.readiness.timeout, Duration::from_secs(30));
        assert_eq!(config.readiness.interval, Duration::from_secs(2));
        assert_eq!(config.readiness.request_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_port_rejects_non_numeric() {
        let result = StackConfig::from_vars(&vars(&[("TEST_PORT", "http")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidPort(msg)) if msg.contains("valid port number"))
        );
    }

    #[test]
    fn test_port_rejects_zero_and_out_of_range() {
        assert!(matches!(
            StackConfig::from_vars(&vars(&[("TEST_PORT", "0")])),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(
            StackConfig::from_vars(&vars(&[("TEST_PORT", "70000")])),
            Err(ConfigError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_durations_reject_zero() {
        let result = StackConfig::from_vars(&vars(&[("READY_INTERVAL_SECONDS", "0")]));
        assert!(
            matches!(result, Err(ConfigError::InvalidDuration(msg)) if msg.contains("READY_INTERVAL_SECONDS"))
        );
    }

    #[test]
    fn test_merge_keep_existing_prefers_process() {
        let merged = merge_vars(
            vars(&[("TEST_PORT", "9000")]),
            vars(&[("TEST_PORT", "9001"), ("COMPOSE_BIN", "podman")]),
            EnvMode::KeepExisting,
        );
        assert_eq!(merged.get("TEST_PORT").map(String::as_str), Some("9000"));
        assert_eq!(merged.get("COMPOSE_BIN").map(String::as_str), Some("podman"));
    }

    #[test]
    fn test_merge_override_prefers_file() {
        let merged = merge_vars(
            vars(&[("TEST_PORT", "9000")]),
            vars(&[("TEST_PORT", "9001")]),
            EnvMode::Override,
        );
        assert_eq!(merged.get("TEST_PORT").map(String::as_str), Some("9001"));
    }

    #[test]
    fn test_read_dotenv_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_dotenv(&dir.path().join(".env")).expect("missing file is not an error");
        assert!(vars.is_empty());
    }

    #[test]
    fn test_read_dotenv_parses_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = StackConfig::dotenv_path(dir.path());
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "# test settings").unwrap();
        writeln!(file, "TEST_PORT=8123").unwrap();
        writeln!(file, "COMPOSE_BIN=\"podman\"").unwrap();

        let vars = read_dotenv(&path).expect("file should parse");
        assert_eq!(vars.get("TEST_PORT").map(String::as_str), Some("8123"));
        assert_eq!(vars.get("COMPOSE_BIN").map(String::as_str), Some("podman"));
    }
}
