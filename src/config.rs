//! Server configuration
//!
//! A YAML file loaded once at startup, with every field defaulted so an
//! empty file (or none at all) yields a runnable server. CLI flags
//! override the file; see `cli.rs`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::{RetryPolicy, SchedulerConfig};

/// Errors for config file I/O and validation (separate from pure parsing
/// errors, which surface as `YamlError`)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Task retry and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Retry policy applied by the scheduler
    #[serde(flatten)]
    pub retry: RetryPolicy,

    /// How long an attempt may sit with a worker before the sweep fails it
    #[serde(rename = "attemptTimeoutSecs")]
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,

    /// How often the timeout sweep runs
    #[serde(rename = "sweepIntervalSecs")]
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_attempt_timeout_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    30
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl TaskConfig {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sweep_interval_secs: self.sweep_interval_secs,
            attempt_timeout_secs: self.attempt_timeout_secs,
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Task retry/timeout settings
    #[serde(default)]
    pub task: TaskConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    55054
}

// Deserialization defaults and Default::default() must agree, so running
// without a config file behaves like loading an empty one.
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            task: TaskConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.task.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "task.maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.task.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "task.sweepIntervalSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and validate a config file from disk. This is the I/O boundary;
/// parsing and validation are pure.
pub fn load_config_file(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: ServerConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_from_empty_mapping() {
        let config: ServerConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 55054);
        assert_eq!(config.task.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_config_defaults_match_empty_file() {
        let config = ServerConfig::default();
        let from_yaml: ServerConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.host, from_yaml.host);
        assert_eq!(config.port, from_yaml.port);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 55054);
        assert_eq!(
            config.task.attempt_timeout_secs,
            from_yaml.task.attempt_timeout_secs
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_file() {
        let file = create_temp_file(
            r#"
host: 127.0.0.1
port: 9000
task:
  maxAttempts: 5
  attemptTimeoutSecs: 120
"#,
        );

        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.task.retry.max_attempts, 5);
        assert_eq!(config.task.attempt_timeout_secs, 120);
        // Unset fields keep their defaults.
        assert_eq!(config.task.sweep_interval_secs, 30);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_config_file(Path::new("/nonexistent/corral.yaml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        let file = create_temp_file("task:\n  maxAttempts: 0\n");
        let result = load_config_file(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_retriable_codes_from_yaml() {
        let file = create_temp_file("task:\n  retriableCodes: [500, 503]\n");
        let config = load_config_file(file.path()).unwrap();

        assert!(config.task.retry.retriable_codes.contains(&500));
        assert!(!config.task.retry.retriable_codes.contains(&408));
    }
}
