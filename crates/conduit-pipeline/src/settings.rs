//! Pipeline settings read from the environment and an optional YAML file.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::retry::DeadlockRetryPolicy;

/// Names a YAML settings file applied before the individual overrides.
pub const CONFIG_FILE_VAR: &str = "CONDUIT_CONFIG";

const RETRY_ATTEMPTS_VAR: &str = "CONDUIT_DEADLOCK_RETRY_ATTEMPTS";
const RETRY_DELAY_VAR: &str = "CONDUIT_DEADLOCK_RETRY_DELAY_MS";
const MARKER_VAR: &str = "CONDUIT_DEADLOCK_MARKER";
const LOG_QUEUE_VAR: &str = "CONDUIT_LOG_QUEUE_CAPACITY";

/// Errors raised while loading [`PipelineSettings`].
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Io {
        /// Path named by `CONDUIT_CONFIG`.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The settings file is not valid YAML for these settings.
    #[error("invalid settings file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A setting from the file or the environment is out of range.
    #[error("{key} must be {expected}, got `{value}`")]
    InvalidValue {
        /// Environment variable or settings file key.
        key: &'static str,
        /// What the variable should contain.
        expected: &'static str,
        /// The rejected value.
        value: String,
    },
}

/// Tunables shared by every pipeline in the process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Total invocations allowed for a deadlocking handler.
    pub deadlock_retry_attempts: u32,
    /// Pause between deadlock retries, in milliseconds.
    pub deadlock_retry_delay_ms: u64,
    /// Text identifying a deadlock in a database error message.
    pub deadlock_marker: String,
    /// Capacity of the background log queue.
    pub log_queue_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            deadlock_retry_attempts: 5,
            deadlock_retry_delay_ms: 100,
            deadlock_marker: "deadlock".to_owned(),
            log_queue_capacity: 1024,
        }
    }
}

impl PipelineSettings {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] if the settings file cannot be read or
    /// parsed, or an override is malformed.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings using `lookup` in place of the process environment.
    ///
    /// # Errors
    ///
    /// See [`PipelineSettings::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut settings = match lookup(CONFIG_FILE_VAR) {
            Some(path) => {
                let path = PathBuf::from(path);
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| SettingsError::Io { path, source })?;
                serde_yaml::from_str(&text)?
            }
            None => Self::default(),
        };

        if let Some(value) = lookup(RETRY_ATTEMPTS_VAR) {
            settings.deadlock_retry_attempts = parse_positive(RETRY_ATTEMPTS_VAR, &value)?;
        }
        if let Some(value) = lookup(RETRY_DELAY_VAR) {
            settings.deadlock_retry_delay_ms =
                value.trim().parse().map_err(|_| SettingsError::InvalidValue {
                    key: RETRY_DELAY_VAR,
                    expected: "a number of milliseconds",
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup(MARKER_VAR) {
            if value.trim().is_empty() {
                return Err(SettingsError::InvalidValue {
                    key: MARKER_VAR,
                    expected: "non-empty text",
                    value,
                });
            }
            settings.deadlock_marker = value;
        }
        if let Some(value) = lookup(LOG_QUEUE_VAR) {
            settings.log_queue_capacity =
                usize::try_from(parse_positive(LOG_QUEUE_VAR, &value)?).map_err(|_| {
                    SettingsError::InvalidValue {
                        key: LOG_QUEUE_VAR,
                        expected: "a positive integer",
                        value: value.clone(),
                    }
                })?;
        }
        settings.validate()
    }

    /// Parses settings from YAML; missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Yaml`] on malformed input and
    /// [`SettingsError::InvalidValue`] for out-of-range values.
    pub fn from_yaml(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_yaml::from_str(text)?;
        settings.validate()
    }

    /// Checks the merged settings, whatever their source.
    fn validate(self) -> Result<Self, SettingsError> {
        if self.deadlock_retry_attempts == 0 {
            return Err(SettingsError::InvalidValue {
                key: "deadlock_retry_attempts",
                expected: "a positive integer",
                value: self.deadlock_retry_attempts.to_string(),
            });
        }
        if self.deadlock_marker.trim().is_empty() {
            return Err(SettingsError::InvalidValue {
                key: "deadlock_marker",
                expected: "non-empty text",
                value: self.deadlock_marker,
            });
        }
        if self.log_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue {
                key: "log_queue_capacity",
                expected: "a positive integer",
                value: self.log_queue_capacity.to_string(),
            });
        }
        Ok(self)
    }

    /// The deadlock retry policy these settings describe.
    #[must_use]
    pub fn deadlock_retry_policy(&self) -> DeadlockRetryPolicy {
        DeadlockRetryPolicy::new(
            self.deadlock_retry_attempts,
            Duration::from_millis(self.deadlock_retry_delay_ms),
            self.deadlock_marker.clone(),
        )
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u32, SettingsError> {
    match value.trim().parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(SettingsError::InvalidValue {
            key,
            expected: "a positive integer",
            value: value.to_owned(),
        }),
    }
}
