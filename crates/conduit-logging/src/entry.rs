//! Log entry model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::Level;

/// How serious a log entry is. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Severity for a `tracing` level; `TRACE` folds into [`Severity::Debug`].
    #[must_use]
    pub fn from_level(level: Level) -> Self {
        match level {
            Level::TRACE | Level::DEBUG => Self::Debug,
            Level::INFO => Self::Info,
            Level::WARN => Self::Warning,
            Level::ERROR => Self::Error,
        }
    }

    /// Parses a severity name, ignoring case.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// How serious the record is.
    pub severity: Severity,
    /// The event's message text.
    pub message: String,
    /// Rendered error attached to the record, if any.
    pub error: Option<String>,
    /// Remaining structured fields.
    pub data: Map<String, Value>,
    /// When the record was captured.
    pub timestamp_utc: DateTime<Utc>,
}

impl LogEntry {
    /// Creates an entry without error or data.
    pub fn new(severity: Severity, message: impl Into<String>, timestamp_utc: DateTime<Utc>) -> Self {
        Self {
            severity,
            message: message.into(),
            error: None,
            data: Map::new(),
            timestamp_utc,
        }
    }

    /// Attaches a rendered error.
    #[must_use]
    pub fn with_error(mut self, error: impl fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Adds a structured field.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_severities_are_ordered() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_levels_map_to_severities() {
        assert_eq!(Severity::from_level(Level::TRACE), Severity::Debug);
        assert_eq!(Severity::from_level(Level::WARN), Severity::Warning);
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse("fatal"), None);
    }

    #[test]
    fn test_entry_serializes_with_snake_case_fields() {
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let entry = LogEntry::new(Severity::Critical, "revert failed", at)
            .with_error("connection lost")
            .with_data("attempt", 2);

        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["severity"], "critical");
        assert_eq!(json["error"], "connection lost");
        assert_eq!(json["data"]["attempt"], 2);
        assert_eq!(json["timestamp_utc"], "2026-01-15T10:00:00Z");
    }
}
