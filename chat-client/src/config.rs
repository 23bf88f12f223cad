//! Configuration loading for convsync.
//!
//! Configuration is loaded from a TOML file (default: `convsync.toml`).
//! Every field has a default, so an empty file is a valid configuration.

use chat_core::{utc_offset, RetryPolicy};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest UTC offset accepted for date bucketing, in minutes.
const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Job scheduler cadence.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Message store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Job scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Connectivity re-check interval while gated (default: 3000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Sleep after a transient failure (default: 2000).
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Message store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Records per page (default: 100).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Local time offset used for date buckets (default: 0).
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Show the encryption hint at the start of history (default: true).
    #[serde(default = "default_encryption_hint")]
    pub encryption_hint: bool,
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_retry_backoff_ms() -> u64 {
    2_000
}

fn default_page_size() -> usize {
    100
}

fn default_encryption_hint() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            utc_offset_minutes: 0,
            encryption_hint: default_encryption_hint(),
        }
    }
}

impl SchedulerConfig {
    /// Retry policy for these settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_millis(self.poll_interval_ms, self.retry_backoff_ms)
    }
}

impl StoreConfig {
    /// Offset used to compute date keys.
    pub fn offset(&self) -> FixedOffset {
        utc_offset(self.utc_offset_minutes)
    }
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.poll_interval_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.scheduler.retry_backoff_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.retry_backoff_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.store.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "store.page_size",
                reason: "must be greater than zero".into(),
            });
        }
        if self.store.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::Invalid {
                field: "store.utc_offset_minutes",
                reason: format!("must be within ±{MAX_UTC_OFFSET_MINUTES}"),
            });
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn default_config_is_valid() {
        let config = ClientConfig::default();
        assert_eq!(config.scheduler.poll_interval_ms, 3_000);
        assert_eq!(config.scheduler.retry_backoff_ms, 2_000);
        assert_eq!(config.store.page_size, 100);
        assert!(config.store.encryption_hint);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[scheduler]
poll_interval_ms = 500

[store]
page_size = 50
utc_offset_minutes = 480
encryption_hint = false
"#;
        let config = ClientConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.scheduler.poll_interval_ms, 500);
        assert_eq!(config.scheduler.retry_backoff_ms, 2_000);
        assert_eq!(config.store.page_size, 50);
        assert_eq!(config.store.offset().local_minus_utc(), 480 * 60);
        assert!(!config.store.encryption_hint);
    }

    #[test]
    fn retry_policy_reflects_settings() {
        let config = ClientConfig::from_toml_str("[scheduler]\nretry_backoff_ms = 250\n").unwrap();
        let policy = config.scheduler.retry_policy();
        assert_eq!(policy.backoff, Duration::from_millis(250));
        assert_eq!(policy.poll_interval, Duration::from_secs(3));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = ClientConfig::from_toml_str("[store]\npage_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "store.page_size", .. }));
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let err = ClientConfig::from_toml_str("[store]\nutc_offset_minutes = 1200\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "store.utc_offset_minutes", .. }));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = ClientConfig::from_toml_str("[store\npage_size = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store]\npage_size = 25").unwrap();
        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.store.page_size, 25);
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let err = ClientConfig::load(Path::new("/nonexistent/convsync.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
