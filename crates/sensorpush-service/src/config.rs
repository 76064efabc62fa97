//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sensorpush_types::Severity;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Radio settings.
    pub radio: RadioConfig,
    /// Live feed settings.
    pub broadcast: BroadcastConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Storage path is not empty
    /// - Identity read timeout is within 1-120 seconds
    /// - Subscriber buffer is within 1-65536 items
    /// - Feed level names a known severity
    ///
    /// # Example
    ///
    /// ```
    /// use sensorpush_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.storage.validate());
        errors.extend(self.radio.validate());
        errors.extend(self.broadcast.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: sensorpush_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Minimum identity read timeout in seconds.
pub const MIN_READ_TIMEOUT_SECS: u64 = 1;
/// Maximum identity read timeout in seconds.
pub const MAX_READ_TIMEOUT_SECS: u64 = 120;

/// Radio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Upper bound for one identity read, in seconds.
    pub identity_read_timeout_secs: u64,
    /// Index of the Bluetooth adapter to use.
    pub adapter_index: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            identity_read_timeout_secs: 15,
            adapter_index: 0,
        }
    }
}

impl RadioConfig {
    /// The identity read timeout as a [`Duration`].
    pub fn identity_read_timeout(&self) -> Duration {
        Duration::from_secs(self.identity_read_timeout_secs)
    }

    /// Validate radio configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.identity_read_timeout_secs < MIN_READ_TIMEOUT_SECS {
            errors.push(ValidationError {
                field: "radio.identity_read_timeout_secs".to_string(),
                message: format!(
                    "identity read timeout {} is too short (minimum {} second)",
                    self.identity_read_timeout_secs, MIN_READ_TIMEOUT_SECS
                ),
            });
        } else if self.identity_read_timeout_secs > MAX_READ_TIMEOUT_SECS {
            errors.push(ValidationError {
                field: "radio.identity_read_timeout_secs".to_string(),
                message: format!(
                    "identity read timeout {} is too long (maximum {} seconds)",
                    self.identity_read_timeout_secs, MAX_READ_TIMEOUT_SECS
                ),
            });
        }

        errors
    }
}

/// Minimum per-subscriber buffer.
pub const MIN_SUBSCRIBER_BUFFER: usize = 1;
/// Maximum per-subscriber buffer.
pub const MAX_SUBSCRIBER_BUFFER: usize = 65536;

/// Live feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Items buffered per subscriber before the oldest are dropped.
    pub subscriber_buffer: usize,
    /// Lowest severity forwarded to the log feed (e.g. "info").
    pub feed_level: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
            feed_level: "info".to_string(),
        }
    }
}

impl BroadcastConfig {
    /// The parsed feed level, falling back to `Info` when unparseable.
    pub fn feed_severity(&self) -> Severity {
        self.feed_level.parse().unwrap_or(Severity::Info)
    }

    /// Validate broadcast configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.subscriber_buffer < MIN_SUBSCRIBER_BUFFER {
            errors.push(ValidationError {
                field: "broadcast.subscriber_buffer".to_string(),
                message: format!(
                    "subscriber buffer {} is too small (minimum {})",
                    self.subscriber_buffer, MIN_SUBSCRIBER_BUFFER
                ),
            });
        } else if self.subscriber_buffer > MAX_SUBSCRIBER_BUFFER {
            errors.push(ValidationError {
                field: "broadcast.subscriber_buffer".to_string(),
                message: format!(
                    "subscriber buffer {} is too large (maximum {})",
                    self.subscriber_buffer, MAX_SUBSCRIBER_BUFFER
                ),
            });
        }

        if self.feed_level.parse::<Severity>().is_err() {
            errors.push(ValidationError {
                field: "broadcast.feed_level".to_string(),
                message: format!(
                    "unknown feed level '{}': expected debug, info, warn, error or critical",
                    self.feed_level
                ),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `radio.adapter_index`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sensorpush")
        .join("service.toml")
}
