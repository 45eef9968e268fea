//! Configuration structures for the clock and store.
//!
//! Supports TOML deserialization with sensible defaults for
//! development and explicit values for production deployment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// Number of shards a store gets when nothing else is configured.
pub const DEFAULT_SHARD_COUNT: usize = 32;

/// Bytes of the CPU information text inspected by the frequency probe.
pub const DEFAULT_CPUINFO_READ_LIMIT: usize = 4096;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Clock subsystem configuration.
    pub clock: ClockConfig,

    /// Sharded store configuration.
    pub store: StoreConfig,

    /// Store load generator configuration.
    pub bench: BenchConfig,
}

/// How the monotonic clock obtains its readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClockStrategy {
    /// The OS monotonic clock (`CLOCK_MONOTONIC`).
    #[default]
    Native,
    /// Wall-clock anchor plus a hardware tick counter and its timebase.
    Emulated,
}

impl std::fmt::Display for ClockStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockStrategy::Native => write!(f, "native"),
            ClockStrategy::Emulated => write!(f, "emulated"),
        }
    }
}

/// Clock subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Monotonic clock strategy.
    pub strategy: ClockStrategy,

    /// Path of the CPU information text (Linux procfs layout).
    pub cpuinfo_path: PathBuf,

    /// Only this many leading bytes of the CPU information are read.
    pub cpuinfo_read_limit: usize,

    /// Probe for an invariant tick counter before falling back to "cpu MHz".
    pub detect_invariant: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            strategy: ClockStrategy::Native,
            cpuinfo_path: PathBuf::from("/proc/cpuinfo"),
            cpuinfo_read_limit: DEFAULT_CPUINFO_READ_LIMIT,
            detect_invariant: true,
        }
    }
}

/// Sharded store configuration.
///
/// Read once when the store is built; changing it afterwards has no effect
/// on an existing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Number of independently locked shards.
    pub shard_count: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
        }
    }
}

impl StoreConfig {
    /// Check that a store can be built from this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidShardCount`] when `shard_count` is zero.
    pub fn validate(&self) -> CoreResult<()> {
        if self.shard_count == 0 {
            return Err(CoreError::InvalidShardCount {
                count: self.shard_count,
            });
        }
        Ok(())
    }
}

/// Store load generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Number of client threads.
    pub threads: usize,

    /// How long each thread keeps issuing commands.
    #[serde(with = "human_duration")]
    pub duration: Duration,

    /// Number of distinct keys the threads cycle through.
    pub key_space: usize,

    /// Length in bytes of every written value.
    pub value_size: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            duration: Duration::from_secs(2),
            key_space: 10_000,
            value_size: 16,
        }
    }
}

impl CoreConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a section fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.store.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Parsed values that cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(CoreError),
}

/// `Duration` fields written as text (`"2s"`, `"1m 30s"`) in config files.
///
/// A bare integer is read as milliseconds. Values are always written back
/// as text.
pub mod human_duration {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Written {
        Text(String),
        Millis(u64),
    }

    /// Write `duration` in humantime notation.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    /// Read humantime text or integer milliseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Written::deserialize(deserializer)? {
            Written::Text(text) => humantime::parse_duration(text.trim()).map_err(D::Error::custom),
            Written::Millis(ms) => Ok(Duration::from_millis(ms)),
        }
    }
}
