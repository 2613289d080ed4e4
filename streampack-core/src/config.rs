//! Centralized configuration for Streampack.
//!
//! All tunable parameters for the packer and its producers are defined here
//! to avoid hard-coded values scattered throughout the codebase.

use tracing::warn;

/// Errors produced while building or validating configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Packer capacity must leave room for at least one byte
    #[error("Packer capacity must be greater than zero")]
    ZeroCapacity,

    /// Producers must read at least one byte per chunk
    #[error("Source chunk size must be greater than zero")]
    ZeroChunkSize,

    /// Environment override could not be parsed
    #[error("Invalid value {value:?} for {variable}")]
    InvalidOverride {
        /// Name of the environment variable
        variable: &'static str,
        /// Raw value that failed to parse
        value: String,
    },
}

/// Central configuration for all Streampack components.
#[derive(Debug, Clone, Default)]
pub struct StreampackConfig {
    pub packer: PackerConfig,
    pub source: SourceConfig,
}

/// Stream data packer configuration.
///
/// Controls the soft capacity that triggers producer backpressure and whether
/// the live pre-download eviction path is enabled.
#[derive(Debug, Clone)]
pub struct PackerConfig {
    /// Resident byte count above which `push_data` blocks the producer
    pub capacity: usize,
    /// Allow `pre_remove` to evict bytes not yet consumed (unseekable live sources)
    pub support_pre_download: bool,
    /// Media offset of the first byte the producer will push
    pub initial_media_offset: u64,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            capacity: 8 * 1024 * 1024, // 8 MiB
            support_pre_download: false,
            initial_media_offset: 0,
        }
    }
}

impl PackerConfig {
    /// Creates configuration with a small window for fast-start playback.
    pub fn low_latency() -> Self {
        Self {
            capacity: 1024 * 1024, // 1 MiB
            ..Default::default()
        }
    }

    /// Creates configuration for unseekable live sources.
    pub fn live() -> Self {
        Self {
            capacity: 2 * 1024 * 1024, // 2 MiB
            support_pre_download: true,
            ..Default::default()
        }
    }

    /// Sets the capacity, keeping every other field.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

/// Producer-side configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Bytes read from the source per pushed chunk
    pub chunk_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024, // 64 KiB
        }
    }
}

impl StreampackConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparsable values are ignored so a stray variable never prevents
    /// startup; use [`StreampackConfig::try_from_env`] to surface them.
    pub fn from_env() -> Self {
        Self::with_lenient_overrides(|variable| std::env::var(variable).ok())
    }

    /// Applies every override `lookup` yields, logging and skipping the
    /// ones that do not parse.
    fn with_lenient_overrides(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        for variable in OVERRIDES {
            if let Some(value) = lookup(variable) {
                if let Err(e) = config.apply_override(variable, &value) {
                    warn!("Ignoring environment override: {}", e);
                }
            }
        }
        config
    }

    /// Creates configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidOverride` - If a variable is set to an unparsable value
    /// - `ConfigError::ZeroCapacity` / `ConfigError::ZeroChunkSize` - If the result is invalid
    pub fn try_from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for variable in OVERRIDES {
            if let Ok(value) = std::env::var(variable) {
                config.apply_override(variable, &value)?;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Applies one named override.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidOverride` - If `value` does not parse for `variable`
    pub fn apply_override(&mut self, variable: &'static str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidOverride {
            variable,
            value: value.to_string(),
        };

        match variable {
            "STREAMPACK_CAPACITY" => {
                self.packer.capacity = value.trim().parse().map_err(|_| invalid())?;
            }
            "STREAMPACK_CHUNK_SIZE" => {
                self.source.chunk_size = value.trim().parse().map_err(|_| invalid())?;
            }
            "STREAMPACK_PRE_DOWNLOAD" => {
                self.packer.support_pre_download = value.trim().parse().map_err(|_| invalid())?;
            }
            _ => return Err(invalid()),
        }
        Ok(())
    }

    /// Validates configuration values.
    ///
    /// # Errors
    ///
    /// - `ConfigError::ZeroCapacity` - If the packer capacity is zero
    /// - `ConfigError::ZeroChunkSize` - If the source chunk size is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packer.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.source.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }
}

const OVERRIDES: [&str; 3] = [
    "STREAMPACK_CAPACITY",
    "STREAMPACK_CHUNK_SIZE",
    "STREAMPACK_PRE_DOWNLOAD",
];
