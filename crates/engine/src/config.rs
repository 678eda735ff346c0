//! Coordinator configuration via `keel.toml`
//!
//! On first start a default `keel.toml` is written next to the data. To
//! change settings, edit the file and restart.

use crate::memory::MemoryEngineOptions;
use keel_core::{KeelError, KeelResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "keel.toml";

/// Engine-facing settings, persisted under `[engine]`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Reject timestamps that are not exactly 16 hex digits
    #[serde(default = "default_true")]
    pub strict_hex_width: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_hex_width: true,
        }
    }
}

impl EngineConfig {
    /// Options for the in-memory engine
    pub fn memory_options(&self) -> MemoryEngineOptions {
        MemoryEngineOptions {
            strict_hex_width: self.strict_hex_width,
            ..MemoryEngineOptions::default()
        }
    }
}

/// Configuration loaded from `keel.toml`.
///
/// # Example
///
/// ```toml
/// log_filter = "keel=info"
/// prune_on_advance = true
///
/// [engine]
/// strict_hex_width = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeelConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Prune older named snapshots after every committed advance
    #[serde(default = "default_true")]
    pub prune_on_advance: bool,
    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_log_filter() -> String {
    "keel=info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for KeelConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            prune_on_advance: true,
            engine: EngineConfig::default(),
        }
    }
}

impl KeelConfig {
    /// Build the `EnvFilter` for `log_filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directive does not parse.
    pub fn env_filter(&self) -> KeelResult<EnvFilter> {
        EnvFilter::try_new(&self.log_filter).map_err(|e| {
            KeelError::invalid_input(format!(
                "Invalid log_filter '{}' in keel.toml: {}",
                self.log_filter, e
            ))
        })
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Keel snapshot coordinator configuration
#
# tracing filter used when RUST_LOG is not set (default: "keel=info")
# Use "keel::snapshot=debug" to log every retention floor change.
log_filter = "keel=info"

# Drop named snapshots older than the committed one after each advance
# (default: true)
prune_on_advance = true

[engine]
# Require timestamps in engine config strings to be exactly 16 hex digits
# (default: true)
strict_hex_width = true
"#
    }

    /// Parse config from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the content does not parse or holds invalid values.
    pub fn from_toml_str(content: &str) -> KeelResult<Self> {
        let config: KeelConfig = toml::from_str(content)
            .map_err(|e| KeelError::invalid_input(format!("Failed to parse keel.toml: {}", e)))?;
        // Validate the filter eagerly
        config.env_filter()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> KeelResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KeelError::internal(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> KeelResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                KeelError::internal(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> KeelResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| KeelError::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            KeelError::internal(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
