//! Configuration documents
//!
//! The format follows the file extension. Every format decodes into a
//! `serde_json::Value` with keys in document order, which is then validated by
//! [`SweepConfig::from_value`].

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use sweepsim_core::SweepConfig;
use tracing::{debug, warn};

use super::fs::atomic_write;
use crate::error::{EnvironmentError, Result};

const SUPPORTED: &str = "toml, json, yaml, yml";

/// On-disk configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    #[default]
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from the extension of `path`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        ext.parse()
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
            ConfigFormat::Yaml => "yaml",
        }
    }

    fn decode(&self, text: &str) -> std::result::Result<Value, String> {
        match self {
            ConfigFormat::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_saphyr::from_str(text).map_err(|e| e.to_string()),
        }
    }

    fn encode(&self, value: &Value) -> std::result::Result<String, String> {
        match self {
            ConfigFormat::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::to_string_pretty(value).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_saphyr::to_string(value).map_err(|e| e.to_string()),
        }
    }
}

impl FromStr for ConfigFormat {
    type Err = EnvironmentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            other => Err(EnvironmentError::UnsupportedFormat {
                format: other.to_string(),
                supported: SUPPORTED.to_string(),
            }),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Read and decode a configuration document without validating it.
pub fn read_config_value(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(EnvironmentError::DataFileNotFound(path.to_path_buf()));
    }
    let format = ConfigFormat::from_path(path)?;
    let text = fs::read_to_string(path).map_err(EnvironmentError::io(path))?;

    format.decode(&text).map_err(|e| {
        EnvironmentError::Configuration(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Read, decode and validate a configuration document.
pub fn load_config(path: &Path) -> Result<SweepConfig> {
    let value = read_config_value(path)?;
    let config = SweepConfig::from_value(value)?;
    debug!(
        path = %path.display(),
        parameters = config.parameters.len(),
        "Loaded configuration"
    );
    Ok(config)
}

/// Write a configuration snapshot, creating the parent directory if needed.
///
/// An existing file is replaced after a warning.
pub fn save_config(config: &Value, path: &Path, format: ConfigFormat) -> Result<()> {
    if path.exists() {
        warn!(path = %path.display(), "Overwriting existing configuration file");
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(EnvironmentError::io(parent))?;
    }

    let text = format.encode(config).map_err(|e| {
        EnvironmentError::Configuration(format!(
            "failed to encode configuration as {format}: {e}"
        ))
    })?;
    atomic_write(path, &text).map_err(EnvironmentError::io(path))?;

    debug!(path = %path.display(), %format, "Saved configuration");
    Ok(())
}
