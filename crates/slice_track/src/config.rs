//! Track tuning knobs, loadable from TOML

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Quantization and labelling settings for slice tracks.
///
/// Every field has a default, so a TOML file only needs the keys it overrides:
///
/// ```toml
/// min_quanta = 8
/// quantize_cutoff_ns = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackConfig {
    /// Minimum number of quanta a quantized window is split into
    pub min_quanta: u32,
    /// Width of one merged bucket in pixels
    pub bucket_px: u32,
    /// Resolution (ns per pixel) at or above which windows are quantized
    pub quantize_cutoff_ns: i64,
    /// Merged bucket labels are cut to this many characters
    pub label_limit: usize,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            min_quanta: 5,
            bucket_px: 5,
            quantize_cutoff_ns: 2000,
            label_limit: 100,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl TrackConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config file, falling back to defaults for missing keys
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
