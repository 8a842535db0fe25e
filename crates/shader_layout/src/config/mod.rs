//! Configuration system
//!
//! Layout tuning knobs plus the file-backed [`Config`] trait shared with
//! binding manifests. Files are read as TOML or RON depending on extension.

pub use serde::{Deserialize, Serialize};

use crate::foundation::math::STRUCT_ALIGNMENT;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::load_from_str(path, &contents)
    }

    /// Parse configuration text, choosing the format from `path`'s extension
    fn load_from_str(path: &str, contents: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Value out of the accepted range
    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// # Layout Configuration
///
/// Controls sub-allocation granularity for offset children and how parent
/// buffers react when a child does not fit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Minimum offset granularity for independently bindable children.
    /// Matches the common `minUniformBufferOffsetAlignment` device limit.
    pub min_sub_allocation: usize,
    /// Whether an owning binding may grow its buffer to fit a new child
    pub allow_parent_growth: bool,
    /// Log the computed field table of every constructed binding at debug level
    pub log_layouts: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            min_sub_allocation: 256,
            allow_parent_growth: true,
            log_layouts: false,
        }
    }
}

impl Config for LayoutConfig {}

impl LayoutConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sub-allocation granularity for bindable children
    pub fn with_min_sub_allocation(mut self, bytes: usize) -> Self {
        self.min_sub_allocation = bytes;
        self
    }

    /// Allow or forbid parent buffers from growing
    pub fn with_parent_growth(mut self, allow: bool) -> Self {
        self.allow_parent_growth = allow;
        self
    }

    /// Enable per-binding layout logging
    pub fn with_layout_logging(mut self, enabled: bool) -> Self {
        self.log_layouts = enabled;
        self
    }

    /// Check that the sub-allocation granularity is usable as a buffer alignment
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_sub_allocation.is_power_of_two() || self.min_sub_allocation < STRUCT_ALIGNMENT {
            return Err(ConfigError::Invalid(format!(
                "min_sub_allocation must be a power of two >= {}, got {}",
                STRUCT_ALIGNMENT, self.min_sub_allocation
            )));
        }
        Ok(())
    }
}
