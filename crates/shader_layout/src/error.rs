//! Error types for layout computation and serialization
//!
//! Declarations are static configuration, so every error here is a
//! programming error surfaced synchronously at construction or update time.

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias used throughout the crate
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Layout and serialization errors
#[derive(Error, Debug)]
pub enum LayoutError {
    /// Symbolic type name is not registered
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// Value shape does not match the declared type
    #[error("Type mismatch for '{field}': {reason}")]
    TypeMismatch {
        /// Field the value was assigned to
        field: String,
        /// What did not match
        reason: String,
    },

    /// Capacity exceeded or an explicit offset is misaligned
    #[error("Layout error: {0}")]
    Layout(String),

    /// Write outside the reserved byte range
    #[error("Range error: write of {len} bytes at offset {offset} exceeds reserved range of {limit} bytes")]
    Range {
        /// Offset of the rejected write, relative to the reserved range
        offset: usize,
        /// Length of the rejected write
        len: usize,
        /// Size of the reserved range
        limit: usize,
    },

    /// Field name not declared on the binding
    #[error("No field named '{0}'")]
    UnknownField(String),

    /// Configuration or manifest loading failed
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl LayoutError {
    /// Shorthand for a [`LayoutError::TypeMismatch`]
    pub fn mismatch(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a type mismatch
    pub const fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}
