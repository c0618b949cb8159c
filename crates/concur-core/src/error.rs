//! Error types for configuration and manager construction.

use thiserror::Error;

/// Errors raised while validating a [`crate::config::ConcurrencyConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A field's value falls outside its valid range.
    #[error("{field} is out of range: {reason}")]
    OutOfRange {
        field: &'static str,
        reason: String,
    },
}
