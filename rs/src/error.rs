//! Errors raised by the similarity engine

use thiserror::Error;

/// Engine-level errors
///
/// Both variants fail the whole operation before any scoring happens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DedupError {
    /// Weights do not sum to 1.0 or the threshold is outside [0.0, 1.0]
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// A candidate or corpus record is missing a required field
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl DedupError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}
