//! Error types for connector setup, model-file parsing and checkpoints.

use thiserror::Error;

/// Errors that can occur while building or restoring a constrained model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u64),

    /// A connector must join two distinct bodies.
    #[error("connector {connector_id} joins body {body_id} to itself")]
    SameBody {
        /// The offending connector.
        connector_id: u64,
        /// The body referenced twice.
        body_id: u64,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Malformed model description.
    #[error("model file parse error: {0}")]
    ConfigParse(String),

    /// Checkpoint stream could not be written or read back.
    #[error("checkpoint error: {reason}")]
    Checkpoint {
        /// Description of what went wrong.
        reason: String,
    },
}

impl SimError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a checkpoint error.
    #[must_use]
    pub fn checkpoint(reason: impl Into<String>) -> Self {
        Self::Checkpoint {
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. } | Self::ConfigParse(_))
    }
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        Self::checkpoint(err.to_string())
    }
}
