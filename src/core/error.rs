//! Error types for Graft.

use thiserror::Error;

/// Result type alias for Graft operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Graft operations.
#[derive(Error, Debug)]
pub enum Error {
    // Registry errors
    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Plugin {id} failed to activate: {reason}")]
    ActivationFailure { id: String, reason: String },

    #[error("Plugin {id} did not shut down cleanly: {reason}")]
    DeactivationFailure { id: String, reason: String },

    // Routing errors
    #[error("Route {route} is already bound by {owner}")]
    BindingConflict { route: String, owner: String },

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    // Persistence errors
    #[error("Plugin store unavailable: {0}")]
    StoreUnavailable(String),

    // Discovery errors
    #[error("Plugin discovery failed: {0}")]
    DiscoveryFailed(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether an operator may retry the failed call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("blocking task failed: {}", err))
    }
}
