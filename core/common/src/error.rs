//! Common error types for Nimbus.

use thiserror::Error;

/// Top-level error type for Nimbus storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication with the provider failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The provider rejected the operation for the current principal.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Network or transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider reported an operation failure.
    #[error("Provider error: {0}")]
    Provider(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
