//! Common error types for AWM

use thiserror::Error;

/// Common result type for AWM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across AWM services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller identity missing or rejected
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Required field missing or malformed on create/update
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation rejected because it would break referential integrity
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
