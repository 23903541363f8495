//! # AppError
//!
//! Centralized error handling for Rusty-Blog.
//! Every action returns one of these instead of panicking; the web layer maps
//! them onto status codes.

use thiserror::Error;

/// The primary error type for all rb-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Resource not found (e.g., User, Post, Reply, slug)
    #[error("{0} not found: {1}")]
    NotFound(String, String),

    /// Bad or missing input (e.g., short username, unknown vote type)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// The action needs a logged-in user.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Login failed. Deliberately says nothing about which half was wrong.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// Logged in, but not the owner of the resource and not an admin.
    #[error("permission denied: {0}")]
    AuthorizationDenied(String),

    /// Resource already exists (e.g., duplicate username, racing vote insert)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database failure. The message is generic; details go to the log.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Anything else that is not the caller's fault (hashing, token signing)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(kind: &str, key: impl ToString) -> Self {
        AppError::NotFound(kind.to_string(), key.to_string())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }
}

/// A specialized Result type for Rusty-Blog logic.
pub type Result<T> = std::result::Result<T, AppError>;
