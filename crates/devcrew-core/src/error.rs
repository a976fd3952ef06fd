//! Error types for Devcrew Core

use thiserror::Error;

/// Result type alias using Devcrew Error
pub type Result<T> = std::result::Result<T, Error>;

/// Devcrew error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Forge error: {0}")]
    Forge(String),

    #[error("Model provider error: {0}")]
    Provider(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Branch safety error: {0}")]
    Branch(String),

    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),
}

/// Applier precondition failures
///
/// These fail a single change; the surrounding apply is rolled back to its
/// pre-captured snapshot and the messages feed Gate 4.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("invalid change: {0}")]
    InvalidChange(String),

    #[error("path is outside the repository: {0}")]
    PathOutsideRepo(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("anchor not found in {path}: {anchor}")]
    AnchorNotFound { path: String, anchor: String },

    #[error("edit matched nothing in {path}: {find}")]
    EditNoMatch { path: String, find: String },

    #[error("invalid regex in change targeting {path}: {message}")]
    BadRegex { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
