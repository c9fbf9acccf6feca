//! Error type shared by the Mise crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures below the HTTP layer
///
/// The API crate maps `InvalidInput` to 400, `NotFound` to 404, `Auth` to 401
/// and everything else to 500.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad or missing configuration, reported at startup
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied value rejected; the message is shown to the client
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Bad credentials, malformed or expired token
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Stored data that can't be decoded, or a bug
    #[error("Internal error: {0}")]
    Internal(String),
}
