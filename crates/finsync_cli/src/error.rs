//! CLI error type.

use finsync_engine::{DomainError, SyncError};
use finsync_store::StoreError;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    /// Local database failure.
    #[error("database error: {0}")]
    Store(#[from] StoreError),

    /// A local mutation was rejected.
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// A sync pass failed.
    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),

    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server URL has no usable host.
    #[error("invalid server URL {0:?}")]
    InvalidServerUrl(String),

    /// A remote command was run without a credential.
    #[error("no bearer token; pass --token or set FINSYNC_TOKEN")]
    MissingToken,

    /// Unknown `--format` value.
    #[error("unknown output format {0:?}, expected text or json")]
    UnknownFormat(String),

    /// Terminal or signal I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
