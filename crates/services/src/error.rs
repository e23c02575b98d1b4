//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted while decoding or encoding persisted progress fields.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors emitted while reading configuration from the environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid value for {var}: {raw:?}")]
    InvalidVar { var: &'static str, raw: String },
}

/// Errors emitted by the backend sync collaborator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("backend sync is not configured")]
    Disabled,
    #[error("backend rejected the request: {0}")]
    Rejected(String),
    #[error("backend request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}
