//! Backend Error Types
//!
//! This module defines the server-side error taxonomy. The categories map
//! directly onto the failure model of the sync engine:
//!
//! - `Storage` / `Migration` - the persistence layer is unavailable or
//!   failed a write. These are never silently swallowed: live mutations are
//!   still applied in memory and broadcast (availability over durability),
//!   the failure is logged, and the periodic flush sweep is the retry path.
//!   The only fatal case is a broken store at startup, which prevents the
//!   process from serving at all.
//! - `CorruptRecord` - a persisted row with an unrecognized kind or an
//!   undeserializable payload. Skipped (with a warning) during load; never
//!   aborts loading the rest of a document.
//! - `Shared` - validation or serialization failures at the protocol
//!   boundary.

use axum::http::StatusCode;
use thiserror::Error;

use crate::shared::SharedError;

/// Server-side error type.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Storage-layer failure (disk full, locked database, broken pool)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Schema migration failure at startup
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A persisted annotation row that cannot be interpreted
    #[error("Corrupt record '{id}': {message}")]
    CorruptRecord {
        /// Primary key of the offending row
        id: String,
        /// What was wrong with it
        message: String,
    },

    /// Server configuration error
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message
        message: String,
    },

    /// Shared error (validation, serialization) from the protocol boundary
    #[error(transparent)]
    Shared(#[from] SharedError),

    /// JSON encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    /// Create a new corrupt-record error
    pub fn corrupt(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            id: id.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Map this error to an HTTP status code for the API surface.
    ///
    /// # Status Code Mapping
    ///
    /// - `Storage` / `Migration` / `CorruptRecord` / `Serialization` - 500
    /// - `Config` - 500
    /// - `Shared` validation - 400
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Migration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CorruptRecord { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Shared(err) => match err {
                SharedError::ValidationError { .. } => StatusCode::BAD_REQUEST,
                SharedError::SerializationError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
