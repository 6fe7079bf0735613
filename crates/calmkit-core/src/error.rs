//! Core error types for calmkit-core.
//!
//! Engine errors are synchronous and recoverable: they describe a caller
//! mistake (a pause while paused, a skip past the last step) and leave the
//! engine state untouched. Storage and configuration errors wrap the
//! underlying I/O, SQLite and serialization failures.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for calmkit-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Timer / routine engine errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Routine store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the phase controllers, the session monitor and the
/// routine sequencer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The operation is not valid for the current status.
    #[error("cannot {operation} while {from}")]
    InvalidStateTransition {
        operation: &'static str,
        from: String,
    },

    /// Routine navigation past the last step.
    #[error("no next step: already on the last step")]
    NoNextStep,

    /// Routine navigation before the first step.
    #[error("no previous step: already on the first step")]
    NoPreviousStep,

    #[error("invalid routine definition: {0}")]
    InvalidRoutineDefinition(String),

    #[error("invalid phase sequence: {0}")]
    InvalidPhaseSequence(String),

    #[error("invalid monitor configuration: {0}")]
    InvalidMonitorConfig(String),
}

impl EngineError {
    pub(crate) fn transition(operation: &'static str, from: impl std::fmt::Display) -> Self {
        EngineError::InvalidStateTransition {
            operation,
            from: from.to_string(),
        }
    }
}

/// Routine store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Routine '{0}' not found")]
    NotFound(String),

    #[error("Invalid routine: {0}")]
    Invalid(#[from] EngineError),

    #[error("Routine storage failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to encode routine: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Failed to access the data directory
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to access the data directory
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
