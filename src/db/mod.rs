pub mod sqlite;

pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated on {field}: {message}")]
    ConstraintViolation { field: &'static str, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl DatabaseError {
    pub(crate) fn constraint(field: &'static str, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            field,
            message: message.into(),
        }
    }
}
