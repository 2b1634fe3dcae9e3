//! Error types for the SQLite backend.

use multipersist_core::CoreError;
use std::io;
use thiserror::Error;

/// Result type for SQLite backend operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Errors that can occur in the SQLite backend.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An I/O error occurred while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored value could not be read back as its declared type.
    #[error("cannot decode column {column} as {expected}: {detail}")]
    Decode {
        /// Column name.
        column: String,
        /// Declared attribute type.
        expected: String,
        /// What was found.
        detail: String,
    },

    /// The database file does not exist and creation was disabled.
    #[error("database does not exist: {0}")]
    Missing(String),
}

impl SqliteError {
    /// Creates a decode error.
    pub fn decode(
        column: impl Into<String>,
        expected: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Decode {
            column: column.into(),
            expected: expected.into(),
            detail: detail.into(),
        }
    }
}

impl From<SqliteError> for CoreError {
    fn from(err: SqliteError) -> Self {
        CoreError::backend(err)
    }
}
