//! Connection configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A private in-memory database.
    Memory,
    /// A database file.
    File(PathBuf),
}

/// Configuration for opening a [`crate::SqliteBackend`].
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database location.
    pub location: Location,

    /// Whether to create the database file if it doesn't exist.
    pub create_if_missing: bool,

    /// How long a statement waits on a locked database.
    pub busy_timeout: Duration,

    /// Whether to switch file databases to write-ahead logging.
    pub journal_wal: bool,

    /// Whether to enforce foreign keys.
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            location: Location::Memory,
            create_if_missing: true,
            busy_timeout: Duration::from_secs(5),
            journal_wal: false,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// Creates a configuration for an in-memory database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for a database file.
    #[must_use]
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            location: Location::File(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Sets whether to create the database file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the busy timeout.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to use write-ahead logging.
    #[must_use]
    pub const fn journal_wal(mut self, value: bool) -> Self {
        self.journal_wal = value;
        self
    }

    /// Sets whether to enforce foreign keys.
    #[must_use]
    pub const fn foreign_keys(mut self, value: bool) -> Self {
        self.foreign_keys = value;
        self
    }

    /// Label used in connected type names: `sqlite3:<path>` or
    /// `sqlite3::memory:`.
    pub fn describe(&self) -> String {
        match &self.location {
            Location::Memory => "sqlite3::memory:".to_string(),
            Location::File(path) => format!("sqlite3:{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = SqliteConfig::default();
        assert_eq!(config.location, Location::Memory);
        assert!(config.create_if_missing);
        assert!(!config.journal_wal);
        assert_eq!(config.describe(), "sqlite3::memory:");
    }

    #[test]
    fn builder_pattern() {
        let config = SqliteConfig::file("/tmp/people.db")
            .create_if_missing(false)
            .journal_wal(true)
            .busy_timeout(Duration::from_millis(250));

        assert!(!config.create_if_missing);
        assert!(config.journal_wal);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert_eq!(config.describe(), "sqlite3:/tmp/people.db");
    }
}
