// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Error types for catalog database operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::SqlVersions;

/// Result type for catalog database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during catalog database operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// SQLite error with context about the failing statement
    #[error("{context}: {source}")]
    Sql {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to open database with context
    #[error("Failed to open database at '{path}': {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Database file not found
    #[error("Database not found at: {0}")]
    DatabaseNotFound(PathBuf),

    /// Schema versions stored in the database differ from ours
    #[error("Incompatible schema versions: expected ({expected}), found ({found})")]
    SchemaVersionMismatch {
        expected: SqlVersions,
        found: SqlVersions,
    },

    /// No `AttrSets` row for the given attribute path
    #[error("No such AttrSet '{0}'")]
    NoSuchAttrSet(String),

    /// No `Packages` row for the given attribute path
    #[error("No such package '{0}'")]
    NoSuchPackage(String),

    /// A row id that does not exist
    #[error("No such '{table}.id' {id}")]
    NoSuchRow { table: &'static str, id: i64 },

    /// The database has no `LockedFlake` row yet
    #[error("No LockedFlake row in database")]
    MissingLockedFlake,

    /// The database belongs to a different namespace
    #[error("Database '{path}' fingerprint '{found}' does not match expected '{expected}'")]
    FingerprintMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    /// Fingerprint string is not 64 hex characters
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Malformed JSON column
    #[error("Invalid JSON in database: {0}")]
    Json(#[from] serde_json::Error),
}

/// Helper trait for adding context to SQLite errors
pub trait DbContext<T> {
    fn db_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> DbContext<T> for std::result::Result<T, rusqlite::Error> {
    fn db_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| Error::Sql {
            context: f(),
            source,
        })
    }
}
