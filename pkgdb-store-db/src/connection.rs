// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Database connection management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior, params};
use tracing::debug;

use crate::error::{DbContext, Error, Result};
use crate::schema::{
    ATTR_SETS_SQL, LOCKED_FLAKE_SQL, PACKAGES_SQL, SCHEMA_VERSIONS, VERSION_ROW_ENGINE,
    VERSION_ROW_TABLES, VERSION_ROW_VIEWS, VERSIONS_SQL, VIEWS_SQL, drop_views_sql,
};
use crate::types::{Fingerprint, LockedRef};

/// How long a connection waits on a locked database before giving up.
pub const DB_BUSY_TIMEOUT: Duration = Duration::from_secs(60);

/// Database open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only access to an existing catalog
    ReadOnly,
    /// Read-write access to an existing catalog
    ReadWrite,
    /// Create the catalog and its schema if missing
    Create,
}

/// SQLite connection to one package catalog.
pub struct PkgDb {
    pub(crate) conn: Connection,
    path: Option<PathBuf>,
}

impl PkgDb {
    /// Open a catalog at `path`.
    ///
    /// With [`OpenMode::Create`] the schema is created when missing; an
    /// existing file keeps whatever schema versions it was written with.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref();
        let flags = match mode {
            OpenMode::ReadOnly => {
                if !path.exists() {
                    return Err(Error::DatabaseNotFound(path.to_owned()));
                }
                OpenFlags::SQLITE_OPEN_READ_ONLY
            }
            OpenMode::ReadWrite => {
                if !path.exists() {
                    return Err(Error::DatabaseNotFound(path.to_owned()));
                }
                OpenFlags::SQLITE_OPEN_READ_WRITE
            }
            OpenMode::Create => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        };

        let conn = Connection::open_with_flags(path, flags).map_err(|e| Error::DatabaseOpen {
            path: path.to_owned(),
            source: e,
        })?;
        conn.busy_timeout(DB_BUSY_TIMEOUT)?;
        let db = Self {
            conn,
            path: Some(path.to_owned()),
        };

        if mode == OpenMode::Create {
            db.configure_pragmas()?;
            db.init()?;
        }

        debug!("Opened catalog at {} ({:?})", path.display(), mode);
        Ok(db)
    }

    /// Create a catalog for the namespace identified by `fingerprint`.
    ///
    /// Schema creation and the identity row are written in one exclusive
    /// transaction. Opening an existing catalog of the same namespace is a
    /// no-op; a catalog of another namespace fails with
    /// [`Error::FingerprintMismatch`].
    pub fn create<P: AsRef<Path>>(
        path: P,
        fingerprint: &Fingerprint,
        locked_ref: &LockedRef,
    ) -> Result<Self> {
        let db = Self::open(path, OpenMode::Create)?;
        db.with_exclusive(|db| db.write_locked_flake(fingerprint, locked_ref))?;
        Ok(db)
    }

    /// Create an in-memory catalog (for testing).
    ///
    /// The database is initialized with the full schema.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: None };
        db.configure_pragmas()?;
        db.init()?;
        debug!("Created in-memory catalog");
        Ok(db)
    }

    /// Configure SQLite pragmas for optimal performance.
    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;
        Ok(())
    }

    /// Create tables, version rows and views if they do not exist yet.
    pub fn init(&self) -> Result<()> {
        self.with_exclusive(|db| {
            db.conn
                .execute_batch(VERSIONS_SQL)
                .db_context(|| "Failed to create DbVersions".into())?;
            db.conn
                .execute_batch(LOCKED_FLAKE_SQL)
                .db_context(|| "Failed to create LockedFlake".into())?;
            db.conn
                .execute_batch(ATTR_SETS_SQL)
                .db_context(|| "Failed to create AttrSets".into())?;
            db.conn
                .execute_batch(PACKAGES_SQL)
                .db_context(|| "Failed to create Packages".into())?;

            let mut stmt = db
                .conn
                .prepare_cached("INSERT OR IGNORE INTO DbVersions (name, version) VALUES (?1, ?2)")?;
            stmt.execute(params![VERSION_ROW_ENGINE, env!("CARGO_PKG_VERSION")])?;
            stmt.execute(params![VERSION_ROW_TABLES, SCHEMA_VERSIONS.tables.to_string()])?;
            stmt.execute(params![VERSION_ROW_VIEWS, SCHEMA_VERSIONS.views.to_string()])?;

            db.conn
                .execute_batch(VIEWS_SQL)
                .db_context(|| "Failed to create views".into())?;
            Ok(())
        })?;
        debug!("Initialized catalog schema");
        Ok(())
    }

    /// Drop and recreate every view, then record the current view version.
    ///
    /// Tables and their rows are untouched.
    pub fn update_views(&self) -> Result<()> {
        self.with_exclusive(|db| {
            db.conn
                .execute_batch(&drop_views_sql())
                .db_context(|| "Failed to drop views".into())?;
            db.conn.execute(
                "INSERT OR REPLACE INTO DbVersions (name, version) VALUES (?1, ?2)",
                params![VERSION_ROW_VIEWS, SCHEMA_VERSIONS.views.to_string()],
            )?;
            db.conn
                .execute_batch(VIEWS_SQL)
                .db_context(|| "Failed to create views".into())?;
            Ok(())
        })?;
        debug!("Recreated catalog views (version {})", SCHEMA_VERSIONS.views);
        Ok(())
    }

    /// Run `f` inside an immediate transaction.
    ///
    /// The transaction commits when `f` succeeds and rolls back otherwise.
    pub fn with_transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        self.run_in_transaction(TransactionBehavior::Immediate, f)
    }

    fn with_exclusive<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        self.run_in_transaction(TransactionBehavior::Exclusive, f)
    }

    fn run_in_transaction<T, E, F>(
        &self,
        behavior: TransactionBehavior,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let tx = Transaction::new_unchecked(&self.conn, behavior).map_err(Error::from)?;
        let value = f(self)?;
        tx.commit().map_err(Error::from)?;
        Ok(value)
    }

    /// Override the busy timeout set at open time.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Path of the catalog file, `None` for in-memory catalogs.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get raw connection (for advanced usage).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
