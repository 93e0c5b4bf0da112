// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Paged scraping of package namespaces into SQLite catalogs.
//!
//! A [`PkgDbInput`] pairs a locked [`Namespace`] with its catalog. Asking it
//! to scrape a prefix such as `legacyPackages.x86_64-linux` takes the
//! catalog's coordination lock, then runs pages of the prefix one after the
//! other, each in a disposable worker process with its own transaction,
//! until the prefix is marked done.
//!
//! ```no_run
//! use pkgdb_scrape::{Config, JsonNamespace, PkgDbInput};
//! use std::path::Path;
//!
//! let namespace = JsonNamespace::from_file(Path::new("namespace.json"))?;
//! let input = PkgDbInput::new(namespace, Config::load()?)?;
//! input.scrape_systems(&pkgdb_scrape::DEFAULT_SUBTREES, &["x86_64-linux"])?;
//! # Ok::<(), pkgdb_scrape::ScrapeError>(())
//! ```

pub mod cache;
pub mod config;
pub mod cursor;
pub mod error;
pub mod input;
pub mod json_namespace;
pub mod lock;
pub mod memory;
pub mod package;
pub mod scheduler;
pub mod traversal;
pub mod versions;

pub use cache::{
    CACHE_DIR_ENV, db_path_for, default_cache_dir, find_stale_databases, gc, is_sqlite_db,
    list_databases,
};
pub use config::{CONFIG_ENV, Config, Isolation};
pub use cursor::{Cursor, Namespace, Node, PackageMeta, RECURSE_MARKER};
pub use error::{EvalError, EvalErrorKind, LockError, Result, SchedulerError, ScrapeError};
pub use input::{DEFAULT_SUBTREES, PkgDbInput};
pub use json_namespace::{JsonCursor, JsonNamespace};
pub use lock::{DbLock, DbLockOwner, LockActivity, LockTimings};
pub use scheduler::{
    EXIT_CHILD_ERROR, EXIT_CHILD_INCOMPLETE, EXIT_CHILD_PANIC, EXIT_FAILURE_EVAL,
    EXIT_PAGE_COMPLETE, ForkRunner, InProcessRunner, PageOutcome, PageRunner, run_pages,
};
