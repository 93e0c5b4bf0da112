// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! SQLite catalog of package metadata.
//!
//! One database caches the packages found in a single locked namespace,
//! identified by its [`Fingerprint`]. The catalog records the namespace's
//! attribute-set hierarchy (`AttrSets`), one row per package leaf
//! (`Packages`), and deduplicated long descriptions (`Descriptions`).
//! Generated views reconstruct attribute paths, split semantic versions and
//! aggregate everything into a search-friendly `v_PackagesSearch`.
//!
//! # Key Features
//!
//! - Write-once `LockedFlake` identity row guarded by a trigger
//! - Independently versioned table and view schemas
//! - Idempotent `(parent, attrName)` inserts for both node tables
//! - Recursive `done` marking for fully scraped subtrees
//! - Structured package search
//!
//! # Example
//!
//! ```ignore
//! use pkgdb_store_db::{OpenMode, PkgDb};
//!
//! let db = PkgDb::open("/path/to/<fingerprint>.sqlite", OpenMode::ReadOnly)?;
//! let id = db.package_id(&["legacyPackages".into(), "x86_64-linux".into(), "hello".into()])?;
//! println!("{}", serde_json::to_string(&db.package(id)?)?);
//! ```

mod connection;
mod error;
mod query;
mod schema;
mod search;
mod types;
mod write;

pub use connection::{DB_BUSY_TIMEOUT, OpenMode, PkgDb};
pub use error::{DbContext, Error, Result};
pub use schema::SCHEMA_VERSIONS;
pub use search::PackageQuery;
pub use types::*;
