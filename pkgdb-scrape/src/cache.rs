// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Catalog files in the cache directory.

use std::fs::{self, File, FileTimes};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use pkgdb_store_db::{Fingerprint, SCHEMA_VERSIONS};
use tracing::{debug, info};

use crate::error::{IoContext, Result, ScrapeError};

/// Overrides the cache directory.
pub const CACHE_DIR_ENV: &str = "PKGDB_CACHEDIR";

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
const DB_EXTENSION: &str = "sqlite";
const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// `env_override`, else `<user cache>/pkgdb/pkgdb-v<tables>`.
pub fn default_cache_dir(env_override: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = env_override {
        return Ok(dir);
    }
    let base = dirs::cache_dir()
        .ok_or_else(|| ScrapeError::config("cannot determine the user cache directory"))?;
    Ok(base
        .join("pkgdb")
        .join(format!("pkgdb-v{}", SCHEMA_VERSIONS.tables)))
}

/// `<cache_dir>/<fingerprint>.sqlite`
pub fn db_path_for(cache_dir: &Path, fingerprint: &Fingerprint) -> PathBuf {
    cache_dir.join(format!("{fingerprint}.{DB_EXTENSION}"))
}

/// Whether `path` starts with the SQLite file header.
pub fn is_sqlite_db(path: &Path) -> bool {
    let mut header = [0u8; 16];
    let read = File::open(path).and_then(|mut file| file.read_exact(&mut header));
    read.is_ok() && &header == SQLITE_MAGIC
}

/// Catalogs in `cache_dir` with the time they were last used.
///
/// Reading the header would count as a use, so the access time is put back
/// afterwards.
fn scan(cache_dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>> {
    let entries = match fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(ScrapeError::io(
                format!("Failed to list {}", cache_dir.display()),
                e,
            ));
        }
    };

    let mut dbs = Vec::new();
    for entry in entries {
        let path = entry
            .io_context(|| format!("Failed to list {}", cache_dir.display()))?
            .path();
        if !path.extension().is_some_and(|ext| ext == DB_EXTENSION) {
            continue;
        }
        let meta = fs::metadata(&path).io_context(|| format!("Failed to stat {}", path.display()))?;
        let last_used = meta
            .accessed()
            .or_else(|_| meta.modified())
            .io_context(|| format!("Failed to read timestamps of {}", path.display()))?;

        let is_db = is_sqlite_db(&path);
        if let Err(e) = File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_times(FileTimes::new().set_accessed(last_used)))
        {
            debug!("cannot restore access time of {}: {e}", path.display());
        }
        if is_db {
            dbs.push((path, last_used));
        }
    }
    dbs.sort();
    Ok(dbs)
}

/// Every catalog in `cache_dir`, sorted by path.
///
/// A missing directory has no catalogs.
pub fn list_databases(cache_dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(scan(cache_dir)?.into_iter().map(|(path, _)| path).collect())
}

/// Catalogs not accessed for at least `min_age_days`.
pub fn find_stale_databases(cache_dir: &Path, min_age_days: u64) -> Result<Vec<PathBuf>> {
    let min_age = Duration::from_secs(min_age_days.saturating_mul(SECS_PER_DAY));
    let now = SystemTime::now();
    Ok(scan(cache_dir)?
        .into_iter()
        .filter(|(path, last_used)| {
            let age = now.duration_since(*last_used).unwrap_or_default();
            debug!("{}: last used {age:?} ago", path.display());
            age >= min_age
        })
        .map(|(path, _)| path)
        .collect())
}

/// Delete stale catalogs; with `dry_run` only report them.
///
/// Catalogs that are currently being built are kept.
pub fn gc(cache_dir: &Path, min_age_days: u64, dry_run: bool) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in find_stale_databases(cache_dir, min_age_days)? {
        if path.with_extension("lock").exists() {
            debug!("keeping {} while it is locked", path.display());
            continue;
        }
        if dry_run {
            info!("would remove {}", path.display());
        } else {
            remove_db_files(&path)?;
            info!("removed {}", path.display());
        }
        removed.push(path);
    }
    Ok(removed)
}

/// Remove a catalog together with its WAL and shared-memory files.
pub(crate) fn remove_db_files(path: &Path) -> Result<()> {
    fs::remove_file(path).io_context(|| format!("Failed to remove {}", path.display()))?;
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        match fs::remove_file(&side) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                return Err(ScrapeError::io(
                    format!("Failed to remove {}", Path::new(&side).display()),
                    e,
                ));
            }
            _ => {}
        }
    }
    Ok(())
}
