// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};
use std::time::Duration;

use pkgdb_rules::{DEFAULT_SYSTEMS, ScrapeRules};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CACHE_DIR_ENV, default_cache_dir};
use crate::error::{IoContext, Result};
use crate::lock::LockTimings;

/// Path of the TOML configuration file.
pub const CONFIG_ENV: &str = "PKGDB_CONFIG";

/// How page workers are isolated from the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Isolation {
    /// One forked process per page.
    #[default]
    Fork,
    /// Pages run in the calling process.
    InProcess,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the catalogs; `PKGDB_CACHEDIR` or the user cache
    /// directory when unset
    pub cache_dir: Option<PathBuf>,

    /// Children per page; derived from free memory when unset
    pub page_size: Option<usize>,

    pub isolation: Isolation,

    /// Scrape rules file; the built-in rules when unset
    pub rules_file: Option<PathBuf>,

    /// Systems a rule glob expands to
    pub systems: Vec<String>,

    pub lock_touch_interval_ms: u64,
    pub lock_max_update_age_ms: u64,
    pub lock_poll_interval_ms: u64,

    /// How often the parent checks on a page worker
    pub worker_poll_interval_ms: u64,

    /// SQLite busy timeout
    pub busy_timeout_ms: u64,

    /// Catalogs not accessed for this many days are garbage
    pub gc_min_age_days: u64,
}

impl Default for Config {
    fn default() -> Self {
        let timings = LockTimings::default();
        Self {
            cache_dir: None,
            page_size: None,
            isolation: Isolation::default(),
            rules_file: None,
            systems: DEFAULT_SYSTEMS.iter().map(|s| s.to_string()).collect(),
            lock_touch_interval_ms: timings.touch_interval.as_millis() as u64,
            lock_max_update_age_ms: timings.max_update_age.as_millis() as u64,
            lock_poll_interval_ms: timings.poll_interval.as_millis() as u64,
            worker_poll_interval_ms: 50,
            busy_timeout_ms: pkgdb_store_db::DB_BUSY_TIMEOUT.as_millis() as u64,
            gc_min_age_days: 30,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .io_context(|| format!("Failed to read config file at {}", path.display()))?;
        let config: Config = toml::from_str(&contents)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load the file named by `PKGDB_CONFIG`, defaults otherwise.
    pub fn load() -> Result<Self> {
        Self::load_from(std::env::var_os(CONFIG_ENV).map(PathBuf::from))
    }

    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Configured cache directory, else `PKGDB_CACHEDIR`, else the default.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_cache_dir(std::env::var_os(CACHE_DIR_ENV).map(PathBuf::from)),
        }
    }

    pub fn lock_timings(&self) -> LockTimings {
        LockTimings {
            touch_interval: Duration::from_millis(self.lock_touch_interval_ms),
            max_update_age: Duration::from_millis(self.lock_max_update_age_ms),
            poll_interval: Duration::from_millis(self.lock_poll_interval_ms),
        }
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn rules(&self) -> Result<ScrapeRules> {
        Ok(match &self.rules_file {
            Some(path) => ScrapeRules::from_file(path, &self.systems)?,
            None => ScrapeRules::default_rules_with_systems(&self.systems)?,
        })
    }
}
