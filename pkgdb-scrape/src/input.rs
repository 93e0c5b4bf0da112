// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! A namespace paired with its catalog.

use std::path::{Path, PathBuf};
use std::thread;

use pkgdb_rules::ScrapeRules;
use pkgdb_store_db::{LockedFlakeInfo, OpenMode, PkgDb, SCHEMA_VERSIONS};
use tracing::{debug, info};

use crate::cache::{db_path_for, remove_db_files};
use crate::config::{Config, Isolation};
use crate::cursor::Namespace;
use crate::error::{IoContext, Result, ScrapeError};
use crate::lock::{DbLock, DbLockOwner, LockActivity};
use crate::memory::{self, AVAILABLE_MEMORY_ENV};
use crate::scheduler::{self, ForkRunner, InProcessRunner, PageOutcome, PageRunner};
use crate::traversal::{self, WorkItem};

/// Top-level groups scraped by [`PkgDbInput::scrape_systems`] by default.
pub const DEFAULT_SUBTREES: [&str; 2] = ["packages", "legacyPackages"];

/// A locked namespace and the catalog it is scraped into.
pub struct PkgDbInput<N> {
    namespace: N,
    config: Config,
    rules: ScrapeRules,
    db_path: PathBuf,
    page_size: usize,
}

impl<N: Namespace> PkgDbInput<N> {
    /// Use the catalog for `namespace` in the configured cache directory.
    pub fn new(namespace: N, config: Config) -> Result<Self> {
        let cache_dir = config.cache_dir()?;
        std::fs::create_dir_all(&cache_dir)
            .io_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        let db_path = db_path_for(&cache_dir, &namespace.fingerprint());
        Self::with_db_path(namespace, config, db_path)
    }

    /// Use the catalog at `db_path`, creating it when missing.
    pub fn with_db_path(namespace: N, config: Config, db_path: PathBuf) -> Result<Self> {
        let rules = config.rules()?;
        let page_size = memory::page_size(
            config.page_size,
            std::env::var(AVAILABLE_MEMORY_ENV).ok().as_deref(),
        );
        let input = Self {
            namespace,
            config,
            rules,
            db_path,
            page_size,
        };
        input.init_db()?;
        Ok(input)
    }

    /// Replace the rules loaded from the configuration.
    pub fn with_rules(mut self, rules: ScrapeRules) -> Self {
        self.rules = rules;
        self
    }

    /// Bring the catalog to the current schema and record the namespace.
    ///
    /// A catalog with other tables is deleted and rebuilt; one with other
    /// views only gets its views replaced.
    fn init_db(&self) -> Result<()> {
        if self.db_path.exists() {
            let db = PkgDb::open(&self.db_path, OpenMode::ReadWrite)?;
            match db.db_versions()? {
                Some(found) if found.tables != SCHEMA_VERSIONS.tables => {
                    drop(db);
                    info!(
                        "catalog {} has tables version {}, rebuilding",
                        self.db_path.display(),
                        found.tables
                    );
                    remove_db_files(&self.db_path)?;
                }
                Some(found) if found.views != SCHEMA_VERSIONS.views => {
                    debug!("updating views of {}", self.db_path.display());
                    db.update_views()?;
                }
                _ => {}
            }
        }

        let db = PkgDb::open(&self.db_path, OpenMode::Create)?;
        db.set_busy_timeout(self.config.busy_timeout())?;
        db.write_locked_flake(&self.namespace.fingerprint(), &self.namespace.locked_ref())?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn namespace(&self) -> &N {
        &self.namespace
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rules(&self) -> &ScrapeRules {
        &self.rules
    }

    /// Children per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn read_only(&self) -> Result<PkgDb> {
        let db = PkgDb::open(&self.db_path, OpenMode::ReadOnly)?;
        db.set_busy_timeout(self.config.busy_timeout())?;
        Ok(db)
    }

    pub fn read_write(&self) -> Result<PkgDb> {
        let db = PkgDb::open(&self.db_path, OpenMode::ReadWrite)?;
        db.set_busy_timeout(self.config.busy_timeout())?;
        Ok(db)
    }

    pub fn locked_flake_info(&self) -> Result<LockedFlakeInfo> {
        Ok(self.read_only()?.locked_flake()?)
    }

    /// Whether `prefix` is fully indexed.
    pub fn completed(&self, prefix: &[String]) -> Result<bool> {
        Ok(self.read_only()?.completed_attr_set(prefix)?)
    }

    /// Make sure `prefix` is fully indexed, scraping it if needed.
    ///
    /// With `force` the prefix is scraped again even when it is complete.
    pub fn scrape_prefix(&self, prefix: &[String], force: bool) -> Result<()> {
        match self.config.isolation {
            Isolation::Fork => {
                let mut runner = ForkRunner::new(self.config.worker_poll_interval());
                self.scrape_prefix_with(&mut runner, prefix, force)
            }
            Isolation::InProcess => {
                let mut runner = InProcessRunner::new(self.config.worker_poll_interval());
                self.scrape_prefix_with(&mut runner, prefix, force)
            }
        }
    }

    /// [`Self::scrape_prefix`] with an explicit page runner.
    pub fn scrape_prefix_with<R: PageRunner + ?Sized>(
        &self,
        runner: &mut R,
        prefix: &[String],
        force: bool,
    ) -> Result<()> {
        if prefix.is_empty() {
            return Err(ScrapeError::InvalidPrefix(String::new()));
        }
        if !force && self.completed(prefix)? {
            debug!("'{}' is already scraped", prefix.join("."));
            return Ok(());
        }

        let lock = DbLock::for_db(&self.db_path, self.config.lock_timings());
        loop {
            if let Some(owner) = lock.try_create()? {
                return self.scrape_as_owner(runner, owner, prefix, force);
            }

            debug!("waiting for {}", lock.path().display());
            lock.register_interest()?;
            match lock.wait_for_lock_activity()? {
                LockActivity::Deleted => {
                    if !force && self.completed(prefix)? {
                        return Ok(());
                    }
                }
                LockActivity::WriterDied => {
                    if let Some(owner) = lock.take_over()? {
                        return self.scrape_as_owner(runner, owner, prefix, force);
                    }
                    thread::sleep(lock.timings().poll_interval);
                }
            }
        }
    }

    fn scrape_as_owner<R: PageRunner + ?Sized>(
        &self,
        runner: &mut R,
        mut owner: DbLockOwner,
        prefix: &[String],
        force: bool,
    ) -> Result<()> {
        let result = self.run_pages(runner, &mut owner, prefix, force);
        let released = owner.release();
        result?;
        released?;
        Ok(())
    }

    fn run_pages<R: PageRunner + ?Sized>(
        &self,
        runner: &mut R,
        owner: &mut DbLockOwner,
        prefix: &[String],
        force: bool,
    ) -> Result<()> {
        {
            let db = self.read_write()?;
            if force {
                if let Some(id) = db.maybe_attr_set_id(prefix)? {
                    db.set_prefix_done(id, false)?;
                }
            } else if db.completed_attr_set(prefix)? {
                return Ok(());
            }
        }

        let pages = scheduler::run_pages(
            runner,
            &mut |page| self.scrape_page(prefix, page),
            &mut || owner.heartbeat(),
        )?;
        info!(pages, "scraped '{}'", prefix.join("."));
        Ok(())
    }

    /// Page worker: scrape page `page` of `prefix` in one transaction.
    fn scrape_page(&self, prefix: &[String], page: usize) -> Result<PageOutcome> {
        let db = self.read_write()?;
        if let Some(id) = db.maybe_attr_set_id(prefix)? {
            if db.completed_attr_set_id(id)? {
                return Ok(PageOutcome::Complete);
            }
        }
        let Some(cursor) = self.namespace.open_cursor(prefix)? else {
            debug!("'{}' does not exist", prefix.join("."));
            return Ok(PageOutcome::Complete);
        };

        db.with_transaction(|db| {
            let root = WorkItem {
                path: prefix.to_vec(),
                cursor,
                id: db.add_or_get_attr_set_path(prefix)?,
            };
            traversal::scrape_page(db, &self.rules, &root, self.page_size, page)
        })
    }

    /// Scrape `<subtree>.<system>` for every pair.
    pub fn scrape_systems<S: AsRef<str>, T: AsRef<str>>(
        &self,
        subtrees: &[S],
        systems: &[T],
    ) -> Result<()> {
        for subtree in subtrees {
            for system in systems {
                let prefix = vec![subtree.as_ref().to_owned(), system.as_ref().to_owned()];
                self.scrape_prefix(&prefix, false)?;
            }
        }
        Ok(())
    }
}
