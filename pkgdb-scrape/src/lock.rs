// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Coordination lock for building a catalog.
//!
//! The lock is a side-car file next to the catalog. Whoever creates it owns
//! the catalog build and keeps bumping its mtime as a heartbeat. Waiters
//! record their PID in the file and watch it: once it disappears the catalog
//! is ready, and once the heartbeat goes stale the first live waiter takes
//! over.
//!
//! The file holds `{"interested": [<pid>, ...]}`; an empty file means no
//! waiters.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::kill;
use nix::unistd::{Pid, getpid};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::LockError;

type Result<T> = std::result::Result<T, LockError>;

/// Timing parameters of the lock protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimings {
    /// How often the owner bumps the heartbeat.
    pub touch_interval: Duration,
    /// Heartbeat age after which the owner is presumed dead.
    pub max_update_age: Duration,
    /// How often waiters check the lock file.
    pub poll_interval: Duration,
}

impl Default for LockTimings {
    fn default() -> Self {
        Self {
            touch_interval: Duration::from_secs(1),
            max_update_age: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// What a waiter observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockActivity {
    /// The owner finished and removed the lock.
    Deleted,
    /// The heartbeat went stale.
    WriterDied,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LockContents {
    #[serde(default)]
    interested: Vec<i32>,
}

/// Handle to the lock file of one catalog, as seen by one process.
#[derive(Debug, Clone)]
pub struct DbLock {
    path: PathBuf,
    pid: i32,
    timings: LockTimings,
}

impl DbLock {
    pub fn new(path: impl Into<PathBuf>, timings: LockTimings) -> Self {
        Self {
            path: path.into(),
            pid: getpid().as_raw(),
            timings,
        }
    }

    /// Lock of the catalog at `db_path`: `<fingerprint>.lock` next to it.
    pub fn for_db(db_path: &Path, timings: LockTimings) -> Self {
        Self::new(db_path.with_extension("lock"), timings)
    }

    /// Act on behalf of `pid` instead of the current process.
    pub fn with_pid(mut self, pid: i32) -> Self {
        self.pid = pid;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn timings(&self) -> LockTimings {
        self.timings
    }

    fn io_error(&self, source: io::Error) -> LockError {
        LockError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Create the lock file; `Some` makes the caller the owner.
    pub fn try_create(&self) -> Result<Option<DbLockOwner>> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(_) => {
                debug!(pid = self.pid, "acquired {}", self.path.display());
                Ok(Some(DbLockOwner::new(self.clone())))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// PIDs waiting on the lock, in registration order.
    pub fn read_pids(&self) -> Result<Vec<i32>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        let mut file = Flock::lock(file, FlockArg::LockShared).map_err(|(_, errno)| {
            LockError::Flock {
                path: self.path.clone(),
                errno,
            }
        })?;
        Ok(self.read_contents(&mut file)?.interested)
    }

    fn read_contents(&self, file: &mut File) -> Result<LockContents> {
        let mut raw = String::new();
        file.read_to_string(&mut raw).map_err(|e| self.io_error(e))?;
        if raw.trim().is_empty() {
            return Ok(LockContents::default());
        }
        serde_json::from_str(&raw).map_err(|source| LockError::Format {
            path: self.path.clone(),
            source,
        })
    }

    /// Open the lock file and take an exclusive `flock` on it.
    ///
    /// `None` when the file is gone, including when it was removed while
    /// we were waiting for the `flock`.
    fn lock_exclusive(&self) -> Result<Option<Flock<File>>> {
        let file = match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        let file = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            LockError::Flock {
                path: self.path.clone(),
                errno,
            }
        })?;
        let locked = file.metadata().map_err(|e| self.io_error(e))?;
        match fs::metadata(&self.path) {
            Ok(current) if current.dev() == locked.dev() && current.ino() == locked.ino() => {
                Ok(Some(file))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn write_contents(&self, file: &mut File, contents: &LockContents) -> Result<()> {
        let bytes = serde_json::to_vec(contents).map_err(|source| LockError::Format {
            path: self.path.clone(),
            source,
        })?;
        file.set_len(0).map_err(|e| self.io_error(e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| self.io_error(e))?;
        file.write_all(&bytes).map_err(|e| self.io_error(e))
    }

    fn modified(&self, file: &File) -> Result<SystemTime> {
        file.metadata()
            .and_then(|meta| meta.modified())
            .map_err(|e| self.io_error(e))
    }

    fn is_stale(&self, heartbeat: SystemTime) -> bool {
        SystemTime::now()
            .duration_since(heartbeat)
            .unwrap_or_default()
            > self.timings.max_update_age
    }

    /// Read-modify-write the PID list under `flock`, keeping the heartbeat.
    ///
    /// A missing lock file is left alone.
    fn update_pids(&self, update: impl FnOnce(&mut Vec<i32>)) -> Result<()> {
        let Some(mut file) = self.lock_exclusive()? else {
            return Ok(());
        };
        let heartbeat = self.modified(&file)?;
        let mut contents = self.read_contents(&mut file)?;
        update(&mut contents.interested);
        self.write_contents(&mut file, &contents)?;
        file.set_modified(heartbeat).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    pub fn register_interest(&self) -> Result<()> {
        let pid = self.pid;
        trace!(pid, "registering interest in {}", self.path.display());
        self.update_pids(|pids| {
            if !pids.contains(&pid) {
                pids.push(pid);
            }
        })
    }

    pub fn unregister_interest(&self) -> Result<()> {
        let pid = self.pid;
        trace!(pid, "unregistering interest in {}", self.path.display());
        self.update_pids(|pids| pids.retain(|p| *p != pid))
    }

    /// Poll until the lock is deleted or its heartbeat goes stale.
    pub fn wait_for_lock_activity(&self) -> Result<LockActivity> {
        loop {
            match fs::metadata(&self.path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LockActivity::Deleted),
                Err(e) => return Err(self.io_error(e)),
                Ok(meta) => {
                    let mtime = meta.modified().map_err(|e| self.io_error(e))?;
                    if self.is_stale(mtime) {
                        warn!("lock {} has a stale heartbeat", self.path.display());
                        return Ok(LockActivity::WriterDied);
                    }
                }
            }
            thread::sleep(self.timings.poll_interval);
        }
    }

    /// Whether the heartbeat is stale and this process is the first live
    /// waiter.
    ///
    /// Only a hint: [`DbLock::take_over`] repeats the check atomically.
    pub fn should_take_over_db_creation(&self) -> Result<bool> {
        let mtime = match fs::metadata(&self.path) {
            Ok(meta) => meta.modified().map_err(|e| self.io_error(e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(self.io_error(e)),
        };
        Ok(self.is_stale(mtime) && first_live(&self.read_pids()?) == Some(self.pid))
    }

    /// Become the owner after the previous one died.
    ///
    /// Election, removal from the interest list and the first heartbeat
    /// happen under one exclusive `flock`, so of several waiters that saw the
    /// same dead owner only one gets `Some`. The others find the heartbeat
    /// fresh again.
    pub fn take_over(&self) -> Result<Option<DbLockOwner>> {
        let Some(mut file) = self.lock_exclusive()? else {
            return Ok(None);
        };
        let heartbeat = self.modified(&file)?;
        let mut contents = self.read_contents(&mut file)?;
        if !self.is_stale(heartbeat) || first_live(&contents.interested) != Some(self.pid) {
            trace!(pid = self.pid, "not taking over {}", self.path.display());
            return Ok(None);
        }

        contents.interested.retain(|p| *p != self.pid);
        self.write_contents(&mut file, &contents)?;
        file.set_modified(SystemTime::now())
            .map_err(|e| self.io_error(e))?;
        debug!(pid = self.pid, "took over {}", self.path.display());
        Ok(Some(DbLockOwner::new(self.clone())))
    }
}

fn first_live(pids: &[i32]) -> Option<i32> {
    pids.iter()
        .copied()
        .filter(|pid| *pid > 0)
        .find(|pid| process_alive(*pid))
}

fn process_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn touch(path: &Path) -> io::Result<()> {
    OpenOptions::new()
        .write(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

/// Ownership of a catalog build. Removes the lock file when dropped.
#[derive(Debug)]
pub struct DbLockOwner {
    lock: DbLock,
    last_touch: Instant,
    released: bool,
}

impl DbLockOwner {
    fn new(lock: DbLock) -> Self {
        Self {
            lock,
            last_touch: Instant::now(),
            released: false,
        }
    }

    pub fn lock(&self) -> &DbLock {
        &self.lock
    }

    /// Bump the heartbeat if the touch interval has passed.
    pub fn heartbeat(&mut self) {
        if self.last_touch.elapsed() < self.lock.timings.touch_interval {
            return;
        }
        if let Err(e) = touch(&self.lock.path) {
            warn!("failed to touch {}: {e}", self.lock.path.display());
        }
        self.last_touch = Instant::now();
    }

    /// Remove the lock file, waking up every waiter.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.lock.path) {
            Ok(()) => {
                debug!("released {}", self.lock.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.lock.io_error(e)),
        }
    }
}

impl Drop for DbLockOwner {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.lock.path);
        }
    }
}
