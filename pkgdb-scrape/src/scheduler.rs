// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Page scheduling.
//!
//! Each page of a prefix runs in a disposable worker. The worker reports back
//! through its exit code only; everything else travels through the catalog.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, fork};
use tracing::{debug, error, trace};

use crate::error::{Result, ScrapeError, SchedulerError};

/// The page covered the last child of its prefix.
pub const EXIT_PAGE_COMPLETE: i32 = 0;
/// More pages follow.
pub const EXIT_CHILD_INCOMPLETE: i32 = 1;
/// Evaluation failed; the page was rolled back.
pub const EXIT_FAILURE_EVAL: i32 = 150;
/// Any other error inside the worker.
pub const EXIT_CHILD_ERROR: i32 = 2;
/// The worker panicked.
pub const EXIT_CHILD_PANIC: i32 = 101;

/// Result of a single committed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// The prefix is fully scraped.
    Complete,
    Incomplete,
}

impl PageOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Complete => EXIT_PAGE_COMPLETE,
            Self::Incomplete => EXIT_CHILD_INCOMPLETE,
        }
    }

    /// Map a worker exit code back to an outcome.
    pub fn from_exit_code(page: usize, code: i32) -> Result<Self> {
        match code {
            EXIT_PAGE_COMPLETE => Ok(Self::Complete),
            EXIT_CHILD_INCOMPLETE => Ok(Self::Incomplete),
            EXIT_FAILURE_EVAL => Err(ScrapeError::EvalInPage { page }),
            code => Err(SchedulerError::UnexpectedExit { page, code }.into()),
        }
    }
}

/// Page worker: scrape page `idx` and commit it.
pub type PageWorker<'a> = dyn FnMut(usize) -> Result<PageOutcome> + 'a;

/// Keeps the build lease alive. May be called from a helper thread.
pub type Heartbeat<'a> = dyn FnMut() + Send + 'a;

/// Runs one page of work in some isolation context.
pub trait PageRunner {
    /// Run `worker(page)`, calling `heartbeat` periodically while waiting.
    fn run_page(
        &mut self,
        page: usize,
        worker: &mut PageWorker<'_>,
        heartbeat: &mut Heartbeat<'_>,
    ) -> Result<PageOutcome>;
}

/// Runs every page in a forked child process.
///
/// The caller must not hold an open write transaction when a page starts;
/// the worker opens its own catalog connection.
#[derive(Debug, Clone)]
pub struct ForkRunner {
    pub poll_interval: Duration,
}

impl Default for ForkRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl ForkRunner {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

fn child_exit_code(page: usize, worker: &mut PageWorker<'_>) -> i32 {
    match panic::catch_unwind(AssertUnwindSafe(|| worker(page))) {
        Ok(Ok(outcome)) => outcome.exit_code(),
        Ok(Err(ScrapeError::Eval(err))) => {
            error!("page {page}: {err}");
            EXIT_FAILURE_EVAL
        }
        Ok(Err(err)) => {
            error!("page {page}: {err}");
            EXIT_CHILD_ERROR
        }
        Err(_) => EXIT_CHILD_PANIC,
    }
}

impl PageRunner for ForkRunner {
    fn run_page(
        &mut self,
        page: usize,
        worker: &mut PageWorker<'_>,
        heartbeat: &mut Heartbeat<'_>,
    ) -> Result<PageOutcome> {
        // SAFETY: the child only runs the page worker and leaves through
        // `_exit`, so it never returns into the parent's stack frames.
        #[allow(unsafe_code)]
        let forked = unsafe { fork() }.map_err(SchedulerError::Fork)?;

        match forked {
            ForkResult::Child => {
                let code = child_exit_code(page, worker);
                // SAFETY: `_exit` skips atexit handlers and destructors that
                // belong to the parent process.
                #[allow(unsafe_code)]
                unsafe {
                    libc::_exit(code);
                }
            }
            ForkResult::Parent { child } => {
                debug!("page {page} running in pid {child}");
                loop {
                    match waitpid(child, Some(WaitPidFlag::WNOHANG)) {
                        Ok(WaitStatus::Exited(_, code)) => {
                            trace!("page {page} exited with {code}");
                            return PageOutcome::from_exit_code(page, code);
                        }
                        Ok(WaitStatus::Signaled(_, signal, _)) => {
                            return Err(SchedulerError::Signaled { page, signal }.into());
                        }
                        Ok(_) | Err(Errno::EINTR) => {
                            heartbeat();
                            thread::sleep(self.poll_interval);
                        }
                        Err(errno) => return Err(SchedulerError::Wait(errno).into()),
                    }
                }
            }
        }
    }
}

/// Runs every page synchronously in the calling process.
///
/// A helper thread keeps calling the heartbeat while the page runs.
#[derive(Debug)]
pub struct InProcessRunner {
    /// Number of pages started so far.
    pub pages_run: usize,
    pub heartbeat_interval: Duration,
}

impl Default for InProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl InProcessRunner {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            pages_run: 0,
            heartbeat_interval,
        }
    }
}

impl PageRunner for InProcessRunner {
    fn run_page(
        &mut self,
        page: usize,
        worker: &mut PageWorker<'_>,
        heartbeat: &mut Heartbeat<'_>,
    ) -> Result<PageOutcome> {
        self.pages_run += 1;
        let interval = self.heartbeat_interval;
        thread::scope(|s| {
            let (stop, stopped) = mpsc::channel::<()>();
            s.spawn(move || {
                loop {
                    heartbeat();
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }
                }
            });
            let outcome = worker(page);
            drop(stop);
            outcome
        })
    }
}

/// Run pages `0, 1, ...` until one reports [`PageOutcome::Complete`].
///
/// Returns the number of pages run.
pub fn run_pages<R: PageRunner + ?Sized>(
    runner: &mut R,
    worker: &mut PageWorker<'_>,
    heartbeat: &mut Heartbeat<'_>,
) -> Result<usize> {
    let mut page = 0;
    loop {
        debug!("scraping page {page}");
        match runner.run_page(page, worker, heartbeat)? {
            PageOutcome::Complete => return Ok(page + 1),
            PageOutcome::Incomplete => page += 1,
        }
    }
}
