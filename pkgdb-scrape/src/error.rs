// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use thiserror::Error;

/// Why an attribute failed to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// Children were requested from a value that is not an attribute set.
    NotAttrSet,
    /// Any other evaluation failure.
    Failed,
}

/// Evaluation failure at an attribute path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("error evaluating '{path}': {message}")]
pub struct EvalError {
    pub path: String,
    pub message: String,
    pub kind: EvalErrorKind,
}

impl EvalError {
    pub fn new(path: &[String], message: impl Into<String>) -> Self {
        Self {
            path: path.join("."),
            message: message.into(),
            kind: EvalErrorKind::Failed,
        }
    }

    pub fn not_attr_set(path: &[String]) -> Self {
        Self {
            path: path.join("."),
            message: "value is not an attribute set".into(),
            kind: EvalErrorKind::NotAttrSet,
        }
    }
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("failed to access lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("flock on {} failed: {errno}", path.display())]
    Flock { path: PathBuf, errno: Errno },

    #[error("malformed lock file {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("fork failed: {0}")]
    Fork(Errno),

    #[error("waitpid failed: {0}")]
    Wait(Errno),

    #[error("page {page} worker exited with unexpected code {code}")]
    UnexpectedExit { page: usize, code: i32 },

    #[error("page {page} worker was killed by {signal:?}")]
    Signaled { page: usize, signal: Signal },
}

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("evaluation failed while scraping page {page}")]
    EvalInPage { page: usize },

    #[error("Store database error: {0}")]
    Store(#[from] pkgdb_store_db::Error),

    #[error("Rules error: {0}")]
    Rules(#[from] pkgdb_rules::RulesError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("invalid attribute path prefix '{0}'")]
    InvalidPrefix(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScrapeError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Helper trait for adding context to IO errors
pub trait IoContext<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ScrapeError::io(f(), e))
    }
}
