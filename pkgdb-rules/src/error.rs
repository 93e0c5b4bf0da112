// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use thiserror::Error;

use crate::rule::ScrapeRule;

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("attempted to overwrite existing rule '{existing}' for '{path}' with new rule '{new}'")]
    Conflict {
        path: String,
        existing: ScrapeRule,
        new: ScrapeRule,
    },

    #[error("glob (null) in rule path '{path}' is only allowed at the system position")]
    MisplacedGlob { path: String },

    #[error("invalid rules JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read rules file at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
