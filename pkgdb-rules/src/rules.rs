// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::RulesError;
use crate::raw::ScrapeRulesRaw;
use crate::rule::ScrapeRule;
use crate::tree::RulesTreeNode;

/// Systems a glob segment expands to unless the caller supplies its own.
pub const DEFAULT_SYSTEMS: [&str; 4] = [
    "x86_64-linux",
    "aarch64-linux",
    "x86_64-darwin",
    "aarch64-darwin",
];

const DEFAULT_RULES_JSON: &str = include_str!("default-rules.json");

/// A rules tree together with the hash of the JSON it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRules {
    root: RulesTreeNode,
    hash: String,
}

impl ScrapeRules {
    /// Parse rules JSON, expanding globs over [`DEFAULT_SYSTEMS`].
    pub fn from_json_str(json: &str) -> Result<Self, RulesError> {
        Self::from_json_str_with_systems(json, &DEFAULT_SYSTEMS)
    }

    pub fn from_json_str_with_systems<S: AsRef<str>>(
        json: &str,
        systems: &[S],
    ) -> Result<Self, RulesError> {
        let raw: ScrapeRulesRaw = serde_json::from_str(json)?;
        let root = RulesTreeNode::from_raw(&raw, systems)?;
        let hash = hex::encode(Sha256::digest(json.as_bytes()));
        debug!(rules = root.rule_count(), %hash, "Loaded scrape rules");
        Ok(Self { root, hash })
    }

    /// Read a rules file from disk.
    pub fn from_file<S: AsRef<str>>(path: &Path, systems: &[S]) -> Result<Self, RulesError> {
        let json = std::fs::read_to_string(path).map_err(|source| RulesError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str_with_systems(&json, systems)
    }

    /// The rule set shipped with this crate.
    pub fn default_rules() -> Result<Self, RulesError> {
        Self::from_json_str(DEFAULT_RULES_JSON)
    }

    /// [`ScrapeRules::default_rules`] expanded over custom systems.
    pub fn default_rules_with_systems<S: AsRef<str>>(systems: &[S]) -> Result<Self, RulesError> {
        Self::from_json_str_with_systems(DEFAULT_RULES_JSON, systems)
    }

    /// Rules that never express an opinion.
    pub fn empty() -> Self {
        Self {
            root: RulesTreeNode::default(),
            hash: hex::encode(Sha256::digest(b"{}")),
        }
    }

    pub fn root(&self) -> &RulesTreeNode {
        &self.root
    }

    /// Lowercase hex SHA-256 of the rules JSON.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn get_rule<S: AsRef<str>>(&self, path: &[S]) -> ScrapeRule {
        self.root.get_rule(path)
    }

    pub fn apply_rules<S: AsRef<str>>(&self, path: &[S]) -> Option<bool> {
        self.root.apply_rules(path)
    }
}
