// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Rules tree.
//!
//! Paths through the tree are built from `default` nodes down to the node
//! carrying the rule. For example `allowRecursive: [["a", "b"]]` and
//! `disallowPackage: [["a", "c"]]` produce:
//!
//! ```text
//! <root> (default)
//! └── a (default)
//!     ├── b (allowRecursive)
//!     └── c (disallowPackage)
//! ```

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::trace;

use crate::error::RulesError;
use crate::raw::{ScrapeRulesRaw, display_glob};
use crate::rule::ScrapeRule;

/// Index of the only path segment that may be a glob.
const SYSTEM_POSITION: usize = 1;

/// Node of the rules tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulesTreeNode {
    pub attr_name: String,
    pub rule: ScrapeRule,
    pub children: BTreeMap<String, RulesTreeNode>,
}

impl RulesTreeNode {
    pub fn new(attr_name: impl Into<String>, rule: ScrapeRule) -> Self {
        Self {
            attr_name: attr_name.into(),
            rule,
            children: BTreeMap::new(),
        }
    }

    /// Build a tree from raw rule lists, expanding globs over `systems`.
    pub fn from_raw<S: AsRef<str>>(raw: &ScrapeRulesRaw, systems: &[S]) -> Result<Self, RulesError> {
        let mut root = Self::default();
        let ordered = [
            (&raw.allow_package, ScrapeRule::AllowPackage),
            (&raw.disallow_package, ScrapeRule::DisallowPackage),
            (&raw.allow_recursive, ScrapeRule::AllowRecursive),
            (&raw.disallow_recursive, ScrapeRule::DisallowRecursive),
        ];
        for (paths, rule) in ordered {
            for path in paths {
                root.add_rule(path, rule, systems)?;
            }
        }
        Ok(root)
    }

    /// Attach `rule` to the node at `path`, creating `default` intermediates.
    ///
    /// A `None` segment is expanded into one rule per entry of `systems` and
    /// is only accepted directly under a top-level group. Re-adding the rule
    /// a node already carries is a no-op; a different rule is a conflict.
    pub fn add_rule<S: AsRef<str>>(
        &mut self,
        path: &[Option<String>],
        rule: ScrapeRule,
        systems: &[S],
    ) -> Result<(), RulesError> {
        self.insert(path, 0, path, rule, systems)
    }

    fn insert<S: AsRef<str>>(
        &mut self,
        full_path: &[Option<String>],
        depth: usize,
        rel_path: &[Option<String>],
        rule: ScrapeRule,
        systems: &[S],
    ) -> Result<(), RulesError> {
        let Some((head, rest)) = rel_path.split_first() else {
            if self.rule == rule {
                return Ok(());
            }
            if self.rule != ScrapeRule::Default {
                return Err(RulesError::Conflict {
                    path: display_glob(full_path),
                    existing: self.rule,
                    new: rule,
                });
            }
            trace!("assigning rule '{rule}' to '{}'", display_glob(full_path));
            self.rule = rule;
            return Ok(());
        };

        match head {
            Some(attr_name) => self
                .children
                .entry(attr_name.clone())
                .or_insert_with(|| Self::new(attr_name.clone(), ScrapeRule::Default))
                .insert(full_path, depth + 1, rest, rule, systems),
            None if depth == SYSTEM_POSITION => {
                trace!("expanding system glob in '{}'", display_glob(full_path));
                for system in systems {
                    let system = system.as_ref();
                    self.children
                        .entry(system.to_owned())
                        .or_insert_with(|| Self::new(system, ScrapeRule::Default))
                        .insert(full_path, depth + 1, rest, rule, systems)?;
                }
                Ok(())
            }
            None => Err(RulesError::MisplacedGlob {
                path: display_glob(full_path),
            }),
        }
    }

    /// Exact rule at `path`, `default` if any segment is missing.
    pub fn get_rule<S: AsRef<str>>(&self, path: &[S]) -> ScrapeRule {
        let mut node = self;
        for attr_name in path {
            match node.children.get(attr_name.as_ref()) {
                Some(child) => node = child,
                None => return ScrapeRule::Default,
            }
        }
        node.rule
    }

    /// Decision for `path`, inherited from the nearest ancestor with a rule.
    pub fn apply_rules<S: AsRef<str>>(&self, path: &[S]) -> Option<bool> {
        (0..=path.len())
            .rev()
            .map(|len| self.get_rule(&path[..len]))
            .find(|rule| *rule != ScrapeRule::Default)
            .and_then(ScrapeRule::decision)
    }

    /// Number of nodes carrying a non-default rule.
    pub fn rule_count(&self) -> usize {
        let own = usize::from(self.rule != ScrapeRule::Default);
        own + self.children.values().map(Self::rule_count).sum::<usize>()
    }
}

impl Serialize for RulesTreeNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.children.len() + 1))?;
        map.serialize_entry("__rule", &self.rule)?;
        for (name, child) in &self.children {
            map.serialize_entry(name, child)?;
        }
        map.end()
    }
}
