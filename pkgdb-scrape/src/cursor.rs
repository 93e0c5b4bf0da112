// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Evaluator capability consumed by the scraper.
//!
//! A [`Namespace`] is one locked version of a package namespace. It hands out
//! [`Cursor`]s, lazily evaluated handles to a single attribute.

use pkgdb_store_db::{Fingerprint, LockedRef};

use crate::error::EvalError;

/// Attribute that marks an attribute set as containing derivations.
pub const RECURSE_MARKER: &str = "recurseForDerivations";

/// Package metadata read from a derivation leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMeta {
    pub name: String,
    pub pname: Option<String>,
    pub version: Option<String>,
    /// Semantic version supplied by the provider, if any
    pub semver: Option<String>,
    pub license: Option<String>,
    pub outputs: Vec<String>,
    pub outputs_to_install: Option<Vec<String>>,
    pub broken: Option<bool>,
    pub unfree: Option<bool>,
    pub description: Option<String>,
}

/// Result of looking up a child attribute.
pub enum Node {
    /// A derivation.
    Leaf(Box<dyn Cursor>),
    /// Anything else that exists.
    Group(Box<dyn Cursor>),
    Missing,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Leaf(c) => write!(f, "Leaf({})", c.attr_path().join(".")),
            Self::Group(c) => write!(f, "Group({})", c.attr_path().join(".")),
            Self::Missing => f.write_str("Missing"),
        }
    }
}

/// Handle to one attribute of a namespace.
pub trait Cursor {
    /// Absolute attribute path of this cursor.
    fn attr_path(&self) -> &[String];

    /// Names of the child attributes, in a stable order.
    fn list_children(&self) -> Result<Vec<String>, EvalError>;

    fn maybe_get_child(&self, name: &str) -> Result<Option<Box<dyn Cursor>>, EvalError>;

    fn is_leaf(&self) -> Result<bool, EvalError>;

    /// Value of the child `recurseForDerivations`, `false` when absent.
    fn recurse_for_derivations(&self) -> Result<bool, EvalError>;

    fn package_meta(&self) -> Result<PackageMeta, EvalError>;

    fn get_child(&self, name: &str) -> Result<Box<dyn Cursor>, EvalError> {
        self.maybe_get_child(name)?.ok_or_else(|| {
            let mut path = self.attr_path().to_vec();
            path.push(name.to_owned());
            EvalError::new(&path, "attribute missing")
        })
    }

    /// Typed child lookup.
    fn child(&self, name: &str) -> Result<Node, EvalError> {
        Ok(match self.maybe_get_child(name)? {
            None => Node::Missing,
            Some(cursor) if cursor.is_leaf()? => Node::Leaf(cursor),
            Some(cursor) => Node::Group(cursor),
        })
    }
}

/// One locked version of a package namespace.
///
/// Reopened in every page worker, so implementations must be cheap to
/// reopen cursors from.
pub trait Namespace {
    fn fingerprint(&self) -> Fingerprint;

    fn locked_ref(&self) -> LockedRef;

    /// Cursor at `prefix`, `None` if the path does not exist.
    fn open_cursor(&self, prefix: &[String]) -> Result<Option<Box<dyn Cursor>>, EvalError>;
}
