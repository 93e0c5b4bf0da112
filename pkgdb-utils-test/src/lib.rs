// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Test utilities for pkgdb.
//!
//! This crate provides namespace fixtures, proptest strategies and macros
//! shared by the pkgdb crates' tests.

use std::path::{Path, PathBuf};

use proptest::prelude::*;
use serde_json::{Map, Value, json};
use tempfile::TempDir;

/// A wrapper around TempDir that provides a canonicalized path.
/// This resolves symlinks like /var -> /private/var on macOS.
pub struct CanonicalTempDir {
    _inner: TempDir,
    path: PathBuf,
}

impl CanonicalTempDir {
    /// Create a new temporary directory with a canonicalized path.
    pub fn new() -> std::io::Result<Self> {
        let inner = TempDir::new()?;
        let path = inner.path().canonicalize()?;
        Ok(Self {
            _inner: inner,
            path,
        })
    }

    /// Get the canonicalized path to the temporary directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A derivation leaf named `name` with a single `out` output.
pub fn derivation(name: &str) -> Value {
    json!({
        "type": "derivation",
        "name": name,
        "outputs": ["out"],
    })
}

/// A derivation leaf carrying the usual metadata fields.
pub fn derivation_with_meta(name: &str, description: &str, license: &str) -> Value {
    json!({
        "type": "derivation",
        "name": name,
        "outputs": ["out", "man"],
        "meta": {
            "description": description,
            "license": { "spdxId": license },
            "broken": false,
            "unfree": false,
        },
    })
}

/// An attribute set that evaluates with an error when inspected.
pub fn eval_error(message: &str) -> Value {
    json!({ "__error": message })
}

/// `count` derivations named `pkg0000-1.0.<i>` under attributes `pkg0000`...
pub fn package_set(count: usize) -> Value {
    let mut set = Map::new();
    for i in 0..count {
        let attr = format!("pkg{i:04}");
        set.insert(attr.clone(), derivation(&format!("{attr}-1.0.{i}")));
    }
    Value::Object(set)
}

/// Mark an attribute set with `recurseForDerivations = true`.
pub fn recursive(mut set: Value) -> Value {
    if let Value::Object(map) = &mut set {
        map.insert("recurseForDerivations".into(), Value::Bool(true));
    }
    set
}

/// `{ <group>: { <system>: <set>, ... } }` for each system.
pub fn namespace(group: &str, systems: &[&str], set: &Value) -> Value {
    let per_system: Map<String, Value> = systems
        .iter()
        .map(|system| (system.to_string(), set.clone()))
        .collect();
    json!({ group: per_system })
}

/// Write a namespace document to `<dir>/namespace.json`.
pub fn write_namespace(dir: &Path, value: &Value) -> std::io::Result<PathBuf> {
    let path = dir.join("namespace.json");
    std::fs::write(&path, serde_json::to_vec_pretty(value)?)?;
    Ok(path)
}

pub fn arb_attr_name() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_'-]{0,15}".prop_filter("Not the recursion marker", |s| {
        s != "recurseForDerivations"
    })
}

pub fn arb_attr_path(min: usize, max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_attr_name(), min..=max)
}

#[macro_export]
macro_rules! pretty_prop_assert_eq {
    ($left:expr , $right:expr,) => ({
        $crate::pretty_prop_assert_eq!($left, $right)
    });
    ($left:expr , $right:expr) => ({
        match (&($left), &($right)) {
            (left_val, right_val) => {
                ::proptest::prop_assert!(*left_val == *right_val,
                    "assertion failed: `(left == right)`\
                          \n\
                          \n{}\
                          \n",
                          $crate::__private::Comparison::new(left_val, right_val))
            }
        }
    });
}

#[doc(hidden)]
pub mod __private {
    pub use pretty_assertions::Comparison;
}
