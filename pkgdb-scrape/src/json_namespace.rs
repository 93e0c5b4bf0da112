// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Static namespace read from a JSON document.
//!
//! Attribute sets are JSON objects. An object with `"type": "derivation"` is
//! a package leaf:
//!
//! ```json
//! {
//!   "type": "derivation",
//!   "name": "hello-2.12.1",
//!   "pname": "hello",
//!   "version": "2.12.1",
//!   "outputs": ["out"],
//!   "meta": { "description": "...", "license": { "spdxId": "GPL-3.0-or-later" } }
//! }
//! ```
//!
//! An object `{"__error": "<message>"}` fails to evaluate whenever it is
//! inspected, which lets dumps record attributes that could not be evaluated.

use std::path::Path;
use std::sync::Arc;

use pkgdb_store_db::{Fingerprint, LockedRef};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::cursor::{Cursor, Namespace, PackageMeta, RECURSE_MARKER};
use crate::error::{EvalError, IoContext, Result};

const ERROR_KEY: &str = "__error";

/// A namespace backed by an in-memory JSON value.
#[derive(Debug, Clone)]
pub struct JsonNamespace {
    root: Arc<Value>,
    fingerprint: Fingerprint,
    locked_ref: LockedRef,
}

impl JsonNamespace {
    /// Wrap `value`; the fingerprint is the hash of its compact rendering.
    pub fn from_value(value: Value) -> Self {
        let fingerprint = Fingerprint::of_bytes(value.to_string().as_bytes());
        let locked_ref = LockedRef {
            string: format!("json:{fingerprint}"),
            attrs: json!({ "type": "json", "fingerprint": fingerprint.to_hex() }),
        };
        Self {
            root: Arc::new(value),
            fingerprint,
            locked_ref,
        }
    }

    /// Load a namespace dump; the fingerprint is the hash of the file bytes.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .io_context(|| format!("Failed to read namespace file at {}", path.display()))?;
        let value: Value = serde_json::from_slice(&bytes)?;
        let fingerprint = Fingerprint::of_bytes(&bytes);
        debug!(%fingerprint, "Loaded namespace from {}", path.display());
        Ok(Self {
            root: Arc::new(value),
            fingerprint,
            locked_ref: LockedRef {
                string: format!("path:{}", path.display()),
                attrs: json!({ "type": "path", "path": path.display().to_string() }),
            },
        })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }
}

impl Namespace for JsonNamespace {
    fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    fn locked_ref(&self) -> LockedRef {
        self.locked_ref.clone()
    }

    fn open_cursor(&self, prefix: &[String]) -> std::result::Result<Option<Box<dyn Cursor>>, EvalError> {
        let mut node = check(&self.root, &[])?;
        for (depth, name) in prefix.iter().enumerate() {
            match node.as_object().and_then(|obj| obj.get(name)) {
                Some(child) => node = check(child, &prefix[..=depth])?,
                None => return Ok(None),
            }
        }
        Ok(Some(Box::new(JsonCursor {
            root: Arc::clone(&self.root),
            path: prefix.to_vec(),
        })))
    }
}

/// Fail if `value` is an error marker.
fn check<'a>(value: &'a Value, path: &[String]) -> std::result::Result<&'a Value, EvalError> {
    match value.get(ERROR_KEY) {
        Some(message) => Err(EvalError::new(
            path,
            message.as_str().unwrap_or("evaluation failed"),
        )),
        None => Ok(value),
    }
}

/// Cursor into a [`JsonNamespace`].
pub struct JsonCursor {
    root: Arc<Value>,
    path: Vec<String>,
}

impl JsonCursor {
    fn value(&self) -> std::result::Result<&Value, EvalError> {
        let mut node = check(&self.root, &[])?;
        for (depth, name) in self.path.iter().enumerate() {
            let path = &self.path[..=depth];
            let child = node
                .get(name)
                .ok_or_else(|| EvalError::new(path, "attribute missing"))?;
            node = check(child, path)?;
        }
        Ok(node)
    }

    fn object(&self) -> std::result::Result<&Map<String, Value>, EvalError> {
        self.value()?
            .as_object()
            .ok_or_else(|| EvalError::not_attr_set(&self.path))
    }
}

impl Cursor for JsonCursor {
    fn attr_path(&self) -> &[String] {
        &self.path
    }

    fn list_children(&self) -> std::result::Result<Vec<String>, EvalError> {
        Ok(self.object()?.keys().cloned().collect())
    }

    fn maybe_get_child(&self, name: &str) -> std::result::Result<Option<Box<dyn Cursor>>, EvalError> {
        if !self.object()?.contains_key(name) {
            return Ok(None);
        }
        let mut path = self.path.clone();
        path.push(name.to_owned());
        Ok(Some(Box::new(JsonCursor {
            root: Arc::clone(&self.root),
            path,
        })))
    }

    fn is_leaf(&self) -> std::result::Result<bool, EvalError> {
        Ok(self.value()?.get("type").and_then(Value::as_str) == Some("derivation"))
    }

    fn recurse_for_derivations(&self) -> std::result::Result<bool, EvalError> {
        Ok(self
            .value()?
            .get(RECURSE_MARKER)
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    fn package_meta(&self) -> std::result::Result<PackageMeta, EvalError> {
        let drv = self.object()?;
        let string = |value: Option<&Value>| value.and_then(Value::as_str).map(str::to_owned);
        let strings = |value: Option<&Value>| {
            value.and_then(Value::as_array).map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
        };

        let name = string(drv.get("name"))
            .ok_or_else(|| EvalError::new(&self.path, "derivation has no name"))?;
        let meta = drv.get("meta");
        let meta_field = |key: &str| meta.and_then(|meta| meta.get(key));

        Ok(PackageMeta {
            name,
            pname: string(drv.get("pname")),
            version: string(drv.get("version")),
            semver: string(drv.get("semver")),
            license: meta_field("license").and_then(license_id),
            outputs: strings(drv.get("outputs")).unwrap_or_else(|| vec!["out".to_owned()]),
            outputs_to_install: strings(meta_field("outputsToInstall")),
            broken: meta_field("broken").and_then(Value::as_bool),
            unfree: meta_field("unfree").and_then(Value::as_bool),
            description: string(meta_field("description")),
        })
    }
}

/// SPDX id of a license value: an object, a plain string, or a list of either.
fn license_id(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Object(license) => license
            .get("spdxId")
            .or_else(|| license.get("shortName"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        Value::Array(licenses) => licenses.first().and_then(license_id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::cursor::Node;
    use crate::error::EvalErrorKind;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    fn namespace() -> JsonNamespace {
        JsonNamespace::from_value(json!({
            "legacyPackages": {
                "x86_64-linux": {
                    "hello": {
                        "type": "derivation",
                        "name": "hello-2.12.1",
                        "outputs": ["out", "man"],
                        "meta": {
                            "description": "A friendly greeting",
                            "license": [{ "spdxId": "GPL-3.0-or-later" }],
                            "outputsToInstall": ["out", "man"],
                            "broken": false,
                        },
                    },
                    "broken": { "__error": "assertion failed" },
                    "scalar": 42,
                    "python3Packages": { "recurseForDerivations": true },
                },
            },
        }))
    }

    #[test]
    fn open_cursor_missing_prefix() {
        let ns = namespace();
        assert!(ns.open_cursor(&path(&["packages"])).unwrap().is_none());
        assert!(ns.open_cursor(&path(&["legacyPackages", "x86_64-linux"])).unwrap().is_some());
    }

    #[test]
    fn children_keep_document_order() {
        let ns = namespace();
        let cursor = ns.open_cursor(&path(&["legacyPackages", "x86_64-linux"])).unwrap().unwrap();
        assert_eq!(
            cursor.list_children().unwrap(),
            path(&["hello", "broken", "scalar", "python3Packages"])
        );
    }

    #[test]
    fn typed_children() {
        let ns = namespace();
        let system = ns.open_cursor(&path(&["legacyPackages", "x86_64-linux"])).unwrap().unwrap();
        assert!(matches!(system.child("hello").unwrap(), Node::Leaf(_)));
        assert!(matches!(system.child("python3Packages").unwrap(), Node::Group(_)));
        assert!(matches!(system.child("nope").unwrap(), Node::Missing));

        let err = system.child("broken").unwrap_err();
        assert_eq!(err.path, "legacyPackages.x86_64-linux.broken");
        assert_eq!(err.message, "assertion failed");
        assert_eq!(err.kind, EvalErrorKind::Failed);
    }

    #[test]
    fn scalar_is_not_an_attr_set() {
        let ns = namespace();
        let system = ns.open_cursor(&path(&["legacyPackages", "x86_64-linux"])).unwrap().unwrap();
        let scalar = system.get_child("scalar").unwrap();
        assert!(!scalar.is_leaf().unwrap());
        assert!(!scalar.recurse_for_derivations().unwrap());
        assert_eq!(scalar.list_children().unwrap_err().kind, EvalErrorKind::NotAttrSet);
    }

    #[test]
    fn package_meta_is_read() {
        let ns = namespace();
        let hello = ns
            .open_cursor(&path(&["legacyPackages", "x86_64-linux", "hello"]))
            .unwrap()
            .unwrap();
        assert_eq!(
            hello.package_meta().unwrap(),
            PackageMeta {
                name: "hello-2.12.1".into(),
                license: Some("GPL-3.0-or-later".into()),
                outputs: path(&["out", "man"]),
                outputs_to_install: Some(path(&["out", "man"])),
                broken: Some(false),
                description: Some("A friendly greeting".into()),
                ..Default::default()
            }
        );
    }

    #[test]
    fn fingerprint_follows_content() {
        let a = JsonNamespace::from_value(json!({ "packages": {} }));
        let b = JsonNamespace::from_value(json!({ "packages": {} }));
        let c = JsonNamespace::from_value(json!({ "legacyPackages": {} }));
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.locked_ref().attrs["type"], "json");
    }
}
