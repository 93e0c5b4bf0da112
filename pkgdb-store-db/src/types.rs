// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Domain types for catalog database records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Error;

/// SQLite row id.
pub type RowId = i64;

/// Attribute path, e.g. `["legacyPackages", "x86_64-linux", "hello"]`.
pub type AttrPath = Vec<String>;

/// SHA-256 identity of one locked version of a namespace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Fingerprint of arbitrary content.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering, also the catalog file stem.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| Error::InvalidFingerprint(s.to_owned()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Locked reference of a namespace: a URL-like string plus its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedRef {
    pub string: String,
    pub attrs: Value,
}

/// Contents of the `LockedFlake` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedFlakeInfo {
    pub fingerprint: Fingerprint,
    pub string: String,
    pub attrs: Value,
}

/// Table and view schema generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlVersions {
    pub tables: u32,
    pub views: u32,
}

impl fmt::Display for SqlVersions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tables: {}, views: {}", self.tables, self.views)
    }
}

/// Parameters for inserting or updating a `Packages` row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageParams {
    /// Leaf attribute name under the parent `AttrSets` row
    pub attr_name: String,
    /// Full derivation name, e.g. `hello-2.12.1`
    pub name: String,
    pub pname: Option<String>,
    pub version: Option<String>,
    /// Version coerced to `MAJOR.MINOR.PATCH[-TAG]`
    pub semver: Option<String>,
    /// SPDX identifier
    pub license: Option<String>,
    /// Declared output names in order
    pub outputs: Vec<String>,
    pub outputs_to_install: Option<Vec<String>>,
    pub broken: Option<bool>,
    pub unfree: Option<bool>,
    pub description: Option<String>,
}

/// A `Packages` row joined with its path information.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub id: RowId,
    pub abs_path: AttrPath,
    pub subtree: String,
    pub system: Option<String>,
    pub rel_path: AttrPath,
    pub name: String,
    pub pname: Option<String>,
    pub version: Option<String>,
    pub semver: Option<String>,
    pub license: Option<String>,
    pub outputs: Vec<String>,
    pub outputs_to_install: Option<Vec<String>>,
    pub broken: Option<bool>,
    pub unfree: Option<bool>,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_hex_roundtrip() {
        let fp = Fingerprint::of_bytes(b"hello");
        let hex = fp.to_string();
        assert_eq!(hex.len(), 64);
        assert_eq!(
            hex,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(hex.parse::<Fingerprint>().unwrap(), fp);
    }

    #[test]
    fn fingerprint_rejects_bad_hex() {
        assert!(matches!(
            "abc".parse::<Fingerprint>(),
            Err(Error::InvalidFingerprint(_))
        ));
        assert!("zz".repeat(32).parse::<Fingerprint>().is_err());
    }

    #[test]
    fn locked_flake_info_serializes_fingerprint_as_hex() {
        let info = LockedFlakeInfo {
            fingerprint: Fingerprint::from_bytes([0xab; 32]),
            string: "github:example/pkgs/abc".into(),
            attrs: serde_json::json!({"type": "github"}),
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["fingerprint"], "ab".repeat(32));
        assert_eq!(value["attrs"]["type"], "github");
    }
}
