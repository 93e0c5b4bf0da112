// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Read query operations for the catalog.

use rusqlite::{OptionalExtension, params};

use crate::connection::PkgDb;
use crate::error::{Error, Result};
use crate::schema::{SCHEMA_VERSIONS, VERSION_ROW_TABLES, VERSION_ROW_VIEWS};
use crate::types::{AttrPath, LockedFlakeInfo, PackageRecord, RowId, SqlVersions};

fn join_path(path: &[String]) -> String {
    path.join(".")
}

impl PkgDb {
    /// Schema versions recorded in `DbVersions`.
    ///
    /// Returns `None` for a database that was never initialized.
    pub fn db_versions(&self) -> Result<Option<SqlVersions>> {
        let has_table: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'DbVersions'",
            [],
            |row| row.get(0),
        )?;
        if !has_table {
            return Ok(None);
        }

        let mut stmt = self
            .conn
            .prepare_cached("SELECT version FROM DbVersions WHERE name = ?1")?;
        let mut version = |name: &str| -> Result<Option<u32>> {
            let raw: Option<String> = stmt
                .query_row(params![name], |row| row.get(0))
                .optional()?;
            Ok(raw.and_then(|v| v.parse().ok()))
        };
        let tables = version(VERSION_ROW_TABLES)?;
        let views = version(VERSION_ROW_VIEWS)?;
        Ok(match (tables, views) {
            (Some(tables), Some(views)) => Some(SqlVersions { tables, views }),
            _ => None,
        })
    }

    /// Fail with [`Error::SchemaVersionMismatch`] unless both generations match.
    pub fn check_versions(&self) -> Result<()> {
        let found = self.db_versions()?.unwrap_or(SqlVersions {
            tables: 0,
            views: 0,
        });
        if found != SCHEMA_VERSIONS {
            return Err(Error::SchemaVersionMismatch {
                expected: SCHEMA_VERSIONS,
                found,
            });
        }
        Ok(())
    }

    /// Identity of the namespace this catalog was scraped from.
    pub fn locked_flake(&self) -> Result<LockedFlakeInfo> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT fingerprint, string, attrs FROM LockedFlake LIMIT 1")?;
        let row: Option<(String, String, String)> = stmt
            .query_row([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()?;
        let (fingerprint, string, attrs) = row.ok_or(Error::MissingLockedFlake)?;
        Ok(LockedFlakeInfo {
            fingerprint: fingerprint.parse()?,
            string,
            attrs: serde_json::from_str(&attrs)?,
        })
    }

    fn child_attr_set_id(&self, parent: RowId, attr_name: &str) -> Result<Option<RowId>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM AttrSets WHERE parent = ?1 AND attrName = ?2")?;
        Ok(stmt
            .query_row(params![parent, attr_name], |row| row.get(0))
            .optional()?)
    }

    /// Row id of the `AttrSets` row at `path`, if it exists.
    pub fn maybe_attr_set_id(&self, path: &[String]) -> Result<Option<RowId>> {
        let mut id = 0;
        for name in path {
            match self.child_attr_set_id(id, name)? {
                Some(child) => id = child,
                None => return Ok(None),
            }
        }
        Ok(Some(id))
    }

    /// Row id of the `AttrSets` row at `path`.
    ///
    /// The empty path resolves to the virtual root `0`.
    pub fn attr_set_id(&self, path: &[String]) -> Result<RowId> {
        self.maybe_attr_set_id(path)?
            .ok_or_else(|| Error::NoSuchAttrSet(join_path(path)))
    }

    /// Check if an `AttrSets` row exists at `path`.
    pub fn has_attr_set(&self, path: &[String]) -> Result<bool> {
        Ok(self.maybe_attr_set_id(path)?.is_some())
    }

    /// Reconstruct the attribute path of an `AttrSets` row.
    pub fn attr_set_path(&self, id: RowId) -> Result<AttrPath> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT parent, attrName FROM AttrSets WHERE id = ?1")?;
        let mut path = Vec::new();
        let mut current = id;
        while current != 0 {
            let (parent, name): (RowId, String) = stmt
                .query_row(params![current], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?
                .ok_or(Error::NoSuchRow {
                    table: "AttrSets",
                    id: current,
                })?;
            path.push(name);
            current = parent;
        }
        path.reverse();
        Ok(path)
    }

    /// Whether the `AttrSets` row `id` is marked done.
    pub fn completed_attr_set_id(&self, id: RowId) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT done FROM AttrSets WHERE id = ?1")?;
        stmt.query_row(params![id], |row| row.get(0))
            .optional()?
            .ok_or(Error::NoSuchRow {
                table: "AttrSets",
                id,
            })
    }

    /// Whether `path` is fully indexed.
    ///
    /// A path below a completed prefix counts as completed even when the
    /// rules never let it be recorded.
    pub fn completed_attr_set(&self, path: &[String]) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, done FROM AttrSets WHERE parent = ?1 AND attrName = ?2",
        )?;
        let mut id: RowId = 0;
        for name in path {
            let row: Option<(RowId, bool)> = stmt
                .query_row(params![id, name], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?;
            match row {
                Some((_, true)) => return Ok(true),
                Some((child, false)) => id = child,
                None => return Ok(false),
            }
        }
        Ok(false)
    }

    /// Row id of the package at `path` (parent attribute set plus leaf name).
    pub fn maybe_package_id(&self, path: &[String]) -> Result<Option<RowId>> {
        let Some((attr_name, parent_path)) = path.split_last() else {
            return Ok(None);
        };
        let Some(parent) = self.maybe_attr_set_id(parent_path)? else {
            return Ok(None);
        };
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM Packages WHERE parentId = ?1 AND attrName = ?2")?;
        Ok(stmt
            .query_row(params![parent, attr_name], |row| row.get(0))
            .optional()?)
    }

    pub fn package_id(&self, path: &[String]) -> Result<RowId> {
        self.maybe_package_id(path)?
            .ok_or_else(|| Error::NoSuchPackage(join_path(path)))
    }

    pub fn has_package(&self, path: &[String]) -> Result<bool> {
        Ok(self.maybe_package_id(path)?.is_some())
    }

    /// Reconstruct the attribute path of a `Packages` row.
    pub fn package_path(&self, id: RowId) -> Result<AttrPath> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT parentId, attrName FROM Packages WHERE id = ?1")?;
        let (parent, name): (RowId, String) = stmt
            .query_row(params![id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?
            .ok_or(Error::NoSuchRow {
                table: "Packages",
                id,
            })?;
        let mut path = self.attr_set_path(parent)?;
        path.push(name);
        Ok(path)
    }

    /// Text of a `Descriptions` row.
    pub fn description(&self, id: RowId) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT description FROM Descriptions WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], |row| row.get(0)).optional()?)
    }

    /// Full record of a `Packages` row, including its path information.
    pub fn package(&self, id: RowId) -> Result<PackageRecord> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT s.path, s.subtree, s.system, s.relPath, p.name, p.pname, p.version,
                   p.semver, p.license, p.outputs, p.outputsToInstall, p.broken, p.unfree,
                   s.description
            FROM Packages p
            INNER JOIN v_PackagesSearch s ON s.id = p.id
            WHERE p.id = ?1
            "#,
        )?;

        let raw = stmt
            .query_row(params![id], |row| {
                Ok(RawPackage {
                    path: row.get(0)?,
                    subtree: row.get(1)?,
                    system: row.get(2)?,
                    rel_path: row.get(3)?,
                    name: row.get(4)?,
                    pname: row.get(5)?,
                    version: row.get(6)?,
                    semver: row.get(7)?,
                    license: row.get(8)?,
                    outputs: row.get(9)?,
                    outputs_to_install: row.get(10)?,
                    broken: row.get(11)?,
                    unfree: row.get(12)?,
                    description: row.get(13)?,
                })
            })
            .optional()?
            .ok_or(Error::NoSuchRow {
                table: "Packages",
                id,
            })?;

        Ok(PackageRecord {
            id,
            abs_path: serde_json::from_str(&raw.path)?,
            subtree: raw.subtree,
            system: raw.system,
            rel_path: serde_json::from_str(&raw.rel_path)?,
            name: raw.name,
            pname: raw.pname,
            version: raw.version,
            semver: raw.semver,
            license: raw.license,
            outputs: serde_json::from_str(&raw.outputs)?,
            outputs_to_install: raw
                .outputs_to_install
                .as_deref()
                .map(|outputs| serde_json::from_str(outputs))
                .transpose()?,
            broken: raw.broken,
            unfree: raw.unfree,
            description: raw.description,
        })
    }

    /// Count all `Packages` rows.
    pub fn count_packages(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM Packages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Count all `AttrSets` rows.
    pub fn count_attr_sets(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM AttrSets", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Columns of a package row before JSON decoding.
struct RawPackage {
    path: String,
    subtree: String,
    system: Option<String>,
    rel_path: String,
    name: String,
    pname: Option<String>,
    version: Option<String>,
    semver: Option<String>,
    license: Option<String>,
    outputs: String,
    outputs_to_install: Option<String>,
    broken: Option<bool>,
    unfree: Option<bool>,
    description: Option<String>,
}
