// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Write operations for the catalog.
//!
//! Node inserts are idempotent: adding an existing `(parent, attrName)` pair
//! returns the row id that is already there.

use rusqlite::{OptionalExtension, params};
use tracing::trace;

use crate::connection::PkgDb;
use crate::error::{DbContext, Error, Result};
use crate::types::{Fingerprint, LockedRef, PackageParams, RowId};

impl PkgDb {
    /// Write the `LockedFlake` identity row.
    ///
    /// Writing the same fingerprint again is a no-op; a different one fails.
    pub fn write_locked_flake(&self, fingerprint: &Fingerprint, locked_ref: &LockedRef) -> Result<()> {
        let existing: Option<String> = self
            .conn
            .query_row("SELECT fingerprint FROM LockedFlake LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        if let Some(found) = existing {
            if found != fingerprint.to_hex() {
                return Err(Error::FingerprintMismatch {
                    path: self.path().map(ToOwned::to_owned).unwrap_or_default(),
                    expected: fingerprint.to_hex(),
                    found,
                });
            }
            return Ok(());
        }

        self.conn
            .execute(
                "INSERT OR IGNORE INTO LockedFlake (fingerprint, string, attrs) VALUES (?1, ?2, ?3)",
                params![
                    fingerprint.to_hex(),
                    locked_ref.string,
                    serde_json::to_string(&locked_ref.attrs)?
                ],
            )
            .db_context(|| "Failed to write LockedFlake".into())?;
        Ok(())
    }

    /// Insert the `AttrSets` row `(parent, attr_name)` or return its existing id.
    pub fn add_or_get_attr_set_id(&self, attr_name: &str, parent: RowId) -> Result<RowId> {
        let mut insert = self
            .conn
            .prepare_cached("INSERT OR IGNORE INTO AttrSets (parent, attrName) VALUES (?1, ?2)")?;
        insert
            .execute(params![parent, attr_name])
            .db_context(|| format!("Failed to add AttrSet '{attr_name}' under {parent}"))?;

        let mut select = self
            .conn
            .prepare_cached("SELECT id FROM AttrSets WHERE parent = ?1 AND attrName = ?2")?;
        let id: RowId = select.query_row(params![parent, attr_name], |row| row.get(0))?;
        trace!(id, parent, attr_name, "AttrSet row");
        Ok(id)
    }

    /// Insert every `AttrSets` row along `path`, returning the id of the last.
    pub fn add_or_get_attr_set_path(&self, path: &[String]) -> Result<RowId> {
        path.iter()
            .try_fold(0, |parent, name| self.add_or_get_attr_set_id(name, parent))
    }

    /// Insert a description or return the id of the identical existing one.
    pub fn add_or_get_description_id(&self, description: &str) -> Result<RowId> {
        let mut insert = self
            .conn
            .prepare_cached("INSERT OR IGNORE INTO Descriptions (description) VALUES (?1)")?;
        insert.execute(params![description])?;

        let mut select = self
            .conn
            .prepare_cached("SELECT id FROM Descriptions WHERE description = ?1")?;
        Ok(select.query_row(params![description], |row| row.get(0))?)
    }

    /// Insert or update the package `params.attr_name` under `parent_id`.
    ///
    /// Updating keeps the row id stable.
    pub fn add_package(&self, parent_id: RowId, params: &PackageParams) -> Result<RowId> {
        let description_id = params
            .description
            .as_deref()
            .map(|d| self.add_or_get_description_id(d))
            .transpose()?;
        let outputs = serde_json::to_string(&params.outputs)?;
        let outputs_to_install = params
            .outputs_to_install
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut stmt = self.conn.prepare_cached(
            r#"
            INSERT INTO Packages (
                parentId, attrName, name, pname, version, semver, license,
                outputs, outputsToInstall, broken, unfree, descriptionId
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT (parentId, attrName) DO UPDATE SET
                name = excluded.name,
                pname = excluded.pname,
                version = excluded.version,
                semver = excluded.semver,
                license = excluded.license,
                outputs = excluded.outputs,
                outputsToInstall = excluded.outputsToInstall,
                broken = excluded.broken,
                unfree = excluded.unfree,
                descriptionId = excluded.descriptionId
            RETURNING id
            "#,
        )?;
        let id: RowId = stmt
            .query_row(
                params![
                    parent_id,
                    params.attr_name,
                    params.name,
                    params.pname,
                    params.version,
                    params.semver,
                    params.license,
                    outputs,
                    outputs_to_install,
                    params.broken,
                    params.unfree,
                    description_id,
                ],
                |row| row.get(0),
            )
            .db_context(|| format!("Failed to write package '{}'", params.attr_name))?;
        trace!(id, parent_id, attr_name = %params.attr_name, "Package row");
        Ok(id)
    }

    /// Set `done` on the `AttrSets` row `id` and every descendant.
    pub fn set_prefix_done(&self, id: RowId, done: bool) -> Result<()> {
        let updated = self
            .conn
            .execute(
                r#"
                WITH RECURSIVE Tree (id) AS (
                    SELECT id FROM AttrSets WHERE id = ?1
                    UNION ALL
                    SELECT AttrSets.id FROM AttrSets INNER JOIN Tree ON AttrSets.parent = Tree.id
                )
                UPDATE AttrSets SET done = ?2 WHERE id IN (SELECT id FROM Tree)
                "#,
                params![id, done],
            )
            .db_context(|| format!("Failed to mark AttrSet {id} done={done}"))?;
        if updated == 0 {
            return Err(Error::NoSuchRow {
                table: "AttrSets",
                id,
            });
        }
        Ok(())
    }

    /// [`PkgDb::set_prefix_done`] addressed by attribute path.
    pub fn set_prefix_done_path(&self, path: &[String], done: bool) -> Result<()> {
        let id = self.attr_set_id(path)?;
        self.set_prefix_done(id, done)
    }
}
