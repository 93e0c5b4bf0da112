// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Structured package search over `v_PackagesSearch`.

use rusqlite::params_from_iter;
use rusqlite::types::Value;

use crate::connection::PkgDb;
use crate::error::{DbContext, Result};
use crate::types::RowId;

/// Filters for [`PkgDb::search`].
///
/// Unset filters match everything. Broken packages are excluded and unfree
/// packages included unless the corresponding policy says otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageQuery {
    /// Exact derivation name
    pub name: Option<String>,
    pub pname: Option<String>,
    pub version: Option<String>,
    /// Semantic version prefix, e.g. `1` or `1.2`
    pub semver: Option<String>,
    /// Substring matched against pname, attribute name and description
    pub match_term: Option<String>,
    pub subtrees: Option<Vec<String>>,
    pub systems: Option<Vec<String>>,
    pub licenses: Option<Vec<String>>,
    pub allow_broken: bool,
    pub allow_unfree: bool,
    pub limit: Option<u32>,
}

impl Default for PackageQuery {
    fn default() -> Self {
        Self {
            name: None,
            pname: None,
            version: None,
            semver: None,
            match_term: None,
            subtrees: None,
            systems: None,
            licenses: None,
            allow_broken: false,
            allow_unfree: true,
            limit: None,
        }
    }
}

impl PackageQuery {
    fn push_in(
        column: &str,
        values: &[String],
        conditions: &mut Vec<String>,
        binds: &mut Vec<Value>,
    ) {
        let placeholders = values
            .iter()
            .map(|v| {
                binds.push(Value::Text(v.clone()));
                format!("?{}", binds.len())
            })
            .collect::<Vec<_>>()
            .join(", ");
        conditions.push(format!("{column} IN ({placeholders})"));
    }

    /// Render the query as SQL plus its positional parameters.
    fn to_sql(&self) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut binds = Vec::new();
        let bind = |value: String, binds: &mut Vec<Value>| {
            binds.push(Value::Text(value));
            format!("?{}", binds.len())
        };

        if let Some(name) = &self.name {
            conditions.push(format!("name = {}", bind(name.clone(), &mut binds)));
        }
        if let Some(pname) = &self.pname {
            conditions.push(format!("pname = {}", bind(pname.clone(), &mut binds)));
        }
        if let Some(version) = &self.version {
            conditions.push(format!("version = {}", bind(version.clone(), &mut binds)));
        }
        if let Some(semver) = &self.semver {
            let exact = bind(semver.clone(), &mut binds);
            let prefix = bind(format!("{semver}.%"), &mut binds);
            conditions.push(format!("(semver = {exact} OR semver LIKE {prefix})"));
        }
        let mut order = Vec::new();
        if let Some(term) = &self.match_term {
            let exact = bind(term.clone(), &mut binds);
            let like = bind(format!("%{term}%"), &mut binds);
            conditions.push(format!(
                "(pname LIKE {like} OR attrName LIKE {like} OR description LIKE {like})"
            ));
            order.push(format!(
                "CASE WHEN pname = {exact} OR attrName = {exact} THEN 0 ELSE 1 END"
            ));
        }
        if let Some(subtrees) = &self.subtrees {
            Self::push_in("subtree", subtrees, &mut conditions, &mut binds);
        }
        if let Some(systems) = &self.systems {
            Self::push_in("system", systems, &mut conditions, &mut binds);
        }
        if let Some(licenses) = &self.licenses {
            Self::push_in("license", licenses, &mut conditions, &mut binds);
        }
        if !self.allow_broken {
            conditions.push("(broken IS NULL OR broken = 0)".into());
        }
        if !self.allow_unfree {
            conditions.push("(unfree IS NULL OR unfree = 0)".into());
        }

        let mut sql = String::from("SELECT id FROM v_PackagesSearch");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        order.push(
            "versionType, \
             CAST(major AS INTEGER) DESC NULLS LAST, \
             CAST(minor AS INTEGER) DESC NULLS LAST, \
             CAST(patch AS INTEGER) DESC NULLS LAST, \
             preTag DESC NULLS FIRST, \
             versionDate DESC NULLS LAST, \
             brokenRank, unfreeRank, id"
                .into(),
        );
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        (sql, binds)
    }
}

impl PkgDb {
    /// Package row ids matching `query`, best matches first.
    pub fn search(&self, query: &PackageQuery) -> Result<Vec<RowId>> {
        let (sql, binds) = query.to_sql();
        let mut stmt = self
            .conn
            .prepare(&sql)
            .db_context(|| format!("Failed to prepare search: {sql}"))?;
        let ids = stmt
            .query_map(params_from_iter(binds), |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<RowId>>>()?;
        Ok(ids)
    }
}
