// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Database schema definitions for the package catalog.
//!
//! Tables and views are versioned independently: a change to the tables
//! invalidates every cached catalog, a change to the views only requires the
//! views to be dropped and recreated.

use crate::types::SqlVersions;

/// Schema generations written by this crate.
pub const SCHEMA_VERSIONS: SqlVersions = SqlVersions {
    tables: 2,
    views: 3,
};

/// `DbVersions` row holding the engine version.
pub(crate) const VERSION_ROW_ENGINE: &str = "pkgdb";
/// `DbVersions` row holding [`SqlVersions::tables`].
pub(crate) const VERSION_ROW_TABLES: &str = "pkgdb_tables_schema";
/// `DbVersions` row holding [`SqlVersions::views`].
pub(crate) const VERSION_ROW_VIEWS: &str = "pkgdb_views_schema";

/// Schema version bookkeeping.
pub(crate) const VERSIONS_SQL: &str = r#"
create table if not exists DbVersions (
    name    text not null primary key,
    version text not null
);
"#;

/// Identity of the namespace the catalog was scraped from.
///
/// The trigger makes the row write-once: a second, different fingerprint
/// aborts the insert.
pub(crate) const LOCKED_FLAKE_SQL: &str = r#"
create table if not exists LockedFlake (
    fingerprint text primary key,
    string      text not null,
    attrs       json not null
);

create trigger if not exists IT_LockedFlake after insert on LockedFlake
  when ( 1 < ( select count(fingerprint) from LockedFlake ) )
  begin
    select raise(abort, 'Cannot write conflicting LockedFlake info.');
  end;
"#;

/// Attribute set hierarchy. `parent = 0` marks a top-level group.
pub(crate) const ATTR_SETS_SQL: &str = r#"
create table if not exists AttrSets (
    id       integer primary key,
    parent   integer,
    attrName varchar(255) not null,
    done     bool not null default false,
    constraint UC_AttrSets unique (parent, attrName)
);

create unique index if not exists idx_AttrSets on AttrSets(parent, attrName);

create trigger if not exists IT_AttrSets after insert on AttrSets
  when
    ( new.id = new.parent ) or
    ( ( new.parent != 0 ) and
      ( ( select count(id) from AttrSets where new.parent = AttrSets.id ) < 1 ) )
  begin
    select raise(abort, 'No such AttrSets.id for parent.');
  end;
"#;

/// Package leaves and their deduplicated descriptions.
pub(crate) const PACKAGES_SQL: &str = r#"
create table if not exists Descriptions (
    id          integer primary key,
    description text not null unique
);

create unique index if not exists idx_Descriptions on Descriptions(description);

create table if not exists Packages (
    id               integer primary key,
    parentId         integer not null,
    attrName         varchar(255) not null,
    name             varchar(255) not null,
    pname            varchar(255),
    version          varchar(127),
    semver           varchar(127),
    license          varchar(255),
    outputs          json not null,
    outputsToInstall json,
    broken           bool,
    unfree           bool,
    descriptionId    integer,
    foreign key (parentId) references AttrSets(id),
    foreign key (descriptionId) references Descriptions(id),
    constraint UC_Packages unique (parentId, attrName)
);

create unique index if not exists idx_Packages on Packages(parentId, attrName);
"#;

/// Names of every view created by [`VIEWS_SQL`], dependents first.
pub(crate) const VIEW_NAMES: &[&str] = &[
    "v_PackagesSearch",
    "v_PackagesPaths",
    "v_PackagesVersions",
    "v_Semvers",
    "v_AttrPaths",
];

/// Generated views used for path reconstruction and search.
pub(crate) const VIEWS_SQL: &str = r#"
-- JSON list form of the attribute path to an AttrSets row.
create view if not exists v_AttrPaths as
  with Tree (id, parent, attrName, subtree, system, path) as (
    select id, parent, attrName
         , attrName            as subtree
         , null                as system
         , json_array(attrName) as path
    from AttrSets where parent = 0
    union all
    select O.id, O.parent, O.attrName
         , Parent.subtree
         , coalesce(Parent.system, O.attrName) as system
         , json_insert(Parent.path, '$[#]', O.attrName) as path
    from AttrSets O inner join Tree as Parent on Parent.id = O.parent
  ) select * from Tree;

-- Semantic versions split into major, minor, patch and pre-release tag.
create view if not exists v_Semvers as select
  semver
, major
, minor
, case when length(mPatch) < 1 then rest else mPatch end as patch
, case when length(mPatch) < 1 then null else rest end   as preTag
from (
  select semver, major, minor
       , substr(rest, 0, instr(rest, '-'))  as mPatch
       , substr(rest, instr(rest, '-') + 1) as rest
  from (
    select semver, major
         , substr(rest, 0, instr(rest, '.'))  as minor
         , substr(rest, instr(rest, '.') + 1) as rest
    from (
      select semver
           , substr(semver, 0, instr(semver, '.'))  as major
           , substr(semver, instr(semver, '.') + 1) as rest
      from (select distinct semver from Packages where semver is not null)
    )
  )
) order by major, minor, patch, preTag desc nulls first;

-- versionType: 0 semver, 1 date, 2 other, 3 absent.
create view if not exists v_PackagesVersions as select
  Packages.id
, case when Packages.version is null     then null
       when Packages.semver is not null  then null
       when Packages.version = date(Packages.version) then date(Packages.version)
       else null
  end as versionDate
, case when Packages.version is null     then 3
       when Packages.semver is not null  then 0
       when Packages.version = date(Packages.version) then 1
       else 2
  end as versionType
from Packages;

create view if not exists v_PackagesPaths as select
  Packages.id
, json_insert(v_AttrPaths.path, '$[#]', Packages.attrName) as path
, json_insert(json_remove(v_AttrPaths.path, '$[1]', '$[0]'), '$[#]', Packages.attrName) as relPath
, json_array_length(v_AttrPaths.path) + 1 as depth
, Packages.attrName as attrName
from Packages inner join v_AttrPaths on Packages.parentId = v_AttrPaths.id;

create view if not exists v_PackagesSearch as select
  Packages.id
, v_AttrPaths.subtree
, v_AttrPaths.system
, v_PackagesPaths.path
, v_PackagesPaths.relPath
, v_PackagesPaths.depth
, Packages.name
, Packages.attrName
, Packages.pname
, Packages.version
, v_PackagesVersions.versionDate
, Packages.semver
, v_Semvers.major
, v_Semvers.minor
, v_Semvers.patch
, v_Semvers.preTag
, v_PackagesVersions.versionType
, Packages.license
, Packages.broken
, case when broken is null then 1 when broken then 2 else 0 end as brokenRank
, Packages.unfree
, case when unfree is null then 1 when unfree then 2 else 0 end as unfreeRank
, Descriptions.description
from Packages
left outer join Descriptions on Packages.descriptionId = Descriptions.id
left outer join v_Semvers    on Packages.semver = v_Semvers.semver
inner join v_AttrPaths        on Packages.parentId = v_AttrPaths.id
inner join v_PackagesPaths    on Packages.id = v_PackagesPaths.id
inner join v_PackagesVersions on Packages.id = v_PackagesVersions.id;
"#;

/// Statement dropping every view, used when only the view generation changed.
pub(crate) fn drop_views_sql() -> String {
    VIEW_NAMES
        .iter()
        .map(|name| format!("drop view if exists {name};\n"))
        .collect()
}
