// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Breadth-first scraping of one page of a prefix.
//!
//! A page is a slice of the prefix's immediate children. Every recursable
//! child in the slice is drained completely through an explicit work queue
//! and marked done before the page returns, so a committed page never leaves
//! half-scraped attribute sets behind.

use std::collections::VecDeque;

use pkgdb_rules::ScrapeRules;
use pkgdb_store_db::{PkgDb, RowId};
use tracing::{debug, trace};

use crate::cursor::{Cursor, Node, RECURSE_MARKER};
use crate::error::{EvalError, EvalErrorKind, Result, ScrapeError};
use crate::package::package_params;
use crate::scheduler::PageOutcome;

/// Paths below `legacyPackages.<system>` entered even without
/// `recurseForDerivations`.
pub const LEGACY_RECURSION_EXCEPTIONS: &[&[&str]] = &[&["darwin"]];

/// Top-level group a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtree {
    /// Flat: only direct derivations are recorded.
    Packages,
    /// Best-effort: evaluation errors are skipped.
    LegacyPackages,
    Other,
}

impl Subtree {
    pub fn of<S: AsRef<str>>(path: &[S]) -> Self {
        match path.first().map(AsRef::as_ref) {
            Some("packages") => Self::Packages,
            Some("legacyPackages") => Self::LegacyPackages,
            _ => Self::Other,
        }
    }
}

/// Whether `path` is hard-coded as recursable under `legacyPackages`.
pub fn is_legacy_exception<S: AsRef<str>>(path: &[S]) -> bool {
    if Subtree::of(path) != Subtree::LegacyPackages || path.len() < 3 {
        return false;
    }
    let rest = &path[2..];
    LEGACY_RECURSION_EXCEPTIONS.iter().any(|exception| {
        exception.len() == rest.len() && exception.iter().zip(rest).all(|(a, b)| *a == b.as_ref())
    })
}

/// An attribute set waiting to have its children scraped.
pub struct WorkItem {
    pub path: Vec<String>,
    pub cursor: Box<dyn Cursor>,
    /// `AttrSets` row of `path`.
    pub id: RowId,
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem")
            .field("path", &self.path)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

fn child_names(cursor: &dyn Cursor) -> std::result::Result<Vec<String>, EvalError> {
    Ok(cursor
        .list_children()?
        .into_iter()
        .filter(|name| name != RECURSE_MARKER)
        .collect())
}

/// Scrape page `page_idx` of `root` into `db`.
///
/// Must run inside a transaction; the caller commits on success.
pub fn scrape_page(
    db: &PkgDb,
    rules: &ScrapeRules,
    root: &WorkItem,
    page_size: usize,
    page_idx: usize,
) -> Result<PageOutcome> {
    if db.completed_attr_set_id(root.id)? {
        debug!("'{}' is already scraped", root.path.join("."));
        return Ok(PageOutcome::Complete);
    }

    let subtree = Subtree::of(&root.path);
    let children = child_names(root.cursor.as_ref())?;
    let start = page_idx.saturating_mul(page_size).min(children.len());
    let end = start.saturating_add(page_size).min(children.len());
    debug!(
        "scraping '{}' page {page_idx}: children {start}..{end} of {}",
        root.path.join("."),
        children.len()
    );

    let mut queue = VecDeque::new();
    for name in &children[start..end] {
        process_child(db, rules, subtree, root, name, &mut queue)?;
        let Some(child_id) = queue.front().map(|item| item.id) else {
            continue;
        };
        drain(db, rules, subtree, &mut queue)?;
        db.set_prefix_done(child_id, true)?;
    }

    if end >= children.len() {
        db.set_prefix_done(root.id, true)?;
        debug!("'{}' is complete", root.path.join("."));
        Ok(PageOutcome::Complete)
    } else {
        Ok(PageOutcome::Incomplete)
    }
}

fn drain(
    db: &PkgDb,
    rules: &ScrapeRules,
    subtree: Subtree,
    queue: &mut VecDeque<WorkItem>,
) -> Result<()> {
    while let Some(item) = queue.pop_front() {
        trace!("visiting '{}'", item.path.join("."));
        let names = match child_names(item.cursor.as_ref()) {
            Ok(names) => names,
            Err(err) if err.kind == EvalErrorKind::NotAttrSet => {
                debug!("skipping '{}': {err}", item.path.join("."));
                continue;
            }
            Err(err) if subtree == Subtree::LegacyPackages => {
                debug!("skipping '{}': {err}", item.path.join("."));
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        for name in &names {
            process_child(db, rules, subtree, &item, name, queue)?;
        }
    }
    Ok(())
}

fn process_child(
    db: &PkgDb,
    rules: &ScrapeRules,
    subtree: Subtree,
    parent: &WorkItem,
    name: &str,
    queue: &mut VecDeque<WorkItem>,
) -> Result<()> {
    match visit_child(db, rules, subtree, parent, name, queue) {
        Err(ScrapeError::Eval(err)) if subtree == Subtree::LegacyPackages => {
            debug!("ignoring evaluation error: {err}");
            Ok(())
        }
        result => result,
    }
}

fn visit_child(
    db: &PkgDb,
    rules: &ScrapeRules,
    subtree: Subtree,
    parent: &WorkItem,
    name: &str,
    queue: &mut VecDeque<WorkItem>,
) -> Result<()> {
    let mut path = parent.path.clone();
    path.push(name.to_owned());

    let rule = rules.apply_rules(&path);
    if rule == Some(false) {
        trace!("'{}' is disallowed by rules", path.join("."));
        return Ok(());
    }

    match parent.cursor.child(name)? {
        Node::Missing => Ok(()),
        Node::Leaf(cursor) => {
            let params = package_params(name, cursor.package_meta()?);
            db.add_package(parent.id, &params)?;
            trace!("recorded package '{}'", path.join("."));
            Ok(())
        }
        Node::Group(cursor) => {
            if subtree == Subtree::Packages {
                trace!("not descending into '{}'", path.join("."));
                return Ok(());
            }
            let allowed = match rule {
                Some(allowed) => allowed,
                None => cursor.recurse_for_derivations()? || is_legacy_exception(&path),
            };
            if !allowed {
                return Ok(());
            }
            let id = db.add_or_get_attr_set_id(name, parent.id)?;
            if db.completed_attr_set_id(id)? {
                trace!("'{}' is already scraped", path.join("."));
                return Ok(());
            }
            queue.push_back(WorkItem { path, cursor, id });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::{Value, json};

    use super::*;
    use crate::cursor::Namespace;
    use crate::json_namespace::JsonNamespace;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    fn drv(name: &str) -> Value {
        json!({ "type": "derivation", "name": name, "outputs": ["out"] })
    }

    fn root(db: &PkgDb, ns: &JsonNamespace, prefix: &[&str]) -> WorkItem {
        let prefix = path(prefix);
        WorkItem {
            cursor: ns.open_cursor(&prefix).unwrap().unwrap(),
            id: db.add_or_get_attr_set_path(&prefix).unwrap(),
            path: prefix,
        }
    }

    #[rstest]
    #[case(&["packages", "x86_64-linux"], Subtree::Packages)]
    #[case(&["legacyPackages"], Subtree::LegacyPackages)]
    #[case(&["checks", "x86_64-linux"], Subtree::Other)]
    #[case(&[], Subtree::Other)]
    fn subtree_of(#[case] path: &[&str], #[case] expected: Subtree) {
        assert_eq!(Subtree::of(path), expected);
    }

    #[rstest]
    #[case(&["legacyPackages", "x86_64-darwin", "darwin"], true)]
    #[case(&["legacyPackages", "x86_64-darwin", "darwin", "apple_sdk"], false)]
    #[case(&["packages", "x86_64-darwin", "darwin"], false)]
    #[case(&["legacyPackages", "darwin"], false)]
    fn legacy_exceptions(#[case] path: &[&str], #[case] expected: bool) {
        assert_eq!(is_legacy_exception(path), expected);
    }

    #[test]
    fn recursion_follows_marker_and_rules() {
        let ns = JsonNamespace::from_value(json!({
            "legacyPackages": { "x86_64-linux": {
                "hello": drv("hello-2.12"),
                "python3Packages": {
                    "recurseForDerivations": true,
                    "requests": drv("python3.11-requests-2.31.0"),
                },
                "hidden": { "secret": drv("secret-1.0") },
                "darwin": { "cctools": drv("cctools-1.0") },
                "forced": { "inner": drv("inner-0.1") },
                "pkgsStatic": { "recurseForDerivations": true, "hello": drv("hello-2.12") },
            }},
        }));
        let rules = ScrapeRules::from_json_str_with_systems(
            r#"{
                "allowRecursive": [["legacyPackages", null, "forced"]],
                "disallowRecursive": [["legacyPackages", null, "pkgsStatic"]]
            }"#,
            &["x86_64-linux"],
        )
        .unwrap();
        let db = PkgDb::open_memory().unwrap();
        let root = root(&db, &ns, &["legacyPackages", "x86_64-linux"]);

        let outcome = scrape_page(&db, &rules, &root, 100, 0).unwrap();
        assert_eq!(outcome, PageOutcome::Complete);

        let has = |p: &[&str]| db.has_package(&path(p)).unwrap();
        assert!(has(&["legacyPackages", "x86_64-linux", "hello"]));
        assert!(has(&["legacyPackages", "x86_64-linux", "python3Packages", "requests"]));
        assert!(has(&["legacyPackages", "x86_64-linux", "darwin", "cctools"]));
        assert!(has(&["legacyPackages", "x86_64-linux", "forced", "inner"]));
        assert!(!has(&["legacyPackages", "x86_64-linux", "hidden", "secret"]));
        assert!(!has(&["legacyPackages", "x86_64-linux", "pkgsStatic", "hello"]));
        assert_eq!(db.count_packages().unwrap(), 4);
        assert!(db.completed_attr_set(&path(&["legacyPackages", "x86_64-linux"])).unwrap());
    }

    #[test]
    fn packages_are_flat() {
        let ns = JsonNamespace::from_value(json!({
            "packages": { "x86_64-linux": {
                "hello": drv("hello-2.12"),
                "nested": { "recurseForDerivations": true, "inner": drv("inner-1.0") },
            }},
        }));
        let db = PkgDb::open_memory().unwrap();
        let root = root(&db, &ns, &["packages", "x86_64-linux"]);
        scrape_page(&db, &ScrapeRules::empty(), &root, 100, 0).unwrap();
        assert_eq!(db.count_packages().unwrap(), 1);
        assert!(!db.has_attr_set(&path(&["packages", "x86_64-linux", "nested"])).unwrap());
    }

    #[test]
    fn eval_errors_are_fatal_outside_legacy_packages() {
        let ns = JsonNamespace::from_value(json!({
            "packages": { "x86_64-linux": {
                "hello": drv("hello-2.12"),
                "broken": { "__error": "assertion failed" },
            }},
            "legacyPackages": { "x86_64-linux": {
                "hello": drv("hello-2.12"),
                "broken": { "__error": "assertion failed" },
                "set": { "recurseForDerivations": true, "bad": { "__error": "nope" } },
            }},
        }));
        let db = PkgDb::open_memory().unwrap();

        let packages = root(&db, &ns, &["packages", "x86_64-linux"]);
        let err = scrape_page(&db, &ScrapeRules::empty(), &packages, 100, 0).unwrap_err();
        assert!(matches!(err, ScrapeError::Eval(_)));

        let legacy = root(&db, &ns, &["legacyPackages", "x86_64-linux"]);
        let outcome = scrape_page(&db, &ScrapeRules::empty(), &legacy, 100, 0).unwrap();
        assert_eq!(outcome, PageOutcome::Complete);
        assert!(db.has_package(&path(&["legacyPackages", "x86_64-linux", "hello"])).unwrap());
    }

    #[test]
    fn pages_slice_children() {
        let mut set = serde_json::Map::new();
        for i in 0..5 {
            set.insert(format!("p{i}"), drv(&format!("p{i}-1.0")));
        }
        set.insert("recurseForDerivations".into(), Value::Bool(true));
        let ns = JsonNamespace::from_value(json!({ "legacyPackages": { "s": set } }));
        let db = PkgDb::open_memory().unwrap();
        let root = root(&db, &ns, &["legacyPackages", "s"]);
        let rules = ScrapeRules::empty();

        assert_eq!(scrape_page(&db, &rules, &root, 2, 0).unwrap(), PageOutcome::Incomplete);
        assert_eq!(db.count_packages().unwrap(), 2);
        assert!(!db.completed_attr_set_id(root.id).unwrap());
        assert_eq!(scrape_page(&db, &rules, &root, 2, 1).unwrap(), PageOutcome::Incomplete);
        assert_eq!(scrape_page(&db, &rules, &root, 2, 2).unwrap(), PageOutcome::Complete);
        assert_eq!(db.count_packages().unwrap(), 5);
        assert!(db.completed_attr_set_id(root.id).unwrap());
    }

    #[test]
    fn drained_children_are_marked_done() {
        let ns = JsonNamespace::from_value(json!({
            "legacyPackages": { "s": {
                "a": { "recurseForDerivations": true, "b": {
                    "recurseForDerivations": true, "x": drv("x-1.0"),
                }},
                "z": drv("z-1.0"),
            }},
        }));
        let db = PkgDb::open_memory().unwrap();
        let root = root(&db, &ns, &["legacyPackages", "s"]);

        let outcome = scrape_page(&db, &ScrapeRules::empty(), &root, 1, 0).unwrap();
        assert_eq!(outcome, PageOutcome::Incomplete);
        assert!(db.completed_attr_set(&path(&["legacyPackages", "s", "a"])).unwrap());
        assert!(db.completed_attr_set(&path(&["legacyPackages", "s", "a", "b"])).unwrap());
        assert!(db.has_package(&path(&["legacyPackages", "s", "a", "b", "x"])).unwrap());
        assert!(!db.completed_attr_set(&path(&["legacyPackages", "s"])).unwrap());
    }
}
