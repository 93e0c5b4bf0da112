// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! End-to-end scraping of JSON namespaces into on-disk catalogs.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pkgdb_rules::ScrapeRules;
use pkgdb_scrape::{
    Config, Cursor, DEFAULT_SUBTREES, EvalError, ForkRunner, InProcessRunner, Isolation,
    JsonNamespace, Namespace, PageOutcome, PageRunner, PkgDbInput, ScrapeError, list_databases,
    scheduler::{Heartbeat, PageWorker},
};
use pkgdb_store_db::{Fingerprint, LockedRef, OpenMode, PackageQuery, PkgDb, SCHEMA_VERSIONS};
use pkgdb_utils_test::{
    CanonicalTempDir, derivation, derivation_with_meta, eval_error, namespace, package_set,
    recursive, write_namespace,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{Map, Value, json};

const SYSTEM: &str = "x86_64-linux";

fn path(segments: &[&str]) -> Vec<String> {
    segments.iter().map(|s| s.to_string()).collect()
}

fn config(dir: &Path, page_size: usize) -> Config {
    Config {
        cache_dir: Some(dir.to_owned()),
        page_size: Some(page_size),
        isolation: Isolation::InProcess,
        lock_touch_interval_ms: 10,
        lock_max_update_age_ms: 1_000,
        lock_poll_interval_ms: 10,
        worker_poll_interval_ms: 5,
        ..Config::default()
    }
}

/// Namespace wrapper counting how often a cursor is opened.
struct Counting {
    inner: JsonNamespace,
    opened: Arc<AtomicUsize>,
}

impl Namespace for Counting {
    fn fingerprint(&self) -> Fingerprint {
        self.inner.fingerprint()
    }

    fn locked_ref(&self) -> LockedRef {
        self.inner.locked_ref()
    }

    fn open_cursor(&self, prefix: &[String]) -> Result<Option<Box<dyn Cursor>>, EvalError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.inner.open_cursor(prefix)
    }
}

/// Page runner recording the catalog state after every page.
struct Observing {
    inner: InProcessRunner,
    db_path: std::path::PathBuf,
    prefix: Vec<String>,
    seen: Vec<(PageOutcome, bool, u64)>,
}

impl PageRunner for Observing {
    fn run_page(
        &mut self,
        page: usize,
        worker: &mut PageWorker<'_>,
        heartbeat: &mut Heartbeat<'_>,
    ) -> pkgdb_scrape::Result<PageOutcome> {
        let outcome = self.inner.run_page(page, worker, heartbeat)?;
        let db = PkgDb::open(&self.db_path, OpenMode::ReadOnly)?;
        self.seen.push((
            outcome,
            db.completed_attr_set(&self.prefix)?,
            db.count_packages()?,
        ));
        Ok(outcome)
    }
}

/// `packages.<SYSTEM>` with six children; the fifth fails to evaluate.
fn packages_with_failure() -> Value {
    let mut set = Map::new();
    for i in 0..6 {
        let attr = format!("pkg{i}");
        let value = if i == 4 {
            eval_error("assertion 'false' failed")
        } else {
            derivation(&format!("{attr}-1.0"))
        };
        set.insert(attr, value);
    }
    namespace("packages", &[SYSTEM], &Value::Object(set))
}

/// A prefix of N children takes ceil(N/K) pages and completes on the last.
#[test_log::test]
fn test_pagination_marks_done_on_last_page() {
    let dir = CanonicalTempDir::new().unwrap();
    let ns = JsonNamespace::from_value(namespace("legacyPackages", &[SYSTEM], &package_set(10)));
    let input = PkgDbInput::new(ns, config(dir.path(), 3)).unwrap();
    let prefix = path(&["legacyPackages", SYSTEM]);

    let mut runner = Observing {
        inner: InProcessRunner::default(),
        db_path: input.db_path().to_owned(),
        prefix: prefix.clone(),
        seen: Vec::new(),
    };
    input.scrape_prefix_with(&mut runner, &prefix, false).unwrap();

    assert_eq!(
        runner.seen,
        vec![
            (PageOutcome::Incomplete, false, 3),
            (PageOutcome::Incomplete, false, 6),
            (PageOutcome::Incomplete, false, 9),
            (PageOutcome::Complete, true, 10),
        ]
    );
    assert!(!input.db_path().with_extension("lock").exists());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// The number of pages is ceil(N/K), and one page for an empty prefix.
    #[test]
    fn page_count(count in 0usize..25, page_size in 1usize..8) {
        let dir = CanonicalTempDir::new().unwrap();
        let ns = JsonNamespace::from_value(namespace("legacyPackages", &[SYSTEM], &package_set(count)));
        let input = PkgDbInput::new(ns, config(dir.path(), page_size)).unwrap();
        let prefix = path(&["legacyPackages", SYSTEM]);

        let mut runner = InProcessRunner::default();
        input.scrape_prefix_with(&mut runner, &prefix, false).unwrap();

        prop_assert_eq!(runner.pages_run, count.div_ceil(page_size).max(1));
        let db = input.read_only().unwrap();
        prop_assert_eq!(db.count_packages().unwrap(), count as u64);
        prop_assert!(db.completed_attr_set(&prefix).unwrap());
    }
}

/// A failing page leaves exactly the rows of the pages committed before it.
#[test_log::test]
fn test_failed_page_rolls_back() {
    let dir = CanonicalTempDir::new().unwrap();
    let ns = JsonNamespace::from_value(packages_with_failure());
    let input = PkgDbInput::new(ns, config(dir.path(), 2)).unwrap();
    let prefix = path(&["packages", SYSTEM]);

    let err = input
        .scrape_prefix_with(&mut InProcessRunner::default(), &prefix, false)
        .unwrap_err();
    match err {
        ScrapeError::Eval(err) => assert_eq!(err.path, "packages.x86_64-linux.pkg4"),
        other => panic!("expected an evaluation error, got {other}"),
    }

    let db = input.read_only().unwrap();
    assert_eq!(db.count_packages().unwrap(), 4);
    assert!(!db.has_package(&path(&["packages", SYSTEM, "pkg5"])).unwrap());
    assert!(!db.completed_attr_set(&prefix).unwrap());
    assert!(!input.db_path().with_extension("lock").exists());
}

/// Forked pages report evaluation failures through their exit code.
#[test_log::test]
fn test_forked_page_failure() {
    let dir = CanonicalTempDir::new().unwrap();
    let ns = JsonNamespace::from_value(packages_with_failure());
    let input = PkgDbInput::new(ns, config(dir.path(), 2)).unwrap();
    let prefix = path(&["packages", SYSTEM]);

    let mut runner = ForkRunner::new(std::time::Duration::from_millis(5));
    let err = input.scrape_prefix_with(&mut runner, &prefix, false).unwrap_err();
    assert!(matches!(err, ScrapeError::EvalInPage { page: 2 }), "{err}");
    assert_eq!(input.read_only().unwrap().count_packages().unwrap(), 4);
}

/// Forked workers write through their own connections.
#[test_log::test]
fn test_forked_scrape() {
    let dir = CanonicalTempDir::new().unwrap();
    let ns = JsonNamespace::from_value(namespace("legacyPackages", &[SYSTEM], &package_set(7)));
    let config = Config {
        isolation: Isolation::Fork,
        ..config(dir.path(), 2)
    };
    let input = PkgDbInput::new(ns, config).unwrap();
    let prefix = path(&["legacyPackages", SYSTEM]);

    input.scrape_prefix(&prefix, false).unwrap();
    assert!(input.completed(&prefix).unwrap());
    assert_eq!(input.read_only().unwrap().count_packages().unwrap(), 7);
}

/// A completed prefix is not touched again.
#[test_log::test]
fn test_completed_prefix_is_noop() {
    let dir = CanonicalTempDir::new().unwrap();
    let opened = Arc::new(AtomicUsize::new(0));
    let ns = Counting {
        inner: JsonNamespace::from_value(namespace("legacyPackages", &[SYSTEM], &package_set(5))),
        opened: Arc::clone(&opened),
    };
    let input = PkgDbInput::new(ns, config(dir.path(), 2)).unwrap();
    let prefix = path(&["legacyPackages", SYSTEM]);

    input.scrape_prefix(&prefix, false).unwrap();
    assert_eq!(opened.load(Ordering::SeqCst), 3);

    let db_path = input.db_path().to_owned();
    let before = std::fs::metadata(&db_path).unwrap().modified().unwrap();
    let mut runner = InProcessRunner::default();
    input.scrape_prefix_with(&mut runner, &prefix, false).unwrap();
    input
        .scrape_prefix_with(&mut runner, &path(&["legacyPackages", SYSTEM, "pkg0001"]), false)
        .unwrap();

    assert_eq!(runner.pages_run, 0);
    assert_eq!(opened.load(Ordering::SeqCst), 3);
    assert_eq!(std::fs::metadata(&db_path).unwrap().modified().unwrap(), before);
}

/// Forcing a scrape redoes it and keeps row ids stable.
#[test_log::test]
fn test_force_rescrape() {
    let dir = CanonicalTempDir::new().unwrap();
    let ns = JsonNamespace::from_value(namespace("legacyPackages", &[SYSTEM], &package_set(4)));
    let input = PkgDbInput::new(ns, config(dir.path(), 10)).unwrap();
    let prefix = path(&["legacyPackages", SYSTEM]);
    let hello = path(&["legacyPackages", SYSTEM, "pkg0002"]);

    input.scrape_prefix(&prefix, false).unwrap();
    let id = input.read_only().unwrap().package_id(&hello).unwrap();

    let mut runner = InProcessRunner::default();
    input.scrape_prefix_with(&mut runner, &prefix, true).unwrap();
    assert_eq!(runner.pages_run, 1);

    let db = input.read_only().unwrap();
    assert_eq!(db.package_id(&hello).unwrap(), id);
    assert_eq!(db.count_packages().unwrap(), 4);
    assert!(db.completed_attr_set(&prefix).unwrap());
}

/// Evaluation errors inside legacyPackages are skipped.
#[test_log::test]
fn test_legacy_packages_are_best_effort() {
    let dir = CanonicalTempDir::new().unwrap();
    let ns = JsonNamespace::from_value(json!({
        "legacyPackages": { SYSTEM: {
            "hello": derivation_with_meta("hello-2.12.1", "A friendly greeting", "GPL-3.0-or-later"),
            "broken": eval_error("hello is broken"),
            "python3Packages": recursive(json!({
                "requests": derivation("python3.11-requests-2.31.0"),
                "bad": eval_error("unsupported platform"),
                "notASet": 7,
            })),
        }},
    }));
    let input = PkgDbInput::new(ns, config(dir.path(), 100)).unwrap();
    let prefix = path(&["legacyPackages", SYSTEM]);
    input.scrape_prefix(&prefix, false).unwrap();

    let db = input.read_only().unwrap();
    assert_eq!(db.count_packages().unwrap(), 2);
    let requests = db
        .package(db.package_id(&path(&["legacyPackages", SYSTEM, "python3Packages", "requests"])).unwrap())
        .unwrap();
    assert_eq!(requests.pname.as_deref(), Some("python3.11-requests"));
    assert_eq!(requests.version.as_deref(), Some("2.31.0"));
    assert_eq!(requests.rel_path, path(&["python3Packages", "requests"]));

    let hello = db.package(db.package_id(&path(&["legacyPackages", SYSTEM, "hello"])).unwrap()).unwrap();
    assert_eq!(hello.description.as_deref(), Some("A friendly greeting"));
    assert_eq!(hello.license.as_deref(), Some("GPL-3.0-or-later"));
    assert_eq!(hello.outputs_to_install, Some(path(&["out"])));
    assert_eq!(hello.semver.as_deref(), Some("2.12.1"));
}

/// Rules hide packages and force recursion.
#[test_log::test]
fn test_rules_steer_scraping() {
    let dir = CanonicalTempDir::new().unwrap();
    let ns = JsonNamespace::from_value(json!({
        "legacyPackages": { SYSTEM: {
            "hello": derivation("hello-2.12.1"),
            "unwanted": derivation("unwanted-1.0"),
            "hidden": { "inner": derivation("inner-1.0") },
        }},
    }));
    let rules = ScrapeRules::from_json_str(
        r#"{
            "disallowPackage": [["legacyPackages", null, "unwanted"]],
            "allowRecursive": [["legacyPackages", null, "hidden"]]
        }"#,
    )
    .unwrap();
    let input = PkgDbInput::new(ns, config(dir.path(), 100))
        .unwrap()
        .with_rules(rules);
    input.scrape_prefix(&path(&["legacyPackages", SYSTEM]), false).unwrap();

    let db = input.read_only().unwrap();
    assert!(db.has_package(&path(&["legacyPackages", SYSTEM, "hello"])).unwrap());
    assert!(!db.has_package(&path(&["legacyPackages", SYSTEM, "unwanted"])).unwrap());
    assert!(db.has_package(&path(&["legacyPackages", SYSTEM, "hidden", "inner"])).unwrap());
}

/// Every subtree/system pair is scraped; missing ones are skipped.
#[test_log::test]
fn test_scrape_systems() {
    let dir = CanonicalTempDir::new().unwrap();
    let systems = ["x86_64-linux", "aarch64-linux"];
    let mut doc = namespace("packages", &systems, &package_set(2));
    doc["legacyPackages"] = namespace("legacyPackages", &systems, &package_set(3))["legacyPackages"].clone();
    let ns_path = write_namespace(dir.path(), &doc).unwrap();

    let ns = JsonNamespace::from_file(&ns_path).unwrap();
    let cache = dir.path().join("cache");
    let input = PkgDbInput::new(ns, config(&cache, 100)).unwrap();
    input
        .scrape_systems(&DEFAULT_SUBTREES, &["x86_64-linux", "aarch64-linux", "riscv64-linux"])
        .unwrap();

    let db = input.read_only().unwrap();
    assert_eq!(db.count_packages().unwrap(), 10);
    for subtree in DEFAULT_SUBTREES {
        for system in systems {
            assert!(input.completed(&path(&[subtree, system])).unwrap());
        }
    }

    let found = db
        .search(&PackageQuery {
            pname: Some("pkg0001".into()),
            systems: Some(vec!["aarch64-linux".into()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(found.len(), 2);

    assert_eq!(list_databases(&cache).unwrap(), vec![input.db_path().to_owned()]);
    let info = input.locked_flake_info().unwrap();
    assert_eq!(info.fingerprint, input.namespace().fingerprint());
    assert!(info.string.starts_with("path:"));
}

/// An empty prefix is rejected.
#[test_log::test]
fn test_empty_prefix() {
    let dir = CanonicalTempDir::new().unwrap();
    let ns = JsonNamespace::from_value(json!({}));
    let input = PkgDbInput::new(ns, config(dir.path(), 10)).unwrap();
    assert!(matches!(
        input.scrape_prefix(&[], false),
        Err(ScrapeError::InvalidPrefix(_))
    ));
}

/// A catalog from another table generation is rebuilt from scratch.
#[test_log::test]
fn test_tables_mismatch_rebuilds_catalog() {
    let dir = CanonicalTempDir::new().unwrap();
    let doc = namespace("legacyPackages", &[SYSTEM], &package_set(3));
    let input = PkgDbInput::new(JsonNamespace::from_value(doc.clone()), config(dir.path(), 10)).unwrap();
    input.scrape_prefix(&path(&["legacyPackages", SYSTEM]), false).unwrap();
    input
        .read_write()
        .unwrap()
        .connection()
        .execute(
            "UPDATE DbVersions SET version = '1' WHERE name = 'pkgdb_tables_schema'",
            [],
        )
        .unwrap();

    let input = PkgDbInput::new(JsonNamespace::from_value(doc), config(dir.path(), 10)).unwrap();
    let db = input.read_only().unwrap();
    assert_eq!(db.db_versions().unwrap(), Some(SCHEMA_VERSIONS));
    assert_eq!(db.count_packages().unwrap(), 0);
    assert!(!input.completed(&path(&["legacyPackages", SYSTEM])).unwrap());
}

/// A catalog from another view generation keeps its rows.
#[test_log::test]
fn test_views_mismatch_updates_views() {
    let dir = CanonicalTempDir::new().unwrap();
    let doc = namespace("legacyPackages", &[SYSTEM], &package_set(3));
    let input = PkgDbInput::new(JsonNamespace::from_value(doc.clone()), config(dir.path(), 10)).unwrap();
    input.scrape_prefix(&path(&["legacyPackages", SYSTEM]), false).unwrap();
    {
        let db = input.read_write().unwrap();
        db.connection()
            .execute_batch(
                "DROP VIEW v_PackagesSearch;
                 UPDATE DbVersions SET version = '1' WHERE name = 'pkgdb_views_schema';",
            )
            .unwrap();
    }

    let input = PkgDbInput::new(JsonNamespace::from_value(doc), config(dir.path(), 10)).unwrap();
    let db = input.read_only().unwrap();
    assert_eq!(db.db_versions().unwrap(), Some(SCHEMA_VERSIONS));
    assert_eq!(db.count_packages().unwrap(), 3);
    assert_eq!(db.search(&PackageQuery::default()).unwrap().len(), 3);
}

/// A catalog belongs to exactly one namespace.
#[test_log::test]
fn test_fingerprint_mismatch() {
    let dir = CanonicalTempDir::new().unwrap();
    let db_path = dir.path().join("catalog.sqlite");
    PkgDbInput::with_db_path(
        JsonNamespace::from_value(json!({ "packages": {} })),
        config(dir.path(), 10),
        db_path.clone(),
    )
    .unwrap();

    let err = PkgDbInput::with_db_path(
        JsonNamespace::from_value(json!({ "legacyPackages": {} })),
        config(dir.path(), 10),
        db_path,
    )
    .err()
    .unwrap();
    assert!(matches!(
        err,
        ScrapeError::Store(pkgdb_store_db::Error::FingerprintMismatch { .. })
    ));
}
