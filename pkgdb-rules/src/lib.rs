// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Scrape rules.
//!
//! A rule set decides, for any attribute path of a namespace, whether the
//! scraper must record it, must skip it, or has no opinion. Rules are read
//! from four ordered lists and folded into a [`RulesTreeNode`] tree; lookups
//! inherit the rule of the nearest ancestor.
//!
//! ```
//! use pkgdb_rules::ScrapeRules;
//!
//! let rules = ScrapeRules::from_json_str_with_systems(
//!     r#"{"allowRecursive": [["groupA", null, "sub"]]}"#,
//!     &["s1", "s2", "s3", "s4"],
//! )?;
//! assert_eq!(rules.apply_rules(&["groupA", "s2", "sub", "pkg"]), Some(true));
//! assert_eq!(rules.apply_rules(&["groupA", "s2", "other"]), None);
//! # Ok::<(), pkgdb_rules::RulesError>(())
//! ```

mod error;
mod raw;
mod rule;
mod rules;
mod tree;

pub use error::RulesError;
pub use raw::{AttrPathGlob, ScrapeRulesRaw};
pub use rule::ScrapeRule;
pub use rules::{DEFAULT_SYSTEMS, ScrapeRules};
pub use tree::RulesTreeNode;
