// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};

/// Attribute path where `None` stands for "every default system".
pub type AttrPathGlob = Vec<Option<String>>;

/// Rules file contents before they are folded into a tree.
///
/// Lists are applied in field order, which is also their precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ScrapeRulesRaw {
    pub allow_package: Vec<AttrPathGlob>,
    pub disallow_package: Vec<AttrPathGlob>,
    pub allow_recursive: Vec<AttrPathGlob>,
    pub disallow_recursive: Vec<AttrPathGlob>,
}

/// Render a glob path for messages, `*` standing in for a glob segment.
pub(crate) fn display_glob(path: &[Option<String>]) -> String {
    path.iter()
        .map(|segment| segment.as_deref().unwrap_or("*"))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_lists() {
        let raw: ScrapeRulesRaw = serde_json::from_str(
            r#"{
                "allowPackage": [["legacyPackages", "x86_64-linux", "hello"]],
                "disallowRecursive": [["legacyPackages", null, "pkgsCross"]]
            }"#,
        )
        .unwrap();
        assert_eq!(raw.allow_package.len(), 1);
        assert!(raw.disallow_package.is_empty());
        assert_eq!(raw.disallow_recursive[0][1], None);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = serde_json::from_str::<ScrapeRulesRaw>(r#"{"allowAlias": []}"#).unwrap_err();
        assert!(err.to_string().contains("allowAlias"));
    }

    #[test]
    fn glob_display() {
        let path = vec![Some("legacyPackages".to_string()), None, Some("darwin".to_string())];
        assert_eq!(display_glob(&path), "legacyPackages.*.darwin");
    }
}
