// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::fmt;

use serde::Serialize;

/// Rule attached to a node of the rules tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScrapeRule {
    /// No opinion; defer to the nearest ancestor.
    #[default]
    Default,
    /// Record the package even if it would be skipped.
    AllowPackage,
    /// Enter the subtree even without `recurseForDerivations`.
    AllowRecursive,
    /// Never record the package.
    DisallowPackage,
    /// Never enter the subtree.
    DisallowRecursive,
}

impl ScrapeRule {
    /// Include/exclude decision carried by this rule.
    pub fn decision(self) -> Option<bool> {
        match self {
            Self::Default => None,
            Self::AllowPackage | Self::AllowRecursive => Some(true),
            Self::DisallowPackage | Self::DisallowRecursive => Some(false),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AllowPackage => "allowPackage",
            Self::AllowRecursive => "allowRecursive",
            Self::DisallowPackage => "disallowPackage",
            Self::DisallowRecursive => "disallowRecursive",
        }
    }
}

impl fmt::Display for ScrapeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
