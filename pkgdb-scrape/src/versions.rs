// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Version string analysis.

use std::sync::LazyLock;

use regex::Regex;

static SEMVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)\.(0|[1-9][0-9]*)(-[-[:alnum:]_+.]+)?$")
        .unwrap()
});

/// Loose semver, e.g. `foo@v1.02-pre`.
///
/// Groups: 3 major, 5 minor, 7 patch, 8 pre-release tag.
static SEMVER_COERCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(.*@)?[vV]?(0*([0-9]+)(\.0*([0-9]+)(\.0*([0-9]+))?)?(-[-[:alnum:]_+.]+)?)$",
    )
    .unwrap()
});

/// `Y-M-D` or `M-D-Y` dates with an optional tag.
static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([12][0-9][0-9][0-9]-[0-1]?[0-9]-[0-3]?[0-9]|[0-1]?[0-9]-[0-3]?[0-9]-[12][0-9][0-9][0-9])(-[-[:alnum:]_+.]+)?$",
    )
    .unwrap()
});

pub fn is_semver(version: &str) -> bool {
    SEMVER.is_match(version)
}

pub fn is_date(version: &str) -> bool {
    DATE.is_match(version)
}

/// Coerce a loose version into `MAJOR.MINOR.PATCH[-TAG]`.
///
/// Missing components become `0` and leading zeros are dropped. Dates never
/// coerce.
pub fn coerce_semver(version: &str) -> Option<String> {
    if is_semver(version) {
        return Some(version.to_owned());
    }
    if is_date(version) {
        return None;
    }
    let caps = SEMVER_COERCE.captures(version)?;
    let group = |idx| caps.get(idx).map_or("", |m| m.as_str());

    let minor = match group(5) {
        "" => "0",
        minor => minor,
    };
    let patch = match group(7) {
        "" => "0",
        patch => patch,
    };
    Some(format!("{}.{minor}.{patch}{}", group(3), group(8)))
}

/// Split a derivation name into `pname` and `version`.
///
/// The version starts after the first `-` that is followed by a character
/// other than an ASCII letter.
pub fn parse_drv_name(name: &str) -> (&str, Option<&str>) {
    let bytes = name.as_bytes();
    for (i, byte) in bytes.iter().enumerate() {
        if *byte == b'-' && bytes.get(i + 1).is_some_and(|next| !next.is_ascii_alphabetic()) {
            return (&name[..i], Some(&name[i + 1..]));
        }
    }
    (name, None)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("1.2.3", Some("1.2.3"))]
    #[case("4.2.0-pre", Some("4.2.0-pre"))]
    #[case("v1.2", Some("1.2.0"))]
    #[case("V3", Some("3.0.0"))]
    #[case("1.02.0-pre", Some("1.2.0-pre"))]
    #[case("foo@v1.0.7", Some("1.0.7"))]
    #[case("0", Some("0.0.0"))]
    #[case("2023-05-31", None)]
    #[case("5-1-2023", None)]
    #[case("unstable", None)]
    #[case("1.2.3.4", None)]
    #[case("", None)]
    fn coerce(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(coerce_semver(input).as_deref(), expected);
    }

    #[rstest]
    #[case("1.2.3", true)]
    #[case("01.2.3", false)]
    #[case("1.2", false)]
    #[case("1.2.3-rc.1+build", true)]
    fn semver(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_semver(input), expected);
    }

    #[rstest]
    #[case("2023-05-31", true)]
    #[case("2023-5-1-unstable", true)]
    #[case("12-31-1999", true)]
    #[case("1.2.3", false)]
    fn date(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_date(input), expected);
    }

    #[rstest]
    #[case("hello-2.12.1", "hello", Some("2.12.1"))]
    #[case("python3.11-requests-2.31.0", "python3.11-requests", Some("2.31.0"))]
    #[case("hello", "hello", None)]
    #[case("foo-", "foo-", None)]
    #[case("git-minimal-2.42.0", "git-minimal", Some("2.42.0"))]
    #[case("font-awesome-unstable-2021", "font-awesome-unstable", Some("2021"))]
    fn drv_name(#[case] name: &str, #[case] pname: &str, #[case] version: Option<&str>) {
        assert_eq!(parse_drv_name(name), (pname, version));
    }
}
