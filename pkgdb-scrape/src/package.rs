// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Normalization of derivation metadata into catalog rows.

use pkgdb_store_db::PackageParams;

use crate::cursor::PackageMeta;
use crate::versions::{coerce_semver, parse_drv_name};

/// Outputs installed by default: the declared outputs up to and including `out`.
pub fn default_outputs_to_install(outputs: &[String]) -> Vec<String> {
    match outputs.iter().position(|o| o == "out") {
        Some(idx) => outputs[..=idx].to_vec(),
        None => outputs.to_vec(),
    }
}

/// Build the `Packages` row for the leaf `attr_name`.
///
/// `pname` and `version` fall back to parsing `name`; `semver` falls back to
/// coercing `version`.
pub fn package_params(attr_name: &str, meta: PackageMeta) -> PackageParams {
    let (parsed_pname, parsed_version) = parse_drv_name(&meta.name);
    let pname = meta.pname.or_else(|| Some(parsed_pname.to_owned()));
    let version = meta
        .version
        .filter(|v| !v.is_empty())
        .or_else(|| parsed_version.map(str::to_owned));
    let semver = meta
        .semver
        .or_else(|| version.as_deref().and_then(coerce_semver));
    let outputs = if meta.outputs.is_empty() {
        vec!["out".to_owned()]
    } else {
        meta.outputs
    };
    let outputs_to_install = meta
        .outputs_to_install
        .unwrap_or_else(|| default_outputs_to_install(&outputs));

    PackageParams {
        attr_name: attr_name.to_owned(),
        name: meta.name,
        pname,
        version,
        semver,
        license: meta.license,
        outputs,
        outputs_to_install: Some(outputs_to_install),
        broken: meta.broken,
        unfree: meta.unfree,
        description: meta.description,
    }
}
