// SPDX-FileCopyrightText: 2026 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Page size selection from available memory.

use tracing::{debug, warn};

/// Overrides the detected free memory, in KiB.
pub const AVAILABLE_MEMORY_ENV: &str = "PKGDB_AVAILABLE_MEMORY";

pub const MIN_PAGE_SIZE: usize = 1_000;
pub const MAX_PAGE_SIZE: usize = 100_000;

const GIB_IN_KIB: u64 = 1024 * 1024;

/// `(minimum free KiB, page size)`, largest first.
const PAGE_SIZE_THRESHOLDS: [(u64, usize); 5] = [
    (16 * GIB_IN_KIB, MAX_PAGE_SIZE),
    (8 * GIB_IN_KIB, 50_000),
    (4 * GIB_IN_KIB, 25_000),
    (2 * GIB_IN_KIB, 10_000),
    (GIB_IN_KIB, 5_000),
];

/// Page size for `available_kib` of free memory.
pub fn page_size_for_memory(available_kib: u64) -> usize {
    PAGE_SIZE_THRESHOLDS
        .iter()
        .find(|(threshold, _)| available_kib >= *threshold)
        .map_or(MIN_PAGE_SIZE, |(_, size)| *size)
}

/// Free memory in KiB, from `env_override` when it parses.
pub fn available_memory_kib(env_override: Option<&str>) -> Option<u64> {
    if let Some(raw) = env_override {
        match raw.trim().parse() {
            Ok(kib) => return Some(kib),
            Err(e) => warn!("ignoring {AVAILABLE_MEMORY_ENV}={raw:?}: {e}"),
        }
    }
    system_available_kib()
}

/// `MemAvailable` from the contents of `/proc/meminfo`, in KiB.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn meminfo_available_kib(meminfo: &str) -> Option<u64> {
    meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemAvailable:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse().ok())
}

/// Memory available for new work, in KiB.
///
/// Prefers the kernel's `MemAvailable`, which counts reclaimable page cache.
/// Without it, `sysinfo` free RAM is used, which excludes the page cache and
/// so underestimates on a busy host.
#[cfg(target_os = "linux")]
fn system_available_kib() -> Option<u64> {
    match std::fs::read_to_string("/proc/meminfo") {
        Ok(meminfo) => {
            if let Some(kib) = meminfo_available_kib(&meminfo) {
                return Some(kib);
            }
        }
        Err(e) => debug!("cannot read /proc/meminfo: {e}"),
    }
    match nix::sys::sysinfo::sysinfo() {
        Ok(info) => Some(info.ram_unused() / 1024),
        Err(e) => {
            warn!("sysinfo failed: {e}");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn system_available_kib() -> Option<u64> {
    None
}

/// Page size for this run.
///
/// An explicit `configured` size wins; otherwise the size follows the free
/// memory, falling back to [`MIN_PAGE_SIZE`] when it is unknown.
pub fn page_size(configured: Option<usize>, env_override: Option<&str>) -> usize {
    if let Some(size) = configured {
        return size.max(1);
    }
    let size = available_memory_kib(env_override).map_or(MIN_PAGE_SIZE, page_size_for_memory);
    debug!("using page size {size}");
    size
}
