//! Path handling: source cleaning, target base resolution and the mapping
//! from a scanned path to its name inside the archive.

use std::path::{Component, Path, PathBuf};

use crate::settings::FALLBACK_BASE_DIR;

/// Lexically normalize a source path: drops `.` components and trailing
/// separators. An empty result becomes `.`.
pub fn clean_source(source: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in source.components() {
        match comp {
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Resolve the directory prefix every archive entry is stored under.
///
/// An empty or missing `requested` value falls back to the last component
/// of `source`. Backslashes count as separators, and only normal components
/// survive, so a base like `/snap` or `../up` can never lift entries out of
/// the archive root. When nothing is left (`.`, `/`, or a source without a
/// last component like `..`) the base is [`FALLBACK_BASE_DIR`].
pub fn resolve_target_base(source: &Path, requested: Option<&str>) -> String {
    let base = match requested.filter(|s| !s.is_empty()) {
        Some(s) => s.replace('\\', "/"),
        None => clean_source(source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let parts = normal_parts(Path::new(&base));
    if parts.is_empty() {
        FALLBACK_BASE_DIR.to_string()
    } else {
        parts.join("/")
    }
}

/// Name of `entry` inside the archive: `target_base/<path relative to source>`.
///
/// The source prefix is removed component-wise, so a sibling such as
/// `data-old/x` is never mistaken for something under `data`. Only normal
/// components are kept, which also drops any leading separator.
pub fn archive_entry_name(source: &Path, target_base: &str, entry: &Path) -> String {
    let rel = entry.strip_prefix(source).unwrap_or(entry);
    let parts = normal_parts(rel);

    if parts.is_empty() {
        target_base.to_string()
    } else {
        format!("{}/{}", target_base, parts.join("/"))
    }
}

fn normal_parts(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}
