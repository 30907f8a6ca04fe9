//! Read-only checks on a finished archive: listing its entries and
//! verifying them against the source tree they were packed from.

use anyhow::{Context, Result};
use log::warn;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::paths::{archive_entry_name, clean_source, resolve_target_base};
use crate::settings::DEFAULT_BUFFER_SIZE;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntryInfo {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub crc32: u32,
    pub is_dir: bool,
}

/// List archive entries in the order they were written.
pub fn list_archive(archive_path: &Path) -> Result<Vec<ArchiveEntryInfo>> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read zip directory of {}", archive_path.display()))?;

    let mut out = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip
            .by_index_raw(i)
            .with_context(|| format!("Failed to read entry #{}", i))?;
        out.push(ArchiveEntryInfo {
            name: entry.name().to_string(),
            size: entry.size(),
            compressed_size: entry.compressed_size(),
            crc32: entry.crc32(),
            is_dir: entry.is_dir(),
        });
    }
    Ok(out)
}

/// Outcome of [`verify_archive`]. Each list holds archive entry names,
/// except `unarchived`, which holds source paths.
#[derive(Clone, Debug, Default)]
pub struct VerifyReport {
    /// Entries whose content matched their source file
    pub matched: u64,
    /// Entries outside the target base, or whose name would resolve
    /// outside the source tree
    pub foreign: Vec<String>,
    /// Entries that failed to decompress or failed their CRC check
    pub corrupt: Vec<String>,
    /// Entries with no source file
    pub missing: Vec<String>,
    /// Entries whose size or checksum differs from the source file
    pub mismatched: Vec<String>,
    /// Regular source files with no entry
    pub unarchived: Vec<PathBuf>,
    /// Source paths that could not be read or walked, with the error
    pub unreadable: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.foreign.is_empty()
            && self.corrupt.is_empty()
            && self.missing.is_empty()
            && self.mismatched.is_empty()
            && self.unarchived.is_empty()
            && self.unreadable.is_empty()
    }
}

/// Check an archive made by `pack` against `source`.
///
/// `target_base` follows the same resolution rules as packing, so passing
/// the value given to `pack` (or `None` for both) lines the names up.
pub fn verify_archive(archive_path: &Path, source: &Path, target_base: Option<&str>) -> Result<VerifyReport> {
    let source = clean_source(source);
    let base = resolve_target_base(&source, target_base);
    let prefix = format!("{}/", base);

    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read zip directory of {}", archive_path.display()))?;

    let mut report = VerifyReport::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .with_context(|| format!("Failed to read entry #{}", i))?;
        let name = entry.name().to_string();
        if entry.is_dir() {
            continue;
        }

        let path = match name.strip_prefix(&prefix).and_then(|rel| source_path(&source, rel)) {
            Some(path) => path,
            None => {
                report.foreign.push(name);
                continue;
            }
        };
        seen.insert(name.clone());

        let expected_crc = entry.crc32();
        let expected_size = entry.size();

        // Reading to the end makes the zip reader check the stored CRC.
        if let Err(e) = drain(&mut entry, &mut buf) {
            warn!("{}: {}", name, e);
            report.corrupt.push(name);
            continue;
        }

        match crc32_file(&path, &mut buf) {
            Ok((size, crc)) if size == expected_size && crc == expected_crc => report.matched += 1,
            Ok(_) => report.mismatched.push(name),
            Err(e) if e.kind() == io::ErrorKind::NotFound => report.missing.push(name),
            Err(e) => {
                warn!("Failed to read source file {}: {}", path.display(), e);
                report.unreadable.push(format!("{}: {}", path.display(), e));
            }
        }
    }

    for item in WalkDir::new(&source).follow_links(false).sort_by_file_name() {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                warn!("{}", e);
                report.unreadable.push(e.to_string());
                continue;
            }
        };
        if !item.file_type().is_file() {
            continue;
        }
        if !seen.contains(&archive_entry_name(&source, &base, item.path())) {
            report.unarchived.push(item.into_path());
        }
    }

    Ok(report)
}

/// Map the part of an entry name below the target base onto `source`.
/// Names with `..`, root or prefix parts have no place in the source tree.
fn source_path(source: &Path, rel: &str) -> Option<PathBuf> {
    let rel = Path::new(rel);
    if rel.as_os_str().is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(source.join(rel))
}

fn drain<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<u64> {
    let mut total = 0u64;
    loop {
        match reader.read(buf) {
            Ok(0) => return Ok(total),
            Ok(n) => total += n as u64,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

fn crc32_file(path: &Path, buf: &mut [u8]) -> io::Result<(u64, u32)> {
    let mut file = File::open(path)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut size = 0u64;
    loop {
        let n = match file.read(buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hasher.finalize()))
}
