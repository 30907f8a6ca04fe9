//! Directory scanning.
//!
//! The walk is pre-order with siblings in file-name order, so a directory
//! always comes before anything inside it. That order is what ends up in
//! the archive. Errors on single entries are counted and skipped; the walk
//! itself never fails.

use log::{info, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::settings::PackFlags;

#[derive(Debug, Default, Clone)]
pub struct ScanOutcome {
    /// Every entry reached, directories included, root first
    pub entries: Vec<PathBuf>,
    /// Sum of regular file sizes
    pub total_size: u64,
    pub errors: u64,
}

pub fn scan(root: &Path, flags: &PackFlags) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();

    if flags.verbose {
        info!("Scanning directory {}...", root.display());
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();

    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                if flags.print_errors {
                    warn!("{}", e);
                }
                outcome.errors += 1;
                continue;
            }
        };

        if entry.file_type().is_file() {
            match entry.metadata() {
                Ok(meta) => outcome.total_size += meta.len(),
                Err(e) => {
                    if flags.print_errors {
                        warn!("{}", e);
                    }
                    outcome.errors += 1;
                    continue;
                }
            }
        }

        outcome.entries.push(entry.into_path());
    }

    if flags.verbose {
        info!("Scanning done: {} entries.", outcome.entries.len());
    }

    outcome
}
