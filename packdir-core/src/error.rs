//! Error types for packing.
//!
//! Only [`PackError::CreateDestination`] stops a pack. Everything that goes
//! wrong with a single entry is an [`EntryError`], which the archiver logs
//! and counts before moving on.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::archiver::PackResult;

/// Operation-level errors
#[derive(Debug, Error)]
pub enum PackError {
    /// The destination archive could not be created. `scanned` holds the
    /// result of the scan phase, which had already run.
    #[error("Failed to create archive {}: {source}", .path.display())]
    CreateDestination {
        path: PathBuf,
        scanned: PackResult,
        #[source]
        source: io::Error,
    },

    /// The archive was written but some entries or the final close failed.
    #[error("Archive is incomplete: {result}")]
    Incomplete { result: PackResult },
}

impl PackError {
    /// Counters gathered before the error.
    pub fn partial_result(&self) -> &PackResult {
        match self {
            Self::CreateDestination { scanned, .. } => scanned,
            Self::Incomplete { result } => result,
        }
    }
}

/// Per-entry errors, counted into [`PackResult::archive_errors`]
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("Failed to stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start archive entry {name}: {source}")]
    StartEntry {
        name: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to copy {} into archive: {source}", .path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
