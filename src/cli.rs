//! Command-line interface for packdir

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "packdir")]
#[command(about = "packdir - Snapshot a directory into a zip archive", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pack a directory into a zip archive
    Create {
        /// Directory to snapshot
        source: PathBuf,

        /// Output zip file
        #[arg(short, long)]
        output: PathBuf,

        /// Directory prefix for every entry (defaults to the source directory name)
        #[arg(short, long)]
        base: Option<String>,

        /// Compression level: -2 fastest, -1 default, 0 store, 1-9 effort (others fall back to 2)
        #[arg(short, long, default_value = "-1", allow_negative_numbers = true)]
        level: i32,

        /// Print a summary with counts and total size
        #[arg(long)]
        info: bool,

        /// Print a line for every scan or archive error
        #[arg(long)]
        errors: bool,

        /// Show a live progress bar
        #[arg(long)]
        progress: bool,

        /// Print every file as it is compressed
        #[arg(short, long)]
        verbose: bool,
    },

    /// List archive contents
    List {
        /// Archive file
        archive: PathBuf,
    },

    /// Check an archive against the directory it was packed from
    Verify {
        /// Archive file
        archive: PathBuf,

        /// Source directory
        source: PathBuf,

        /// Directory prefix used when packing
        #[arg(short, long)]
        base: Option<String>,
    },
}
