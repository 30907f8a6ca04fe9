//! packdir - Snapshot a directory tree into a portable zip archive

use anyhow::{bail, Result};
use clap::Parser;
use indicatif::HumanBytes;
use packdir_core::progress::{bar_callback, new_bar};
use packdir_core::{list_archive, pack, verify_archive, PackFlags, PackSettings};
use tracing_subscriber::EnvFilter;

mod cli;
use cli::{Cli, Commands};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Commands::Create {
            source,
            output,
            base,
            level,
            info,
            errors,
            progress,
            verbose,
        } => {
            let settings = PackSettings {
                target_base_dir: base,
                compression_level: level,
                flags: PackFlags {
                    print_info: info,
                    print_errors: errors,
                    show_progress: progress,
                    verbose,
                },
                ..PackSettings::default()
            };

            let pb = if progress { Some(new_bar()) } else { None };
            let callback = pb.clone().map(bar_callback);

            let result = pack(&source, &output, &settings, callback);

            if let Some(pb) = pb {
                pb.finish_with_message("Complete");
            }

            let result = result?;
            println!("Archive: {}", output.display());
            println!("  Scanned: {} entries ({})", result.entries, HumanBytes(result.total_size));
            println!("  Archived: {} files", result.archived_files);
            if result.scan_errors > 0 || result.archive_errors > 0 {
                println!("  Scan errors: {}", result.scan_errors);
                println!("  Archive errors: {}", result.archive_errors);
            }

            result.into_result()?;
            Ok(())
        }

        Commands::List { archive } => {
            let entries = list_archive(&archive)?;
            for entry in &entries {
                println!(
                    "{:>12} {:>12}  {:08x}  {}",
                    entry.size, entry.compressed_size, entry.crc32, entry.name
                );
            }
            let total: u64 = entries.iter().map(|e| e.size).sum();
            println!("{} entries, {}", entries.len(), HumanBytes(total));
            Ok(())
        }

        Commands::Verify { archive, source, base } => {
            let report = verify_archive(&archive, &source, base.as_deref())?;

            println!("Matched: {}", report.matched);
            for name in &report.foreign {
                println!("  foreign:    {}", name);
            }
            for name in &report.corrupt {
                println!("  corrupt:    {}", name);
            }
            for name in &report.missing {
                println!("  missing:    {}", name);
            }
            for name in &report.mismatched {
                println!("  mismatched: {}", name);
            }
            for path in &report.unarchived {
                println!("  unarchived: {}", path.display());
            }
            for problem in &report.unreadable {
                println!("  unreadable: {}", problem);
            }

            if !report.is_clean() {
                bail!("{} does not match {}", archive.display(), source.display());
            }
            println!("OK");
            Ok(())
        }
    }
}
