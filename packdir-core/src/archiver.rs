//! Pack a scanned directory tree into a zip archive.
//!
//! Every regular file becomes one entry named `target_base/<relative path>`.
//! A failure on one file is logged and counted, never fatal; only failing to
//! create the destination file aborts the operation.

use indicatif::HumanBytes;
use log::{debug, info, warn};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use zip::write::{FileOptions, ZipWriter};

use crate::error::{EntryError, PackError};
use crate::level::CompressionLevel;
use crate::paths::{archive_entry_name, clean_source, resolve_target_base};
use crate::progress::ProgressFn;
use crate::scanner::scan;
use crate::settings::{PackFlags, PackSettings, DEFAULT_BUFFER_SIZE};

/// Counters for one pack operation.
///
/// A successful return from [`pack`] does not mean every file made it
/// into the archive. Check [`PackResult::is_complete`] or call
/// [`PackResult::into_result`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackResult {
    /// Entries found by the scan, directories included
    pub entries: u64,
    /// Total size of the regular files found by the scan
    pub total_size: u64,
    pub scan_errors: u64,
    /// Archive entries actually written
    pub archived_files: u64,
    pub archive_errors: u64,
    /// The archive writer was closed without error
    pub finalized: bool,
}

impl PackResult {
    pub fn is_complete(&self) -> bool {
        self.scan_errors == 0 && self.archive_errors == 0 && self.finalized
    }

    /// Turn any recorded failure into [`PackError::Incomplete`].
    pub fn into_result(self) -> Result<PackResult, PackError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(PackError::Incomplete { result: self })
        }
    }
}

impl fmt::Display for PackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries ({}), {} archived, {} scan errors, {} archive errors",
            self.entries,
            HumanBytes(self.total_size),
            self.archived_files,
            self.scan_errors,
            self.archive_errors
        )?;
        if !self.finalized {
            write!(f, ", not finalized")?;
        }
        Ok(())
    }
}

/// Streams files into a zip writer under a fixed target base.
pub struct Archiver<W: Write + Seek> {
    writer: ZipWriter<Output<W>>,
    muted: Arc<AtomicBool>,
    source: PathBuf,
    target_base: String,
    options: FileOptions,
    buffer: Vec<u8>,
    flags: PackFlags,
}

impl<W: Write + Seek> Archiver<W> {
    pub fn new(
        out: W,
        source: &Path,
        target_base: &str,
        level: CompressionLevel,
        flags: PackFlags,
        buffer_size: usize,
    ) -> Self {
        let buffer_size = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };
        let muted = Arc::new(AtomicBool::new(false));
        Self {
            writer: ZipWriter::new(Output::new(out, muted.clone())),
            muted,
            source: source.to_path_buf(),
            target_base: target_base.to_string(),
            options: level.file_options(),
            buffer: vec![0u8; buffer_size],
            flags,
        }
    }

    /// Add one scanned path. Returns `Ok(false)` for anything that is not a
    /// regular file (directories, symlinks, devices), which is skipped.
    pub fn add_path(&mut self, path: &Path) -> Result<bool, EntryError> {
        let meta = fs::symlink_metadata(path).map_err(|source| EntryError::Stat {
            path: path.to_path_buf(),
            source,
        })?;

        if meta.is_dir() {
            return Ok(false);
        }
        if !meta.is_file() {
            if self.flags.verbose {
                debug!("Skipping non-regular file {}", path.display());
            }
            return Ok(false);
        }

        if self.flags.verbose {
            info!("Compressing {}", path.display());
        }

        let mut source = File::open(path).map_err(|source| EntryError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let size = source
            .metadata()
            .map_err(|source| EntryError::Stat {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        let name = archive_entry_name(&self.source, &self.target_base, path);
        let options = entry_options(self.options, &meta, size);

        self.writer
            .start_file(name.as_str(), options)
            .map_err(|source| EntryError::StartEntry { name, source })?;

        copy_with_buffer(&mut source, &mut self.writer, &mut self.buffer).map_err(|source| {
            EntryError::Copy {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Ok(true)
    }

    /// Add every path in order, counting written entries and failures into
    /// `result`. `progress` is called once per path.
    pub fn add_entries(
        &mut self,
        entries: &[PathBuf],
        progress: Option<&ProgressFn>,
        result: &mut PackResult,
    ) {
        let total = entries.len();
        for (i, path) in entries.iter().enumerate() {
            match self.add_path(path) {
                Ok(true) => result.archived_files += 1,
                Ok(false) => {}
                Err(e) => {
                    if self.flags.print_errors {
                        warn!("{}", e);
                    }
                    result.archive_errors += 1;
                }
            }

            if let Some(cb) = progress {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                cb(i + 1, total, &name);
            }
        }
    }

    /// Write the central directory and hand back the underlying writer.
    ///
    /// On failure the output is muted before the zip writer is dropped, so
    /// its drop-time finalize neither touches the output again nor reports
    /// anything on its own.
    pub fn finish(mut self) -> zip::result::ZipResult<W> {
        match self.writer.finish() {
            Ok(out) => Ok(out.inner),
            Err(e) => {
                self.muted.store(true, Ordering::Relaxed);
                Err(e)
            }
        }
    }
}

/// Archive output that can be switched into a discarding mode.
///
/// While muted, writes are accepted and dropped and every seek reports the
/// furthest position reached, which keeps the zip writer's offset arithmetic
/// consistent.
struct Output<W> {
    inner: W,
    muted: Arc<AtomicBool>,
    pos: u64,
    high: u64,
}

impl<W> Output<W> {
    fn new(inner: W, muted: Arc<AtomicBool>) -> Self {
        Self {
            inner,
            muted,
            pos: 0,
            high: 0,
        }
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    fn moved_to(&mut self, pos: u64) {
        self.pos = pos;
        self.high = self.high.max(pos);
    }
}

impl<W: Write> Write for Output<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.is_muted() {
            return Ok(buf.len());
        }
        let n = self.inner.write(buf)?;
        self.moved_to(self.pos + n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.is_muted() {
            return Ok(());
        }
        self.inner.flush()
    }
}

impl<W: Seek> Seek for Output<W> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        if self.is_muted() {
            return Ok(self.high);
        }
        let pos = self.inner.seek(pos)?;
        self.moved_to(pos);
        Ok(pos)
    }
}

#[cfg(unix)]
fn entry_options(base: FileOptions, meta: &fs::Metadata, size: u64) -> FileOptions {
    use std::os::unix::fs::PermissionsExt;
    base.large_file(size >= u32::MAX as u64)
        .unix_permissions(meta.permissions().mode())
}

#[cfg(not(unix))]
fn entry_options(base: FileOptions, _meta: &fs::Metadata, size: u64) -> FileOptions {
    base.large_file(size >= u32::MAX as u64)
}

/// `io::copy` with a caller-owned buffer, so one allocation serves every file.
fn copy_with_buffer<R: Read, W: Write>(reader: &mut R, writer: &mut W, buf: &mut [u8]) -> io::Result<u64> {
    let mut copied = 0u64;
    loop {
        let n = match reader.read(buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        copied += n as u64;
    }
    Ok(copied)
}

/// Pack `source` into the zip file `out_file`.
///
/// Files are stored under the resolved target base (see
/// [`resolve_target_base`]) in scan order. Only a failure to create
/// `out_file` is returned as an error, carrying the scan-phase counters.
/// Scan, per-file and finalization errors are counted into the returned
/// [`PackResult`]; an `Ok` result can still describe an incomplete archive.
pub fn pack(
    source: &Path,
    out_file: &Path,
    settings: &PackSettings,
    progress: Option<Arc<ProgressFn>>,
) -> Result<PackResult, PackError> {
    let flags = settings.flags;

    let (level, clamped) = CompressionLevel::clamp(settings.compression_level);
    if clamped && flags.print_errors {
        warn!(
            "Unsupported compression level {}, using level {} instead.",
            settings.compression_level,
            level.get()
        );
    }

    let source = clean_source(source);
    let target_base = resolve_target_base(&source, settings.target_base_dir.as_deref());

    let scanned = scan(&source, &flags);
    let mut result = PackResult {
        entries: scanned.entries.len() as u64,
        total_size: scanned.total_size,
        scan_errors: scanned.errors,
        ..PackResult::default()
    };

    if flags.print_info {
        info!(
            "Archiving {} files with total size {}, {} errors during scan.",
            scanned.entries.len(),
            HumanBytes(scanned.total_size),
            scanned.errors
        );
    }

    let out = match File::create(out_file) {
        Ok(f) => f,
        Err(e) => {
            if flags.print_errors {
                warn!("Failed to create {}: {}", out_file.display(), e);
            }
            return Err(PackError::CreateDestination {
                path: out_file.to_path_buf(),
                scanned: result,
                source: e,
            });
        }
    };

    let mut archiver = Archiver::new(
        BufWriter::new(out),
        &source,
        &target_base,
        level,
        flags,
        settings.buffer_size,
    );

    let progress = progress.filter(|_| flags.show_progress);
    archiver.add_entries(&scanned.entries, progress.as_deref(), &mut result);

    let closed = archiver
        .finish()
        .and_then(|mut w| w.flush().map_err(zip::result::ZipError::from));
    match closed {
        Ok(()) => result.finalized = true,
        Err(e) => {
            if flags.print_errors {
                warn!("Failed to finalize {}: {}", out_file.display(), e);
            }
            result.archive_errors += 1;
        }
    }

    if flags.print_info {
        if result.archive_errors > 0 {
            info!("Done, {} errors during archiving.", result.archive_errors);
        } else {
            info!("Done.");
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    fn read_entries(archive: &Path) -> Result<Vec<(String, Vec<u8>)>> {
        let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
        let mut out = Vec::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            out.push((entry.name().to_string(), data));
        }
        Ok(out)
    }

    fn sample_tree() -> Result<tempfile::TempDir> {
        let temp_dir = tempfile::TempDir::new()?;
        fs::write(temp_dir.path().join("a.txt"), b"0123456789")?;
        fs::create_dir(temp_dir.path().join("sub"))?;
        fs::write(temp_dir.path().join("sub/b.txt"), b"01234567890123456789")?;
        Ok(temp_dir)
    }

    #[test]
    fn packs_tree_under_target_base() -> Result<()> {
        let src = sample_tree()?;
        let out_dir = tempfile::TempDir::new()?;
        let out = out_dir.path().join("snap.zip");

        let settings = PackSettings {
            target_base_dir: Some("snap".to_string()),
            ..PackSettings::default()
        };
        let result = pack(src.path(), &out, &settings, None)?;

        assert_eq!(result.total_size, 30);
        assert_eq!(result.entries, 4);
        assert_eq!(result.archived_files, 2);
        assert_eq!(result.scan_errors, 0);
        assert_eq!(result.archive_errors, 0);
        assert!(result.finalized);

        let entries = read_entries(&out)?;
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["snap/a.txt", "snap/sub/b.txt"]);
        assert_eq!(entries[0].1, b"0123456789");
        assert_eq!(entries[1].1, b"01234567890123456789");
        Ok(())
    }

    #[test]
    fn default_base_is_source_dir_name() -> Result<()> {
        let parent = tempfile::TempDir::new()?;
        let src = parent.path().join("photos");
        fs::create_dir(&src)?;
        fs::write(src.join("img.raw"), b"pixels")?;
        let out = parent.path().join("out.zip");

        pack(&src, &out, &PackSettings::default(), None)?;

        let entries = read_entries(&out)?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "photos/img.raw");
        Ok(())
    }

    #[test]
    fn trailing_separator_on_base_is_dropped() -> Result<()> {
        let src = sample_tree()?;
        let out_dir = tempfile::TempDir::new()?;
        let out = out_dir.path().join("o.zip");
        let settings = PackSettings {
            target_base_dir: Some("backup/".to_string()),
            ..PackSettings::default()
        };
        pack(src.path(), &out, &settings, None)?;

        for (name, _) in read_entries(&out)? {
            assert!(name.starts_with("backup/"), "{}", name);
            assert!(!name.starts_with("backup//"), "{}", name);
        }
        Ok(())
    }

    #[test]
    fn out_of_range_level_still_packs() -> Result<()> {
        let src = sample_tree()?;
        let out_dir = tempfile::TempDir::new()?;
        let out = out_dir.path().join("o.zip");
        let settings = PackSettings {
            compression_level: 42,
            flags: PackFlags::all(),
            ..PackSettings::default()
        };
        let result = pack(src.path(), &out, &settings, None)?;
        assert!(result.is_complete());
        assert_eq!(read_entries(&out)?.len(), 2);
        Ok(())
    }

    #[test]
    fn level_zero_stores_entries() -> Result<()> {
        let src = sample_tree()?;
        let out_dir = tempfile::TempDir::new()?;
        let out = out_dir.path().join("o.zip");
        let settings = PackSettings {
            compression_level: 0,
            ..PackSettings::default()
        };
        pack(src.path(), &out, &settings, None)?;

        let mut zip = zip::ZipArchive::new(File::open(&out)?)?;
        for i in 0..zip.len() {
            let entry = zip.by_index(i)?;
            assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
            assert_eq!(entry.size(), entry.compressed_size());
        }
        Ok(())
    }

    #[test]
    fn missing_entry_costs_one_archive_error() -> Result<()> {
        let src = sample_tree()?;
        let mut entries = scan(src.path(), &PackFlags::default()).entries;
        entries.insert(2, src.path().join("vanished.txt"));

        let mut result = PackResult::default();
        let mut archiver = Archiver::new(
            Cursor::new(Vec::new()),
            src.path(),
            "snap",
            CompressionLevel::DEFAULT,
            PackFlags::default(),
            DEFAULT_BUFFER_SIZE,
        );
        archiver.add_entries(&entries, None, &mut result);
        let bytes = archiver.finish()?.into_inner();

        assert_eq!(result.archive_errors, 1);
        assert_eq!(result.archived_files, 2);

        let zip = zip::ZipArchive::new(Cursor::new(bytes))?;
        assert_eq!(zip.len(), 2);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_counted_and_skipped() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let src = sample_tree()?;
        let locked = src.path().join("locked.txt");
        fs::write(&locked, b"secret")?;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;
        if File::open(&locked).is_ok() {
            // Running with privileges that ignore file modes.
            return Ok(());
        }

        let out_dir = tempfile::TempDir::new()?;
        let out = out_dir.path().join("o.zip");
        let result = pack(src.path(), &out, &PackSettings::default(), None)?;

        assert_eq!(result.archive_errors, 1);
        assert!(result.finalized);
        let names: Vec<String> = read_entries(&out)?.into_iter().map(|(n, _)| n).collect();
        assert_eq!(names.len(), 2);
        assert!(!names.iter().any(|n| n.ends_with("locked.txt")));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_archived() -> Result<()> {
        let src = sample_tree()?;
        std::os::unix::fs::symlink(src.path().join("a.txt"), src.path().join("link.txt"))?;
        let out_dir = tempfile::TempDir::new()?;
        let out = out_dir.path().join("o.zip");

        let result = pack(src.path(), &out, &PackSettings::default(), None)?;
        assert_eq!(result.archive_errors, 0);
        assert_eq!(result.archived_files, 2);
        assert!(!read_entries(&out)?.iter().any(|(n, _)| n.ends_with("link.txt")));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn finalize_failure_is_counted_not_fatal() -> Result<()> {
        let full = Path::new("/dev/full");
        if !full.exists() {
            return Ok(());
        }
        let src = sample_tree()?;

        let result = pack(src.path(), full, &PackSettings::default(), None)?;

        assert_eq!(result.entries, 4);
        assert_eq!(result.total_size, 30);
        assert!(result.archive_errors >= 1, "{}", result);
        assert!(!result.finalized);
        assert!(matches!(
            result.into_result(),
            Err(PackError::Incomplete { .. })
        ));
        Ok(())
    }

    /// Accepts seeks and rejects every write, counting the attempts.
    struct FullDisk {
        writes: Arc<AtomicUsize>,
    }

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.writes.fetch_add(1, Ordering::Relaxed);
            Err(io::Error::new(ErrorKind::Other, "no space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FullDisk {
        fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn failed_finish_does_not_write_again_on_drop() {
        let writes = Arc::new(AtomicUsize::new(0));
        let archiver = Archiver::new(
            FullDisk {
                writes: writes.clone(),
            },
            Path::new("."),
            "snap",
            CompressionLevel::DEFAULT,
            PackFlags::default(),
            DEFAULT_BUFFER_SIZE,
        );

        assert!(archiver.finish().is_err());
        assert_eq!(writes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn requested_base_cannot_escape_archive_root() -> Result<()> {
        let src = sample_tree()?;
        let out_dir = tempfile::TempDir::new()?;

        for (requested, expected) in [("/snap", "snap/"), ("../up", "up/"), ("a/../../b", "a/b/")] {
            let out = out_dir.path().join("o.zip");
            let settings = PackSettings {
                target_base_dir: Some(requested.to_string()),
                ..PackSettings::default()
            };
            assert!(pack(src.path(), &out, &settings, None)?.is_complete());

            for (name, _) in read_entries(&out)? {
                assert!(name.starts_with(expected), "{} -> {}", requested, name);
                assert!(!name.split('/').any(|part| part == ".."), "{}", name);
            }
        }
        Ok(())
    }

    #[test]
    fn destination_failure_returns_scan_result() -> Result<()> {
        let src = sample_tree()?;
        let out_dir = tempfile::TempDir::new()?;
        let out = out_dir.path().join("no/such/dir/o.zip");

        let err = pack(src.path(), &out, &PackSettings::default(), None).unwrap_err();
        match &err {
            PackError::CreateDestination { scanned, path, .. } => {
                assert_eq!(path, &out);
                assert_eq!(scanned.entries, 4);
                assert_eq!(scanned.total_size, 30);
                assert_eq!(scanned.archive_errors, 0);
                assert!(!scanned.finalized);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(err.partial_result().entries, 4);
        Ok(())
    }

    #[test]
    fn progress_advances_once_per_entry() -> Result<()> {
        let src = sample_tree()?;
        let out_dir = tempfile::TempDir::new()?;
        let out = out_dir.path().join("o.zip");

        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        let cb: Arc<ProgressFn> = Arc::new(move |done: usize, total: usize, _name: &str| {
            calls_clone.lock().unwrap().push((done, total));
        });

        let settings = PackSettings {
            flags: PackFlags {
                show_progress: true,
                ..PackFlags::default()
            },
            ..PackSettings::default()
        };
        pack(src.path(), &out, &settings, Some(cb))?;

        let calls = calls.lock().unwrap();
        assert_eq!(*calls, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
        Ok(())
    }

    #[test]
    fn progress_is_silent_without_flag() -> Result<()> {
        let src = sample_tree()?;
        let out_dir = tempfile::TempDir::new()?;
        let out = out_dir.path().join("o.zip");

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let cb: Arc<ProgressFn> = Arc::new(move |_: usize, _: usize, _: &str| {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });
        pack(src.path(), &out, &PackSettings::default(), Some(cb))?;

        assert_eq!(count.load(Ordering::Relaxed), 0);
        Ok(())
    }

    #[test]
    fn repacking_gives_same_entries() -> Result<()> {
        let src = sample_tree()?;
        let out_dir = tempfile::TempDir::new()?;
        let first = out_dir.path().join("1.zip");
        let second = out_dir.path().join("2.zip");

        pack(src.path(), &first, &PackSettings::default(), None)?;
        pack(src.path(), &second, &PackSettings::default(), None)?;

        assert_eq!(read_entries(&first)?, read_entries(&second)?);
        Ok(())
    }

    #[test]
    fn small_buffer_copies_whole_file() -> Result<()> {
        let src = tempfile::TempDir::new()?;
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(src.path().join("blob.bin"), &data)?;
        let out_dir = tempfile::TempDir::new()?;
        let out = out_dir.path().join("blob.zip");

        let settings = PackSettings {
            buffer_size: 7,
            target_base_dir: Some("b".to_string()),
            ..PackSettings::default()
        };
        pack(src.path(), &out, &settings, None)?;

        let entries = read_entries(&out)?;
        assert_eq!(entries, vec![("b/blob.bin".to_string(), data)]);
        Ok(())
    }

    #[test]
    fn into_result_flags_incomplete_archives() {
        let ok = PackResult {
            entries: 3,
            archived_files: 2,
            finalized: true,
            ..PackResult::default()
        };
        assert!(ok.clone().into_result().is_ok());

        let not_closed = PackResult {
            finalized: false,
            ..ok.clone()
        };
        assert!(matches!(
            not_closed.into_result(),
            Err(PackError::Incomplete { .. })
        ));

        let with_errors = PackResult {
            archive_errors: 1,
            ..ok
        };
        let err = with_errors.into_result().unwrap_err();
        assert!(err.to_string().contains("1 archive errors"));
    }
}
