/// Diagnostic switches for a pack operation. None of them affect the
/// archive contents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackFlags {
    /// Summary lines: counts, total size, final error count
    pub print_info: bool,
    /// One diagnostic per scan or archive error
    pub print_errors: bool,
    /// Drive the injected progress callback
    pub show_progress: bool,
    /// Per-file trace lines
    pub verbose: bool,
}

impl PackFlags {
    pub fn all() -> Self {
        Self {
            print_info: true,
            print_errors: true,
            show_progress: true,
            verbose: true,
        }
    }
}

pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Fallback target base when the source has no usable last component.
pub const FALLBACK_BASE_DIR: &str = "snapshot";

#[derive(Clone, Debug)]
pub struct PackSettings {
    /// Prefix for every archive entry. `None` or empty means the last
    /// component of the source directory.
    pub target_base_dir: Option<String>,
    /// Raw level, validated by `CompressionLevel::clamp` at pack time.
    pub compression_level: i32,
    pub flags: PackFlags,
    /// Size of the copy buffer shared by all entries
    pub buffer_size: usize,
}

impl Default for PackSettings {
    fn default() -> Self {
        Self {
            target_base_dir: None,
            compression_level: -1,
            flags: PackFlags::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}
