//! Compression level domain and its mapping onto zip entry options.

use std::fmt;
use zip::write::FileOptions;
use zip::CompressionMethod;

/// Deflate effort on the `-2..=9` scale.
///
/// - `-2`: fastest, lowest ratio
/// - `-1`: codec default
/// - `0`: store, no compression
/// - `1..=9`: increasing effort, `9` is maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompressionLevel(i32);

impl CompressionLevel {
    pub const HUFFMAN_ONLY: Self = Self(-2);
    pub const DEFAULT: Self = Self(-1);
    pub const NONE: Self = Self(0);
    pub const FAIR: Self = Self(2);
    pub const GOOD: Self = Self(5);
    pub const BEST: Self = Self(9);

    pub const MIN: i32 = -2;
    pub const MAX: i32 = 9;

    /// Level substituted for anything outside `MIN..=MAX`.
    pub const FALLBACK: Self = Self::FAIR;

    /// Validate `level`, substituting [`Self::FALLBACK`] when out of range.
    /// The flag is true when a substitution happened.
    pub fn clamp(level: i32) -> (Self, bool) {
        if (Self::MIN..=Self::MAX).contains(&level) {
            (Self(level), false)
        } else {
            (Self::FALLBACK, true)
        }
    }

    pub fn get(self) -> i32 {
        self.0
    }

    pub fn method(self) -> CompressionMethod {
        if self.0 == 0 {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        }
    }

    /// Effort passed to the deflate encoder. `None` lets the codec pick.
    ///
    /// Deflate through the `zip` crate has no Huffman-only mode, so `-2`
    /// uses level 1, the cheapest setting it exposes.
    pub fn deflate_level(self) -> Option<i32> {
        match self.0 {
            -2 => Some(1),
            -1 | 0 => None,
            n => Some(n),
        }
    }

    pub fn file_options(self) -> FileOptions {
        FileOptions::default()
            .compression_method(self.method())
            .compression_level(self.deflate_level())
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            -2 => write!(f, "-2 (fastest)"),
            -1 => write!(f, "-1 (default)"),
            0 => write!(f, "0 (store)"),
            n => write!(f, "{}", n),
        }
    }
}
