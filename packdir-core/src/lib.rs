pub mod archiver;
pub mod error;
pub mod inspect;
pub mod level;
pub mod paths;
pub mod progress;
pub mod scanner;
pub mod settings;

pub use archiver::{pack, Archiver, PackResult};
pub use error::{EntryError, PackError};
pub use inspect::{list_archive, verify_archive, ArchiveEntryInfo, VerifyReport};
pub use level::CompressionLevel;
pub use progress::ProgressFn;
pub use scanner::{scan, ScanOutcome};
pub use settings::{PackFlags, PackSettings};
