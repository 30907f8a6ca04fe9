//! Progress reporting.
//!
//! The archiver never owns a progress display. Callers hand it a
//! [`ProgressFn`] which is invoked as `(done, total, name)` once per
//! processed entry.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

pub type ProgressFn = dyn Fn(usize, usize, &str) + Send + Sync;

/// Style used by [`new_bar`].
pub fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

pub fn new_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(bar_style());
    pb
}

/// Adapt an `indicatif` bar to the archiver's progress callback.
pub fn bar_callback(pb: ProgressBar) -> Arc<ProgressFn> {
    Arc::new(move |done: usize, total: usize, name: &str| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
        pb.set_message(name.to_string());
    })
}
