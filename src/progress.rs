//! Progress reporting support (requires `progress` feature)

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a spinner for a run whose total is not known up front.
///
/// Update its message from a [`ProgressCallback`](crate::ProgressCallback).
#[must_use]
pub fn create_progress_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Human readable byte count, e.g. `1.5 GiB`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    indicatif::BinaryBytes(bytes).to_string()
}
