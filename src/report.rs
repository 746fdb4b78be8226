//! Run statistics.
//!
//! [`RunReport`] is owned by exactly one aggregator thread while a run is in
//! progress. Workers never touch it; they send `(path, outcome)` pairs over
//! a channel and the aggregator folds them in.

use crate::options::RecompressOptions;
use crate::rewrite::{FailureKind, RewriteOutcome};
use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A file that could not be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileFailure {
    /// Path of the file (or directory, for [`FailureKind::UnreadableDirectory`])
    pub path: PathBuf,
    /// Classification
    pub kind: FailureKind,
    /// Underlying error text
    pub message: String,
}

/// A file that was rewritten but lost some metadata on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DegradedFile {
    /// Path of the file
    pub path: PathBuf,
    /// What could not be preserved
    pub note: String,
}

/// Statistics from a run.
///
/// Returned by [`recompress_dir`](crate::recompress_dir).
///
/// # Example
///
/// ```no_run
/// use recompress::{recompress_dir, RecompressOptions};
/// use std::path::Path;
///
/// let report = recompress_dir(Path::new("/tank/data"), &RecompressOptions::default())?;
/// println!("Rewrote {} files ({} bytes)", report.files_rewritten, report.bytes_rewritten);
/// for failure in &report.failures {
///     eprintln!("{}: {}", failure.path.display(), failure.kind);
/// }
/// # Ok::<(), recompress::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RunReport {
    /// Regular files handed to the worker pool
    pub files_discovered: u64,
    /// Files whose content was rewritten (degraded ones included)
    pub files_rewritten: u64,
    /// Rewritten files with incomplete metadata
    pub files_degraded: u64,
    /// Files (and unreadable directories) that failed
    pub files_failed: u64,
    /// Symlinks and special files
    pub files_skipped_not_regular: u64,
    /// 0-byte files skipped with `skip_empty`
    pub files_skipped_empty: u64,
    /// Queued files abandoned because of cancellation
    pub files_skipped_cancelled: u64,
    /// Dot-files and dot-directories skipped with `skip_hidden`
    pub entries_skipped_hidden: u64,
    /// Directories not entered because they are on another filesystem
    pub dirs_skipped_other_fs: u64,
    /// Leftover temporary files seen during the walk
    pub stale_temps_found: u64,
    /// Leftover temporary files deleted
    pub stale_temps_removed: u64,
    /// Total bytes written to new copies
    pub bytes_rewritten: u64,
    /// Every failure, in the order they were recorded
    pub failures: Vec<FileFailure>,
    /// Every degraded rewrite
    pub degraded: Vec<DegradedFile>,
    /// Whether the run was stopped by the cancel token
    pub cancelled: bool,
    /// Wall time of the run
    pub duration: Duration,
}

impl RunReport {
    /// Files skipped for any reason.
    pub fn files_skipped(&self) -> u64 {
        self.files_skipped_not_regular + self.files_skipped_empty + self.files_skipped_cancelled
    }

    /// Discovered files that a worker actually worked on.
    pub fn files_processed(&self) -> u64 {
        self.files_discovered - self.files_skipped_cancelled
    }

    /// Whether any failure was recorded.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Fold one outcome into the counters.
    pub fn record(&mut self, path: &Path, outcome: &RewriteOutcome) {
        match outcome {
            RewriteOutcome::Rewritten { bytes, degraded } => {
                self.files_rewritten += 1;
                self.bytes_rewritten += bytes;
                if let Some(note) = degraded {
                    self.files_degraded += 1;
                    self.degraded.push(DegradedFile {
                        path: path.to_path_buf(),
                        note: note.clone(),
                    });
                }
            }
            RewriteOutcome::SkippedNotRegularFile => self.files_skipped_not_regular += 1,
            RewriteOutcome::SkippedEmpty => self.files_skipped_empty += 1,
            RewriteOutcome::SkippedCancelled => self.files_skipped_cancelled += 1,
            RewriteOutcome::Failed(failure) => {
                self.files_failed += 1;
                self.failures.push(FileFailure {
                    path: path.to_path_buf(),
                    kind: failure.kind,
                    message: failure.message.clone(),
                });
            }
        }
    }
}

/// Messages consumed by the aggregator.
#[derive(Debug)]
pub(crate) enum Event {
    /// A regular file was queued
    Discovered,
    /// A file or directory reached its final outcome
    Outcome(PathBuf, RewriteOutcome),
    /// Traversal skipped a hidden entry
    Hidden,
    /// Traversal did not cross into another filesystem
    OtherFilesystem,
    /// Traversal saw a stale temp file and whether it removed it
    StaleTemp { removed: bool },
}

/// Drain `events` into a report until every sender is gone.
pub(crate) fn aggregate(events: Receiver<Event>, options: &RecompressOptions) -> RunReport {
    let mut report = RunReport::default();

    for event in events {
        match event {
            Event::Discovered => report.files_discovered += 1,
            Event::Outcome(path, outcome) => {
                log_outcome(options, &path, &outcome);
                report.record(&path, &outcome);
                if let Some(progress) = &options.progress {
                    progress(&path, &outcome);
                }
            }
            Event::Hidden => report.entries_skipped_hidden += 1,
            Event::OtherFilesystem => report.dirs_skipped_other_fs += 1,
            Event::StaleTemp { removed } => {
                report.stale_temps_found += 1;
                if removed {
                    report.stale_temps_removed += 1;
                }
            }
        }
    }

    report
}

fn log_outcome(options: &RecompressOptions, path: &Path, outcome: &RewriteOutcome) {
    match outcome {
        RewriteOutcome::Failed(failure) => {
            options.warn(&format!("Failed to rewrite {}: {}", path.display(), failure));
        }
        RewriteOutcome::Rewritten {
            degraded: Some(note),
            ..
        } => {
            options.warn(&format!("Rewrote {} with degraded metadata: {}", path.display(), note));
        }
        RewriteOutcome::Rewritten { bytes, .. } => {
            options.verbose(&format!("rewrote {} ({} bytes)", path.display(), bytes));
        }
        other => {
            options.verbose(&format!("{} {}", other.label(), path.display()));
        }
    }
}
