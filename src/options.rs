//! Configuration options for recompress runs.
//!
//! This module provides [`RecompressOptions`], shared by the
//! [`FileRewriter`](crate::FileRewriter) and the directory dispatcher.
//!
//! # Example
//!
//! ```
//! use recompress::RecompressOptions;
//!
//! let options = RecompressOptions::default()
//!     .with_parallel(4)
//!     .with_skip_empty()
//!     .with_one_file_system();
//! ```

use crate::rewrite::RewriteOutcome;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Callback invoked once per recorded outcome.
///
/// Called from the single aggregator thread, never concurrently with itself.
pub type ProgressCallback = Arc<dyn Fn(&Path, &RewriteOutcome) + Send + Sync>;

/// Default number of concurrent rewrites.
pub const DEFAULT_PARALLEL: usize = 8;

/// Default bound of the work queue between traversal and workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Options for rewrite runs.
///
/// Use [`Default::default()`] to get sensible defaults, then customize
/// using the builder methods.
///
/// # Default Values
///
/// | Field | Default | Description |
/// |-------|---------|-------------|
/// | `parallel` | 8 | Concurrent rewrites |
/// | `fsync` | `true` | Sync temp file and directory before/after rename |
/// | `preserve_permissions` | `true` | Copy mode bits |
/// | `preserve_timestamps` | `true` | Copy atime/mtime |
/// | `preserve_ownership` | `true` | Copy uid/gid (unix) |
/// | `skip_empty` | `false` | Rewrite 0-byte files too |
/// | `skip_hidden` | `false` | Dot-files are rewritten like any other |
/// | `one_file_system` | `false` | Cross mount points |
/// | `remove_stale_temps` | `false` | Leave leftovers of killed runs alone |
/// | `queue_capacity` | 1024 | Pending work items before traversal blocks |
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(clippy::struct_excessive_bools)]
pub struct RecompressOptions {
    /// Number of worker threads, i.e. the maximum number of files being
    /// rewritten at any instant (default: 8)
    ///
    /// Zero is rejected when the run starts.
    pub parallel: usize,

    /// Whether to sync the temporary file to disk before the rename and
    /// the parent directory after it (default: true)
    pub fsync: bool,

    /// Whether to copy permission bits onto the rewritten file (default: true)
    pub preserve_permissions: bool,

    /// Whether to copy access and modification times (default: true)
    pub preserve_timestamps: bool,

    /// Whether to copy the owning user and group (default: true)
    ///
    /// Only effective on Unix. Usually needs root for files owned by
    /// someone else; a failure is reported as a degraded success.
    pub preserve_ownership: bool,

    /// Report 0-byte files as skipped instead of rewriting them (default: false)
    pub skip_empty: bool,

    /// Skip files and directories whose name starts with `.` (default: false)
    pub skip_hidden: bool,

    /// Do not descend into directories on another device (default: false)
    pub one_file_system: bool,

    /// Delete leftover temporary files from interrupted runs (default: false)
    pub remove_stale_temps: bool,

    /// Capacity of the work queue (default: 1024)
    pub queue_capacity: usize,

    /// Cancellation flag checked by the traversal and by every worker
    #[cfg_attr(feature = "serde", serde(skip))]
    pub cancel_token: Option<Arc<AtomicBool>>,

    /// Callback for warnings (optional)
    ///
    /// If not set and `tracing` feature is enabled, warnings are logged via tracing.
    /// Otherwise, warnings are silently ignored.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub warn_handler: Option<fn(&str)>,

    /// Callback for per-file detail messages (optional)
    ///
    /// Falls back to `tracing::debug!` when the `tracing` feature is enabled.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub verbose_handler: Option<fn(&str)>,

    /// Progress callback (optional)
    #[cfg_attr(feature = "serde", serde(skip))]
    pub progress: Option<ProgressCallback>,
}

impl Default for RecompressOptions {
    fn default() -> Self {
        Self {
            parallel: DEFAULT_PARALLEL,
            fsync: true,
            preserve_permissions: true,
            preserve_timestamps: true,
            preserve_ownership: true,
            skip_empty: false,
            skip_hidden: false,
            one_file_system: false,
            remove_stale_temps: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            cancel_token: None,
            warn_handler: None,
            verbose_handler: None,
            progress: None,
        }
    }
}

impl fmt::Debug for RecompressOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecompressOptions")
            .field("parallel", &self.parallel)
            .field("fsync", &self.fsync)
            .field("preserve_permissions", &self.preserve_permissions)
            .field("preserve_timestamps", &self.preserve_timestamps)
            .field("preserve_ownership", &self.preserve_ownership)
            .field("skip_empty", &self.skip_empty)
            .field("skip_hidden", &self.skip_hidden)
            .field("one_file_system", &self.one_file_system)
            .field("remove_stale_temps", &self.remove_stale_temps)
            .field("queue_capacity", &self.queue_capacity)
            .field("cancel_token", &self.cancel_token)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish_non_exhaustive()
    }
}

impl RecompressOptions {
    /// Create options with a warning handler
    #[must_use]
    pub fn with_warn_handler(mut self, handler: fn(&str)) -> Self {
        self.warn_handler = Some(handler);
        self
    }

    /// Create options with a per-file detail handler
    #[must_use]
    pub fn with_verbose_handler(mut self, handler: fn(&str)) -> Self {
        self.verbose_handler = Some(handler);
        self
    }

    /// Set the number of worker threads
    ///
    /// Not clamped: a value of 0 makes the run fail with
    /// [`Error::InvalidConcurrency`](crate::Error::InvalidConcurrency).
    #[must_use]
    pub fn with_parallel(mut self, n: usize) -> Self {
        self.parallel = n;
        self
    }

    /// Set the work queue capacity (at least 1)
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Disable fsync for faster (but less durable) rewrites
    #[must_use]
    pub fn without_fsync(mut self) -> Self {
        self.fsync = false;
        self
    }

    /// Do not copy permission bits
    #[must_use]
    pub fn without_permissions(mut self) -> Self {
        self.preserve_permissions = false;
        self
    }

    /// Do not copy timestamps; rewritten files get the current time
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.preserve_timestamps = false;
        self
    }

    /// Do not copy ownership
    #[must_use]
    pub fn without_ownership(mut self) -> Self {
        self.preserve_ownership = false;
        self
    }

    /// Skip 0-byte files
    #[must_use]
    pub fn with_skip_empty(mut self) -> Self {
        self.skip_empty = true;
        self
    }

    /// Skip dot-files and dot-directories
    #[must_use]
    pub fn with_skip_hidden(mut self) -> Self {
        self.skip_hidden = true;
        self
    }

    /// Stay on the root's filesystem
    #[must_use]
    pub fn with_one_file_system(mut self) -> Self {
        self.one_file_system = true;
        self
    }

    /// Delete stale temporary files found during the walk
    #[must_use]
    pub fn with_remove_stale_temps(mut self) -> Self {
        self.remove_stale_temps = true;
        self
    }

    /// Set a cancellation token
    ///
    /// When the flag becomes `true`, in-flight rewrites finish, no new file
    /// is started and the remaining queued files are reported as
    /// [`RewriteOutcome::SkippedCancelled`].
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Set a progress callback
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Path, &RewriteOutcome) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(|t| t.load(Ordering::Relaxed))
    }

    pub(crate) fn warn(&self, msg: &str) {
        if let Some(handler) = self.warn_handler {
            handler(msg);
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!("{}", msg);
        }
    }

    pub(crate) fn verbose(&self, msg: &str) {
        if let Some(handler) = self.verbose_handler {
            handler(msg);
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!("{}", msg);
        }
    }
}
