//! Builder API for recompress runs.
//!
//! The builder provides a fluent interface over [`RecompressOptions`] and
//! picks the rewriter ([`FileRewriter`] or [`DryRun`]) for you.
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```no_run
//! use recompress::RecompressBuilder;
//!
//! let report = RecompressBuilder::new("/tank/data").run()?;
//! println!("Rewrote {} files", report.files_rewritten);
//! # Ok::<(), recompress::Error>(())
//! ```
//!
//! ## With Options
//!
//! ```no_run
//! use recompress::RecompressBuilder;
//!
//! let report = RecompressBuilder::new("/tank/data")
//!     .parallel(16)
//!     .one_file_system()
//!     .skip_empty()
//!     .run()?;
//! # Ok::<(), recompress::Error>(())
//! ```

use crate::error::Result;
use crate::options::RecompressOptions;
use crate::report::RunReport;
use crate::rewrite::{DryRun, FileRewriter, RewriteOutcome, recompress_dir_with};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// A builder for configuring and executing a run over one directory tree.
///
/// # Example
///
/// ```no_run
/// use recompress::RecompressBuilder;
///
/// let report = RecompressBuilder::new("/tank/photos")
///     .parallel(4)
///     .no_fsync()
///     .run()?;
/// # Ok::<(), recompress::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct RecompressBuilder {
    root: PathBuf,
    options: RecompressOptions,
    dry_run: bool,
}

impl RecompressBuilder {
    /// Create a builder for the tree under `root` with default options.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            options: RecompressOptions::default(),
            dry_run: false,
        }
    }

    /// Set the number of concurrent rewrites (default 8).
    ///
    /// Zero is not clamped; [`run`](Self::run) rejects it.
    #[must_use]
    pub fn parallel(mut self, threads: usize) -> Self {
        self.options = self.options.with_parallel(threads);
        self
    }

    /// Skip syncing temp files and parent directories.
    ///
    /// Faster, but a crash shortly after the run may lose rewritten data
    /// that the filesystem had not flushed yet.
    #[must_use]
    pub fn no_fsync(mut self) -> Self {
        self.options = self.options.without_fsync();
        self
    }

    /// Do not copy permission bits onto rewritten files.
    #[must_use]
    pub fn no_permissions(mut self) -> Self {
        self.options = self.options.without_permissions();
        self
    }

    /// Do not copy access/modification times onto rewritten files.
    #[must_use]
    pub fn no_timestamps(mut self) -> Self {
        self.options = self.options.without_timestamps();
        self
    }

    /// Do not copy the owning user and group.
    #[must_use]
    pub fn no_ownership(mut self) -> Self {
        self.options = self.options.without_ownership();
        self
    }

    /// Leave 0-byte files alone.
    #[must_use]
    pub fn skip_empty(mut self) -> Self {
        self.options = self.options.with_skip_empty();
        self
    }

    /// Skip dot-files and do not descend into dot-directories.
    #[must_use]
    pub fn skip_hidden(mut self) -> Self {
        self.options = self.options.with_skip_hidden();
        self
    }

    /// Stay on the filesystem of the root directory.
    #[must_use]
    pub fn one_file_system(mut self) -> Self {
        self.options = self.options.with_one_file_system();
        self
    }

    /// Delete temp files left behind by interrupted runs.
    ///
    /// Ignored in a dry run, which never modifies the tree.
    #[must_use]
    pub fn remove_stale_temps(mut self) -> Self {
        self.options = self.options.with_remove_stale_temps();
        self
    }

    /// Stop the run when `token` becomes `true`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use recompress::RecompressBuilder;
    /// use std::sync::Arc;
    /// use std::sync::atomic::AtomicBool;
    ///
    /// let cancel = Arc::new(AtomicBool::new(false));
    /// // hand `cancel` to a signal handler ...
    /// let report = RecompressBuilder::new("/tank/data")
    ///     .cancel_token(cancel)
    ///     .run()?;
    /// if report.cancelled {
    ///     eprintln!("stopped after {} files", report.files_processed());
    /// }
    /// # Ok::<(), recompress::Error>(())
    /// ```
    #[must_use]
    pub fn cancel_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.options = self.options.with_cancel_token(token);
        self
    }

    /// Call `callback` for every outcome as it is recorded.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Path, &RewriteOutcome) + Send + Sync + 'static,
    {
        self.options = self.options.with_progress(callback);
        self
    }

    /// Classify files without writing anything.
    ///
    /// `Rewritten` outcomes in the report then mean "would be rewritten".
    #[must_use]
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Get the current options.
    pub fn options(&self) -> &RecompressOptions {
        &self.options
    }

    /// Run over the tree and return the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is invalid, `parallel` is 0 or the
    /// worker pool cannot be created. Per-file problems are in the report.
    pub fn run(self) -> Result<RunReport> {
        if self.dry_run {
            let mut options = self.options;
            options.remove_stale_temps = false;
            recompress_dir_with(&self.root, &options, &DryRun::new(&options))
        } else {
            recompress_dir_with(&self.root, &self.options, &FileRewriter::new(&self.options))
        }
    }
}
