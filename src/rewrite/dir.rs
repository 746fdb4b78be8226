//! Directory traversal and dispatch.
//!
//! The calling thread walks the tree and feeds regular files into a bounded
//! queue. A dedicated rayon pool of exactly `parallel` threads runs one worker
//! loop per thread, each pulling one path at a time and rewriting it. A third
//! party, the aggregator thread, is the only owner of the [`RunReport`].
//!
//! ```text
//!  walk (caller) ──WorkItem──▶ [bounded queue] ──▶ worker × N ──outcome──▶ aggregator
//!        └──────────────── skipped entries / dir failures ───────────────────▲
//! ```

use crate::error::{Error, Result};
use crate::options::RecompressOptions;
use crate::report::{Event, RunReport, aggregate};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::file::{FileRewriter, Rewrite};
use super::outcome::{FailureKind, RewriteOutcome};
use super::utils::{
    device_of, get_dir_key, is_hidden, is_own_temp_file, is_stale_temp_file, remove_if_exists,
};

/// Rewrite every regular file under `root` with the [`FileRewriter`].
///
/// Blocks until every discovered file has an outcome. Per-file failures do
/// not make this return an error; they are listed in
/// [`RunReport::failures`].
///
/// # Errors
///
/// Returns an error before touching anything if:
/// - `parallel` is 0 ([`Error::InvalidConcurrency`])
/// - `root` is missing, not a directory, or cannot be listed ([`Error::InvalidRoot`])
/// - the worker pool cannot be created ([`Error::ThreadPool`])
///
/// # Example
///
/// ```no_run
/// use recompress::{recompress_dir, RecompressOptions};
/// use std::path::Path;
///
/// let options = RecompressOptions::default().with_parallel(4);
/// let report = recompress_dir(Path::new("/tank/archive"), &options)?;
/// println!("{} rewritten, {} failed", report.files_rewritten, report.files_failed);
/// # Ok::<(), recompress::Error>(())
/// ```
pub fn recompress_dir(root: &Path, options: &RecompressOptions) -> Result<RunReport> {
    recompress_dir_with(root, options, &FileRewriter::new(options))
}

/// Like [`recompress_dir`], with a caller-supplied [`Rewrite`] implementation.
pub fn recompress_dir_with<R>(
    root: &Path,
    options: &RecompressOptions,
    rewriter: &R,
) -> Result<RunReport>
where
    R: Rewrite + ?Sized,
{
    let start_time = Instant::now();

    if options.parallel == 0 {
        return Err(Error::InvalidConcurrency(options.parallel));
    }
    let (root, root_meta) = validate_root(root)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.parallel)
        .thread_name(|index| format!("recompress-worker-{index}"))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let (work_tx, work_rx) = crossbeam_channel::bounded::<PathBuf>(options.queue_capacity);
    let (event_tx, event_rx) = crossbeam_channel::unbounded::<Event>();

    let (joined, walk_interrupted) = std::thread::scope(|s| {
        let aggregator = std::thread::Builder::new()
            .name("recompress-aggregator".to_string())
            .spawn_scoped(s, move || aggregate(event_rx, options));
        let aggregator = match aggregator {
            Ok(handle) => handle,
            Err(e) => return Err(Error::Io(e)),
        };

        let walk_interrupted = pool.in_place_scope(|scope| {
            for _ in 0..options.parallel {
                let queue = work_rx.clone();
                let events = event_tx.clone();
                scope.spawn(move |_| worker_loop(&queue, &events, rewriter, options));
            }
            drop(work_rx);

            let mut walker = Walker::new(options, &root_meta, work_tx, &event_tx);
            walker.walk(&root, &root_meta)
            // Dropping the walker drops the last queue sender: workers drain and exit
        });
        drop(event_tx);

        Ok((aggregator.join(), walk_interrupted))
    })?;

    let mut report = match joined {
        Ok(report) => report,
        Err(panic) => std::panic::resume_unwind(panic),
    };
    report.cancelled = was_cancelled(walk_interrupted, &report);
    report.duration = start_time.elapsed();
    Ok(report)
}

/// A run counts as cancelled only if some work was left undone.
fn was_cancelled(walk_interrupted: bool, report: &RunReport) -> bool {
    walk_interrupted || report.files_skipped_cancelled > 0
}

fn validate_root(root: &Path) -> Result<(PathBuf, Metadata)> {
    let invalid = |reason: String| Error::InvalidRoot {
        path: root.to_path_buf(),
        reason,
    };

    let meta = match fs::metadata(root) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(invalid("does not exist".to_string()));
        }
        Err(e) => return Err(invalid(e.to_string())),
    };
    if !meta.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    if let Err(e) = fs::read_dir(root) {
        return Err(invalid(format!("cannot be listed: {e}")));
    }
    let canonical = fs::canonicalize(root).map_err(|e| invalid(e.to_string()))?;
    Ok((canonical, meta))
}

/// One pool thread: take a path, rewrite it, report, repeat until the queue
/// is closed and empty.
fn worker_loop<R>(
    queue: &Receiver<PathBuf>,
    events: &Sender<Event>,
    rewriter: &R,
    options: &RecompressOptions,
) where
    R: Rewrite + ?Sized,
{
    for path in queue.iter() {
        // After cancellation keep draining, so every queued file is accounted for
        let outcome = if options.is_cancelled() {
            RewriteOutcome::SkippedCancelled
        } else {
            rewriter.rewrite(&path)
        };
        if events.send(Event::Outcome(path, outcome)).is_err() {
            break;
        }
    }
}

/// Depth-first walk that never follows symlinks.
struct Walker<'a> {
    options: &'a RecompressOptions,
    root_dev: u64,
    visited: HashSet<(u64, u64)>,
    queue: Sender<PathBuf>,
    events: &'a Sender<Event>,
}

impl<'a> Walker<'a> {
    fn new(
        options: &'a RecompressOptions,
        root_meta: &Metadata,
        queue: Sender<PathBuf>,
        events: &'a Sender<Event>,
    ) -> Self {
        Self {
            options,
            root_dev: device_of(root_meta),
            visited: HashSet::new(),
            queue,
            events,
        }
    }

    /// Returns `true` if cancellation stopped the walk before it was done.
    fn walk(&mut self, root: &Path, root_meta: &Metadata) -> bool {
        self.visited.insert(get_dir_key(root_meta, root));
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            if self.options.is_cancelled() {
                return true;
            }
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    self.fail_dir(dir, &e);
                    continue;
                }
            };

            for entry in entries {
                if self.options.is_cancelled() {
                    return true;
                }
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        self.fail_dir(dir.clone(), &e);
                        break;
                    }
                };
                let path = entry.path();

                // DirEntry::file_type does not follow symlinks
                let file_type = match entry.file_type() {
                    Ok(ft) => ft,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => {
                        self.emit(Event::Outcome(
                            path,
                            RewriteOutcome::failed(FailureKind::ReadError, e),
                        ));
                        continue;
                    }
                };

                // Only a regular file can be one of our temps; a directory or
                // symlink with the same name is user data
                if file_type.is_file() && is_stale_temp_file(&path) {
                    self.stale_temp(&path);
                    continue;
                }
                if self.options.skip_hidden && is_hidden(&entry.file_name()) {
                    self.options
                        .verbose(&format!("skipped hidden {}", path.display()));
                    self.emit(Event::Hidden);
                    continue;
                }

                if file_type.is_dir() {
                    if let Some(subdir) = self.enter_dir(path) {
                        pending.push(subdir);
                    }
                } else if file_type.is_file() {
                    self.emit(Event::Discovered);
                    if self.queue.send(path).is_err() {
                        // Every worker is gone; nothing left to feed
                        return false;
                    }
                } else {
                    self.emit(Event::Outcome(path, RewriteOutcome::SkippedNotRegularFile));
                }
            }
        }
        false
    }

    /// Decide whether a subdirectory is walked.
    fn enter_dir(&mut self, path: PathBuf) -> Option<PathBuf> {
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                self.fail_dir(path, &e);
                return None;
            }
        };

        if self.options.one_file_system && device_of(&meta) != self.root_dev {
            self.options
                .verbose(&format!("not crossing into {}", path.display()));
            self.emit(Event::OtherFilesystem);
            return None;
        }
        if !self.visited.insert(get_dir_key(&meta, &path)) {
            self.options
                .warn(&format!("Directory already visited, skipping: {}", path.display()));
            return None;
        }
        Some(path)
    }

    fn stale_temp(&self, path: &Path) {
        // In-flight copies of this very run look the same; leave them alone
        if is_own_temp_file(path) {
            return;
        }
        let removed = if self.options.remove_stale_temps {
            match remove_if_exists(path) {
                Ok(()) => {
                    self.options
                        .verbose(&format!("removed stale temp file {}", path.display()));
                    true
                }
                Err(e) => {
                    self.options.warn(&format!(
                        "Failed to remove stale temp file {}: {}",
                        path.display(),
                        e
                    ));
                    false
                }
            }
        } else {
            self.options
                .warn(&format!("Stale temp file from an earlier run: {}", path.display()));
            false
        };
        self.emit(Event::StaleTemp { removed });
    }

    fn fail_dir(&self, dir: PathBuf, e: &io::Error) {
        let kind = if e.kind() == io::ErrorKind::NotFound {
            FailureKind::Vanished
        } else {
            FailureKind::UnreadableDirectory
        };
        self.emit(Event::Outcome(dir, RewriteOutcome::failed(kind, e)));
    }

    fn emit(&self, event: Event) {
        // The aggregator outlives the walk; a send error means it panicked
        let _ = self.events.send(event);
    }
}

// =============================================================================
// Tests
// =============================================================================
