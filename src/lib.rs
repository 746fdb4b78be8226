//! # recompress
//!
//! Rewrite files in place so that a copy-on-write filesystem (ZFS, btrfs)
//! stores them again with whatever compression is configured *now*.
//!
//! Changing the compression property of a dataset only affects new writes.
//! This crate pushes every existing byte through the write path again:
//! each file is copied to a temporary sibling, synced, given the original's
//! metadata and atomically renamed over the original.
//!
//! ## Core Features
//!
//! - **Atomic replacement**: readers see either the old or the new file, never a mix
//! - **Bounded parallelism**: exactly `parallel` files in flight, default 8
//! - **Crash safe**: an interrupted run leaves originals intact and at worst a
//!   `.recompress-*.tmp` leftover, which later runs recognise
//! - **Concurrent writer guard**: a file modified during its copy is not replaced
//! - **Metadata preserving**: permissions, timestamps and ownership
//! - **Symlink aware**: links are never followed, neither while walking nor when opening
//! - **Cancellable**: a shared flag drains the queue without starting new rewrites
//!
//! ## Quick Start with Builder API
//!
//! ```no_run
//! use recompress::RecompressBuilder;
//!
//! let report = RecompressBuilder::new("/tank/archive").parallel(4).run()?;
//! println!(
//!     "Rewrote {} files ({} bytes), {} failed",
//!     report.files_rewritten, report.bytes_rewritten, report.files_failed
//! );
//! # Ok::<(), recompress::Error>(())
//! ```
//!
//! ### Dry Run
//!
//! ```no_run
//! use recompress::RecompressBuilder;
//!
//! let plan = RecompressBuilder::new("/tank/archive").dry_run().run()?;
//! println!("Would rewrite {} files", plan.files_rewritten);
//! # Ok::<(), recompress::Error>(())
//! ```
//!
//! ## Function API
//!
//! ```no_run
//! use recompress::{recompress_dir, RecompressOptions};
//! use std::path::Path;
//!
//! let options = RecompressOptions::default()
//!     .with_parallel(16)
//!     .with_one_file_system()
//!     .with_remove_stale_temps();
//!
//! let report = recompress_dir(Path::new("/tank/archive"), &options)?;
//! for failure in &report.failures {
//!     eprintln!("{}: {}", failure.path.display(), failure.kind);
//! }
//! # Ok::<(), recompress::Error>(())
//! ```
//!
//! ## Failure Model
//!
//! Only problems that prevent a run from starting are [`Error`]s: a bad
//! root directory, a worker count of zero, a thread pool that cannot be
//! built. Anything that goes wrong with an individual file is a
//! [`RewriteOutcome::Failed`] recorded in the [`RunReport`], and the run
//! carries on with the next file.
//!
//! ## Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `progress` | Spinner helper with indicatif |
//! | `tracing` | Structured logging with tracing crate |
//! | `serde` | Serialize/Deserialize for [`RecompressOptions`], Serialize for [`RunReport`] |
//! | `full` | Enable all optional features |

#![cfg_attr(docsrs, feature(doc_cfg))]

mod builder;
mod error;
mod options;
mod report;
mod rewrite;

#[cfg(feature = "progress")]
mod progress;

pub use builder::RecompressBuilder;
pub use error::{Error, ErrorCode, Result, is_no_space_error};
pub use options::{DEFAULT_PARALLEL, DEFAULT_QUEUE_CAPACITY, ProgressCallback, RecompressOptions};
pub use report::{DegradedFile, FileFailure, RunReport};
pub use rewrite::{
    DryRun, Failure, FailureKind, FileRewriter, Rewrite, RewriteOutcome, TEMP_PREFIX, TEMP_SUFFIX,
    is_stale_temp_file, recompress_dir, recompress_dir_with, rewrite_file,
};

#[cfg(feature = "progress")]
#[cfg_attr(docsrs, doc(cfg(feature = "progress")))]
pub use progress::{create_progress_spinner, format_bytes};
