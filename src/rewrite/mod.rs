//! In-place rewriting of files and directory trees.
//!
//! [`rewrite_file`] handles one file; [`recompress_dir`] walks a tree and
//! fans the files out to a fixed-size worker pool.

mod dir;
mod file;
mod outcome;
pub(crate) mod utils;

pub use dir::{recompress_dir, recompress_dir_with};
pub use file::{DryRun, FileRewriter, Rewrite, rewrite_file};
pub use outcome::{Failure, FailureKind, RewriteOutcome};
pub use utils::{TEMP_PREFIX, TEMP_SUFFIX, is_stale_temp_file};
