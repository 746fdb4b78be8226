//! Error types for recompress.
//!
//! This module provides the [`Error`] enum for conditions that stop a run
//! before any file is touched, and the [`Result`] type alias.
//!
//! Per-file problems (a file vanishing, a full disk, a failed rename) are
//! never reported through [`Error`]. They are recorded as
//! [`RewriteOutcome::Failed`](crate::RewriteOutcome::Failed) and surface in
//! the final [`RunReport`](crate::RunReport).
//!
//! # Error Categories
//!
//! | Category | Errors |
//! |----------|--------|
//! | Validation | [`Error::InvalidRoot`], [`Error::InvalidConcurrency`] |
//! | Setup | [`Error::ThreadPool`], [`Error::Io`] |

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for recompress operations.
///
/// This is a type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Check if an IO error indicates "no space left on device".
///
/// # Platform Support
///
/// | Platform | Error Detection |
/// |----------|-----------------|
/// | Unix | `ENOSPC`, `EDQUOT` |
/// | Windows | `ERROR_DISK_FULL` (0x70) |
///
/// # Example
///
/// ```
/// use std::io;
/// use recompress::is_no_space_error;
///
/// let error = io::Error::new(io::ErrorKind::StorageFull, "disk full");
/// assert!(is_no_space_error(&error));
/// ```
pub fn is_no_space_error(error: &io::Error) -> bool {
    if error.kind() == io::ErrorKind::StorageFull {
        return true;
    }

    #[cfg(unix)]
    {
        // A quota hit is "no space" as far as the rewrite is concerned
        if let Some(raw_error) = error.raw_os_error() {
            return raw_error == libc::ENOSPC || raw_error == libc::EDQUOT;
        }
    }

    #[cfg(windows)]
    {
        if let Some(raw_error) = error.raw_os_error() {
            const ERROR_DISK_FULL: i32 = 112;
            return raw_error == ERROR_DISK_FULL;
        }
    }

    false
}

/// Fatal errors that prevent a run from starting.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The root path is missing or is not a directory
    #[error("Invalid root {path}: {reason}")]
    InvalidRoot {
        /// The path that was given
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// The worker count must be at least 1
    #[error("Invalid concurrency {0}: worker count must be at least 1")]
    InvalidConcurrency(usize),

    /// The worker pool could not be created
    #[error("Failed to start worker pool: {0}")]
    ThreadPool(String),

    /// IO error while setting up the run
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRoot { .. } => ErrorCode::InvalidRoot,
            Self::InvalidConcurrency(_) => ErrorCode::InvalidConcurrency,
            Self::ThreadPool(_) => ErrorCode::Internal,
            Self::Io(e) if is_no_space_error(e) => ErrorCode::NoSpace,
            Self::Io(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                ErrorCode::PermissionDenied
            }
            Self::Io(_) => ErrorCode::IoError,
        }
    }
}

/// Stable error codes for fatal errors, used in CLI and JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Root is missing or not a directory
    InvalidRoot,
    /// Worker count out of range
    InvalidConcurrency,
    /// Storage is full
    NoSpace,
    /// Access denied
    PermissionDenied,
    /// Any other IO error
    IoError,
    /// Internal failure
    Internal,
}

impl ErrorCode {
    /// The snake_case code string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRoot => "invalid_root",
            Self::InvalidConcurrency => "invalid_concurrency",
            Self::NoSpace => "no_space",
            Self::PermissionDenied => "permission_denied",
            Self::IoError => "io_error",
            Self::Internal => "internal",
        }
    }

    /// Whether this code stems from bad user input rather than the environment.
    pub fn is_invalid_input(self) -> bool {
        matches!(self, Self::InvalidRoot | Self::InvalidConcurrency)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
