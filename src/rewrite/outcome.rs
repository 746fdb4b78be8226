//! Per-file outcomes.

use std::fmt;

/// Why a single file could not be rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum FailureKind {
    /// The file disappeared between discovery and rewrite
    Vanished,
    /// The original could not be opened or read
    ReadError,
    /// Not enough space for the temporary copy
    NoSpace,
    /// Creating, writing or syncing the temporary copy failed
    WriteError,
    /// The final rename onto the original path failed
    RenameError,
    /// The file was changed by someone else while it was being copied
    Modified,
    /// A directory could not be listed, so its contents were not visited
    UnreadableDirectory,
}

impl FailureKind {
    /// Stable snake_case code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vanished => "vanished",
            Self::ReadError => "read_error",
            Self::NoSpace => "no_space",
            Self::WriteError => "write_error",
            Self::RenameError => "rename_error",
            Self::Modified => "modified",
            Self::UnreadableDirectory => "unreadable_directory",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-file failure: its kind plus the underlying error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Classification
    pub kind: FailureKind,
    /// Human readable detail
    pub message: String,
}

impl Failure {
    pub(crate) fn new(kind: FailureKind, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of rewriting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Content was rewritten.
    ///
    /// `degraded` is set when some metadata (ownership, timestamps,
    /// permissions, hard links) could not be carried over.
    Rewritten {
        /// Bytes written to the new copy
        bytes: u64,
        /// What was lost, if anything
        degraded: Option<String>,
    },
    /// Symlink, socket, fifo, device or directory
    SkippedNotRegularFile,
    /// 0-byte file with `skip_empty` set
    SkippedEmpty,
    /// Never started because the run was cancelled
    SkippedCancelled,
    /// Recoverable per-file failure; the original is untouched
    Failed(Failure),
}

impl RewriteOutcome {
    pub(crate) fn failed(kind: FailureKind, message: impl fmt::Display) -> Self {
        Self::Failed(Failure::new(kind, message))
    }

    /// Whether the content was rewritten (degraded or not).
    pub fn is_rewritten(&self) -> bool {
        matches!(self, Self::Rewritten { .. })
    }

    /// The failure kind, if this outcome is a failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed(failure) => Some(failure.kind),
            _ => None,
        }
    }

    /// Short label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Rewritten { degraded: None, .. } => "rewritten",
            Self::Rewritten { .. } => "rewritten (degraded)",
            Self::SkippedNotRegularFile => "skipped (not a regular file)",
            Self::SkippedEmpty => "skipped (empty)",
            Self::SkippedCancelled => "skipped (cancelled)",
            Self::Failed(_) => "failed",
        }
    }
}
