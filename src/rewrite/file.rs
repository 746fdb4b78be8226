//! Single file rewrite.
//!
//! The bytes of a file are streamed into a temporary sibling, the sibling is
//! synced and given the original's metadata, and then renamed over the
//! original. Until that rename the original is never opened for writing, so
//! an interrupted process leaves at most a stray temp file behind.

use crate::options::RecompressOptions;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;

use super::outcome::{FailureKind, RewriteOutcome};
use super::utils::{
    CopyError, FileIdentity, TEMP_SUFFIX, available_space, copy_contents, link_count,
    own_temp_prefix, preserve_ownership, preserve_permissions, preserve_timestamps, sync_dir,
};

/// Something that turns one discovered path into one outcome.
///
/// The dispatcher calls this from several worker threads at once, each with
/// a different path.
pub trait Rewrite: Sync {
    /// Process `path` and report what happened. Must not panic on IO errors.
    fn rewrite(&self, path: &Path) -> RewriteOutcome;
}

impl<F> Rewrite for F
where
    F: Fn(&Path) -> RewriteOutcome + Sync,
{
    fn rewrite(&self, path: &Path) -> RewriteOutcome {
        self(path)
    }
}

/// The real rewriter: temp copy plus atomic rename.
#[derive(Debug, Clone, Copy)]
pub struct FileRewriter<'a> {
    options: &'a RecompressOptions,
}

impl<'a> FileRewriter<'a> {
    /// Create a rewriter using `options`.
    pub fn new(options: &'a RecompressOptions) -> Self {
        Self { options }
    }
}

impl Rewrite for FileRewriter<'_> {
    fn rewrite(&self, path: &Path) -> RewriteOutcome {
        rewrite_file(path, self.options)
    }
}

/// Classifies files like [`FileRewriter`] but never writes anything.
///
/// A `Rewritten` outcome from this rewriter means "would be rewritten";
/// `bytes` is the current file length.
#[derive(Debug, Clone, Copy)]
pub struct DryRun<'a> {
    options: &'a RecompressOptions,
}

impl<'a> DryRun<'a> {
    /// Create a dry-run rewriter using `options`.
    pub fn new(options: &'a RecompressOptions) -> Self {
        Self { options }
    }
}

impl Rewrite for DryRun<'_> {
    fn rewrite(&self, path: &Path) -> RewriteOutcome {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) => return classify_open_error(e),
        };
        if !meta.file_type().is_file() {
            return RewriteOutcome::SkippedNotRegularFile;
        }
        if self.options.skip_empty && meta.len() == 0 {
            return RewriteOutcome::SkippedEmpty;
        }
        if let Err(e) = open_source(path) {
            return classify_open_error(e);
        }
        RewriteOutcome::Rewritten {
            bytes: meta.len(),
            degraded: None,
        }
    }
}

/// Rewrite a single file in place.
///
/// Bytes in equal bytes out; the point is to push the data through the
/// filesystem's write path again. Every failure is reported as
/// [`RewriteOutcome::Failed`] with the original left untouched.
///
/// # Example
///
/// ```no_run
/// use recompress::{RecompressOptions, RewriteOutcome, rewrite_file};
/// use std::path::Path;
///
/// let outcome = rewrite_file(Path::new("/tank/data/big.log"), &RecompressOptions::default());
/// assert!(matches!(outcome, RewriteOutcome::Rewritten { .. }));
/// ```
pub fn rewrite_file(path: &Path, options: &RecompressOptions) -> RewriteOutcome {
    rewrite_file_inner(path, options, available_space, |_| {})
}

/// `free_space` reports the bytes available in the parent directory.
/// `before_commit` runs with the temp path once the copy is complete,
/// right before the concurrent-modification check and the rename.
pub(crate) fn rewrite_file_inner(
    path: &Path,
    options: &RecompressOptions,
    free_space: impl FnOnce(&Path) -> io::Result<u64>,
    before_commit: impl FnOnce(&Path),
) -> RewriteOutcome {
    // Cheap lstat first: symlinks and special files never get opened
    let lstat = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) => return classify_open_error(e),
    };
    if !lstat.file_type().is_file() {
        return RewriteOutcome::SkippedNotRegularFile;
    }
    if options.skip_empty && lstat.len() == 0 {
        return RewriteOutcome::SkippedEmpty;
    }

    let mut src = match open_source(path) {
        Ok(f) => f,
        Err(e) => return classify_open_error(e),
    };

    // Re-check on the handle: the path may have been swapped since the lstat
    let src_meta = match src.metadata() {
        Ok(m) => m,
        Err(e) => return RewriteOutcome::failed(FailureKind::ReadError, e),
    };
    if !src_meta.is_file() {
        return RewriteOutcome::SkippedNotRegularFile;
    }
    let before = FileIdentity::of(&src_meta);

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    match free_space(parent) {
        Ok(available) if available < src_meta.len() => {
            return RewriteOutcome::failed(
                FailureKind::NoSpace,
                format!(
                    "{} bytes needed for the temporary copy, {} available",
                    src_meta.len(),
                    available
                ),
            );
        }
        Ok(_) => {}
        Err(e) => options.warn(&format!(
            "Cannot determine free space in {}: {}",
            parent.display(),
            e
        )),
    }

    let mut temp = match create_temp(parent, options) {
        Ok(t) => t,
        Err(e) => {
            return classify_write_error(
                format!("failed to create temporary file in {}: {}", parent.display(), e),
                &e,
            );
        }
    };

    // From here on, returning early drops `temp`, which deletes it
    let bytes = match copy_contents(&mut src, temp.as_file_mut()) {
        Ok(n) => n,
        Err(CopyError::Read(e)) => return RewriteOutcome::failed(FailureKind::ReadError, e),
        Err(CopyError::Write(e)) => return classify_write_error(&e, &e),
    };

    let mut degraded: Vec<String> = Vec::new();

    // chown before chmod: changing the owner may clear setuid/setgid bits
    if options.preserve_ownership {
        if let Err(e) = preserve_ownership(&src_meta, temp.as_file()) {
            degraded.push(format!("ownership not preserved: {e}"));
        }
    }
    if options.preserve_permissions {
        if let Err(e) = preserve_permissions(&src_meta, temp.as_file()) {
            degraded.push(format!("permissions not preserved: {e}"));
        }
    }
    if options.preserve_timestamps {
        if let Err(e) = preserve_timestamps(&src_meta, temp.as_file()) {
            degraded.push(format!("timestamps not preserved: {e}"));
        }
    }
    let links = link_count(&src_meta);
    if links > 1 {
        degraded.push(format!("hard link split ({links} links)"));
    }

    if options.fsync {
        if let Err(e) = temp.as_file().sync_all() {
            return classify_write_error(&e, &e);
        }
    }

    before_commit(temp.path());

    // Never replace a file somebody else changed while we were copying it
    match fs::symlink_metadata(path) {
        Ok(now) if FileIdentity::of(&now) == before => {}
        Ok(_) => {
            return RewriteOutcome::failed(
                FailureKind::Modified,
                "file changed while it was being rewritten",
            );
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return RewriteOutcome::failed(FailureKind::Vanished, e);
        }
        Err(e) => return RewriteOutcome::failed(FailureKind::ReadError, e),
    }
    drop(src);

    if let Err(e) = temp.persist(path) {
        // Keep the copy around for inspection
        let message = match e.file.keep() {
            Ok((_, kept)) => format!(
                "{}; temporary copy left at {}",
                e.error,
                kept.display()
            ),
            Err(_) => e.error.to_string(),
        };
        return RewriteOutcome::failed(FailureKind::RenameError, message);
    }

    if options.fsync {
        if let Err(e) = sync_dir(parent) {
            options.warn(&format!("Failed to sync directory {}: {}", parent.display(), e));
        }
    }

    RewriteOutcome::Rewritten {
        bytes,
        degraded: if degraded.is_empty() {
            None
        } else {
            Some(degraded.join("; "))
        },
    }
}

/// Open for reading without following a symlink swapped in after discovery.
#[cfg(unix)]
fn open_source(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    // O_NONBLOCK so a fifo swapped in cannot park the worker
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
fn open_source(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

fn create_temp(parent: &Path, options: &RecompressOptions) -> io::Result<NamedTempFile> {
    let prefix = own_temp_prefix();
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(TEMP_SUFFIX);

    // Without permission preservation, fall back to umask defaults
    #[cfg(unix)]
    if !options.preserve_permissions {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    #[cfg(not(unix))]
    let _ = options;

    builder.tempfile_in(parent)
}

fn classify_open_error(e: io::Error) -> RewriteOutcome {
    if e.kind() == io::ErrorKind::NotFound {
        return RewriteOutcome::failed(FailureKind::Vanished, e);
    }
    #[cfg(unix)]
    if e.raw_os_error() == Some(libc::ELOOP) {
        return RewriteOutcome::SkippedNotRegularFile;
    }
    RewriteOutcome::failed(FailureKind::ReadError, e)
}

fn classify_write_error(message: impl std::fmt::Display, e: &io::Error) -> RewriteOutcome {
    if crate::is_no_space_error(e) {
        RewriteOutcome::failed(FailureKind::NoSpace, message)
    } else {
        RewriteOutcome::failed(FailureKind::WriteError, message)
    }
}

// =============================================================================
// Tests
// =============================================================================
