//! Utility functions for rewrite operations.
//!
//! This module contains helper functions used by the file rewriter and the
//! directory dispatcher: chunked content copying, metadata preservation,
//! file identity snapshots and temp file naming.

use filetime::{FileTime, set_file_handle_times};
use std::ffi::OsStr;
use std::fs::{self, File, Metadata};
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::SystemTime;

/// Prefix of every temporary file created by the rewriter.
pub const TEMP_PREFIX: &str = ".recompress-";

/// Suffix of every temporary file created by the rewriter.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Size of the buffer used to stream file contents.
pub(crate) const CHUNK_SIZE: usize = 1024 * 1024;

// =============================================================================
// File content copying
// =============================================================================

/// Which side of a copy failed.
#[derive(Debug)]
pub(crate) enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

/// Stream `src` into `dst` in [`CHUNK_SIZE`] pieces.
///
/// Deliberately a plain read/write loop. `copy_file_range`, reflinks and
/// block cloning let a copy-on-write filesystem share the existing blocks,
/// which would keep the old compression.
pub(crate) fn copy_contents(src: &mut File, dst: &mut File) -> Result<u64, CopyError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied: u64 = 0;

    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        dst.write_all(&buf[..n]).map_err(CopyError::Write)?;
        copied += n as u64;
    }

    dst.flush().map_err(CopyError::Write)?;
    Ok(copied)
}

// =============================================================================
// File identity
// =============================================================================

/// Snapshot of the attributes that change when someone else touches a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileIdentity {
    dev: u64,
    ino: u64,
    len: u64,
    mtime: Option<SystemTime>,
}

impl FileIdentity {
    pub(crate) fn of(meta: &Metadata) -> Self {
        let (dev, ino) = dev_ino(meta);
        Self {
            dev,
            ino,
            len: meta.len(),
            mtime: meta.modified().ok(),
        }
    }
}

#[cfg(unix)]
fn dev_ino(meta: &Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (meta.dev(), meta.ino())
}

#[cfg(not(unix))]
fn dev_ino(_meta: &Metadata) -> (u64, u64) {
    (0, 0)
}

/// Number of hard links to the file (always 1 where unknown).
#[cfg(unix)]
pub(crate) fn link_count(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.nlink()
}

#[cfg(not(unix))]
pub(crate) fn link_count(_meta: &Metadata) -> u64 {
    1
}

// =============================================================================
// Directory utilities
// =============================================================================

/// Get a unique key for a directory based on device and inode.
///
/// On non-Unix, falls back to a hash of the canonical path.
#[cfg(unix)]
pub(crate) fn get_dir_key(meta: &Metadata, _path: &Path) -> (u64, u64) {
    dev_ino(meta)
}

#[cfg(not(unix))]
pub(crate) fn get_dir_key(_meta: &Metadata, path: &Path) -> (u64, u64) {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    (0, hasher.finish())
}

/// Device id of a directory, used for `one_file_system`.
pub(crate) fn device_of(meta: &Metadata) -> u64 {
    dev_ino(meta).0
}

/// Flush a directory entry change (the rename) to disk.
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Bytes available to unprivileged users on the filesystem holding `dir`.
#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
pub(crate) fn available_space(dir: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(dir.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: statvfs is plain old data; an all-zero value is valid
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat points to a live statvfs
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
}

#[cfg(not(unix))]
pub(crate) fn available_space(_dir: &Path) -> io::Result<u64> {
    Ok(u64::MAX)
}

// =============================================================================
// Names
// =============================================================================

/// Whether `path` names a temporary file left behind by an interrupted rewrite.
///
/// Only the exact shape the rewriter creates matches:
/// `.recompress-<pid>-<random>.tmp`, where `<pid>` is decimal and `<random>`
/// is ASCII alphanumeric. The caller still has to check that the entry is a
/// regular file.
///
/// # Example
///
/// ```
/// use recompress::is_stale_temp_file;
/// use std::path::Path;
///
/// assert!(is_stale_temp_file(Path::new("/data/.recompress-4242-a1B2c3.tmp")));
/// assert!(!is_stale_temp_file(Path::new("/data/.recompress-notes.tmp")));
/// assert!(!is_stale_temp_file(Path::new("/data/report.tmp")));
/// ```
pub fn is_stale_temp_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(OsStr::to_str) else {
        return false;
    };
    let Some(middle) = name
        .strip_prefix(TEMP_PREFIX)
        .and_then(|rest| rest.strip_suffix(TEMP_SUFFIX))
    else {
        return false;
    };
    let Some((pid, random)) = middle.split_once('-') else {
        return false;
    };

    !pid.is_empty()
        && pid.bytes().all(|b| b.is_ascii_digit())
        && !random.is_empty()
        && random.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Prefix used for temp files of this process: `.recompress-<pid>-`.
pub(crate) fn own_temp_prefix() -> String {
    format!("{}{}-", TEMP_PREFIX, std::process::id())
}

/// Whether `path` is a temp file that belongs to a rewrite of this process.
pub(crate) fn is_own_temp_file(path: &Path) -> bool {
    let prefix = own_temp_prefix();
    path.file_name()
        .and_then(OsStr::to_str)
        .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(TEMP_SUFFIX))
}

/// Dot-prefixed names count as hidden.
#[inline]
pub(crate) fn is_hidden(name: &OsStr) -> bool {
    name.as_encoded_bytes().first() == Some(&b'.')
}

// =============================================================================
// Metadata preservation
// =============================================================================

/// Copy atime and mtime from `src_meta` onto an open file.
pub(crate) fn preserve_timestamps(src_meta: &Metadata, dst: &File) -> io::Result<()> {
    let mtime = FileTime::from_last_modification_time(src_meta);
    let atime = FileTime::from_last_access_time(src_meta);
    set_file_handle_times(dst, Some(atime), Some(mtime))
}

/// Copy owner and group from `src_meta` onto an open file.
///
/// A no-op when they already match, which is the common unprivileged case.
#[cfg(unix)]
pub(crate) fn preserve_ownership(src_meta: &Metadata, dst: &File) -> io::Result<()> {
    use std::os::unix::fs::MetadataExt;

    let current = dst.metadata()?;
    if current.uid() == src_meta.uid() && current.gid() == src_meta.gid() {
        return Ok(());
    }
    std::os::unix::fs::fchown(dst, Some(src_meta.uid()), Some(src_meta.gid()))
}

#[cfg(not(unix))]
pub(crate) fn preserve_ownership(_src_meta: &Metadata, _dst: &File) -> io::Result<()> {
    Ok(())
}

/// Copy permission bits from `src_meta` onto `dst`.
pub(crate) fn preserve_permissions(src_meta: &Metadata, dst: &File) -> io::Result<()> {
    dst.set_permissions(src_meta.permissions())
}

/// Remove a file, ignoring "not found".
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

// =============================================================================
// Tests
// =============================================================================
