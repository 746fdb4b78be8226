//! Edge case integration tests for the recompress CLI.
//!
//! These tests cover:
//! - Symlinks and special files
//! - Metadata preservation (permissions, timestamps, hard links)
//! - Leftover temp files from interrupted runs
//! - Special filenames and boundary conditions

#[path = "../common/mod.rs"]
mod common;

use assert_cmd::cargo::cargo_bin_cmd;
use common::TestTree;
use predicates::prelude::*;
use std::fs;
use std::time::{Duration, SystemTime};

#[test]
fn test_empty_root() {
    let tree = TestTree::new();

    let mut cmd = cargo_bin_cmd!("recompress");
    cmd.arg("-q")
        .arg(tree.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Rewrote 0 files"));
}

#[test]
fn test_special_filenames() {
    let tree = TestTree::new();
    tree.write("with space.txt", "space");
    tree.write("ünïcödé-名前.txt", "unicode");
    tree.write("dir with space/-leading-dash", "dash");
    tree.write("many.dots.in.name.tar.gz", "dots");
    let before = tree.snapshot();

    let mut cmd = cargo_bin_cmd!("recompress");
    cmd.arg("-q")
        .arg(tree.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Rewrote 4 files"));

    assert_eq!(tree.snapshot(), before);
}

#[test]
fn test_many_small_files_high_parallelism() {
    let tree = TestTree::new();
    tree.create_files(500, 64);
    let before = tree.snapshot();

    let mut cmd = cargo_bin_cmd!("recompress");
    cmd.arg("-q")
        .arg("-j")
        .arg("32")
        .arg("--no-sync")
        .arg(tree.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Rewrote 500 files"));

    assert_eq!(tree.snapshot(), before);
}

#[test]
fn test_timestamps_preserved() {
    let tree = TestTree::new();
    let file = tree.write("old.txt", "old content");
    let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
    fs::File::options()
        .write(true)
        .open(&file)
        .unwrap()
        .set_modified(past)
        .unwrap();

    let mut cmd = cargo_bin_cmd!("recompress");
    cmd.arg("-q").arg(tree.path()).assert().success();

    assert_eq!(fs::metadata(&file).unwrap().modified().unwrap(), past);
}

#[test]
fn test_no_times_flag() {
    let tree = TestTree::new();
    let file = tree.write("old.txt", "old content");
    let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
    fs::File::options()
        .write(true)
        .open(&file)
        .unwrap()
        .set_modified(past)
        .unwrap();

    let mut cmd = cargo_bin_cmd!("recompress");
    cmd.arg("-q")
        .arg("--no-times")
        .arg(tree.path())
        .assert()
        .success();

    assert!(fs::metadata(&file).unwrap().modified().unwrap() > past);
}

#[cfg(unix)]
mod unix_tests {
    use super::*;
    use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt, symlink};

    #[test]
    fn test_symlinks_left_alone() {
        let outside = TestTree::new();
        let target = outside.write("target.txt", "outside the tree");
        outside.write("dir/inner.txt", "inner");
        let target_inode = common::inode(&target);
        let inner_inode = common::inode(&outside.path().join("dir/inner.txt"));

        let tree = TestTree::new();
        tree.write("real.txt", "real");
        symlink(&target, tree.path().join("file_link")).unwrap();
        symlink(outside.path().join("dir"), tree.path().join("dir_link")).unwrap();
        symlink("nowhere", tree.path().join("dangling")).unwrap();

        let mut cmd = cargo_bin_cmd!("recompress");
        cmd.arg("-q")
            .arg(tree.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Rewrote 1 files"))
            .stdout(predicate::str::contains("3 skipped"));

        assert_eq!(common::inode(&target), target_inode);
        assert_eq!(
            common::inode(&outside.path().join("dir/inner.txt")),
            inner_inode
        );
        let link_meta = fs::symlink_metadata(tree.path().join("file_link")).unwrap();
        assert!(link_meta.file_type().is_symlink());
        assert_eq!(
            fs::read_link(tree.path().join("dangling")).unwrap().to_str(),
            Some("nowhere")
        );
    }

    #[test]
    fn test_fifo_is_skipped() {
        let tree = TestTree::new();
        tree.write("real.txt", "real");
        let fifo = tree.path().join("pipe");
        let c_path = std::ffi::CString::new(fifo.to_str().unwrap()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) }, 0);

        let mut cmd = cargo_bin_cmd!("recompress");
        cmd.arg("-q")
            .arg(tree.path())
            .timeout(Duration::from_secs(30))
            .assert()
            .success()
            .stdout(predicate::str::contains("Rewrote 1 files"))
            .stdout(predicate::str::contains("1 skipped"));

        assert!(fs::symlink_metadata(&fifo).unwrap().file_type().is_fifo());
    }

    #[test]
    fn test_permissions_preserved() {
        let tree = TestTree::new();
        let script = tree.write("run.sh", "#!/bin/sh\necho hi\n");
        let secret = tree.write("secret.key", "key");
        fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).unwrap();
        fs::set_permissions(&secret, fs::Permissions::from_mode(0o400)).unwrap();

        let mut cmd = cargo_bin_cmd!("recompress");
        cmd.arg("-q").arg(tree.path()).assert().success();

        let mode = |p: &std::path::Path| fs::metadata(p).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode(script.as_path()), 0o750);
        assert_eq!(mode(secret.as_path()), 0o400);
        assert_eq!(fs::read_to_string(&secret).unwrap(), "key");
    }

    #[test]
    fn test_hard_link_reported_as_degraded() {
        let tree = TestTree::new();
        let original = tree.write("original.txt", "shared");
        fs::hard_link(&original, tree.path().join("alias.txt")).unwrap();

        let mut cmd = cargo_bin_cmd!("recompress");
        cmd.arg("-q")
            .arg("-v")
            .arg(tree.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Rewrote 2 files"))
            .stderr(predicate::str::contains("hard link split"));

        assert_eq!(fs::read_to_string(&original).unwrap(), "shared");
        assert_eq!(
            fs::read_to_string(tree.path().join("alias.txt")).unwrap(),
            "shared"
        );
        assert_eq!(fs::metadata(&original).unwrap().nlink(), 1);
    }

    #[test]
    fn test_stale_temp_files_reported_then_cleaned() {
        let tree = TestTree::new();
        tree.write("data.txt", "data");
        let stale = tree.write("sub/.recompress-1-AbC123.tmp", "partial copy");

        let mut cmd = cargo_bin_cmd!("recompress");
        cmd.arg("-q")
            .arg(tree.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Rewrote 1 files"))
            .stderr(predicate::str::contains("--clean-temp"));
        assert!(stale.exists());

        let mut cmd = cargo_bin_cmd!("recompress");
        cmd.arg("-q")
            .arg("--clean-temp")
            .arg(tree.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Rewrote 1 files"));
        assert!(!stale.exists());
        assert_eq!(fs::read_to_string(tree.path().join("data.txt")).unwrap(), "data");
    }

    #[test]
    fn test_dry_run_never_cleans_temps() {
        let tree = TestTree::new();
        let stale = tree.write(".recompress-1-ZzZzZz.tmp", "partial copy");

        let mut cmd = cargo_bin_cmd!("recompress");
        cmd.arg("-q")
            .arg("-n")
            .arg("--clean-temp")
            .arg(tree.path())
            .assert()
            .success();

        assert!(stale.exists());
    }

    #[test]
    fn test_clean_temp_spares_lookalike_user_files() {
        let tree = TestTree::new();
        let notes = tree.write(".recompress-notes.tmp", "keep me");
        tree.write(".recompress-archive.tmp/a.txt", "a");
        tree.write(".recompress-archive.tmp/b.txt", "b");
        let before = tree.snapshot();

        let mut cmd = cargo_bin_cmd!("recompress");
        cmd.arg("-q")
            .arg("--clean-temp")
            .arg(tree.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Rewrote 3 files"))
            .stderr(predicate::str::contains("leftover temp").not());

        assert_eq!(fs::read_to_string(&notes).unwrap(), "keep me");
        assert_eq!(tree.snapshot(), before);
    }
}
