//! Interruption tests for the recompress CLI.
//!
//! A killed or cancelled run must leave every original file intact. The only
//! debris allowed is temp files, which a later `--clean-temp` run removes.

#[path = "../common/mod.rs"]
mod common;

#[cfg(unix)]
mod unix_tests {
    use super::common::{self, TestTree};
    use assert_cmd::cargo::cargo_bin_cmd;
    use predicates::prelude::*;
    use std::path::PathBuf;
    use std::process::{Child, Command, Stdio};
    use std::thread;
    use std::time::{Duration, Instant};

    const FILE_COUNT: usize = 64;
    const FILE_SIZE: usize = 4 * 1024 * 1024;

    fn big_tree() -> (TestTree, Vec<(PathBuf, u64)>) {
        let tree = TestTree::new();
        let mut files = Vec::new();
        for i in 0..FILE_COUNT {
            let content: Vec<u8> = (0..FILE_SIZE).map(|b| ((b + i) % 251) as u8).collect();
            let path = tree.write(&format!("d{}/file{}.bin", i % 4, i), content);
            let inode = common::inode(&path);
            files.push((path, inode));
        }
        (tree, files)
    }

    fn spawn(tree: &TestTree, extra: &[&str]) -> Child {
        Command::new(env!("CARGO_BIN_EXE_recompress"))
            .args(extra)
            .arg("-q")
            .arg(tree.path())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap()
    }

    /// Wait until some file has been replaced, i.e. the run is underway.
    fn wait_for_first_rewrite(files: &[(PathBuf, u64)], child: &mut Child) {
        let deadline = Instant::now() + Duration::from_secs(30);
        while Instant::now() < deadline {
            if files.iter().any(|(path, inode)| common::inode(path) != *inode) {
                return;
            }
            if child.try_wait().unwrap().is_some() {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn non_temp_snapshot(tree: &TestTree) -> Vec<(PathBuf, Vec<u8>)> {
        tree.snapshot()
            .into_iter()
            .filter(|(path, _)| !recompress::is_stale_temp_file(path))
            .collect()
    }

    #[test]
    fn test_killed_run_leaves_originals_intact() {
        let (tree, files) = big_tree();
        let before = tree.snapshot();

        let mut child = spawn(&tree, &["-j", "2"]);
        wait_for_first_rewrite(&files, &mut child);
        let _ = child.kill();
        child.wait().unwrap();

        // Every original is either the old or the new copy, never partial
        assert_eq!(non_temp_snapshot(&tree), before);

        let mut cmd = cargo_bin_cmd!("recompress");
        cmd.arg("-q")
            .arg("--clean-temp")
            .arg(tree.path())
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("Rewrote {FILE_COUNT} files")));

        assert!(tree.temp_files().is_empty());
        assert_eq!(tree.snapshot(), before);
    }

    #[test]
    fn test_sigint_cancels_gracefully() {
        let (tree, files) = big_tree();
        let before = tree.snapshot();

        let mut child = spawn(&tree, &["-j", "1"]);
        wait_for_first_rewrite(&files, &mut child);
        unsafe {
            libc::kill(child.id() as libc::pid_t, libc::SIGINT);
        }
        let output = child.wait_with_output().unwrap();
        let stderr = String::from_utf8_lossy(&output.stderr);

        // The run may have finished before the signal landed
        match output.status.code() {
            Some(130) => {
                assert!(stderr.contains("Cancelled:"), "stderr: {stderr}");
                assert!(stderr.contains("discovered"), "stderr: {stderr}");
            }
            Some(0) => {}
            other => panic!("unexpected exit status {other:?}, stderr: {stderr}"),
        }

        // Graceful cancellation finishes in-flight files; nothing is left behind
        assert!(tree.temp_files().is_empty());
        assert_eq!(tree.snapshot(), before);
    }
}
