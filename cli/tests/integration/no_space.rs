//! No-space integration tests for the recompress CLI.
//!
//! These tests run the binary on a tiny tmpfs so a file cannot be copied
//! next to itself.
//!
//! # Running these tests
//!
//! Mounting needs root:
//!
//! ```bash
//! sudo cargo test --test no_space
//! ```
//!
//! or a privileged container:
//!
//! ```bash
//! docker run --privileged -v $(pwd):/workspace -w /workspace rust:latest \
//!   cargo test --package recompress-cli --test no_space
//! ```
//!
//! Without privileges the tests are skipped.

#[path = "../common/mod.rs"]
mod common;

#[cfg(target_os = "linux")]
mod linux_tests {
    use super::common;
    use assert_cmd::cargo::cargo_bin_cmd;
    use predicates::prelude::*;
    use serde_json::Value;
    use std::fs;
    use std::path::Path;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    /// Mount a 1 MiB tmpfs, or explain why not and return `None`.
    fn mount_small_tmpfs() -> Option<TempDir> {
        if !common::running_as_root() {
            eprintln!("SKIP: Test requires root privileges");
            eprintln!("      Run with: sudo cargo test --test no_space");
            return None;
        }

        let mount_point = TempDir::new().expect("Failed to create temp dir");
        let mount_result = StdCommand::new("mount")
            .args(["-t", "tmpfs", "-o", "size=1M", "tmpfs"])
            .arg(mount_point.path())
            .output();

        match mount_result {
            Ok(output) if output.status.success() => Some(mount_point),
            Ok(output) => {
                eprintln!(
                    "SKIP: Failed to mount tmpfs: {}",
                    String::from_utf8_lossy(&output.stderr)
                );
                None
            }
            Err(e) => {
                eprintln!("SKIP: Failed to execute mount: {}", e);
                None
            }
        }
    }

    fn leftover_temps(dir: &Path) -> Vec<std::path::PathBuf> {
        fs::read_dir(dir)
            .expect("Failed to read directory")
            .map(|entry| entry.expect("Failed to read entry").path())
            .filter(|path| recompress::is_stale_temp_file(path))
            .collect()
    }

    #[test]
    fn test_no_space_keeps_original_and_continues() {
        let Some(mount_point) = mount_small_tmpfs() else {
            return;
        };
        let _guard = scopeguard::guard(mount_point.path(), |path| {
            let _ = StdCommand::new("umount").arg(path).output();
        });

        // 700 KB cannot be copied again inside 1 MiB
        let big = mount_point.path().join("big.bin");
        let content: Vec<u8> = (0..700_000).map(|i| (i % 251) as u8).collect();
        fs::write(&big, &content).expect("Failed to write file");
        let small = mount_point.path().join("small.txt");
        fs::write(&small, "fits").expect("Failed to write file");
        let big_inode = common::inode(&big);

        let mut cmd = cargo_bin_cmd!("recompress");
        cmd.arg("-q")
            .arg(mount_point.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Rewrote 1 files"))
            .stdout(predicate::str::contains("1 failed"))
            .stderr(predicate::str::contains("no_space"));

        assert_eq!(fs::read(&big).expect("Failed to read file"), content);
        assert_eq!(common::inode(&big), big_inode);
        assert_eq!(fs::read_to_string(&small).expect("Failed to read file"), "fits");
        assert!(leftover_temps(mount_point.path()).is_empty());
    }

    #[test]
    fn test_no_space_in_json_report() {
        let Some(mount_point) = mount_small_tmpfs() else {
            return;
        };
        let _guard = scopeguard::guard(mount_point.path(), |path| {
            let _ = StdCommand::new("umount").arg(path).output();
        });

        let big = mount_point.path().join("big.bin");
        fs::write(&big, vec![b'z'; 700_000]).expect("Failed to write file");

        let mut cmd = cargo_bin_cmd!("recompress");
        let output = cmd
            .args(["--output", "json"])
            .arg(mount_point.path())
            .output()
            .expect("Failed to run recompress");

        assert_eq!(output.status.code(), Some(0));
        let value: Value = serde_json::from_slice(&output.stdout).expect("Invalid JSON");
        let report = &value["report"];
        assert_eq!(report["files_failed"], 1);
        assert_eq!(report["files_rewritten"], 0);
        assert_eq!(report["failures"][0]["kind"], "no_space");
        assert_eq!(report["cancelled"], false);
        assert_eq!(fs::read(&big).expect("Failed to read file").len(), 700_000);
        assert!(leftover_temps(mount_point.path()).is_empty());
    }
}
