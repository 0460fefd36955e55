//! CLI argument parsing and offline command tests
//!
//! Nothing here launches a browser or touches the network.

#![allow(deprecated)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the walletbridge binary command
fn walletbridge() -> Command {
    let mut cmd = Command::cargo_bin("walletbridge").unwrap();
    cmd.env_remove("WALLETBRIDGE_REMOTE_DEBUGGING_URL")
        .env_remove("RUST_LOG");
    cmd
}

/// Config file pointing every cache into a temp dir
fn sandbox() -> (TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("config.toml");
    write_config(&config, tmp.path(), "");
    (tmp, config)
}

fn write_config(path: &Path, root: &Path, extra: &str) {
    let content = format!(
        "[cache]\nroot = \"{}\"\ntemp_root = \"{}\"\n{}",
        root.join("cache").display(),
        root.join("profiles").display(),
        extra
    );
    std::fs::write(path, content).unwrap();
}

mod help {
    use super::*;

    #[test]
    fn shows_help() {
        walletbridge()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("walletbridge"))
            .stdout(predicate::str::contains("prebake"))
            .stdout(predicate::str::contains("connect"));
    }

    #[test]
    fn shows_version() {
        walletbridge()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("walletbridge"));
    }

    #[test]
    fn global_flags_are_listed() {
        walletbridge()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--remote-debugging-url"))
            .stdout(predicate::str::contains("--headless"))
            .stdout(predicate::str::contains("--json"));
    }
}

mod connect_command {
    use super::*;

    #[test]
    fn connect_requires_url() {
        walletbridge()
            .arg("connect")
            .assert()
            .failure()
            .stderr(predicate::str::contains("<URL>"));
    }

    #[test]
    fn connect_help_shows_options() {
        walletbridge()
            .args(["connect", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--test-id"))
            .stdout(predicate::str::contains("--state"))
            .stdout(predicate::str::contains("[default: cli]"));
    }

    #[test]
    fn connect_without_prebaked_profile_fails_fast() {
        let (_tmp, config) = sandbox();
        walletbridge()
            .args(["--config", config.to_str().unwrap()])
            .args(["connect", "http://localhost:3000"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("ProfileCacheMissing"));
    }
}

mod config_command {
    use super::*;

    #[test]
    fn path_follows_config_flag() {
        let (_tmp, config) = sandbox();
        walletbridge()
            .args(["--config", config.to_str().unwrap(), "config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn show_merges_file_env_and_flags() {
        let tmp = tempfile::tempdir().unwrap();
        let config = tmp.path().join("config.toml");
        write_config(&config, tmp.path(), "[network]\nchain_id = 137\n");

        let output = walletbridge()
            .env("WALLETBRIDGE_WALLET__VERSION", "12.0.0")
            .args(["--config", config.to_str().unwrap(), "--json", "--headless"])
            .args(["--remote-debugging-url", "http://127.0.0.1:9222"])
            .args(["config", "show"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(shown["network"]["chain_id"], 137);
        assert_eq!(shown["wallet"]["version"], "12.0.0");
        assert_eq!(shown["browser"]["headless"], true);
        assert_eq!(
            shown["browser"]["remote_debugging_url"],
            "http://127.0.0.1:9222"
        );
        assert_eq!(shown["dapp"]["connect_button"], "text=Connect Wallet");
    }

    #[test]
    fn invalid_pinned_version_is_rejected() {
        let (_tmp, config) = sandbox();
        walletbridge()
            .env("WALLETBRIDGE_WALLET__VERSION", "latest")
            .args(["--config", config.to_str().unwrap(), "config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("InvalidVersion"));
    }
}

mod cache_commands {
    use super::*;

    #[test]
    fn fingerprint_reports_missing_profile() {
        let (_tmp, config) = sandbox();
        let output = walletbridge()
            .args(["--config", config.to_str().unwrap(), "--json", "fingerprint"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let fingerprint = shown["fingerprint"].as_str().unwrap();
        assert_eq!(fingerprint.len(), 20);
        assert_eq!(shown["prebaked"], false);
    }

    #[test]
    fn fingerprint_changes_with_network() {
        let (tmp, config) = sandbox();
        let other = tmp.path().join("other.toml");
        write_config(&other, tmp.path(), "[network]\nchain_id = 1\n");

        let read = |path: &Path| -> String {
            let output = walletbridge()
                .args(["--config", path.to_str().unwrap(), "--json", "fingerprint"])
                .output()
                .unwrap();
            let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
            shown["fingerprint"].as_str().unwrap().to_string()
        };

        assert_ne!(read(&config), read(&other));
    }

    #[test]
    fn empty_cache_lists_nothing() {
        let (_tmp, config) = sandbox();
        let output = walletbridge()
            .args(["--config", config.to_str().unwrap(), "--json", "cache", "list"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let shown: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(shown["extension_versions"], serde_json::json!([]));
        assert_eq!(shown["prebaked"], false);
    }

    #[test]
    fn removing_uncached_version_is_not_an_error() {
        let (_tmp, config) = sandbox();
        walletbridge()
            .args(["--config", config.to_str().unwrap(), "cache", "remove", "11.9.1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("not cached"));
    }

    #[test]
    fn removing_invalid_version_fails() {
        let (_tmp, config) = sandbox();
        walletbridge()
            .args(["--config", config.to_str().unwrap(), "cache", "remove", "not-a-version"])
            .assert()
            .failure();
    }
}
