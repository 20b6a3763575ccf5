//! Integration tests for mamba-setup

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn mamba_setup() -> Command {
        cargo_bin_cmd!("mamba-setup")
    }

    #[test]
    fn help_displays() {
        mamba_setup()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("provision an isolated micromamba runtime"));
    }

    #[test]
    fn version_displays() {
        mamba_setup()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("mamba-setup"));
    }

    #[test]
    fn provision_help_lists_cache_flags() {
        mamba_setup()
            .args(["provision", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--no-cache-environment"))
            .stdout(predicate::str::contains("--init-shell"));
    }

    #[test]
    fn provision_rejects_bogus_version() {
        mamba_setup()
            .args(["provision", "--micromamba-version", "not-a-version"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid micromamba version"));
    }

    #[test]
    fn provision_rejects_unknown_shell() {
        mamba_setup()
            .args(["provision", "--init-shell", "tcsh"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid value"));
    }

    #[test]
    fn provision_rejects_missing_config_file() {
        mamba_setup()
            .args(["provision", "--config", "/nonexistent/config.toml"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("reading config"));
    }

    #[test]
    fn post_without_state_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("absent.json");
        mamba_setup()
            .arg("-v")
            .arg("post")
            .arg("--state-file")
            .arg(&state)
            .assert()
            .success()
            .stdout(predicate::str::contains("No provision state found"));
    }

    #[test]
    fn post_skips_save_after_downloads_hit() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("phase.json");
        std::fs::write(
            &state,
            r#"{
                "cache_downloads": true,
                "downloads_cache_hit": true,
                "downloads_key": "bin-0123456789abcdef",
                "bin_path": "/opt/micromamba",
                "recorded_at": "2025-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();

        mamba_setup()
            .arg("-v")
            .arg("post")
            .arg("--state-file")
            .arg(&state)
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to save"));
    }

    #[test]
    fn post_skips_save_when_downloads_caching_disabled() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("micromamba");
        std::fs::write(&bin, b"ELF").unwrap();
        let cache_dir = dir.path().join("cache");
        let state = dir.path().join("phase.json");
        std::fs::write(
            &state,
            format!(
                r#"{{
                    "cache_downloads": false,
                    "downloads_cache_hit": false,
                    "downloads_key": "bin-0123456789abcdef",
                    "bin_path": "{}",
                    "recorded_at": "2025-01-01T00:00:00Z"
                }}"#,
                bin.display()
            ),
        )
        .unwrap();

        mamba_setup()
            .arg("-v")
            .arg("post")
            .arg("--state-file")
            .arg(&state)
            .arg("--cache-dir")
            .arg(&cache_dir)
            .assert()
            .success()
            .stdout(predicate::str::contains("caching was disabled"));

        assert!(!cache_dir.join("bin-0123456789abcdef").exists());
    }

    #[test]
    fn post_saves_binary_into_cache() {
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("micromamba");
        std::fs::write(&bin, b"ELF").unwrap();
        let cache_dir = dir.path().join("cache");
        let state = dir.path().join("phase.json");
        std::fs::write(
            &state,
            format!(
                r#"{{
                    "cache_downloads": true,
                    "downloads_cache_hit": false,
                    "downloads_key": "bin-0123456789abcdef",
                    "bin_path": "{}",
                    "recorded_at": "2025-01-01T00:00:00Z"
                }}"#,
                bin.display()
            ),
        )
        .unwrap();

        mamba_setup()
            .arg("-v")
            .arg("post")
            .arg("--state-file")
            .arg(&state)
            .arg("--cache-dir")
            .arg(&cache_dir)
            .assert()
            .success()
            .stdout(predicate::str::contains("Saved micromamba binary"));

        assert!(cache_dir.join("bin-0123456789abcdef").join("meta.json").exists());
    }
}
