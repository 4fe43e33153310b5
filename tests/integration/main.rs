//! Integration tests for gradle-cache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn gradle_cache() -> Command {
        cargo_bin_cmd!("gradle-cache")
    }

    /// A job with its own runner temp, home and store
    struct Runner {
        temp: TempDir,
    }

    impl Runner {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            for dir in ["home", "runner-temp", "store"] {
                std::fs::create_dir_all(temp.path().join(dir)).unwrap();
            }
            Self { temp }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.temp.path().join(name)
        }

        fn gradle_user_home(&self) -> PathBuf {
            self.path("home/.gradle")
        }

        fn state(&self) -> PathBuf {
            self.path("runner-temp/.gradle-cache/job-state.json")
        }

        fn command(&self, with_store: bool) -> Command {
            let mut cmd = gradle_cache();
            cmd.env_clear()
                .env("HOME", self.path("home"))
                .env("GRADLE_USER_HOME", self.gradle_user_home())
                .env("RUNNER_TEMP", self.path("runner-temp"))
                .env("GRADLE_CACHE_CONFIG", self.path("missing.toml"))
                .env("RUNNER_OS", "Linux")
                .env("RUNNER_ARCH", "X64")
                .env("GITHUB_JOB", "build")
                .env("GITHUB_WORKFLOW", "CI")
                .env("GITHUB_SHA", "0123abcd")
                .env("INPUT_CACHE-CLEANUP", "never");
            if with_store {
                cmd.env("GRADLE_CACHE_STORE_DIR", self.path("store"));
            }
            cmd
        }
    }

    fn write_file(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn help_displays() {
        gradle_cache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Gradle User Home"));
    }

    #[test]
    fn version_displays() {
        gradle_cache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("gradle-cache"));
    }

    #[test]
    fn key_prints_hierarchy() {
        let runner = Runner::new();
        runner
            .command(false)
            .arg("key")
            .assert()
            .success()
            .stdout(predicate::str::starts_with("gradle-home-v1|Linux-X64|build["))
            .stdout(predicate::str::contains("]-0123abcd"))
            .stdout(predicate::str::contains("  gradle-home-v1|Linux-X64\n"));
    }

    #[test]
    fn key_strict_match_json() {
        let runner = Runner::new();
        let output = runner
            .command(false)
            .env("INPUT_GRADLE-HOME-CACHE-STRICT-MATCH", "true")
            .args(["key", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let key: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(key["restore_keys"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn invalid_input_fails_fast() {
        let runner = Runner::new();
        runner
            .command(false)
            .env("INPUT_CACHE-READ-ONLY", "yes")
            .arg("restore")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"))
            .stderr(predicate::str::contains("cache-read-only"));
    }

    #[test]
    fn report_without_state() {
        let runner = Runner::new();
        runner
            .command(false)
            .arg("report")
            .assert()
            .success()
            .stdout(predicate::str::contains("Caching for Gradle was enabled"));
    }

    #[test]
    fn report_lists_deprecated_inputs() {
        let runner = Runner::new();
        runner
            .command(false)
            .env("INPUT_GRADLE-HOME-CACHE-CLEANUP", "false")
            .arg("report")
            .assert()
            .success()
            .stdout(predicate::str::contains("Deprecation warnings"))
            .stdout(predicate::str::contains(
                "`gradle-home-cache-cleanup` input parameter has been replaced",
            ));
    }

    #[test]
    fn restore_without_store_initialises_home() {
        let runner = Runner::new();
        runner
            .command(false)
            .arg("restore")
            .assert()
            .success();

        assert!(runner.gradle_user_home().join(".setup-gradle").is_dir());
        let state = std::fs::read_to_string(runner.state()).unwrap();
        assert!(state.contains("\"setup_completed\": true"));

        runner
            .command(false)
            .arg("report")
            .assert()
            .success()
            .stdout(predicate::str::contains("Caching for Gradle was not available"));

        runner
            .command(false)
            .arg("save")
            .assert()
            .success();
        assert_eq!(std::fs::read_dir(runner.path("store")).unwrap().count(), 0);
    }

    #[test]
    fn save_then_restore_in_next_job() {
        let runner = Runner::new();
        runner.command(true).arg("restore").assert().success();

        let marker = runner.gradle_user_home().join("caches/modules-2/metadata.bin");
        write_file(&marker, "cached");
        runner
            .command(true)
            .arg("save")
            .assert()
            .success()
            .stdout(predicate::str::contains("Entries Saved"));
        assert!(std::fs::read_dir(runner.path("store")).unwrap().count() > 0);

        // Next job on a fresh runner sharing the store
        std::fs::remove_dir_all(runner.gradle_user_home()).unwrap();
        std::fs::remove_dir_all(runner.path("runner-temp")).unwrap();
        std::fs::create_dir_all(runner.path("runner-temp")).unwrap();

        runner
            .command(true)
            .arg("restore")
            .assert()
            .success()
            .stdout(predicate::str::contains("Restored gradle-home-v1|Linux-X64|build["));
        assert_eq!(std::fs::read_to_string(&marker).unwrap(), "cached");
    }

    #[test]
    fn existing_home_is_left_alone() {
        let runner = Runner::new();
        write_file(&runner.gradle_user_home().join("caches/keep.txt"), "mine");

        runner.command(true).arg("restore").assert().success();
        runner
            .command(true)
            .arg("report")
            .assert()
            .success()
            .stdout(predicate::str::contains("Caching for Gradle was disabled"));
    }

    #[test]
    fn cleanup_requires_timestamp() {
        let runner = Runner::new();
        runner
            .command(false)
            .arg("cleanup")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--timestamp"));
    }

    #[test]
    fn config_path() {
        let runner = Runner::new();
        runner
            .command(false)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("missing.toml"));
    }

    #[test]
    fn config_show_includes_inputs() {
        let runner = Runner::new();
        runner
            .command(false)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("cleanup = \"never\""));
    }

    #[test]
    fn completions_generate() {
        gradle_cache()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("gradle-cache"));
    }
}
