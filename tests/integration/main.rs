//! Integration tests for buildcache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn buildcache() -> Command {
        let mut cmd = cargo_bin_cmd!("buildcache");
        for var in [
            "GITHUB_OUTPUT",
            "GITHUB_RUN_ID",
            "BUILDCACHE_RUN_ID",
            "BUILDCACHE_STATE_FILE",
            "BUILDCACHE_DISABLED",
            "RUST_LOG",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    /// A workspace with its own store, state file and config
    struct Pipeline {
        _temp: TempDir,
        root: PathBuf,
    }

    impl Pipeline {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let root = temp.path().to_path_buf();
            std::fs::create_dir_all(root.join("work/target")).unwrap();
            std::fs::write(root.join("work/target/app.o"), b"object code").unwrap();
            Self { _temp: temp, root }
        }

        fn target(&self) -> PathBuf {
            self.root.join("work/target")
        }

        /// Command for one phase of run `run`, triggered by `event`
        fn phase(&self, phase: &str, run: &str, event: &str, key: &str) -> Command {
            self.phase_at(phase, run, event, key, &self.target())
        }

        /// Like [`Pipeline::phase`], caching `cached` instead of the target
        fn phase_at(&self, phase: &str, run: &str, event: &str, key: &str, cached: &Path) -> Command {
            let mut cmd = buildcache();
            cmd.env("BUILDCACHE_CONFIG", self.root.join("config.toml"))
                .args(["--store-dir", &path(&self.root.join("store"))])
                .args(["--state-file", &path(&self.root.join(format!("{run}.jsonl")))])
                .args(["--event", event, "--ref", "refs/heads/main"])
                .arg(phase)
                .args(["--key", key, "--path", &path(cached)]);
            cmd
        }

        /// Command for one phase, scoped only by the CI run environment
        fn job_phase(&self, phase: &str, key: &str, cached: &str) -> Command {
            std::fs::write(
                self.root.join("config.toml"),
                format!("[state]\ndir = '{}'\n", self.root.join("runs").display()),
            )
            .unwrap();

            let mut cmd = buildcache();
            cmd.env("BUILDCACHE_CONFIG", self.root.join("config.toml"))
                .env("GITHUB_RUN_ID", "1")
                .env("GITHUB_RUN_ATTEMPT", "1")
                .env("GITHUB_JOB", "ci")
                .args(["--store-dir", &path(&self.root.join("store"))])
                .args(["--event", "push", "--ref", "refs/heads/main"])
                .arg(phase)
                .args(["--key", key, "--path", &path(&self.root.join(cached))]);
            cmd
        }
    }

    fn path(p: &Path) -> String {
        p.display().to_string()
    }

    #[test]
    fn help_displays() {
        buildcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build cache for CI pipelines"));
    }

    #[test]
    fn version_displays() {
        buildcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("buildcache"));
    }

    #[test]
    fn restore_save_restore_cycle() {
        let pipeline = Pipeline::new();

        pipeline
            .phase("restore", "run-1", "push", "linux-deps-v1")
            .assert()
            .success()
            .stdout(predicate::str::contains("cache-hit=false"))
            .stderr(predicate::str::contains("Cache not found for input keys: linux-deps-v1"));

        pipeline
            .phase("save", "run-1", "push", "linux-deps-v1")
            .assert()
            .success()
            .stderr(predicate::str::contains("Cache saved with key: linux-deps-v1"));

        std::fs::remove_dir_all(pipeline.target()).unwrap();

        pipeline
            .phase("restore", "run-2", "push", "linux-deps-v1")
            .assert()
            .success()
            .stdout(predicate::str::contains("cache-hit=true"));
        assert_eq!(
            std::fs::read(pipeline.target().join("app.o")).unwrap(),
            b"object code"
        );

        pipeline
            .phase("save", "run-2", "push", "linux-deps-v1")
            .assert()
            .success()
            .stderr(predicate::str::contains("not saving cache"));
    }

    #[test]
    fn prefix_match_reports_miss_signal() {
        let pipeline = Pipeline::new();
        pipeline
            .phase("restore", "run-1", "push", "linux-deps-v1")
            .assert()
            .success();
        pipeline
            .phase("save", "run-1", "push", "linux-deps-v1")
            .assert()
            .success();

        pipeline
            .phase("restore", "run-2", "push", "linux-deps-v2")
            .args(["--restore-keys", "linux-deps-"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cache-hit=false"))
            .stderr(predicate::str::contains("Cache restored from key: linux-deps-v1"));
    }

    #[test]
    fn schedule_event_is_a_no_op() {
        let pipeline = Pipeline::new();
        pipeline
            .phase("restore", "run-1", "schedule", "linux-deps-v1")
            .assert()
            .success()
            .stdout(predicate::str::contains("cache-hit=false"))
            .stderr(predicate::str::contains("Event Validation Error"));

        pipeline
            .phase("save", "run-1", "schedule", "linux-deps-v1")
            .assert()
            .success();
        assert!(!pipeline.root.join("store/entries").exists());
    }

    #[test]
    fn restore_without_key_fails() {
        let pipeline = Pipeline::new();
        pipeline
            .phase("restore", "run-1", "push", "")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Input required and not supplied: key"));
    }

    #[test]
    fn save_without_state_succeeds() {
        let pipeline = Pipeline::new();
        pipeline
            .phase("save", "never-restored", "push", "linux-deps-v1")
            .assert()
            .success()
            .stderr(predicate::str::contains("Error retrieving key from state."));
    }

    #[test]
    fn incomplete_s3_settings_fail_restore() {
        let pipeline = Pipeline::new();
        pipeline
            .phase("restore", "run-1", "push", "linux-deps-v1")
            .args(["--s3-endpoint", "https://s3.local"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("S3 configuration incomplete"));
    }

    #[test]
    fn output_file_receives_signal() {
        let pipeline = Pipeline::new();
        let output = pipeline.root.join("github_output");
        pipeline
            .phase("restore", "run-1", "push", "linux-deps-v1")
            .env("GITHUB_OUTPUT", &output)
            .assert()
            .success();
        assert_eq!(
            std::fs::read_to_string(output).unwrap(),
            "cache-hit=false\n"
        );
    }

    #[test]
    fn exact_key_saved_for_other_paths_fails_restore() {
        let pipeline = Pipeline::new();
        pipeline
            .phase("restore", "run-1", "push", "k")
            .assert()
            .success();
        pipeline.phase("save", "run-1", "push", "k").assert().success();

        let elsewhere = pipeline.root.join("work/other");
        pipeline
            .phase_at("restore", "run-2", "push", "k", &elsewhere)
            .assert()
            .failure()
            .stdout(predicate::str::contains("cache-hit=true").not())
            .stderr(predicate::str::contains("holds no data"));
        assert!(!elsewhere.exists());
    }

    #[test]
    fn two_caches_in_one_job_keep_their_keys() {
        let pipeline = Pipeline::new();
        for dir in ["deps", "build"] {
            std::fs::create_dir_all(pipeline.root.join(dir)).unwrap();
            std::fs::write(pipeline.root.join(dir).join("out"), dir).unwrap();
        }

        pipeline
            .job_phase("restore", "deps-v1", "deps")
            .assert()
            .success();
        pipeline
            .job_phase("restore", "build-v1", "build")
            .assert()
            .success();

        pipeline
            .job_phase("save", "deps-v1", "deps")
            .assert()
            .success()
            .stderr(predicate::str::contains("Cache saved with key: deps-v1"));
        pipeline
            .job_phase("save", "build-v1", "build")
            .assert()
            .success()
            .stderr(predicate::str::contains("Cache saved with key: build-v1"));
    }
}
