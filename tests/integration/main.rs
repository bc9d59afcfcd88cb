//! Integration tests for idae

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// idae with a private config and cache under `temp`
    fn idae(temp: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("idae");
        cmd.env("IDAE_CONFIG", temp.path().join("config.toml"))
            .env("IDAE_CACHE_DIR", temp.path().join("cache"))
            .env_remove("CI");
        cmd
    }

    fn script(temp: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = temp.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    /// Whether a `python3` that can create virtual environments is on PATH
    fn venv_capable_python() -> bool {
        std::process::Command::new("python3")
            .args(["-c", "import venv, ensurepip"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        idae(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("inline dependenc"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        idae(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("idae"));
    }

    #[test]
    fn run_help() {
        let temp = TempDir::new().unwrap();
        idae(&temp)
            .args(["run", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--python-flags"))
            .stdout(predicate::str::contains("--force-version"));
    }

    #[test]
    fn clean_explicit_dir() {
        let temp = TempDir::new().unwrap();
        let cache = temp.path().join("cache");
        std::fs::create_dir_all(cache.join("3.12").join("abc")).unwrap();

        idae(&temp).arg("clean").assert().success();
        assert!(!cache.exists());
    }

    #[test]
    fn clean_missing_dir_succeeds() {
        let temp = TempDir::new().unwrap();
        idae(&temp)
            .args(["clean", "--cache-dir"])
            .arg(temp.path().join("never-created"))
            .assert()
            .success();
    }

    #[test]
    fn clean_local_dir() {
        let temp = TempDir::new().unwrap();
        let local = temp.path().join(".idae");
        std::fs::create_dir_all(local.join("3.11")).unwrap();

        idae(&temp)
            .current_dir(temp.path())
            .args(["clean", "--local"])
            .assert()
            .success();
        assert!(!local.exists());
    }

    #[test]
    fn missing_script() {
        let temp = TempDir::new().unwrap();
        idae(&temp)
            .args(["run", "does_not_exist.py"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Script not found"));
    }

    #[test]
    fn multiple_blocks_rejected() {
        let temp = TempDir::new().unwrap();
        let path = script(
            &temp,
            "twice.py",
            "# /// script\n# dependencies = []\n# ///\n\n# /// script\n# dependencies = []\n# ///\n",
        );

        idae(&temp)
            .arg("run")
            .arg(&path)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Multiple script blocks"));
        assert!(!temp.path().join("cache").exists());
    }

    #[test]
    fn impossible_python() {
        let temp = TempDir::new().unwrap();
        let path = script(
            &temp,
            "impossible_python.py",
            "# /// script\n# requires-python = \">=69420\"\n# ///\nprint('unreachable')\n",
        );

        idae(&temp)
            .arg("run")
            .arg(&path)
            .assert()
            .code(1)
            .stdout(predicate::str::contains("unreachable").not())
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn unparsable_constraint() {
        let temp = TempDir::new().unwrap();
        let path = script(
            &temp,
            "bad_constraint.py",
            "# /// script\n# requires-python = \"~&%29\"\n# ///\n",
        );

        idae(&temp)
            .arg("run")
            .arg(&path)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("could not be parsed"));
    }

    #[test]
    fn force_version_overrides_script() {
        let temp = TempDir::new().unwrap();
        let path = script(
            &temp,
            "forced.py",
            "# /// script\n# requires-python = \">=3\"\n# ///\n",
        );

        idae(&temp)
            .args(["run", "--force-version", ">=69420"])
            .arg(&path)
            .assert()
            .code(1)
            .stderr(predicate::str::contains(">=69420 not found"));
    }

    #[test]
    fn malformed_metadata() {
        let temp = TempDir::new().unwrap();
        let path = script(
            &temp,
            "malformed.py",
            "# /// script\n# dependencies = [\"rich\"\n# ///\n",
        );

        idae(&temp)
            .arg("run")
            .arg(&path)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid script metadata"));
    }

    #[test]
    fn invalid_dependency() {
        let temp = TempDir::new().unwrap();
        let path = script(
            &temp,
            "bad_dep.py",
            "# /// script\n# dependencies = [\"not a package!\"]\n# ///\n",
        );

        idae(&temp)
            .arg("run")
            .arg(&path)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid requirement"));
    }

    #[test]
    fn invalid_config_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[python\n").unwrap();
        let path = script(&temp, "plain.py", "print('hi')\n");

        idae(&temp)
            .arg("run")
            .arg(&path)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn missing_default_interpreter() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.toml"),
            "[python]\ndefault = \"/nonexistent/python3\"\n",
        )
        .unwrap();
        let path = script(&temp, "plain.py", "print('hi')\n");

        idae(&temp)
            .arg("run")
            .arg(&path)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("/nonexistent/python3"));
    }

    #[test]
    fn runs_script_and_forwards_exit_code() {
        if !venv_capable_python() {
            eprintln!("skipping: python3 with venv support not available");
            return;
        }
        let temp = TempDir::new().unwrap();
        let path = script(
            &temp,
            "echo_args.py",
            "# /// script\n# dependencies = []\n# ///\nimport sys\nprint(' '.join(sys.argv[1:]))\nsys.exit(3)\n",
        );

        for _ in 0..2 {
            idae(&temp)
                .args(["run", "--python-flags", "-u"])
                .arg(&path)
                .args(["hello", "--flag"])
                .assert()
                .code(3)
                .stdout(predicate::str::contains("hello --flag"));
        }

        // Both runs share one environment
        let cache = temp.path().join("cache");
        let versions: Vec<_> = std::fs::read_dir(&cache)
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert_eq!(versions.len(), 1);
        assert_eq!(entries(&versions[0].path()), 1);
    }
}
