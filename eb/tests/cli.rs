//! End-to-end tests of the `eb` command line.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TOY_EC: &str = "easyblock = 'Binary'
name = 'toy'
version = '0.0'
homepage = 'https://example.org/toy'
description = 'Toy tool'
toolchain = SYSTEM
sources = ['toy.sh']
dependencies = [('zlib', '1.3')]
postinstallcmds = ['mkdir -p %(installdir)s/bin && mv %(installdir)s/toy.sh %(installdir)s/bin/toy && chmod +x %(installdir)s/bin/toy']
sanity_check_paths = {'files': ['bin/toy'], 'dirs': []}
";

struct Fixture {
    tmp: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("home/.config")).unwrap();
        Self { tmp }
    }

    fn prefix(&self) -> PathBuf {
        self.tmp.path().join("prefix")
    }

    /// `eb` isolated from the caller's configuration files and `EASYBUILD_*` settings.
    fn eb(&self) -> Command {
        let mut cmd = Command::cargo_bin("eb").unwrap();
        for (key, _) in std::env::vars() {
            if key.starts_with("EASYBUILD_") {
                cmd.env_remove(key);
            }
        }
        let home = self.tmp.path().join("home");
        cmd.env("HOME", &home)
            .env("XDG_CONFIG_HOME", home.join(".config"))
            .env("EASYBUILD_PREFIX", self.prefix())
            .env("EASYBUILD_TMP_LOGDIR", self.tmp.path().join("logs"))
            .env_remove("MODULEPATH")
            .env_remove("EB_LOG");
        cmd
    }

    /// Writes the toy easyconfig and its source script; returns the easyconfig path.
    fn toy(&self) -> PathBuf {
        let ec_dir = self.tmp.path().join("ecs");
        fs::create_dir_all(&ec_dir).unwrap();
        let ec = ec_dir.join("toy-0.0.eb");
        fs::write(&ec, TOY_EC).unwrap();

        let store = self.prefix().join("sources/t/toy");
        fs::create_dir_all(&store).unwrap();
        fs::write(store.join("toy.sh"), "#!/bin/bash\necho toy\n").unwrap();
        ec
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn version_prints_banner() {
    let fx = Fixture::new();
    fx.eb()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("This is eb ").and(predicate::str::contains(" on host ")));
}

#[test]
fn no_action_is_an_error() {
    let fx = Fixture::new();
    fx.eb()
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("ERROR:"))
        .stderr(predicate::str::contains("Please provide one or multiple easyconfig files"));
}

#[test]
fn show_config_reports_sources() {
    let fx = Fixture::new();
    let installpath = fx.tmp.path().join("software-root");
    fx.eb()
        .arg("--show-config")
        .arg("--installpath")
        .arg(&installpath)
        .env("EASYBUILD_BUILDPATH", fx.tmp.path().join("build"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("#\n# Current eb configuration\n"))
        .stdout(predicate::str::contains(format!("(C) = {}", installpath.display())))
        .stdout(predicate::str::contains(format!(
            "(E) = {}",
            fx.tmp.path().join("build").display()
        )))
        .stdout(predicate::str::contains(format!("(E) = {}", fx.prefix().display())));
}

#[test]
fn show_system_info_lists_sections() {
    let fx = Fixture::new();
    fx.eb()
        .arg("--show-system-info")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("System information ("))
        .stdout(predicate::str::contains("* OS:"))
        .stdout(predicate::str::contains("* CPU:"))
        .stdout(predicate::str::contains("* Software:"));
}

#[test]
fn check_eb_deps_prints_both_sections() {
    let fx = Fixture::new();
    // The exit code depends on the tools installed on this host.
    fx.eb()
        .arg("--check-eb-deps")
        .assert()
        .stdout(predicate::str::contains("Required dependencies:"))
        .stdout(predicate::str::contains("Optional dependencies:"))
        .stdout(predicate::str::contains("bash"));
}

#[test]
fn list_toolchains_and_easyblocks() {
    let fx = Fixture::new();
    fx.eb()
        .arg("--list-toolchains")
        .assert()
        .success()
        .stdout(predicate::str::contains("List of known toolchains"))
        .stdout(predicate::str::contains("\tfoss: "));

    fx.eb()
        .arg("--list-easyblocks")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("EasyBlock\n"))
        .stdout(predicate::str::contains("|-- ConfigureMake"));

    fx.eb()
        .args(["--list-easyblocks=detailed", "--output-format", "md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("- **EasyBlock** (eb_core::easyblocks)"));
}

#[test]
fn json_output_is_rejected_for_toolchains() {
    let fx = Fixture::new();
    fx.eb()
        .args(["--list-toolchains", "--output-format", "json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ERROR:"));
}

#[test]
fn bootstrap_version_mismatch_fails() {
    let fx = Fixture::new();
    let script = fx.tmp.path().join("bootstrap_eb.py");
    fs::write(&script, "EB_BOOTSTRAP_VERSION = '20231214.01'\n").unwrap();
    let expected = format!("20231214.01 {}", "0".repeat(64));

    fx.eb()
        .arg("--verify-bootstrap")
        .arg(&script)
        .arg("--bootstrap-expected")
        .arg(&expected)
        .env("EASYBUILD_BOOTSTRAP_DEPRECATED", "1")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Version check on bootstrap script failed"));

    fx.eb()
        .arg("--verify-bootstrap")
        .arg(&script)
        .arg("--bootstrap-expected")
        .arg(&expected)
        .assert()
        .failure()
        .stderr(predicate::str::contains("EASYBUILD_BOOTSTRAP_DEPRECATED"));
}

#[test]
fn missing_dependency_without_robot_fails() {
    let fx = Fixture::new();
    let ec = fx.toy();
    fx.eb()
        .arg(path_arg(&ec))
        .assert()
        .failure()
        .stderr(predicate::str::contains("zlib/1.3"));
}

#[test]
fn extended_dry_run_builds_nothing() {
    let fx = Fixture::new();
    let ec = fx.toy();
    fx.eb()
        .args(["-x", &path_arg(&ec), "--filter-deps=zlib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("*** DRY RUN using 'Binary' easyblock"))
        .stdout(predicate::str::contains("[DRY RUN]"));
    assert!(!fx.prefix().join("software/toy").exists());
    assert!(!fx.prefix().join("modules").exists());
}

#[test]
fn dry_run_shows_build_status() {
    let fx = Fixture::new();
    let ec = fx.toy();
    fx.eb()
        .args(["-D", &path_arg(&ec)])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Dry run: printing build status of easyconfigs and dependencies",
        ))
        .stdout(predicate::str::contains("(module: toy/0.0)"))
        .stdout(predicate::str::contains(" * [?] (module: zlib/1.3)"));
}

#[test]
fn robot_build_with_filtered_dependency_is_idempotent() {
    let fx = Fixture::new();
    let ec = fx.toy();

    fx.eb()
        .args([&path_arg(&ec), "--trace", "--robot", "--filter-deps=zlib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("filtered dependencies: zlib/1.3"))
        .stdout(predicate::str::contains("== COMPLETED: Installation ended successfully"))
        .stdout(predicate::str::contains("== Build succeeded for 1 out of 1"));

    assert!(fx.prefix().join("software/toy/0.0/bin/toy").is_file());
    assert!(fx.prefix().join("software/toy/0.0/easybuild/toy-0.0.eb").is_file());

    fx.eb()
        .args([&path_arg(&ec), "--trace", "--robot", "--filter-deps=zlib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("== No easyconfigs left to be built."));

    fx.eb()
        .arg("--list-installed-software")
        .arg("--robot-paths")
        .arg(ec.parent().unwrap())
        .assert()
        .success()
        .stdout(predicate::str::contains("* toy"));
}

#[test]
fn license_and_cfgfile_constant_listings() {
    let fx = Fixture::new();
    fx.eb()
        .args(["--avail-easyconfig-licenses", "--output-format", "rst"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "License constants that can be used in easyconfigs\n---",
        ))
        .stdout(predicate::str::contains("``LicenseGPLv2``"));

    fx.eb()
        .arg("--avail-cfgfile-constants")
        .assert()
        .success()
        .stdout(predicate::str::contains("* HOME: Current user's home directory"))
        .stdout(predicate::str::contains(format!(
            "[value: {}]",
            fx.tmp.path().join("home").display()
        )));
}

#[test]
fn system_info_as_json() {
    let fx = Fixture::new();
    let output = fx
        .eb()
        .args(["--show-system-info", "--output-format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(info["os"]["name"].is_string());
    assert!(info["cpu"].is_object());
}
