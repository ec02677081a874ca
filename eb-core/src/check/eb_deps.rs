// eb-core/src/check/eb_deps.rs
//! External tools a build relies on, and whether this host has them.
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use eb_aio::process::run_command_sync;
use eb_common::config::Config;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::modules_tool::modules_tool;

pub const REQUIRED_TOOLS: &[&str] = &["bash", "make", "patch", "tar"];
pub const OPTIONAL_TOOLS: &[&str] = &["git", "cmake", "gcc", "curl"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "version")]
pub enum ToolStatus {
    /// Found; carries the detected version when `--version` reveals one.
    Found(Option<String>),
    Missing,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCheck {
    pub name: String,
    pub required: bool,
    pub path: Option<PathBuf>,
    pub status: ToolStatus,
}

impl ToolCheck {
    pub fn is_missing(&self) -> bool {
        self.status == ToolStatus::Missing
    }

    /// `name version`, `name (version unknown)` or `name (NOT FOUND)`.
    pub fn describe(&self) -> String {
        match &self.status {
            ToolStatus::Found(Some(version)) => format!("{} {}", self.name, version),
            ToolStatus::Found(None) => format!("{} (version unknown)", self.name),
            ToolStatus::Missing => format!("{} (NOT FOUND)", self.name),
        }
    }
}

/// Checks the required tools (including the configured modules tool) and the
/// optional ones against `$PATH`.
pub fn check_eb_deps(config: &Config) -> Vec<ToolCheck> {
    let search_path = env::var_os("PATH");
    let mut checks = check_tools_in(REQUIRED_TOOLS, true, search_path.clone());

    let tool = modules_tool(config);
    checks.push(match tool.command() {
        Some(cmd) => ToolCheck {
            name: tool.name(),
            required: true,
            path: Some(cmd),
            status: ToolStatus::Found(tool.version().ok()),
        },
        None => ToolCheck {
            name: tool.name(),
            required: true,
            path: None,
            status: ToolStatus::Missing,
        },
    });

    checks.extend(check_tools_in(OPTIONAL_TOOLS, false, search_path));
    checks
}

/// Looks up each of `tools` in `search_path` (a `$PATH`-style list).
pub fn check_tools_in(tools: &[&str], required: bool, search_path: Option<OsString>) -> Vec<ToolCheck> {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    tools
        .iter()
        .map(|name| {
            match which::which_in(name, search_path.as_ref(), &cwd) {
                Ok(path) => {
                    let version = tool_version(&path);
                    debug!("Found {} at {} (version {:?})", name, path.display(), version);
                    ToolCheck {
                        name: name.to_string(),
                        required,
                        path: Some(path),
                        status: ToolStatus::Found(version),
                    }
                }
                Err(e) => {
                    debug!("{} not found: {}", name, e);
                    ToolCheck {
                        name: name.to_string(),
                        required,
                        path: None,
                        status: ToolStatus::Missing,
                    }
                }
            }
        })
        .collect()
}

/// First dotted version number in the first line of `<tool> --version` output.
fn tool_version(path: &Path) -> Option<String> {
    let output = run_command_sync(&path.display().to_string(), &["--version"], None, None).ok()?;
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    parse_version(&text)
}

fn parse_version(output: &str) -> Option<String> {
    let first_line = output.lines().find(|l| !l.trim().is_empty())?;
    let re = Regex::new(r"(\d+(?:\.\d+)+)").ok()?;
    re.captures(first_line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// True when every required tool was found.
pub fn all_required_found(checks: &[ToolCheck]) -> bool {
    checks.iter().all(|c| !c.required || !c.is_missing())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    fn stub(dir: &Path, name: &str, version_line: &str) {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\necho '{version_line}'\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn versions_from_first_line() {
        assert_eq!(
            parse_version("GNU bash, version 5.2.15(1)-release (x86_64-pc-linux-gnu)\nCopyright").as_deref(),
            Some("5.2.15")
        );
        assert_eq!(parse_version("tar (GNU tar) 1.34\n").as_deref(), Some("1.34"));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn finds_stub_tools_and_reports_missing() {
        let tmp = tempfile::tempdir().unwrap();
        stub(tmp.path(), "make", "GNU Make 4.3");
        stub(tmp.path(), "patch", "GNU patch 2.7.6");

        let checks = check_tools_in(
            &["make", "patch", "no-such-tool-here"],
            true,
            Some(tmp.path().as_os_str().to_owned()),
        );
        assert_eq!(checks[0].describe(), "make 4.3");
        assert_eq!(checks[1].describe(), "patch 2.7.6");
        assert_eq!(checks[2].describe(), "no-such-tool-here (NOT FOUND)");
        assert!(!all_required_found(&checks));

        let optional = check_tools_in(&["no-such-tool-here"], false, Some(tmp.path().as_os_str().to_owned()));
        assert!(all_required_found(&optional));
    }
}
