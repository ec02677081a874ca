// eb-core/src/modules_tool.rs
//! The environment modules tool on this host: which one, where, which version.
use std::env;
use std::path::PathBuf;

use eb_aio::process::run_command_sync;
use eb_common::config::{Config, ModuleSyntax, ModulesToolKind};
use eb_common::error::{EbError, Result};
use eb_common::InstalledModules;
use regex::Regex;
use tracing::{debug, warn};

pub trait ModulesTool: Send + Sync {
    fn kind(&self) -> ModulesToolKind;

    /// Executable driving the tool, if it can be found.
    fn command(&self) -> Option<PathBuf>;

    /// Arguments that make `command` print its version.
    fn version_args(&self) -> &'static [&'static str];

    /// Extracts the version from the output of `command version_args`.
    fn parse_version(&self, output: &str) -> Option<String>;

    fn supported_syntaxes(&self) -> &'static [ModuleSyntax] {
        &[ModuleSyntax::Tcl]
    }

    fn module_paths(&self) -> &[PathBuf];

    /// Adds `path` in front of the module paths.
    fn use_path(&mut self, path: PathBuf);

    fn name(&self) -> String {
        self.kind().to_string()
    }

    fn version(&self) -> Result<String> {
        let cmd = self.command().ok_or_else(|| {
            EbError::ModulesTool(format!("{} command not found", self.name()))
        })?;
        let cmd_str = cmd.display().to_string();
        let output = run_command_sync(&cmd_str, self.version_args(), None, None)?;
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        self.parse_version(&text).ok_or_else(|| {
            EbError::ModulesTool(format!(
                "Failed to determine {} version from output of '{} {}'",
                self.name(),
                cmd_str,
                self.version_args().join(" ")
            ))
        })
    }

    /// Whether a module file exists for each of `mod_names`, in order.
    fn exist(&self, mod_names: &[String]) -> Vec<bool> {
        let lua = self.supported_syntaxes().contains(&ModuleSyntax::Lua);
        mod_names
            .iter()
            .map(|name| {
                self.module_paths().iter().any(|dir| {
                    dir.join(name).is_file()
                        || (lua && dir.join(format!("{name}.lua")).is_file())
                })
            })
            .collect()
    }
}

fn capture(pattern: &str, output: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()?
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
}

/// `$<env_var>` if it names an existing file, else `program` from `$PATH`.
fn find_command(env_var: &str, program: &str) -> Option<PathBuf> {
    if let Ok(value) = env::var(env_var) {
        let path = PathBuf::from(value);
        if path.is_file() {
            return Some(path);
        }
        debug!("${} points to missing file {}", env_var, path.display());
    }
    which::which(program).ok()
}

macro_rules! module_paths_impl {
    () => {
        fn module_paths(&self) -> &[PathBuf] {
            &self.module_paths
        }

        fn use_path(&mut self, path: PathBuf) {
            self.module_paths.retain(|p| p != &path);
            self.module_paths.insert(0, path);
        }
    };
}

pub struct Lmod {
    module_paths: Vec<PathBuf>,
}

impl Lmod {
    pub fn new(module_paths: Vec<PathBuf>) -> Self {
        Self { module_paths }
    }
}

impl ModulesTool for Lmod {
    fn kind(&self) -> ModulesToolKind {
        ModulesToolKind::Lmod
    }

    fn command(&self) -> Option<PathBuf> {
        find_command("LMOD_CMD", "lmod")
    }

    fn version_args(&self) -> &'static [&'static str] {
        &["--version"]
    }

    fn parse_version(&self, output: &str) -> Option<String> {
        capture(r"Version\s+(\d[\d.]*)", output)
    }

    fn supported_syntaxes(&self) -> &'static [ModuleSyntax] {
        &[ModuleSyntax::Lua, ModuleSyntax::Tcl]
    }

    module_paths_impl!();
}

/// Environment Modules 4.x and later (Tcl implementation, `modulecmd.tcl`).
pub struct EnvironmentModules {
    module_paths: Vec<PathBuf>,
}

impl EnvironmentModules {
    pub fn new(module_paths: Vec<PathBuf>) -> Self {
        Self { module_paths }
    }
}

impl ModulesTool for EnvironmentModules {
    fn kind(&self) -> ModulesToolKind {
        ModulesToolKind::EnvironmentModules
    }

    fn command(&self) -> Option<PathBuf> {
        find_command("MODULES_CMD", "modulecmd.tcl")
    }

    fn version_args(&self) -> &'static [&'static str] {
        &["bash", "--version"]
    }

    fn parse_version(&self, output: &str) -> Option<String> {
        capture(r"Modules Release\s+(\d[\d.]*)", output)
    }

    module_paths_impl!();
}

/// Environment Modules 3.x, the C implementation (`modulecmd`).
pub struct EnvironmentModulesC {
    module_paths: Vec<PathBuf>,
}

impl EnvironmentModulesC {
    pub fn new(module_paths: Vec<PathBuf>) -> Self {
        Self { module_paths }
    }
}

impl ModulesTool for EnvironmentModulesC {
    fn kind(&self) -> ModulesToolKind {
        ModulesToolKind::EnvironmentModulesC
    }

    fn command(&self) -> Option<PathBuf> {
        which::which("modulecmd").ok()
    }

    fn version_args(&self) -> &'static [&'static str] {
        &["bash", "--version"]
    }

    fn parse_version(&self, output: &str) -> Option<String> {
        capture(r"VERSION=(\d[\d.]*)", output)
    }

    module_paths_impl!();
}

/// The old Tcl-only implementation (`modulecmd.tcl` before 4.0).
pub struct EnvironmentModulesTcl {
    module_paths: Vec<PathBuf>,
}

impl EnvironmentModulesTcl {
    pub fn new(module_paths: Vec<PathBuf>) -> Self {
        Self { module_paths }
    }
}

impl ModulesTool for EnvironmentModulesTcl {
    fn kind(&self) -> ModulesToolKind {
        ModulesToolKind::EnvironmentModulesTcl
    }

    fn command(&self) -> Option<PathBuf> {
        find_command("MODULES_CMD", "modulecmd.tcl")
    }

    fn version_args(&self) -> &'static [&'static str] {
        &["bash", "--version"]
    }

    fn parse_version(&self, output: &str) -> Option<String> {
        capture(r"Modules Release Tcl\s+(\d[\d.]*)", output)
    }

    module_paths_impl!();
}

/// The configured modules tool, seeing the configured module directory and `$MODULEPATH`.
pub fn modules_tool(config: &Config) -> Box<dyn ModulesTool> {
    let module_paths = InstalledModules::new(config).module_paths().to_vec();
    let tool: Box<dyn ModulesTool> = match config.modules_tool {
        ModulesToolKind::Lmod => Box::new(Lmod::new(module_paths)),
        ModulesToolKind::EnvironmentModules => Box::new(EnvironmentModules::new(module_paths)),
        ModulesToolKind::EnvironmentModulesC => Box::new(EnvironmentModulesC::new(module_paths)),
        ModulesToolKind::EnvironmentModulesTcl => Box::new(EnvironmentModulesTcl::new(module_paths)),
    };
    if !tool.supported_syntaxes().contains(&config.module_syntax) {
        warn!(
            "{} does not support {} module files",
            tool.name(),
            config.module_syntax
        );
    }
    tool
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn parses_versions() {
        let lmod = Lmod::new(Vec::new());
        assert_eq!(
            lmod.parse_version("\nModules based on Lua: Version 8.7.32  2023-08-28 12:42 -05:00\n"),
            Some("8.7.32".to_string())
        );
        let envmod = EnvironmentModules::new(Vec::new());
        assert_eq!(
            envmod.parse_version("Modules Release 5.3.1 (2023-06-27)"),
            Some("5.3.1".to_string())
        );
        let cmod = EnvironmentModulesC::new(Vec::new());
        assert_eq!(
            cmod.parse_version("VERSION=3.2.10\nDATE=2012-12-21\n"),
            Some("3.2.10".to_string())
        );
        let tclmod = EnvironmentModulesTcl::new(Vec::new());
        assert_eq!(
            tclmod.parse_version("Modules Release Tcl 1.923"),
            Some("1.923".to_string())
        );
        assert_eq!(cmod.parse_version("garbage"), None);
    }

    #[test]
    fn exist_scans_module_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("one");
        let second = tmp.path().join("two");
        fs::create_dir_all(first.join("bzip2")).unwrap();
        fs::create_dir_all(second.join("zlib")).unwrap();
        fs::write(first.join("bzip2/1.0.8.lua"), "").unwrap();
        fs::write(second.join("zlib/1.3"), "#%Module").unwrap();

        let names = vec![
            "bzip2/1.0.8".to_string(),
            "zlib/1.3".to_string(),
            "GCC/12.3.0".to_string(),
        ];
        let mut lmod = Lmod::new(vec![second.clone()]);
        lmod.use_path(first.clone());
        assert_eq!(lmod.module_paths()[0], first);
        assert_eq!(lmod.exist(&names), vec![true, true, false]);

        let tcl_only = EnvironmentModules::new(vec![first, second]);
        assert_eq!(tcl_only.exist(&names), vec![false, true, false]);
    }
}
