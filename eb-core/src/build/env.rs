// eb-core/src/build/env.rs
//! Environment for build commands: toolchain compiler settings plus what loading the
//! module of every dependency would set.
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use eb_common::config::Config;
use eb_common::dependency::Dependency;
use eb_common::error::Result;
use eb_common::receipt::InstallReceipt;
use eb_common::toolchain::{get_toolchain, toolchain_env};
use eb_common::{EasyConfig, InstalledModules};
use tracing::{debug, warn};

/// Sub-directories of an installation and the path variables they are prepended to.
/// An empty directory name stands for the installation root.
const STANDARD_PATHS: &[(&str, &[&str])] = &[
    ("ACLOCAL_PATH", &["share/aclocal"]),
    ("CMAKE_PREFIX_PATH", &[""]),
    ("CPATH", &["include"]),
    ("LD_LIBRARY_PATH", &["lib", "lib32", "lib64"]),
    ("LIBRARY_PATH", &["lib", "lib32", "lib64"]),
    ("MANPATH", &["man", "share/man"]),
    ("PATH", &["bin", "sbin"]),
    ("PKG_CONFIG_PATH", &["lib/pkgconfig", "lib32/pkgconfig", "lib64/pkgconfig", "share/pkgconfig"]),
    ("XDG_DATA_DIRS", &["share"]),
];

/// Suffix for `EBROOT*`/`EBVERSION*`/`EBDEVEL*` variables: `+` becomes `PLUS`, `-`
/// becomes `MIN`, dots are dropped, everything is upper-cased.
pub fn env_name_suffix(name: &str) -> String {
    name.replace('+', "plus")
        .replace('-', "min")
        .replace('.', "")
        .to_uppercase()
}

fn dir_has_entries(path: &Path) -> bool {
    path.read_dir()
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Relative paths below `install_dir` worth prepending for a module, keyed by variable.
/// Only non-empty directories are included.
pub fn standard_prepend_paths(install_dir: &Path) -> BTreeMap<String, Vec<String>> {
    let mut paths = BTreeMap::new();
    for (var, subdirs) in STANDARD_PATHS {
        let present: Vec<String> = subdirs
            .iter()
            .filter(|sub| {
                if sub.is_empty() {
                    dir_has_entries(install_dir)
                } else {
                    dir_has_entries(&install_dir.join(sub))
                }
            })
            .map(|sub| sub.to_string())
            .collect();
        if !present.is_empty() {
            paths.insert(var.to_string(), present);
        }
    }
    paths
}

#[derive(Debug, Clone, Default)]
pub struct BuildEnvironment {
    /// Variables set on top of the inherited process environment.
    vars: BTreeMap<String, String>,
}

impl BuildEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment for building `ec`: toolchain settings, then every dependency in order.
    pub fn for_build(
        config: &Config,
        ec: &EasyConfig,
        dependencies: &[Dependency],
        installed: &InstalledModules,
    ) -> Result<Self> {
        let mut build_env = Self::new();
        for dep in dependencies {
            build_env.load_dependency(config, dep, installed);
        }
        if let Some(definition) = get_toolchain(&ec.toolchain.name) {
            for (key, value) in toolchain_env(definition, &ec.toolchainopts()) {
                build_env.set(key, value);
            }
        }
        debug!(
            "Build environment for {}: {} variables set",
            ec.full_mod_name(),
            build_env.vars.len()
        );
        Ok(build_env)
    }

    fn load_dependency(&mut self, config: &Config, dep: &Dependency, installed: &InstalledModules) {
        let mod_name = dep.module_name();
        let install_dir = installed
            .find(&mod_name)
            .and_then(|m| m.install_dir)
            .unwrap_or_else(|| config.software_install_dir(&dep.name, &dep.version_string()));
        match InstallReceipt::read(&install_dir) {
            Ok(receipt) => self.apply_receipt(&receipt),
            Err(e) if install_dir.is_dir() => {
                debug!("No receipt for {} ({}), using directory layout", mod_name, e);
                self.apply_install_dir(&install_dir, &dep.name, &dep.version);
            }
            Err(_) => warn!(
                "Installation of dependency {} not found at {}; not adding it to the build environment",
                mod_name,
                install_dir.display()
            ),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Current value, falling back to the inherited environment.
    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned().or_else(|| env::var(key).ok())
    }

    pub fn prepend_path(&mut self, key: &str, dir: &Path) {
        let dir = dir.display().to_string();
        let value = match self.get(key).filter(|v| !v.is_empty()) {
            Some(current) => {
                if current.split(':').any(|p| p == dir) {
                    return;
                }
                format!("{dir}:{current}")
            }
            None => dir,
        };
        self.vars.insert(key.to_string(), value);
    }

    pub fn apply_receipt(&mut self, receipt: &InstallReceipt) {
        debug!("Loading environment of {}", receipt.module_name);
        self.apply_prepends(&receipt.install_dir, &receipt.prepend_paths);
        for (key, value) in &receipt.set_env {
            self.set(key.clone(), value.clone());
        }
    }

    /// What the module of an installation in `install_dir` would set.
    pub fn apply_install_dir(&mut self, install_dir: &Path, name: &str, version: &str) {
        self.apply_prepends(install_dir, &standard_prepend_paths(install_dir));
        let suffix = env_name_suffix(name);
        self.set(format!("EBROOT{suffix}"), install_dir.display().to_string());
        self.set(format!("EBVERSION{suffix}"), version);
    }

    fn apply_prepends(&mut self, root: &Path, prepends: &BTreeMap<String, Vec<String>>) {
        for (key, subdirs) in prepends {
            // Reversed so the first listed directory ends up first.
            for sub in subdirs.iter().rev() {
                let dir: PathBuf = if sub.is_empty() {
                    root.to_path_buf()
                } else {
                    root.join(sub)
                };
                self.prepend_path(key, &dir);
            }
        }
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// `export` lines describing the environment, for dry runs.
    pub fn describe(&self) -> Vec<String> {
        self.vars
            .iter()
            .map(|(k, v)| format!("export {k}=\"{v}\""))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn env_names_follow_conversion_rules() {
        assert_eq!(env_name_suffix("bzip2"), "BZIP2");
        assert_eq!(env_name_suffix("GCCcore"), "GCCCORE");
        assert_eq!(env_name_suffix("GTK+"), "GTKPLUS");
        assert_eq!(env_name_suffix("Python-bundle-PyPI"), "PYTHONMINBUNDLEMINPYPI");
        assert_eq!(env_name_suffix("libxml2.9"), "LIBXML29");
    }

    #[test]
    fn only_populated_directories_are_prepended() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/bzip2"), "").unwrap();
        fs::create_dir_all(root.join("lib/pkgconfig")).unwrap();
        fs::write(root.join("lib/libbz2.a"), "").unwrap();
        fs::create_dir_all(root.join("include")).unwrap();

        let paths = standard_prepend_paths(root);
        assert_eq!(paths.get("PATH"), Some(&vec!["bin".to_string()]));
        assert_eq!(paths.get("LD_LIBRARY_PATH"), Some(&vec!["lib".to_string()]));
        assert_eq!(paths.get("CMAKE_PREFIX_PATH"), Some(&vec!["".to_string()]));
        assert!(!paths.contains_key("CPATH"));
        assert!(!paths.contains_key("PKG_CONFIG_PATH"));

        let empty = tempfile::tempdir().unwrap();
        assert!(standard_prepend_paths(empty.path()).is_empty());
    }

    #[test]
    fn install_dir_environment() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("bin")).unwrap();
        fs::write(tmp.path().join("bin/tool"), "").unwrap();

        let mut build_env = BuildEnvironment::new();
        build_env.set("PATH", "/usr/bin");
        build_env.apply_install_dir(tmp.path(), "zlib", "1.3");
        build_env.apply_install_dir(tmp.path(), "zlib", "1.3");
        assert_eq!(
            build_env.get("PATH").unwrap(),
            format!("{}:/usr/bin", tmp.path().join("bin").display())
        );
        assert_eq!(build_env.get("EBVERSIONZLIB").as_deref(), Some("1.3"));
        assert!(build_env
            .describe()
            .contains(&"export EBVERSIONZLIB=\"1.3\"".to_string()));
    }
}
