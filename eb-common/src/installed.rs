// eb-common/src/installed.rs
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::config::{split_paths, Config};
use super::error::Result;

/// A module file found in one of the module paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModule {
    /// `name/versionstring`
    pub mod_name: String,
    pub module_file: PathBuf,
    /// Software installation directory, if it lives under the configured install path.
    pub install_dir: Option<PathBuf>,
}

/// Answers "is this module available?" by looking for module files on disk.
#[derive(Debug, Clone)]
pub struct InstalledModules {
    module_paths: Vec<PathBuf>,
    software_dir: PathBuf,
}

impl InstalledModules {
    /// Module paths are the configured `modules/all` directory followed by `$MODULEPATH`.
    pub fn new(config: &Config) -> Self {
        let mut module_paths = vec![config.modules_dir()];
        if let Ok(modulepath) = env::var("MODULEPATH") {
            for path in split_paths(&modulepath) {
                if !module_paths.contains(&path) {
                    module_paths.push(path);
                }
            }
        }
        debug!("Module paths: {:?}", module_paths);
        Self {
            module_paths,
            software_dir: config.software_dir(),
        }
    }

    pub fn with_paths(module_paths: Vec<PathBuf>, software_dir: PathBuf) -> Self {
        Self {
            module_paths,
            software_dir,
        }
    }

    pub fn module_paths(&self) -> &[PathBuf] {
        &self.module_paths
    }

    fn module_file_in(dir: &Path, mod_name: &str) -> Option<PathBuf> {
        let plain = dir.join(mod_name);
        if plain.is_file() {
            return Some(plain);
        }
        let lua = dir.join(format!("{mod_name}.lua"));
        lua.is_file().then_some(lua)
    }

    pub fn find(&self, mod_name: &str) -> Option<InstalledModule> {
        for dir in &self.module_paths {
            if let Some(module_file) = Self::module_file_in(dir, mod_name) {
                debug!("Module '{}' found at {}", mod_name, module_file.display());
                let install_dir = Some(self.software_dir.join(mod_name)).filter(|p| p.is_dir());
                return Some(InstalledModule {
                    mod_name: mod_name.to_string(),
                    module_file,
                    install_dir,
                });
            }
        }
        debug!("Module '{}' not found in any module path", mod_name);
        None
    }

    pub fn is_installed(&self, mod_name: &str) -> bool {
        self.find(mod_name).is_some()
    }

    /// Every `name/version` module in the module paths; the first path providing a name wins.
    pub fn list(&self) -> Result<Vec<InstalledModule>> {
        let mut modules: Vec<InstalledModule> = Vec::new();
        for dir in &self.module_paths {
            if !dir.is_dir() {
                debug!("Module path {} does not exist, skipping", dir.display());
                continue;
            }
            for name_entry in fs::read_dir(dir)? {
                let name_entry = match name_entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!("Error reading entry in {}: {}. Skipping.", dir.display(), e);
                        continue;
                    }
                };
                let name_path = name_entry.path();
                let Some(name) = name_path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !name_path.is_dir() || name.starts_with('.') {
                    continue;
                }
                let mut versions: Vec<PathBuf> = fs::read_dir(&name_path)?
                    .filter_map(|e| e.ok().map(|e| e.path()))
                    .filter(|p| p.is_file())
                    .collect();
                versions.sort();
                for module_file in versions {
                    let Some(file_name) = module_file.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    if file_name.starts_with('.') {
                        continue;
                    }
                    let version = file_name.strip_suffix(".lua").unwrap_or(file_name);
                    let mod_name = format!("{name}/{version}");
                    if modules.iter().any(|m| m.mod_name == mod_name) {
                        continue;
                    }
                    let install_dir =
                        Some(self.software_dir.join(&mod_name)).filter(|p| p.is_dir());
                    modules.push(InstalledModule {
                        mod_name,
                        module_file,
                        install_dir,
                    });
                }
            }
        }
        modules.sort_by(|a, b| a.mod_name.cmp(&b.mod_name));
        debug!("Found {} installed modules", modules.len());
        Ok(modules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_tcl_and_lua_module_files() {
        let tmp = tempfile::tempdir().unwrap();
        let modules = tmp.path().join("modules/all");
        fs::create_dir_all(modules.join("zlib")).unwrap();
        fs::create_dir_all(modules.join("bzip2")).unwrap();
        fs::write(modules.join("zlib/1.2.13"), "#%Module").unwrap();
        fs::write(modules.join("bzip2/1.0.8.lua"), "help([==[]==])").unwrap();
        let software = tmp.path().join("software");
        fs::create_dir_all(software.join("bzip2/1.0.8")).unwrap();

        let registry = InstalledModules::with_paths(vec![modules], software.clone());
        assert!(registry.is_installed("zlib/1.2.13"));
        let bzip2 = registry.find("bzip2/1.0.8").unwrap();
        assert_eq!(bzip2.install_dir, Some(software.join("bzip2/1.0.8")));
        assert!(!registry.is_installed("bzip2/1.0.6"));

        let names: Vec<String> = registry
            .list()
            .unwrap()
            .into_iter()
            .map(|m| m.mod_name)
            .collect();
        assert_eq!(names, vec!["bzip2/1.0.8", "zlib/1.2.13"]);
    }

    #[test]
    fn missing_module_path_is_not_an_error() {
        let registry =
            InstalledModules::with_paths(vec![PathBuf::from("/nonexistent/modules")], PathBuf::new());
        assert!(registry.list().unwrap().is_empty());
    }
}
