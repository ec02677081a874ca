// eb-common/src/repository.rs
//! Locating easyconfig files in the robot search path.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;
use walkdir::WalkDir;

use super::config::Config;
use super::easyconfig::{parse_easyconfig, EasyConfig, EASYCONFIG_EXT};
use super::error::{EbError, Result};

#[derive(Debug)]
pub struct EasyConfigRepository {
    robot_paths: Vec<PathBuf>,
    parsed_cache: Mutex<HashMap<PathBuf, Arc<EasyConfig>>>,
}

impl EasyConfigRepository {
    pub fn new(config: &Config) -> Self {
        Self::with_paths(config.robot_paths.clone())
    }

    pub fn with_paths(robot_paths: Vec<PathBuf>) -> Self {
        Self {
            robot_paths,
            parsed_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn robot_paths(&self) -> &[PathBuf] {
        &self.robot_paths
    }

    /// Puts `path` first in the search order, e.g. the directory of an easyconfig given
    /// on the command line.
    pub fn prepend_path(&mut self, path: PathBuf) {
        self.robot_paths.retain(|p| p != &path);
        self.robot_paths.insert(0, path);
    }

    /// Looks for `filename` as `<path>/<letter>/<name>/<file>`, `<path>/<name>/<file>`,
    /// `<path>/<file>` and finally anywhere below each robot path.
    pub fn find(&self, name: &str, filename: &str) -> Option<PathBuf> {
        let letter = name
            .chars()
            .next()
            .map(|c| c.to_lowercase().to_string())
            .unwrap_or_default();
        for root in &self.robot_paths {
            let candidates = [
                root.join(&letter).join(name).join(filename),
                root.join(name).join(filename),
                root.join(filename),
            ];
            if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
                debug!("Found easyconfig {} at {}", filename, found.display());
                return Some(found);
            }
        }
        for root in &self.robot_paths {
            let found = WalkDir::new(root)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .find(|e| e.file_type().is_file() && e.file_name().to_str() == Some(filename));
            if let Some(entry) = found {
                debug!(
                    "Found easyconfig {} by searching {}",
                    filename,
                    root.display()
                );
                return Some(entry.into_path());
            }
        }
        debug!("Easyconfig {} not found in robot paths", filename);
        None
    }

    /// Resolves an easyconfig argument: an existing path is used as-is, a bare file name is
    /// searched for in the robot paths.
    pub fn locate(&self, arg: &str) -> Result<PathBuf> {
        let as_path = Path::new(arg);
        if as_path.is_file() {
            return Ok(as_path.to_path_buf());
        }
        let filename = as_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(arg);
        let name = filename
            .strip_suffix(EASYCONFIG_EXT)
            .unwrap_or(filename)
            .split('-')
            .next()
            .unwrap_or(filename);
        self.find(name, filename).ok_or_else(|| {
            EbError::NotFound(format!(
                "Can't find path {arg} (robot paths: {})",
                self.robot_paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(":")
            ))
        })
    }

    pub fn load(&self, path: &Path) -> Result<Arc<EasyConfig>> {
        let mut cache = self
            .parsed_cache
            .lock()
            .map_err(|_| EbError::Generic("easyconfig cache lock poisoned".to_string()))?;
        if let Some(ec) = cache.get(path) {
            debug!("Loaded easyconfig {} from parsed cache", path.display());
            return Ok(Arc::clone(ec));
        }
        let ec = Arc::new(parse_easyconfig(path)?);
        cache.insert(path.to_path_buf(), Arc::clone(&ec));
        Ok(ec)
    }

    /// Finds and parses `<name>-<versionstring>.eb`.
    pub fn load_by_name(&self, name: &str, filename: &str) -> Result<Option<Arc<EasyConfig>>> {
        match self.find(name, filename) {
            Some(path) => self.load(&path).map(Some),
            None => Ok(None),
        }
    }

    /// All easyconfig files below the robot paths, sorted by file name.
    pub fn all_easyconfig_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .robot_paths
            .iter()
            .flat_map(|root| {
                WalkDir::new(root)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .filter(|e| {
                        e.file_type().is_file()
                            && e.file_name()
                                .to_str()
                                .is_some_and(|n| n.ends_with(EASYCONFIG_EXT))
                    })
                    .map(|e| e.into_path())
            })
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        files.dedup_by(|a, b| a.file_name() == b.file_name());
        files
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const EC: &str = "name = 'zlib'\nversion = '1.2.13'\nhomepage = 'h'\ndescription = 'd'\ntoolchain = SYSTEM\n";

    #[test]
    fn finds_easyconfigs_in_letter_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("z/zlib");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("zlib-1.2.13.eb"), EC).unwrap();

        let repo = EasyConfigRepository::with_paths(vec![tmp.path().to_path_buf()]);
        let found = repo.find("zlib", "zlib-1.2.13.eb").unwrap();
        assert_eq!(found, dir.join("zlib-1.2.13.eb"));
        assert_eq!(repo.locate("zlib-1.2.13.eb").unwrap(), found);
        let ec = repo.load_by_name("zlib", "zlib-1.2.13.eb").unwrap().unwrap();
        assert_eq!(ec.full_mod_name(), "zlib/1.2.13");
        assert!(repo.find("zlib", "zlib-1.3.eb").is_none());
    }

    #[test]
    fn falls_back_to_recursive_search() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("some/other/layout");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("zlib-1.2.13.eb"), EC).unwrap();

        let repo = EasyConfigRepository::with_paths(vec![tmp.path().to_path_buf()]);
        assert_eq!(
            repo.find("zlib", "zlib-1.2.13.eb"),
            Some(dir.join("zlib-1.2.13.eb"))
        );
        assert_eq!(repo.all_easyconfig_files().len(), 1);
    }

    #[test]
    fn locate_reports_missing_easyconfig() {
        let repo = EasyConfigRepository::with_paths(Vec::new());
        let err = repo.locate("nope-1.0.eb").unwrap_err();
        assert!(err.to_string().contains("Can't find path nope-1.0.eb"));
    }
}
