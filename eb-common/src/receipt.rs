// eb-common/src/receipt.rs
//! `easybuild/receipt.json` written into every installation directory. Build
//! environments for dependencies are reconstructed from it.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{EbError, Result};

pub const RECEIPT_DIR: &str = "easybuild";
pub const RECEIPT_FILE: &str = "receipt.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub name: String,
    pub version: String,
    pub version_string: String,
    pub module_name: String,
    pub install_dir: PathBuf,
    pub toolchain: String,
    pub easyblock: String,
    /// Runtime dependency modules, in load order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Paths prepended to environment variables when the module is loaded.
    #[serde(default)]
    pub prepend_paths: BTreeMap<String, Vec<String>>,
    /// Environment variables set when the module is loaded.
    #[serde(default)]
    pub set_env: BTreeMap<String, String>,
    pub installed_at: DateTime<Utc>,
    pub eb_version: String,
    pub built_on: BuiltOn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltOn {
    pub os: String,
    pub arch: String,
}

impl Default for BuiltOn {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

impl InstallReceipt {
    pub fn path_in(install_dir: &Path) -> PathBuf {
        install_dir.join(RECEIPT_DIR).join(RECEIPT_FILE)
    }

    pub fn write(&self) -> Result<PathBuf> {
        let path = Self::path_in(&self.install_dir);
        debug!("Writing install receipt: {}", path.display());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    pub fn read(install_dir: &Path) -> Result<Self> {
        let path = Self::path_in(install_dir);
        let content = fs::read_to_string(&path).map_err(|e| {
            EbError::NotFound(format!("Install receipt {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_survives_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let mut prepend_paths = BTreeMap::new();
        prepend_paths.insert("PATH".to_string(), vec!["bin".to_string()]);
        let receipt = InstallReceipt {
            name: "bzip2".into(),
            version: "1.0.8".into(),
            version_string: "1.0.8".into(),
            module_name: "bzip2/1.0.8".into(),
            install_dir: tmp.path().to_path_buf(),
            toolchain: "system".into(),
            easyblock: "EB_bzip2".into(),
            dependencies: Vec::new(),
            prepend_paths,
            set_env: BTreeMap::new(),
            installed_at: Utc::now(),
            eb_version: "0.1.0".into(),
            built_on: BuiltOn::default(),
        };
        let path = receipt.write().unwrap();
        assert!(path.ends_with("easybuild/receipt.json"));
        assert_eq!(InstallReceipt::read(tmp.path()).unwrap(), receipt);
    }

    #[test]
    fn missing_receipt_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            InstallReceipt::read(tmp.path()),
            Err(EbError::NotFound(_))
        ));
    }
}
