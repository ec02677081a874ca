// eb-core/src/bootstrap.rs
//! Pinning of the bootstrap script: its declared version and its SHA-256 must
//! match the expected pair together.
use std::fmt;
use std::path::Path;

use eb_aio::checksum::compute_sha256;
use eb_common::config::Config;
use eb_common::error::{EbError, Result};
use regex::Regex;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPin {
    pub version: String,
    pub sha256: String,
}

impl BootstrapPin {
    /// Parses `"<version> <sha256>"`.
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(version), Some(sha256), None) => Ok(Self {
                version: version.to_string(),
                sha256: sha256.to_ascii_lowercase(),
            }),
            _ => Err(EbError::Bootstrap(format!(
                "Expected '<version> <sha256>', got '{value}'"
            ))),
        }
    }
}

impl fmt::Display for BootstrapPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.version, self.sha256)
    }
}

/// Value of the `EB_BOOTSTRAP_VERSION = '...'` assignment in `script`.
pub fn declared_version(script: &str) -> Option<String> {
    let re = Regex::new(r#"(?m)^\s*EB_BOOTSTRAP_VERSION\s*=\s*['"]([^'"]+)['"]"#).ok()?;
    re.captures(script)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// What the script at `path` actually is.
pub fn found_pin(path: &Path) -> Result<BootstrapPin> {
    let content = std::fs::read_to_string(path)?;
    let version = declared_version(&content).ok_or_else(|| {
        EbError::Bootstrap(format!(
            "No EB_BOOTSTRAP_VERSION found in {}",
            path.display()
        ))
    })?;
    let sha256 = compute_sha256(path)?;
    Ok(BootstrapPin { version, sha256 })
}

/// Accepts the script only if version and checksum both match `expected`.
pub fn verify_bootstrap(config: &Config, path: &Path, expected: &BootstrapPin) -> Result<BootstrapPin> {
    if !config.bootstrap_deprecated {
        return Err(EbError::Bootstrap(
            "The bootstrap script is deprecated; set $EASYBUILD_BOOTSTRAP_DEPRECATED to use it anyway"
                .to_string(),
        ));
    }
    let found = found_pin(path)?;
    debug!("Bootstrap script {}: found '{}', expected '{}'", path.display(), found, expected);
    if &found != expected {
        return Err(EbError::Bootstrap(format!(
            "Version check on bootstrap script failed: expected '{expected}', found '{found}'"
        )));
    }
    info!("Bootstrap script {} verified ({})", path.display(), found);
    Ok(found)
}
