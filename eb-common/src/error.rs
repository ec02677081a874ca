use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum EbError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("TOML Parsing Error: {0}")]
    Toml(#[from] Arc<toml::de::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Failed to parse easyconfig {file} (line {line}): {msg}")]
    EasyConfigParse {
        file: String,
        line: usize,
        msg: String,
    },

    #[error("Invalid easyconfig {0}: {1}")]
    EasyConfig(String, String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Dependency Error: {0}")]
    DependencyError(String),

    #[error("Missing modules for dependencies (use --robot?): {}", .0.join(", "))]
    MissingDependencies(Vec<String>),

    #[error("Checksum Mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("DownloadError: Failed to download '{0}' from '{1}': {2}")]
    DownloadError(String, String, String),

    #[error("HttpError: {0}")]
    HttpError(String),

    #[error("Validation Error: {0}")]
    ValidationError(String),

    #[error("Build failed in {step} step: {msg}")]
    Build { step: String, msg: String },

    #[error("cmd \"{cmd}\" exited with exit code {code} and output:\n{output}")]
    Command {
        cmd: String,
        code: i32,
        output: String,
    },

    #[error("Sanity check failed: {0}")]
    SanityCheck(String),

    #[error("Modules tool error: {0}")]
    ModulesTool(String),

    #[error("Bootstrap Error: {0}")]
    Bootstrap(String),

    #[error("DEPRECATED (since v{version}) functionality used: {msg}")]
    Deprecated { msg: String, version: String },

    #[error("Archive Error for {0}: {1}")]
    Archive(PathBuf, String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for EbError {
    fn from(err: std::io::Error) -> Self {
        EbError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for EbError {
    fn from(err: reqwest::Error) -> Self {
        EbError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for EbError {
    fn from(err: serde_json::Error) -> Self {
        EbError::Json(Arc::new(err))
    }
}

impl From<toml::de::Error> for EbError {
    fn from(err: toml::de::Error) -> Self {
        EbError::Toml(Arc::new(err))
    }
}

impl From<walkdir::Error> for EbError {
    fn from(err: walkdir::Error) -> Self {
        EbError::Generic(format!("Directory walk failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, EbError>;
