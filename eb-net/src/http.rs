// eb-net/src/http.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use eb_aio::checksum::verify_checksum_async;
use eb_common::error::{EbError, Result};
use futures::future::try_join_all;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};
use url::Url;

use crate::validation::{local_path_for, validate_url};

const DOWNLOAD_TIMEOUT_SECS: u64 = 600;
const CONNECT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT_STRING: &str = concat!("eb/", env!("CARGO_PKG_VERSION"), " (Rust)");

/// A single file to obtain from one of several source URLs.
#[derive(Debug, Clone)]
pub struct SourceRequest {
    /// Name the file is stored under in `dest_dir`.
    pub filename: String,
    /// Name of the file on the server, if different.
    pub download_filename: Option<String>,
    /// Base URLs, tried in order. A URL already ending in the file name is used as is.
    pub urls: Vec<String>,
    pub dest_dir: PathBuf,
    /// Accepted SHA-256 digests; the file passes when it matches any of them.
    pub checksums: Vec<String>,
}

impl SourceRequest {
    pub fn dest_path(&self) -> PathBuf {
        self.dest_dir.join(&self.filename)
    }

    fn remote_name(&self) -> &str {
        self.download_filename.as_deref().unwrap_or(&self.filename)
    }

    /// Full URLs to try, in order.
    pub fn candidate_urls(&self) -> Vec<String> {
        let remote = self.remote_name();
        self.urls
            .iter()
            .map(|base| {
                if base.ends_with(&format!("/{remote}")) {
                    base.clone()
                } else {
                    format!("{}/{}", base.trim_end_matches('/'), remote)
                }
            })
            .collect()
    }
}

pub fn build_http_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| EbError::HttpError(format!("Failed to build HTTP client: {e}")))
}

/// Downloads every request concurrently; fails on the first request that cannot be
/// satisfied from any of its URLs.
pub async fn fetch_all(requests: &[SourceRequest]) -> Result<Vec<PathBuf>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }
    let client = build_http_client()?;
    try_join_all(requests.iter().map(|req| fetch_file(&client, req))).await
}

pub async fn fetch_file(client: &Client, req: &SourceRequest) -> Result<PathBuf> {
    let final_path = req.dest_path();
    debug!(
        "Preparing to fetch '{}' into {}",
        req.filename,
        req.dest_dir.display()
    );
    if req.urls.is_empty() {
        return Err(EbError::DownloadError(
            req.filename.clone(),
            String::new(),
            "no source URLs available".to_string(),
        ));
    }
    tokio::fs::create_dir_all(&req.dest_dir).await?;

    let mut last_error: Option<EbError> = None;
    for candidate in req.candidate_urls() {
        debug!("Attempting download from: {}", candidate);
        let url = match validate_url(&candidate) {
            Ok(url) => url,
            Err(e) => {
                warn!("Skipping source URL {}: {}", candidate, e);
                last_error = Some(e);
                continue;
            }
        };
        match download_and_verify(client, &url, &final_path, &req.checksums).await {
            Ok(path) => {
                debug!("Successfully fetched and verified: {}", path.display());
                return Ok(path);
            }
            Err(e) => {
                error!("Download attempt failed from {}: {}", candidate, e);
                last_error = Some(e);
            }
        }
    }

    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "All download attempts failed.".to_string());
    Err(EbError::DownloadError(
        req.filename.clone(),
        req.urls.join(", "),
        reason,
    ))
}

fn temp_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{name}.download"))
}

async fn download_and_verify(
    client: &Client,
    url: &Url,
    final_path: &Path,
    sha256_expected: &[String],
) -> Result<PathBuf> {
    let temp_path = temp_path_for(final_path);
    debug!("Downloading to temporary path: {}", temp_path.display());
    if temp_path.exists() {
        if let Err(e) = tokio::fs::remove_file(&temp_path).await {
            warn!(
                "Could not remove existing temporary file {}: {}",
                temp_path.display(),
                e
            );
        }
    }

    if let Some(local) = local_path_for(url) {
        tokio::fs::copy(&local, &temp_path).await.map_err(|e| {
            EbError::HttpError(format!("Failed to copy {}: {}", local.display(), e))
        })?;
    } else {
        stream_to_file(client, url, &temp_path).await?;
    }

    if sha256_expected.is_empty() {
        debug!(
            "No checksum provided for {}, skipping verification",
            final_path.display()
        );
    } else {
        if let Err(e) = verify_checksum_async(&temp_path, sha256_expected).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
        debug!("Checksum verified for {}", temp_path.display());
    }

    tokio::fs::rename(&temp_path, final_path).await?;
    debug!("Moved fetched file to {}", final_path.display());
    Ok(final_path.to_path_buf())
}

async fn stream_to_file(client: &Client, url: &Url, temp_path: &Path) -> Result<()> {
    let response = client.get(url.clone()).send().await.map_err(|e| {
        debug!("HTTP request failed for {url}: {e}");
        EbError::HttpError(format!("HTTP request failed for {url}: {e}"))
    })?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);
    if !status.is_success() {
        return Err(match status {
            StatusCode::NOT_FOUND => EbError::HttpError(format!("Resource not found (404): {url}")),
            StatusCode::FORBIDDEN => EbError::HttpError(format!("Access forbidden (403): {url}")),
            _ => EbError::HttpError(format!("HTTP error {status} for URL {url}")),
        });
    }

    let mut temp_file = TokioFile::create(temp_path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| EbError::HttpError(format!("Failed to read response body: {e}")))?;
        temp_file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    temp_file.flush().await?;
    debug!("Wrote {} bytes to {}", written, temp_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha256("hello\n")
    const HELLO: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    fn request(mirror: &Path, dest: &Path, checksum: Option<&str>) -> SourceRequest {
        SourceRequest {
            filename: "hello-1.0.tar.gz".to_string(),
            download_filename: None,
            urls: vec![
                "ftp://ftp.example.org/pub".to_string(),
                Url::from_directory_path(mirror).unwrap().to_string(),
            ],
            dest_dir: dest.to_path_buf(),
            checksums: checksum.map(str::to_string).into_iter().collect(),
        }
    }

    #[test]
    fn candidate_urls_append_remote_name() {
        let req = SourceRequest {
            filename: "v1.0.tar.gz".to_string(),
            download_filename: Some("pkg-1.0.tar.gz".to_string()),
            urls: vec![
                "https://example.org/dl/".to_string(),
                "https://mirror.org/pkg-1.0.tar.gz".to_string(),
            ],
            dest_dir: PathBuf::from("/tmp"),
            checksums: Vec::new(),
        };
        assert_eq!(
            req.candidate_urls(),
            vec![
                "https://example.org/dl/pkg-1.0.tar.gz",
                "https://mirror.org/pkg-1.0.tar.gz"
            ]
        );
    }

    #[tokio::test]
    async fn falls_back_to_next_url_and_verifies() {
        let tmp = tempfile::tempdir().unwrap();
        let mirror = tmp.path().join("mirror");
        std::fs::create_dir_all(&mirror).unwrap();
        std::fs::write(mirror.join("hello-1.0.tar.gz"), "hello\n").unwrap();
        let dest = tmp.path().join("sources");

        let fetched = fetch_all(&[request(&mirror, &dest, Some(HELLO))])
            .await
            .unwrap();
        assert_eq!(fetched, vec![dest.join("hello-1.0.tar.gz")]);
        assert_eq!(std::fs::read_to_string(&fetched[0]).unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn checksum_mismatch_is_a_download_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mirror = tmp.path().join("mirror");
        std::fs::create_dir_all(&mirror).unwrap();
        std::fs::write(mirror.join("hello-1.0.tar.gz"), "tampered\n").unwrap();
        let dest = tmp.path().join("sources");

        let err = fetch_all(&[request(&mirror, &dest, Some(HELLO))])
            .await
            .unwrap_err();
        match err {
            EbError::DownloadError(name, _, reason) => {
                assert_eq!(name, "hello-1.0.tar.gz");
                assert!(reason.contains("Checksum verification"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!dest.join("hello-1.0.tar.gz").exists());
    }
}
