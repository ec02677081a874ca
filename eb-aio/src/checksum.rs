// eb-aio/src/checksum.rs
use std::io::Read;
use std::path::Path;

use eb_common::error::{EbError, Result};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Hex-encoded SHA-256 of the file at `path`.
pub fn compute_sha256(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        total += n as u64;
    }
    let actual = hex::encode(hasher.finalize());
    debug!(
        "Calculated SHA256 of {}: {} ({} bytes read)",
        path.display(),
        actual,
        total
    );
    Ok(actual)
}

/// Passes when `actual` equals any of `expected`; an empty list accepts everything.
fn compare(path: &Path, expected: &[String], actual: &str) -> Result<()> {
    debug!("Expected SHA256:   {}", expected.join(" or "));
    if expected.is_empty()
        || expected
            .iter()
            .any(|candidate| actual.eq_ignore_ascii_case(candidate.trim()))
    {
        return Ok(());
    }
    let wanted = match expected {
        [single] => single.clone(),
        several => format!("one of {}", several.join(", ")),
    };
    Err(EbError::ChecksumMismatch(format!(
        "Checksum verification for {} failed: expected {}, got {}",
        path.display(),
        wanted,
        actual
    )))
}

pub fn verify_checksum_sync(path: &Path, expected: &[String]) -> Result<()> {
    debug!("Sync Verifying checksum for: {}", path.display());
    let actual = compute_sha256(path)?;
    compare(path, expected, &actual)
}

/// Reads the file asynchronously, hashing as it goes.
pub async fn verify_checksum_async(path: &Path, expected: &[String]) -> Result<()> {
    debug!("Async Verifying checksum for: {}", path.display());
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = Vec::with_capacity(8192);
    loop {
        buffer.clear();
        let n = file.read_buf(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    let actual = hex::encode(hasher.finalize());
    compare(path, expected, &actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha256("hello\n")
    const HELLO: &str = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";

    #[test]
    fn computes_and_verifies() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f");
        std::fs::write(&path, "hello\n").unwrap();
        assert_eq!(compute_sha256(&path).unwrap(), HELLO);
        assert!(verify_checksum_sync(&path, &[HELLO.to_uppercase()]).is_ok());
        let err = verify_checksum_sync(&path, &["00".to_string()]).unwrap_err();
        assert!(matches!(err, EbError::ChecksumMismatch(_)));
    }

    #[test]
    fn any_alternative_may_match() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f");
        std::fs::write(&path, "hello\n").unwrap();
        let alternatives = vec!["0".repeat(64), HELLO.to_string()];
        assert!(verify_checksum_sync(&path, &alternatives).is_ok());

        let wrong = vec!["0".repeat(64), "1".repeat(64)];
        let err = verify_checksum_sync(&path, &wrong).unwrap_err().to_string();
        assert!(err.contains("expected one of"));
        assert!(err.contains(HELLO));
    }

    #[tokio::test]
    async fn async_verification_matches_sync() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("f");
        std::fs::write(&path, "hello\n").unwrap();
        assert!(verify_checksum_async(&path, &[HELLO.to_string()]).await.is_ok());
        assert!(verify_checksum_async(&path, &["00".to_string()]).await.is_err());
    }
}
