// eb-net/src/validation.rs
use std::path::PathBuf;

use eb_common::error::{EbError, Result};
use url::Url;

const ALLOWED_SCHEMES: &[&str] = &["http", "https", "file"];

/// Parses a download URL, accepting only schemes sources can be fetched from.
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str)
        .map_err(|e| EbError::ValidationError(format!("Failed to parse URL '{url_str}': {e}")))?;
    if ALLOWED_SCHEMES.contains(&url.scheme()) {
        Ok(url)
    } else {
        Err(EbError::ValidationError(format!(
            "Invalid URL scheme for '{}': must be one of {}, but got '{}'",
            url_str,
            ALLOWED_SCHEMES.join(", "),
            url.scheme()
        )))
    }
}

/// Local filesystem path of a `file://` URL.
pub fn local_path_for(url: &Url) -> Option<PathBuf> {
    if url.scheme() == "file" {
        url.to_file_path().ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_download_schemes() {
        assert!(validate_url("https://sourceware.org/pub/bzip2/").is_ok());
        assert!(validate_url("http://example.org/x.tar.gz").is_ok());
        let url = validate_url("file:///tmp/sources/x.tar.gz").unwrap();
        assert_eq!(local_path_for(&url), Some(PathBuf::from("/tmp/sources/x.tar.gz")));
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(matches!(
            validate_url("ftp://ftp.gnu.org/gnu/make/"),
            Err(EbError::ValidationError(_))
        ));
        assert!(validate_url("not a url").is_err());
    }
}
