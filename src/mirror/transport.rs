// src/mirror/transport.rs

//! Transports that fetch repository files
//!
//! The sync engine never opens network or file handles itself; it asks a
//! `Transport` for the bytes behind a location relative to the repository
//! root.

use super::relative_path;
use crate::error::{Error, Result};
use crate::repomd::Checksum;
use reqwest::blocking::Client;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Bytes returned by a transport for one location
///
/// Transports never decode what they fetch. Decompression for the
/// open-checksum happens during verification, after the compressed digest
/// has been checked.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    /// The file exactly as stored remotely
    pub bytes: Vec<u8>,

    /// A digest the transport observed on its own (e.g. from a server
    /// header). The engine checks it against the manifest in addition to
    /// computing its own.
    pub observed: Option<Checksum>,
}

impl FetchedFile {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            observed: None,
        }
    }
}

/// Source of repository files
pub trait Transport: Send + Sync {
    /// Fetch the file at `location`, relative to the repository root
    fn fetch(&self, location: &str) -> Result<FetchedFile>;

    /// Human-readable description of the remote root, for logs
    fn describe(&self) -> String;
}

/// Pick a transport for a configured base URL
///
/// `http://` and `https://` use `HttpTransport`; `file://` URLs and plain
/// paths use `LocalTransport`.
pub fn transport_for(base_url: &str) -> Result<Box<dyn Transport>> {
    if base_url.starts_with("http://") || base_url.starts_with("https://") {
        Ok(Box::new(HttpTransport::new(base_url)?))
    } else if let Some(path) = base_url.strip_prefix("file://") {
        Ok(Box::new(LocalTransport::new(path)))
    } else if base_url.contains("://") {
        Err(Error::ConfigError(format!(
            "Unsupported URL scheme in baseurl '{}'",
            base_url
        )))
    } else {
        Ok(Box::new(LocalTransport::new(base_url)))
    }
}

/// HTTP transport with retry support
pub struct HttpTransport {
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl HttpTransport {
    /// Create a transport rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: MAX_RETRIES,
        })
    }

    fn url_for(&self, location: &str) -> String {
        format!("{}/{}", self.base_url, location.trim_start_matches('/'))
    }

    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let failure = |reason: String| Error::TransportFailure {
            location: url.to_string(),
            reason,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(failure(format!("HTTP {}", response.status())));
                    }

                    let bytes = response
                        .bytes()
                        .map_err(|e| failure(format!("failed to read response: {}", e)))?;

                    debug!("Downloaded {} bytes from {}", bytes.len(), url);
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(failure(format!("gave up after {} attempts: {}", attempt, e)));
                    }
                    warn!("Download attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, location: &str) -> Result<FetchedFile> {
        let url = self.url_for(location);
        info!("Fetching {}", url);
        let bytes = self.get(&url)?;
        Ok(FetchedFile::new(bytes))
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// Transport reading from a directory on the local file system
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Transport for LocalTransport {
    fn fetch(&self, location: &str) -> Result<FetchedFile> {
        let relative = relative_path(location).ok_or_else(|| Error::TransportFailure {
            location: location.to_string(),
            reason: "location escapes the repository root".to_string(),
        })?;
        let path = self.root.join(relative);
        debug!("Reading {}", path.display());

        let bytes = fs::read(&path).map_err(|e| Error::TransportFailure {
            location: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(FetchedFile::new(bytes))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_local_transport_reads_relative_location() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("repodata")).unwrap();
        fs::write(dir.path().join("repodata/comps.xml"), b"<comps/>").unwrap();

        let transport = LocalTransport::new(dir.path());
        let fetched = transport.fetch("repodata/comps.xml").unwrap();
        assert_eq!(fetched.bytes, b"<comps/>");
        assert!(fetched.observed.is_none());
    }

    #[test]
    fn test_local_transport_missing_file() {
        let dir = tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());
        let result = transport.fetch("repodata/missing.xml.gz");
        assert!(matches!(result, Err(Error::TransportFailure { .. })));
    }

    #[test]
    fn test_local_transport_rejects_escaping_location() {
        let dir = tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());
        assert!(transport.fetch("../etc/passwd").is_err());
        assert!(transport.fetch("/etc/passwd").is_err());
    }

    #[test]
    fn test_transport_for_schemes() {
        assert!(transport_for("https://mirror.example.com/fedora/39/x86_64").is_ok());
        assert!(transport_for("file:///srv/mirror/base").is_ok());
        assert!(transport_for("/srv/mirror/base").is_ok());
        assert!(matches!(
            transport_for("ftp://mirror.example.com/base"),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn test_http_url_join() {
        let transport = HttpTransport::new("https://example.com/repo/").unwrap();
        assert_eq!(
            transport.url_for("repodata/repomd.xml"),
            "https://example.com/repo/repodata/repomd.xml"
        );
        assert_eq!(transport.describe(), "https://example.com/repo");
    }
}
