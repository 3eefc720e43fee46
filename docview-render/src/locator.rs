use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use docview_core::LoadError;
use thiserror::Error;
use tracing::debug;
use ureq::{Agent, AgentBuilder, Error as UreqError};
use url::Url;

/// Remote documents larger than this are refused.
const MAX_REMOTE_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocatorError {
    #[error("empty document locator")]
    Empty,
    #[error("unsupported locator scheme `{scheme}`")]
    UnsupportedScheme { scheme: String },
    #[error("`{url}` does not name a local file")]
    InvalidFileUrl { url: String },
}

/// Where a document's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Remote(Url),
    Local(PathBuf),
}

impl Locator {
    /// `http(s)://` URLs are fetched, `file://` URLs and anything that does
    /// not parse as an absolute URL are treated as filesystem paths.
    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LocatorError::Empty);
        }
        match Url::parse(raw) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(Locator::Remote(url)),
                "file" => url
                    .to_file_path()
                    .map(Locator::Local)
                    .map_err(|_| LocatorError::InvalidFileUrl {
                        url: raw.to_owned(),
                    }),
                // A Windows drive letter such as `C:\docs\a.pdf`.
                scheme if scheme.len() == 1 => Ok(Locator::Local(PathBuf::from(raw))),
                scheme => Err(LocatorError::UnsupportedScheme {
                    scheme: scheme.to_owned(),
                }),
            },
            Err(_) => Ok(Locator::Local(PathBuf::from(raw))),
        }
    }
}

/// Blocking byte loader. Run it off the async runtime.
pub struct Fetcher {
    agent: Agent,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn fetch(&self, locator: &Locator) -> Result<Vec<u8>> {
        match locator {
            Locator::Local(path) => {
                fs::read(path).with_context(|| format!("failed to read {:?}", path))
            }
            Locator::Remote(url) => self.download(url),
        }
    }

    fn download(&self, url: &Url) -> Result<Vec<u8>> {
        debug!(%url, "fetching remote document");
        let response = match self.agent.get(url.as_str()).call() {
            Ok(response) => response,
            Err(UreqError::Status(code, _)) => {
                return Err(anyhow!("GET {} failed with HTTP status {}", url, code));
            }
            Err(err) => {
                return Err(anyhow!("GET {} failed: {}", url, err));
            }
        };

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_REMOTE_BYTES + 1)
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read response body from {}", url))?;
        if bytes.len() as u64 > MAX_REMOTE_BYTES {
            return Err(anyhow!(
                "{} is larger than {} bytes",
                url,
                MAX_REMOTE_BYTES
            ));
        }
        Ok(bytes)
    }
}

/// Resolves `raw` and reads its bytes on the blocking pool. Every failure is
/// reported against `raw` as given.
pub async fn fetch_document(fetcher: Arc<Fetcher>, raw: &str) -> Result<Vec<u8>, LoadError> {
    let locator = Locator::parse(raw).map_err(|err| LoadError::new(raw, err))?;
    tokio::task::spawn_blocking(move || fetcher.fetch(&locator))
        .await
        .map_err(|err| LoadError::new(raw, err))?
        .map_err(|err| LoadError::new(raw, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn parses_remote_and_local_locators() {
        assert!(matches!(
            Locator::parse("https://files.example.com/f/abc"),
            Ok(Locator::Remote(url)) if url.host_str() == Some("files.example.com")
        ));
        assert_eq!(
            Locator::parse(" reports/q3.pdf "),
            Ok(Locator::Local(PathBuf::from("reports/q3.pdf")))
        );
        assert_eq!(
            Locator::parse("/tmp/q3.pdf"),
            Ok(Locator::Local(PathBuf::from("/tmp/q3.pdf")))
        );
    }

    #[cfg(unix)]
    #[test]
    fn file_urls_become_paths() {
        assert_eq!(
            Locator::parse("file:///tmp/q3.pdf"),
            Ok(Locator::Local(PathBuf::from("/tmp/q3.pdf")))
        );
    }

    #[test]
    fn rejects_empty_and_unknown_schemes() {
        assert_eq!(Locator::parse("   "), Err(LocatorError::Empty));
        assert_eq!(
            Locator::parse("ftp://example.com/a.pdf"),
            Err(LocatorError::UnsupportedScheme {
                scheme: "ftp".to_owned()
            })
        );
    }

    #[test]
    fn fetches_local_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        fs::write(&path, b"%PDF-1.7").unwrap();

        let fetcher = Fetcher::new(Duration::from_secs(1));
        let bytes = fetcher.fetch(&Locator::Local(path)).unwrap();
        assert_eq!(bytes, b"%PDF-1.7");

        let missing = fetcher.fetch(&Locator::Local(dir.path().join("missing.pdf")));
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn fetch_document_reports_load_errors_against_the_locator() {
        let fetcher = Arc::new(Fetcher::new(Duration::from_secs(1)));

        let err = fetch_document(Arc::clone(&fetcher), "ftp://example.com/a.pdf")
            .await
            .unwrap_err();
        assert_eq!(err.locator, "ftp://example.com/a.pdf");
        assert_eq!(
            err.source.downcast_ref::<LocatorError>(),
            Some(&LocatorError::UnsupportedScheme {
                scheme: "ftp".to_owned()
            })
        );

        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.pdf");
        let raw = missing.to_string_lossy().into_owned();
        let err = fetch_document(Arc::clone(&fetcher), &raw).await.unwrap_err();
        assert_eq!(err.locator, raw);
        assert!(format!("{:#}", err.source).contains("failed to read"));

        let present = dir.path().join("a.pdf");
        fs::write(&present, b"%PDF-1.7").unwrap();
        let bytes = fetch_document(fetcher, &present.to_string_lossy())
            .await
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.7");
    }
}
