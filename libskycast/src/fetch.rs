//! Page and byte retrieval
//!
//! Link previews need the target page's HTML and images need raw bytes,
//! either from the web or from the local filesystem. Both sit behind traits
//! so the composer can be driven by in-memory fakes.

use async_trait::async_trait;
use url::Url;

use crate::config::HttpConfig;
use crate::error::{Result, SkycastError};

#[async_trait]
pub trait PageMetadataFetcher: Send + Sync {
    /// Fetch the HTML of `url`.
    async fn fetch_page(&self, url: &Url) -> Result<String>;
}

#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Fetch raw bytes from an http(s) URL or a local path.
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>>;
}

/// True when `location` should be fetched over HTTP rather than read from disk.
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// reqwest-backed fetcher that also reads local files.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| SkycastError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SkycastError::Transport(format!("HTTP {} for {}", status, url)));
        }
        Ok(response)
    }
}

#[async_trait]
impl PageMetadataFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<String> {
        tracing::debug!("Fetching page metadata from {}", url);
        let response = self.get(url.as_str()).await?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl ByteSource for HttpFetcher {
    async fn fetch_bytes(&self, location: &str) -> Result<Vec<u8>> {
        if is_remote(location) {
            tracing::debug!("Downloading {}", location);
            let response = self.get(location).await?;
            return Ok(response.bytes().await?.to_vec());
        }

        let path = shellexpand::tilde(location).to_string();
        tracing::debug!("Reading {}", path);
        tokio::fs::read(&path)
            .await
            .map_err(|e| SkycastError::Transport(format!("failed to read {}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/cat.png"));
        assert!(is_remote("http://example.com/cat.png"));
        assert!(!is_remote("/tmp/cat.png"));
        assert!(!is_remote("~/Pictures/cat.png"));
        assert!(!is_remote("ftp://example.com/cat.png"));
    }

    #[tokio::test]
    async fn test_reads_local_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cat.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nbytes").unwrap();

        let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
        let bytes = fetcher.fetch_bytes(path.to_str().unwrap()).await.unwrap();
        assert_eq!(bytes, b"\x89PNG\r\n\x1a\nbytes");
    }

    #[tokio::test]
    async fn test_missing_local_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.png");

        let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
        let err = fetcher
            .fetch_bytes(path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SkycastError::Transport(_)));
        assert!(err.to_string().contains("missing.png"));
    }

    #[tokio::test]
    async fn test_fetches_page_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<meta property="og:title" content="Hi">"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/article", server.uri())).unwrap();
        let html = fetcher.fetch_page(&url).await.unwrap();
        assert!(html.contains("og:title"));
    }

    #[tokio::test]
    async fn test_downloads_remote_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG\r\n\x1a\nbytes".to_vec()))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
        let bytes = fetcher
            .fetch_bytes(&format!("{}/cat.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"\x89PNG\r\n\x1a\nbytes");
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = fetcher.fetch_page(&url).await.unwrap_err();
        assert!(matches!(err, SkycastError::Transport(ref msg) if msg.contains("404")));

        let err = fetcher
            .fetch_bytes(&format!("{}/missing.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, SkycastError::Transport(_)));
    }
}
