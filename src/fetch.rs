//! HTTP client wrapper with a fixed politeness delay.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::FetchError;

/// Realistic desktop user agent; the search frontend serves automation
/// differently otherwise.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Stateful HTTP client used for document pages and PDF payloads.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    request_delay: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration, request_delay: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self {
            client,
            request_delay,
        })
    }

    /// GET a URL. The politeness delay is applied after every request,
    /// successful or not.
    pub async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        debug!("GET {}", url);
        let result = self.client.get(url).send().await;
        tokio::time::sleep(self.request_delay).await;
        let response = result?;

        let status = response.status();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.to_string(), v.to_string());
            }
        }

        Ok(FetchResponse {
            status,
            headers,
            response,
        })
    }

    /// GET a URL and return its body as text, treating non-OK statuses as
    /// errors.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status.as_u16(),
                url: url.to_string(),
            });
        }
        response.text().await
    }
}

/// Response wrapper exposing status and headers up front, body on demand.
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    response: reqwest::Response,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }

    /// Whether the declared content type indicates a PDF payload.
    pub fn is_pdf(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("application/pdf"))
            .unwrap_or(false)
    }

    pub async fn bytes(self) -> Result<Vec<u8>, FetchError> {
        Ok(self.response.bytes().await?.to_vec())
    }

    pub async fn text(self) -> Result<String, FetchError> {
        Ok(self.response.text().await?)
    }
}
