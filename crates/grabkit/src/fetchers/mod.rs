//! Resource fetching
//!
//! Design: the [`Fetcher`] trait is the single seam to the network. The
//! conversion pipeline and the streaming proxy only ever see a
//! [`FetchResult`], so tests can swap in a fake fetcher and production uses
//! [`HttpFetcher`].

#[cfg(test)]
pub(crate) mod fake;
mod http;

pub use http::HttpFetcher;

use crate::error::FetchError;
use crate::types::HttpMethod;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Timeout for metadata and buffered calls
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for full-body streaming calls
pub const STREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Redirect cap
pub const MAX_REDIRECTS: usize = 5;

/// Upstream body, delivered chunk by chunk
pub type BodyStream = BoxStream<'static, Result<Bytes, FetchError>>;

/// How the body of a fetch will be consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Body is read into memory and transformed (transparent decompression)
    #[default]
    Buffered,
    /// Body is relayed byte-exact to a consumer (no decompression)
    Streaming,
}

/// A single upstream call
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: HttpMethod,
    pub mode: FetchMode,
    pub timeout: Duration,
    /// Range header forwarded verbatim
    pub range: Option<String>,
}

impl FetchRequest {
    /// GET request with the buffered timeout
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: HttpMethod::Get,
            mode: FetchMode::Buffered,
            timeout: FETCH_TIMEOUT,
            range: None,
        }
    }

    /// HEAD request with the buffered timeout
    pub fn head(url: Url) -> Self {
        Self {
            method: HttpMethod::Head,
            ..Self::get(url)
        }
    }

    /// GET request for byte-exact relay with the streaming timeout
    pub fn stream(url: Url) -> Self {
        Self {
            mode: FetchMode::Streaming,
            timeout: STREAM_TIMEOUT,
            ..Self::get(url)
        }
    }

    /// Override the timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Forward a Range header
    pub fn range(mut self, range: Option<String>) -> Self {
        self.range = range;
        self
    }
}

/// Upstream response: status, headers and a not-yet-consumed body
pub struct FetchResult {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// Declared Content-Type, empty when absent
    pub media_type: String,
    /// Parsed Content-Length
    pub byte_length: Option<u64>,
    /// Response headers, lowercased names
    pub headers: BTreeMap<String, String>,
    body: BodyStream,
}

impl std::fmt::Debug for FetchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchResult")
            .field("url", &self.url)
            .field("status", &self.status)
            .field("media_type", &self.media_type)
            .field("byte_length", &self.byte_length)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl FetchResult {
    /// Build a result from parts.
    ///
    /// `media_type` and `byte_length` are derived from the headers.
    pub fn new(
        url: impl Into<String>,
        status: u16,
        status_text: impl Into<String>,
        headers: BTreeMap<String, String>,
        body: BodyStream,
    ) -> Self {
        let media_type = headers.get("content-type").cloned().unwrap_or_default();
        let byte_length = headers
            .get("content-length")
            .and_then(|v| v.trim().parse().ok());
        Self {
            url: url.into(),
            status,
            status_text: status_text.into(),
            media_type,
            byte_length,
            headers,
            body,
        }
    }

    /// True for 2xx responses (206 included)
    pub fn status_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value by lowercase name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Turn a non-success response into [`FetchError::UpstreamHttp`]
    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if self.status_ok() {
            Ok(self)
        } else {
            Err(FetchError::UpstreamHttp {
                status: self.status,
                status_text: self.status_text,
            })
        }
    }

    /// Take the body stream
    pub fn into_body(self) -> BodyStream {
        self.body
    }

    /// Read the full body into memory
    pub async fn bytes(self) -> Result<Bytes, FetchError> {
        let chunks: Vec<Bytes> = self.body.try_collect().await?;
        Ok(Bytes::from(chunks.concat()))
    }

    /// Read the full body as (lossy) UTF-8 text
    pub async fn text(self) -> Result<String, FetchError> {
        let body = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Parse and check a caller-supplied URL before any network call.
///
/// Empty input is [`FetchError::MissingUrl`]; anything that is not an
/// absolute `http`/`https` URL is [`FetchError::InvalidUrl`].
pub fn validate_url(url: &str) -> Result<Url, FetchError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(FetchError::MissingUrl);
    }
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(parsed),
        "http" | "https" => Err(FetchError::InvalidUrl("missing host".to_string())),
        scheme => Err(FetchError::InvalidUrl(format!("unsupported scheme: {}", scheme))),
    }
}

/// Empty body stream
pub fn empty_body() -> BodyStream {
    futures::stream::empty().boxed()
}

/// Trait for the transport seam
///
/// Implementations perform a single attempt per call; retries are the
/// caller's business.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Identifier for logging
    fn name(&self) -> &'static str;

    /// Perform the request and return the response with an unread body.
    ///
    /// Non-success statuses are returned as a [`FetchResult`], not an error;
    /// use [`FetchResult::error_for_status`] to reject them.
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResult, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_request_constructors() {
        let url = Url::parse("https://example.com/a.mp3").unwrap();

        let get = FetchRequest::get(url.clone());
        assert_eq!(get.method, HttpMethod::Get);
        assert_eq!(get.mode, FetchMode::Buffered);
        assert_eq!(get.timeout, FETCH_TIMEOUT);

        let head = FetchRequest::head(url.clone());
        assert_eq!(head.method, HttpMethod::Head);
        assert_eq!(head.timeout, FETCH_TIMEOUT);

        let stream = FetchRequest::stream(url).range(Some("bytes=0-1".to_string()));
        assert_eq!(stream.method, HttpMethod::Get);
        assert_eq!(stream.mode, FetchMode::Streaming);
        assert_eq!(stream.timeout, STREAM_TIMEOUT);
        assert_eq!(stream.range.as_deref(), Some("bytes=0-1"));
    }

    #[test]
    fn test_validate_url() {
        assert!(matches!(validate_url(""), Err(FetchError::MissingUrl)));
        assert!(matches!(validate_url("   "), Err(FetchError::MissingUrl)));
        assert!(matches!(validate_url("not a url"), Err(FetchError::InvalidUrl(_))));
        assert!(matches!(
            validate_url("ftp://example.com/file"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(FetchError::InvalidUrl(_))
        ));

        let url = validate_url(" https://example.com/a.mp3?x=1 ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a.mp3?x=1");
        assert!(validate_url("http://localhost:8080/").is_ok());
    }

    #[test]
    fn test_result_derives_type_and_length() {
        let result = FetchResult::new(
            "https://example.com",
            200,
            "OK",
            headers(&[("content-type", "text/html"), ("content-length", "42")]),
            empty_body(),
        );
        assert_eq!(result.media_type, "text/html");
        assert_eq!(result.byte_length, Some(42));
        assert!(result.status_ok());

        let result = FetchResult::new(
            "https://example.com",
            200,
            "OK",
            headers(&[("content-length", "lots")]),
            empty_body(),
        );
        assert_eq!(result.media_type, "");
        assert_eq!(result.byte_length, None);
    }

    #[test]
    fn test_error_for_status() {
        let partial = FetchResult::new("u", 206, "Partial Content", BTreeMap::new(), empty_body());
        assert!(partial.error_for_status().is_ok());

        let missing = FetchResult::new("u", 404, "Not Found", BTreeMap::new(), empty_body());
        match missing.error_for_status() {
            Err(FetchError::UpstreamHttp {
                status,
                status_text,
            }) => {
                assert_eq!(status, 404);
                assert_eq!(status_text, "Not Found");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_concatenates_chunks() {
        let body = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"Hello, ")),
            Ok(Bytes::from_static(b"World")),
        ])
        .boxed();
        let result = FetchResult::new("u", 200, "OK", BTreeMap::new(), body);
        assert_eq!(result.text().await.unwrap(), "Hello, World");
    }

    #[tokio::test]
    async fn test_body_error_propagates() {
        let body = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(FetchError::Timeout),
        ])
        .boxed();
        let result = FetchResult::new("u", 200, "OK", BTreeMap::new(), body);
        assert!(matches!(result.bytes().await, Err(FetchError::Timeout)));
    }
}
