//! HTTP fetcher backed by reqwest
//!
//! Handles the actual network calls for conversions, probes and streamed
//! downloads. One attempt per call, no retries.

use crate::error::FetchError;
use crate::fetchers::{FetchMode, FetchRequest, FetchResult, Fetcher, MAX_REDIRECTS};
use crate::types::HttpMethod;
use crate::DEFAULT_USER_AGENT;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RANGE, USER_AGENT};
use reqwest::redirect::Policy;
use std::collections::BTreeMap;
use tracing::debug;

/// HTTP fetcher
///
/// Holds two clients sharing the same identity and redirect cap:
/// - buffered: transparent gzip/brotli/deflate decoding for bodies that get transformed
/// - streaming: no decoding, so relayed bytes and length headers stay exact
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    buffered: reqwest::Client,
    streaming: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default user agent and redirect cap
    pub fn new() -> Result<Self, FetchError> {
        Self::with_options(None, MAX_REDIRECTS)
    }

    /// Create a fetcher with a custom user agent and redirect cap
    pub fn with_options(user_agent: Option<&str>, max_redirects: usize) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        let user_agent = user_agent.unwrap_or(DEFAULT_USER_AGENT);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT)),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let buffered = reqwest::Client::builder()
            .default_headers(headers.clone())
            .redirect(Policy::limited(max_redirects))
            .build()
            .map_err(|e| FetchError::Internal(format!("failed to create HTTP client: {}", e)))?;

        let streaming = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(Policy::limited(max_redirects))
            .no_gzip()
            .no_brotli()
            .no_deflate()
            .build()
            .map_err(|e| FetchError::Internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            buffered,
            streaming,
        })
    }

    fn client(&self, mode: FetchMode) -> &reqwest::Client {
        match mode {
            FetchMode::Buffered => &self.buffered,
            FetchMode::Streaming => &self.streaming,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, request: FetchRequest) -> Result<FetchResult, FetchError> {
        let reqwest_method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        };

        let mut http_request = self
            .client(request.mode)
            .request(reqwest_method, request.url.as_str())
            .timeout(request.timeout);

        if let Some(range) = &request.range {
            http_request = http_request.header(RANGE, range.as_str());
        }

        debug!(
            method = %request.method,
            url = %request.url,
            mode = ?request.mode,
            range = request.range.as_deref().unwrap_or(""),
            "Sending upstream request"
        );

        let response = http_request
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = collect_headers(response.headers());

        let body = response
            .bytes_stream()
            .map_err(FetchError::from_reqwest)
            .boxed();

        Ok(FetchResult::new(
            final_url,
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
            headers,
            body,
        ))
    }
}

/// Flatten a header map, joining repeated headers with ", "
fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    map
}
