//! URL to payload conversion
//!
//! Design: one fetch per conversion, classification from headers and URL
//! only, then a single branch per content kind. Binary bodies are never
//! read; the payload points the caller at the download endpoint instead.

use crate::classify::{classify, ContentKind, MediaPolicy};
use crate::error::FetchError;
use crate::extract::HtmlDocument;
use crate::fetchers::{validate_url, FetchRequest, Fetcher, FETCH_TIMEOUT};
use crate::markdown::html_to_markdown;
use crate::size::format_file_size;
use crate::types::{
    timestamp_now, ConversionOptions, ExtractedMetadata, FileInfo, OutputFormat, PayloadFormat,
    TransformedPayload,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Endpoint binary payloads point at
pub const DOWNLOAD_ENDPOINT: &str = "/api/download";

/// Converts fetched resources into [`TransformedPayload`]s
#[derive(Clone)]
pub struct Converter {
    fetcher: Arc<dyn Fetcher>,
    policy: MediaPolicy,
    timeout: Duration,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("fetcher", &self.fetcher.name())
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Converter {
    /// Create a converter over the given fetcher with the default policy
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            policy: MediaPolicy::default(),
            timeout: FETCH_TIMEOUT,
        }
    }

    /// Set the media policy used for classification
    pub fn with_policy(mut self, policy: MediaPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the upstream timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch `url` and convert it according to `options`
    #[instrument(skip(self, options), fields(fetcher = self.fetcher.name()))]
    pub async fn convert(
        &self,
        url: &str,
        options: ConversionOptions,
    ) -> Result<TransformedPayload, FetchError> {
        let parsed = validate_url(url)?;

        let result = self
            .fetcher
            .fetch(FetchRequest::get(parsed).timeout(self.timeout))
            .await?
            .error_for_status()?;

        let classified = classify(&result.media_type, url, &self.policy);
        debug!(
            kind = ?classified.kind,
            source = ?classified.source,
            media_type = %result.media_type,
            "Classified upstream response"
        );

        let payload = match classified.kind {
            ContentKind::Json => json_payload(url, result.text().await?),
            ContentKind::Html => {
                let body = result.text().await?;
                html_payload(url, &body, options)
            }
            ContentKind::PlainText => {
                let content_type = result.media_type.clone();
                let body = result.text().await?;
                text_payload(url, body, content_type)
            }
            ContentKind::Binary => {
                // Dropping the result releases the unread body
                let file_size = result.byte_length.unwrap_or(0);
                binary_payload(url, result.media_type, file_size)
            }
        };

        info!(format = ?payload.format, size = ?payload.size, "Conversion complete");
        Ok(payload)
    }
}

fn char_count(s: &str) -> u64 {
    s.chars().count() as u64
}

fn json_payload(url: &str, body: String) -> TransformedPayload {
    let content = match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or(body),
        Err(e) => {
            debug!(error = %e, "JSON body did not parse, returning raw text");
            body
        }
    };
    TransformedPayload {
        url: url.to_string(),
        size: Some(char_count(&content)),
        content: Some(content),
        metadata: None,
        file_info: None,
        content_type: "application/json".to_string(),
        format: PayloadFormat::Json,
        timestamp: timestamp_now(),
    }
}

/// HTML branch. Kept synchronous: the parsed document is not `Send`.
fn html_payload(url: &str, body: &str, options: ConversionOptions) -> TransformedPayload {
    let (content, metadata) = render_html(url, body, options);
    TransformedPayload {
        url: url.to_string(),
        size: Some(char_count(&content)),
        content: Some(content),
        metadata,
        file_info: None,
        content_type: "text/html".to_string(),
        format: options.output_format.into(),
        timestamp: timestamp_now(),
    }
}

fn render_html(
    url: &str,
    body: &str,
    options: ConversionOptions,
) -> (String, Option<ExtractedMetadata>) {
    let mut document = HtmlDocument::parse(body);
    let metadata = options.include_metadata.then(|| document.metadata(url));
    document.remove_noise();

    let content = match options.output_format {
        OutputFormat::Markdown => {
            let inner = document.body_html().unwrap_or_else(|| body.to_string());
            html_to_markdown(&inner)
        }
        OutputFormat::Html => document.body_html().unwrap_or_else(|| body.to_string()),
        OutputFormat::Text => document.body_text(),
    };
    (content, metadata)
}

fn text_payload(url: &str, body: String, content_type: String) -> TransformedPayload {
    TransformedPayload {
        url: url.to_string(),
        size: Some(char_count(&body)),
        content: Some(body),
        metadata: None,
        file_info: None,
        content_type,
        format: PayloadFormat::Text,
        timestamp: timestamp_now(),
    }
}

fn binary_payload(url: &str, content_type: String, file_size: u64) -> TransformedPayload {
    TransformedPayload {
        url: url.to_string(),
        content: None,
        metadata: None,
        file_info: Some(FileInfo {
            file_size,
            file_size_formatted: format_file_size(file_size),
            is_binary: true,
            download_endpoint: DOWNLOAD_ENDPOINT.to_string(),
        }),
        content_type,
        format: PayloadFormat::Binary,
        size: None,
        timestamp: timestamp_now(),
    }
}
