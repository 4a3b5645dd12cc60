//! Tool builder and contract for GrabKit

use crate::classify::MediaPolicy;
use crate::error::FetchError;
use crate::fetchers::{Fetcher, HttpFetcher, FETCH_TIMEOUT, MAX_REDIRECTS, STREAM_TIMEOUT};
use crate::pipeline::{Converter, DOWNLOAD_ENDPOINT};
use crate::proxy::{DownloadOutcome, Downloader, ProxiedStream, ResourceProbe};
use crate::types::{timestamp_now, ConvertRequest, DownloadRequest, OutputFormat, TransformedPayload};
use crate::{TOOL_DESCRIPTION, TOOL_LLMTXT};
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Endpoint paths advertised by [`Capabilities`]
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Endpoints {
    pub convert: String,
    pub download: String,
    pub info: String,
}

/// Content families the tool understands
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SupportedFormats {
    pub text: Vec<String>,
    pub media: Vec<String>,
    pub documents: Vec<String>,
}

/// Limits in effect for this tool
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    pub fetch_timeout_secs: u64,
    pub stream_timeout_secs: u64,
    pub max_redirects: usize,
    pub max_file_size: String,
}

/// Static self-description
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Endpoints,
    pub supported_formats: SupportedFormats,
    pub output_formats: Vec<OutputFormat>,
    pub media_extensions: Vec<String>,
    pub features: Vec<String>,
    pub limits: Limits,
    pub timestamp: String,
}

const FEATURES: &[&str] = &[
    "Text content extraction",
    "HTML to Markdown conversion",
    "Metadata extraction",
    "Multiple output formats",
    "Media file downloading with Range support",
    "Large file support with streaming",
];

/// Builder for configuring the GrabKit tool
#[derive(Clone)]
pub struct ToolBuilder {
    user_agent: Option<String>,
    fetch_timeout: Duration,
    stream_timeout: Duration,
    max_redirects: usize,
    media_policy: MediaPolicy,
    fetcher: Option<Arc<dyn Fetcher>>,
}

impl Default for ToolBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            fetch_timeout: FETCH_TIMEOUT,
            stream_timeout: STREAM_TIMEOUT,
            max_redirects: MAX_REDIRECTS,
            media_policy: MediaPolicy::default(),
            fetcher: None,
        }
    }
}

impl std::fmt::Debug for ToolBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBuilder")
            .field("user_agent", &self.user_agent)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("stream_timeout", &self.stream_timeout)
            .field("max_redirects", &self.max_redirects)
            .field("media_policy", &self.media_policy)
            .field("fetcher", &self.fetcher.as_ref().map(|f| f.name()))
            .finish()
    }
}

impl ToolBuilder {
    /// Create a new tool builder with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom User-Agent
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Timeout for conversions and HEAD probes
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Timeout for streamed downloads
    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn media_policy(mut self, policy: MediaPolicy) -> Self {
        self.media_policy = policy;
        self
    }

    /// Use a custom fetcher instead of the HTTP one.
    ///
    /// User agent and redirect settings are ignored when set.
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Build the tool
    pub fn build(self) -> Result<Tool, FetchError> {
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::with_options(
                self.user_agent.as_deref(),
                self.max_redirects,
            )?),
        };

        let converter = Converter::new(fetcher.clone())
            .with_policy(self.media_policy.clone())
            .with_timeout(self.fetch_timeout);
        let downloader = Downloader::new(fetcher)
            .with_policy(self.media_policy.clone())
            .with_timeouts(self.fetch_timeout, self.stream_timeout);

        Ok(Tool {
            converter,
            downloader,
            media_policy: self.media_policy,
            fetch_timeout: self.fetch_timeout,
            stream_timeout: self.stream_timeout,
            max_redirects: self.max_redirects,
        })
    }
}

/// Configured GrabKit tool
#[derive(Debug, Clone)]
pub struct Tool {
    converter: Converter,
    downloader: Downloader,
    media_policy: MediaPolicy,
    fetch_timeout: Duration,
    stream_timeout: Duration,
    max_redirects: usize,
}

impl Tool {
    /// Create a new tool builder
    pub fn builder() -> ToolBuilder {
        ToolBuilder::new()
    }

    /// Get tool description
    pub fn description(&self) -> &'static str {
        TOOL_DESCRIPTION
    }

    /// Get full documentation (llmtxt)
    pub fn llmtxt(&self) -> &'static str {
        TOOL_LLMTXT
    }

    /// JSON schema of [`ConvertRequest`]
    pub fn convert_schema(&self) -> serde_json::Value {
        let schema = schema_for!(ConvertRequest);
        serde_json::to_value(schema).unwrap_or_default()
    }

    /// JSON schema of [`DownloadRequest`]
    pub fn download_schema(&self) -> serde_json::Value {
        let schema = schema_for!(DownloadRequest);
        serde_json::to_value(schema).unwrap_or_default()
    }

    /// JSON schema of [`TransformedPayload`]
    pub fn output_schema(&self) -> serde_json::Value {
        let schema = schema_for!(TransformedPayload);
        serde_json::to_value(schema).unwrap_or_default()
    }

    /// Convert a URL
    pub async fn convert(&self, req: ConvertRequest) -> Result<TransformedPayload, FetchError> {
        self.converter.convert(&req.url, req.options()).await
    }

    /// HEAD a URL and decide whether it is downloadable media
    pub async fn probe(&self, url: &str) -> Result<ResourceProbe, FetchError> {
        self.downloader.probe(url).await
    }

    /// Relay a URL body regardless of its type
    pub async fn stream(
        &self,
        url: &str,
        range: Option<String>,
        filename: Option<&str>,
    ) -> Result<ProxiedStream, FetchError> {
        self.downloader.stream(url, range, filename).await
    }

    /// Describe a URL or stream it when requested and eligible
    pub async fn download(&self, req: DownloadRequest) -> Result<DownloadOutcome, FetchError> {
        self.downloader.download(req).await
    }

    /// Static self-description
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "GrabKit".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            endpoints: Endpoints {
                convert: "/api/convert".to_string(),
                download: DOWNLOAD_ENDPOINT.to_string(),
                info: "/api/info".to_string(),
            },
            supported_formats: SupportedFormats {
                text: ["text/html", "text/plain", "text/csv", "application/json"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                media: self
                    .media_policy
                    .type_prefixes()
                    .iter()
                    .map(|p| format!("{}*", p))
                    .collect(),
                documents: [
                    "application/pdf",
                    "application/msword",
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            output_formats: vec![OutputFormat::Text, OutputFormat::Markdown, OutputFormat::Html],
            media_extensions: self.media_policy.extensions().to_vec(),
            features: FEATURES.iter().map(|s| s.to_string()).collect(),
            limits: Limits {
                fetch_timeout_secs: self.fetch_timeout.as_secs(),
                stream_timeout_secs: self.stream_timeout.as_secs(),
                max_redirects: self.max_redirects,
                max_file_size: "No limit (streaming supported)".to_string(),
            },
            timestamp: timestamp_now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetchers::fake::{FakeFetcher, FakeResponse};
    use crate::types::PayloadFormat;

    #[test]
    fn test_tool_builder() {
        let tool = Tool::builder()
            .user_agent("TestAgent/1.0")
            .fetch_timeout(Duration::from_secs(10))
            .stream_timeout(Duration::from_secs(60))
            .max_redirects(2)
            .media_policy(MediaPolicy::empty().with_type_prefix("audio/"))
            .build()
            .unwrap();

        assert_eq!(tool.fetch_timeout, Duration::from_secs(10));
        assert_eq!(tool.stream_timeout, Duration::from_secs(60));
        assert_eq!(tool.max_redirects, 2);

        let caps = tool.capabilities();
        assert_eq!(caps.limits.fetch_timeout_secs, 10);
        assert_eq!(caps.limits.stream_timeout_secs, 60);
        assert_eq!(caps.supported_formats.media, vec!["audio/*"]);
        assert!(caps.media_extensions.is_empty());
    }

    #[test]
    fn test_tool_description() {
        let tool = Tool::builder().build().unwrap();
        assert!(!tool.description().is_empty());
        assert!(!tool.llmtxt().is_empty());
    }

    #[test]
    fn test_tool_schemas() {
        let tool = Tool::builder().build().unwrap();

        let convert = tool.convert_schema();
        assert!(convert["properties"]["url"].is_object());
        assert!(convert["properties"]["format"].is_object());
        assert!(convert["properties"]["includeMetadata"].is_object());

        let download = tool.download_schema();
        assert!(download["properties"]["download"].is_object());
        assert!(download["properties"]["filename"].is_object());
        assert!(download["properties"].get("range").is_none());

        let output = tool.output_schema();
        assert!(output["properties"]["contentType"].is_object());
    }

    #[test]
    fn test_capabilities_serialization() {
        let tool = Tool::builder().build().unwrap();
        let json = serde_json::to_value(tool.capabilities()).unwrap();
        assert_eq!(json["name"], "GrabKit");
        assert_eq!(json["endpoints"]["download"], "/api/download");
        assert_eq!(json["limits"]["streamTimeoutSecs"], 300);
        assert_eq!(json["limits"]["maxRedirects"], 5);
        assert_eq!(
            json["outputFormats"],
            serde_json::json!(["text", "markdown", "html"])
        );
        assert!(json["mediaExtensions"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("mp3")));
    }

    #[tokio::test]
    async fn test_tool_uses_custom_fetcher() {
        let fetcher = Arc::new(FakeFetcher::new().respond(
            FakeResponse::new(200)
                .header("content-type", "text/plain")
                .body("hello"),
        ));
        let tool = Tool::builder().fetcher(fetcher.clone()).build().unwrap();

        let payload = tool
            .convert(ConvertRequest::new("https://example.com/hello.txt"))
            .await
            .unwrap();
        assert_eq!(payload.format, PayloadFormat::Text);
        assert_eq!(payload.content.as_deref(), Some("hello"));
        assert_eq!(fetcher.calls(), 1);
    }
}
