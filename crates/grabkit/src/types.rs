//! Core types for GrabKit

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// HTTP method used against the upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// HTTP GET request
    #[default]
    Get,
    /// HTTP HEAD request
    Head,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Head => write!(f, "HEAD"),
        }
    }
}

/// Requested representation of an HTML document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Whitespace-collapsed plain text
    #[default]
    Text,
    /// Markdown
    Markdown,
    /// Inner body HTML with noise removed
    Html,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "html" => Ok(OutputFormat::Html),
            _ => Err("Invalid format: must be text, markdown or html".to_string()),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Html => write!(f, "html"),
        }
    }
}

/// Format tag carried by every [`TransformedPayload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Json,
    Text,
    Markdown,
    Html,
    Binary,
}

impl From<OutputFormat> for PayloadFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => PayloadFormat::Text,
            OutputFormat::Markdown => PayloadFormat::Markdown,
            OutputFormat::Html => PayloadFormat::Html,
        }
    }
}

/// Options for a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOptions {
    pub output_format: OutputFormat,
    pub include_metadata: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Text,
            include_metadata: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn lenient_format<'de, D>(deserializer: D) -> Result<OutputFormat, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(name
        .and_then(|name| name.parse().ok())
        .unwrap_or_default())
}

/// Request to convert a URL
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConvertRequest {
    /// The URL to fetch (required, must be http:// or https://)
    #[serde(default)]
    pub url: String,

    /// Output format for HTML documents (default text, unknown names fall back to text)
    #[serde(default, deserialize_with = "lenient_format")]
    pub format: OutputFormat,

    /// Extract page metadata from HTML documents (default true)
    #[serde(default = "default_true")]
    pub include_metadata: bool,
}

impl ConvertRequest {
    /// Create a new request with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: OutputFormat::default(),
            include_metadata: true,
        }
    }

    /// Set the output format
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Convert HTML to markdown
    pub fn as_markdown(self) -> Self {
        self.format(OutputFormat::Markdown)
    }

    /// Skip metadata extraction
    pub fn without_metadata(mut self) -> Self {
        self.include_metadata = false;
        self
    }

    pub fn options(&self) -> ConversionOptions {
        ConversionOptions {
            output_format: self.format,
            include_metadata: self.include_metadata,
        }
    }
}

/// Request to describe or download a URL
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    /// The URL to fetch (required, must be http:// or https://)
    #[serde(default)]
    pub url: String,

    /// Stream the bytes instead of describing the resource (default false)
    #[serde(default)]
    pub download: bool,

    /// Filename for the Content-Disposition header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Inbound Range header, forwarded verbatim upstream
    #[serde(skip)]
    pub range: Option<String>,
}

impl DownloadRequest {
    /// Create a new request with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Request the byte stream
    pub fn download(mut self) -> Self {
        self.download = true;
        self
    }

    /// Set the attachment filename
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the Range header to forward
    pub fn range(mut self, range: impl Into<String>) -> Self {
        self.range = Some(range.into());
        self
    }
}

/// Page metadata pulled from an HTML head.
///
/// Every field is defaulted independently when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedMetadata {
    pub title: String,
    pub description: String,
    pub author: String,
    pub published_date: String,
    pub keywords: String,
    pub og_image: String,
    pub canonical_url: String,
    pub lang: String,
}

/// Description of a binary resource that was not transformed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Size from Content-Length, 0 when absent
    pub file_size: u64,
    /// Human readable size
    pub file_size_formatted: String,
    pub is_binary: bool,
    /// Where the bytes can be streamed from
    pub download_endpoint: String,
}

/// Result of a conversion
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransformedPayload {
    /// The requested URL
    pub url: String,

    /// Converted content (absent for binary resources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Page metadata (HTML with metadata requested)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExtractedMetadata>,

    /// Binary resource description
    #[serde(flatten)]
    pub file_info: Option<FileInfo>,

    /// Content-Type of the returned content
    pub content_type: String,

    /// Format tag
    pub format: PayloadFormat,

    /// Character length of `content`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// RFC 3339 creation time
    pub timestamp: String,
}

/// Description of a resource returned by a download request that did not stream
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfo {
    pub url: String,
    pub content_type: String,
    pub file_size: u64,
    pub file_size_formatted: String,
    pub is_media_file: bool,
    pub download_supported: bool,
    /// Headers from the HEAD probe, empty when the probe failed
    pub headers: BTreeMap<String, String>,
    pub timestamp: String,
}

/// Current time as an RFC 3339 UTC timestamp with millisecond precision
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
