//! GrabKit - web content conversion and streaming downloads
//!
//! Two operations over any http(s) URL:
//!
//! - **convert**: fetch once, classify from the declared content type and
//!   URL suffix, then return pretty JSON, passthrough text, or an HTML page
//!   rendered as text, markdown or cleaned inner HTML with page metadata.
//!   Binary resources are described, never read.
//! - **download**: probe with HEAD, then relay media resources chunk by
//!   chunk with Range forwarding, or describe the resource.
//!
//! ## Fetcher System
//!
//! All network access goes through the [`Fetcher`] trait. [`HttpFetcher`]
//! is the reqwest-backed implementation; [`ToolBuilder::fetcher`] swaps in
//! any other.

pub mod classify;
pub mod client;
mod error;
pub mod extract;
pub mod fetchers;
pub mod markdown;
pub mod pipeline;
pub mod proxy;
pub mod size;
mod tool;
mod types;

pub use classify::{classify, ClassificationSource, ClassifiedContent, ContentKind, MediaPolicy};
pub use client::{convert, download, probe};
pub use error::{FetchError, Operation};
pub use fetchers::{FetchRequest, FetchResult, Fetcher, HttpFetcher};
pub use markdown::html_to_markdown;
pub use pipeline::{Converter, DOWNLOAD_ENDPOINT};
pub use proxy::{DownloadOutcome, Downloader, ProxiedStream, ResourceProbe, StreamSession};
pub use size::format_file_size;
pub use tool::{Capabilities, Tool, ToolBuilder};
pub use types::{
    ConversionOptions, ConvertRequest, DownloadInfo, DownloadRequest, ExtractedMetadata, FileInfo,
    HttpMethod, OutputFormat, PayloadFormat, TransformedPayload,
};

/// Default User-Agent string.
///
/// Browser-like, since some servers reject unidentified clients.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Tool description for LLM consumption
pub const TOOL_DESCRIPTION: &str = r#"Converts web content to text, markdown, HTML or pretty JSON, and streams media downloads.

- HTML pages become plain text, markdown or cleaned HTML with metadata
- JSON is pretty-printed, other text passes through
- Binary resources are described, not downloaded
- Media files stream with Range support"#;

/// Extended documentation for LLM consumption (llmtxt)
pub const TOOL_LLMTXT: &str = r#"# GrabKit

Converts web content and streams media downloads.

## Capabilities
- HTML to plain text, markdown or cleaned inner HTML
- Page metadata (title, description, author, dates, image, canonical URL, language)
- Pretty-printed JSON
- Text and CSV passthrough
- Binary detection by content type or URL extension (metadata only)
- Streaming downloads with Range forwarding

## Convert
### Input
- `url` (required): http:// or https:// URL
- `format` (optional): "text" (default), "markdown" or "html"
- `includeMetadata` (optional): extract page metadata (default true)

### Output
- `url`, `contentType`, `format`, `timestamp`
- `content` and `size` (character count) for textual resources
- `metadata` for HTML with metadata requested
- `fileSize`, `fileSizeFormatted`, `isBinary`, `downloadEndpoint` for binary resources

## Download
### Input
- `url` (required): http:// or https:// URL
- `download` (optional): stream the bytes when the resource is media (default false)
- `filename` (optional): attachment filename
- `Range` request header: forwarded upstream

### Output
- Streamed bytes with Content-Disposition, Accept-Ranges and echoed
  Content-Range/Content-Length (206 for partial content)
- Otherwise `url`, `contentType`, `fileSize`, `fileSizeFormatted`,
  `isMediaFile`, `downloadSupported`, `headers`, `timestamp`

## Examples

### Page as markdown
```json
{"url": "https://example.com", "format": "markdown"}
```

### Download a podcast episode
```json
{"url": "https://example.com/episode.mp3", "download": true, "filename": "episode.mp3"}
```

## Error Handling
- `{"error": "..."}` with status 400 for missing/invalid or unreachable URLs
- Upstream HTTP errors pass their status through as "HTTP {status}: {text}"
- Timeouts and other failures return 500
- A stream that fails after bytes were sent is cut off
"#;
