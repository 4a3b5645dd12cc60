//! One-shot entry points
//!
//! Each call builds a default [`Tool`](crate::Tool) backed by the HTTP
//! fetcher. Build a tool once with [`ToolBuilder`](crate::ToolBuilder) to
//! reuse the connection pool or change limits.

use crate::error::FetchError;
use crate::proxy::{DownloadOutcome, ResourceProbe};
use crate::tool::Tool;
use crate::types::{ConvertRequest, DownloadRequest, TransformedPayload};

/// Convert a URL with default settings
pub async fn convert(req: ConvertRequest) -> Result<TransformedPayload, FetchError> {
    Tool::builder().build()?.convert(req).await
}

/// Probe a URL with default settings
pub async fn probe(url: &str) -> Result<ResourceProbe, FetchError> {
    Tool::builder().build()?.probe(url).await
}

/// Describe or stream a URL with default settings
pub async fn download(req: DownloadRequest) -> Result<DownloadOutcome, FetchError> {
    Tool::builder().build()?.download(req).await
}
