//! Range-aware streaming downloads
//!
//! A download starts with a tolerant HEAD probe. Media resources can then be
//! relayed chunk by chunk through a [`StreamSession`]: every upstream chunk
//! is handed to the consumer as soon as it arrives, and the next one is only
//! polled once the consumer asks for it. Dropping the session drops the
//! upstream body and with it the connection.

use crate::classify::{classify, extension_for_type, url_extension, MediaPolicy};
use crate::error::FetchError;
use crate::fetchers::{
    validate_url, BodyStream, FetchRequest, FetchResult, Fetcher, FETCH_TIMEOUT, STREAM_TIMEOUT,
};
use crate::size::format_file_size;
use crate::types::{timestamp_now, DownloadInfo, DownloadRequest};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Content type used when upstream declares none
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// What a HEAD probe learned about a resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceProbe {
    /// Declared Content-Type, empty when unknown
    pub content_type: String,
    /// Content-Length, 0 when unknown
    pub file_size: u64,
    pub is_media_file: bool,
    /// HEAD response headers, empty when the probe failed
    pub headers: BTreeMap<String, String>,
}

impl ResourceProbe {
    /// Describe the probed resource
    pub fn into_info(self, url: &str) -> DownloadInfo {
        DownloadInfo {
            url: url.to_string(),
            content_type: self.content_type,
            file_size: self.file_size,
            file_size_formatted: format_file_size(self.file_size),
            is_media_file: self.is_media_file,
            download_supported: self.is_media_file,
            headers: self.headers,
            timestamp: timestamp_now(),
        }
    }
}

/// Result of [`Downloader::download`]
#[derive(Debug)]
pub enum DownloadOutcome {
    /// Bytes are being relayed
    Stream(ProxiedStream),
    /// Resource description only
    Info(DownloadInfo),
}

/// A relayed download: response framing plus the byte stream
#[derive(Debug)]
pub struct ProxiedStream {
    /// 206 when upstream answered with a range, else 200
    pub status: u16,
    pub content_type: String,
    /// Resolved attachment filename
    pub filename: String,
    /// Echoed from upstream
    pub content_range: Option<String>,
    /// Echoed from upstream
    pub content_length: Option<String>,
    pub body: StreamSession,
}

impl ProxiedStream {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }

    /// Response headers in emission order, lowercase names
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("content-type", self.content_type.clone()),
            ("content-disposition", self.content_disposition()),
            ("accept-ranges", "bytes".to_string()),
        ];
        if let Some(range) = &self.content_range {
            headers.push(("content-range", range.clone()));
        }
        if let Some(length) = &self.content_length {
            headers.push(("content-length", length.clone()));
        }
        headers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Streaming,
    Finished,
    Failed,
}

/// Ordered, pull-driven relay of an upstream body.
///
/// Yields upstream chunks unchanged and in order. An upstream error is
/// yielded once and ends the stream; bytes already yielded stay delivered.
pub struct StreamSession {
    upstream: BodyStream,
    url: String,
    emitted: u64,
    state: SessionState,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("url", &self.url)
            .field("emitted", &self.emitted)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    pub fn new(url: impl Into<String>, upstream: BodyStream) -> Self {
        Self {
            upstream,
            url: url.into(),
            emitted: 0,
            state: SessionState::Streaming,
        }
    }

    /// Bytes handed to the consumer so far
    pub fn bytes_emitted(&self) -> u64 {
        self.emitted
    }

    /// True once upstream ended cleanly
    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }
}

impl Stream for StreamSession {
    type Item = Result<Bytes, FetchError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.state != SessionState::Streaming {
            return Poll::Ready(None);
        }

        match self.upstream.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.emitted += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.state = SessionState::Failed;
                warn!(url = %self.url, emitted = self.emitted, error = %e, "Upstream stream failed");
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.state = SessionState::Finished;
                info!(url = %self.url, emitted = self.emitted, "Stream complete");
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.state == SessionState::Streaming {
            info!(
                url = %self.url,
                emitted = self.emitted,
                "Consumer went away, releasing upstream"
            );
        }
    }
}

/// Attachment filename: the caller's choice, else `download.<ext>`.
///
/// The extension comes from the content type, then the URL suffix, then
/// falls back to `bin`. Quotes, backslashes and control characters are
/// replaced so the name is safe inside a quoted header value.
pub fn resolve_filename(filename: Option<&str>, content_type: &str, url: &str) -> String {
    if let Some(name) = filename.map(str::trim).filter(|n| !n.is_empty()) {
        return name
            .chars()
            .map(|c| match c {
                '"' | '\\' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
    }

    let ext = extension_for_type(content_type)
        .map(str::to_string)
        .or_else(|| url_extension(url))
        .unwrap_or_else(|| "bin".to_string());
    format!("download.{}", ext)
}

/// Probes and relays downloadable resources
#[derive(Clone)]
pub struct Downloader {
    fetcher: Arc<dyn Fetcher>,
    policy: MediaPolicy,
    probe_timeout: Duration,
    stream_timeout: Duration,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("fetcher", &self.fetcher.name())
            .field("policy", &self.policy)
            .field("probe_timeout", &self.probe_timeout)
            .field("stream_timeout", &self.stream_timeout)
            .finish()
    }
}

impl Downloader {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            policy: MediaPolicy::default(),
            probe_timeout: FETCH_TIMEOUT,
            stream_timeout: STREAM_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: MediaPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeouts(mut self, probe: Duration, stream: Duration) -> Self {
        self.probe_timeout = probe;
        self.stream_timeout = stream;
        self
    }

    /// HEAD the resource and decide whether it is downloadable media.
    ///
    /// Only URL validation can fail; a failed probe yields unknown headers.
    #[instrument(skip(self), fields(fetcher = self.fetcher.name()))]
    pub async fn probe(&self, url: &str) -> Result<ResourceProbe, FetchError> {
        let parsed = validate_url(url)?;
        Ok(self.probe_parsed(url, parsed).await)
    }

    /// Relay the resource body.
    ///
    /// `range` is forwarded verbatim. The content type is taken from the
    /// GET response.
    #[instrument(skip(self), fields(fetcher = self.fetcher.name()))]
    pub async fn stream(
        &self,
        url: &str,
        range: Option<String>,
        filename: Option<&str>,
    ) -> Result<ProxiedStream, FetchError> {
        let parsed = validate_url(url)?;
        self.stream_parsed(url, parsed, range, filename, None).await
    }

    /// Describe the resource, or stream it when asked to and it is media
    #[instrument(skip(self, request), fields(url = %request.url, download = request.download))]
    pub async fn download(&self, request: DownloadRequest) -> Result<DownloadOutcome, FetchError> {
        let parsed = validate_url(&request.url)?;
        let probe = self.probe_parsed(&request.url, parsed.clone()).await;

        if !(request.download && probe.is_media_file) {
            debug!(
                is_media_file = probe.is_media_file,
                "Returning resource description"
            );
            return Ok(DownloadOutcome::Info(probe.into_info(&request.url)));
        }

        let known_type = Some(probe.content_type).filter(|t| !t.is_empty());
        let stream = self
            .stream_parsed(
                &request.url,
                parsed,
                request.range,
                request.filename.as_deref(),
                known_type,
            )
            .await?;
        Ok(DownloadOutcome::Stream(stream))
    }

    async fn probe_parsed(&self, url: &str, parsed: Url) -> ResourceProbe {
        let head = self
            .fetcher
            .fetch(FetchRequest::head(parsed).timeout(self.probe_timeout))
            .await
            .and_then(FetchResult::error_for_status);

        let (content_type, file_size, headers) = match head {
            Ok(result) => (
                result.media_type.clone(),
                result.byte_length.unwrap_or(0),
                result.headers.clone(),
            ),
            Err(e) => {
                warn!(error = %e, "HEAD probe failed, treating headers as unknown");
                (String::new(), 0, BTreeMap::new())
            }
        };

        let is_media_file = classify(&content_type, url, &self.policy).is_media;
        ResourceProbe {
            content_type,
            file_size,
            is_media_file,
            headers,
        }
    }

    async fn stream_parsed(
        &self,
        url: &str,
        parsed: Url,
        range: Option<String>,
        filename: Option<&str>,
        known_type: Option<String>,
    ) -> Result<ProxiedStream, FetchError> {
        let result = self
            .fetcher
            .fetch(
                FetchRequest::stream(parsed)
                    .timeout(self.stream_timeout)
                    .range(range),
            )
            .await?
            .error_for_status()?;

        let content_type = known_type
            .or_else(|| Some(result.media_type.clone()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
        let content_range = result.header("content-range").map(str::to_string);
        let content_length = result.header("content-length").map(str::to_string);
        let status = if content_range.is_some() { 206 } else { 200 };
        let filename = resolve_filename(filename, &content_type, url);

        info!(
            status,
            content_type = %content_type,
            filename = %filename,
            content_length = content_length.as_deref().unwrap_or(""),
            "Streaming download"
        );

        Ok(ProxiedStream {
            status,
            content_type,
            filename,
            content_range,
            content_length,
            body: StreamSession::new(url, result.into_body()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetchers::fake::{FakeFetcher, FakeResponse};
    use crate::fetchers::FetchMode;
    use crate::types::HttpMethod;
    use futures::TryStreamExt;

    fn downloader(fetcher: FakeFetcher) -> (Downloader, Arc<FakeFetcher>) {
        let fetcher = Arc::new(fetcher);
        (Downloader::new(fetcher.clone()), fetcher)
    }

    fn chunks(parts: &[&'static [u8]]) -> Vec<Result<Bytes, FetchError>> {
        parts.iter().map(|p| Ok(Bytes::from_static(p))).collect()
    }

    #[test]
    fn test_resolve_filename() {
        assert_eq!(
            resolve_filename(Some("song.mp3"), "audio/mpeg", "https://x.io/a"),
            "song.mp3"
        );
        assert_eq!(
            resolve_filename(Some("a\"b\\c.mp3"), "", "https://x.io/a"),
            "a_b_c.mp3"
        );
        assert_eq!(
            resolve_filename(None, "audio/mpeg", "https://x.io/track"),
            "download.mp3"
        );
        assert_eq!(
            resolve_filename(Some("  "), "application/octet-stream", "https://x.io/v.MKV?t=1"),
            "download.mkv"
        );
        assert_eq!(
            resolve_filename(None, "", "https://x.io/blob"),
            "download.bin"
        );
    }

    #[tokio::test]
    async fn test_probe_reads_head() {
        let (downloader, fetcher) = downloader(FakeFetcher::new().respond(
            FakeResponse::new(200)
                .header("content-type", "audio/mpeg")
                .header("content-length", "2048"),
        ));

        let probe = downloader.probe("https://x.io/track").await.unwrap();
        assert_eq!(probe.content_type, "audio/mpeg");
        assert_eq!(probe.file_size, 2048);
        assert!(probe.is_media_file);
        assert_eq!(
            probe.headers.get("content-length").map(String::as_str),
            Some("2048")
        );

        let request = &fetcher.requests()[0];
        assert_eq!(request.method, HttpMethod::Head);
        assert_eq!(request.timeout, FETCH_TIMEOUT);
    }

    #[tokio::test]
    async fn test_probe_failure_is_tolerated() {
        let (downloader, _) = downloader(
            FakeFetcher::new()
                .fail(FetchError::Unreachable("connection refused".to_string()))
                .respond(FakeResponse::new(405)),
        );

        let probe = downloader.probe("https://x.io/clip.mp4").await.unwrap();
        assert_eq!(probe.content_type, "");
        assert_eq!(probe.file_size, 0);
        assert!(probe.headers.is_empty());
        assert!(probe.is_media_file);

        let probe = downloader.probe("https://x.io/page").await.unwrap();
        assert!(!probe.is_media_file);
    }

    #[tokio::test]
    async fn test_invalid_url_never_fetches() {
        let (downloader, fetcher) = downloader(FakeFetcher::new());

        assert!(matches!(
            downloader.probe("nope").await,
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            downloader.stream("", None, None).await,
            Err(FetchError::MissingUrl)
        ));
        assert!(matches!(
            downloader
                .download(DownloadRequest::new("ftp://x.io/a.mp3").download())
                .await,
            Err(FetchError::InvalidUrl(_))
        ));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_chunks_relayed_in_order() {
        let (downloader, _) = downloader(FakeFetcher::new().respond(
            FakeResponse::new(200)
                .header("content-type", "video/mp4")
                .chunks(chunks(&[b"one", b"two", b"three"])),
        ));

        let mut stream = downloader
            .stream("https://x.io/v.mp4", None, None)
            .await
            .unwrap();
        assert_eq!(stream.status, 200);
        assert_eq!(stream.content_type, "video/mp4");
        assert_eq!(stream.filename, "download.mp4");

        let mut seen = Vec::new();
        while let Some(chunk) = stream.body.next().await {
            seen.push(chunk.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                Bytes::from_static(b"one"),
                Bytes::from_static(b"two"),
                Bytes::from_static(b"three")
            ]
        );
        assert_eq!(stream.body.bytes_emitted(), 11);
        assert!(stream.body.is_finished());
        assert!(stream.body.next().await.is_none());
    }

    #[test]
    fn test_session_waits_for_upstream() {
        let (tx, rx) = futures::channel::mpsc::unbounded::<Result<Bytes, FetchError>>();
        let mut session = StreamSession::new("https://x.io/a.mp3", rx.boxed());

        {
            let mut next = tokio_test::task::spawn(session.next());
            tokio_test::assert_pending!(next.poll());

            tx.unbounded_send(Ok(Bytes::from_static(b"a"))).unwrap();
            assert!(next.is_woken());
            assert!(matches!(
                next.poll(),
                Poll::Ready(Some(Ok(ref chunk))) if &chunk[..] == b"a"
            ));
        }
        assert_eq!(session.bytes_emitted(), 1);
        assert!(!session.is_finished());

        drop(tx);
        assert!(tokio_test::block_on(session.next()).is_none());
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn test_upstream_error_ends_stream() {
        let (downloader, _) = downloader(FakeFetcher::new().respond(
            FakeResponse::new(200).chunks(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(FetchError::Timeout),
                Ok(Bytes::from_static(b"never")),
            ]),
        ));

        let mut stream = downloader
            .stream("https://x.io/a.zip", None, None)
            .await
            .unwrap();
        assert_eq!(stream.content_type, FALLBACK_CONTENT_TYPE);

        assert_eq!(
            stream.body.next().await.unwrap().unwrap(),
            Bytes::from_static(b"partial")
        );
        assert!(matches!(
            stream.body.next().await,
            Some(Err(FetchError::Timeout))
        ));
        assert!(stream.body.next().await.is_none());
        assert_eq!(stream.body.bytes_emitted(), 7);
        assert!(!stream.body.is_finished());
    }

    #[tokio::test]
    async fn test_range_is_forwarded_and_echoed() {
        let (downloader, fetcher) = downloader(FakeFetcher::new().respond(
            FakeResponse::new(206)
                .header("content-type", "audio/mpeg")
                .header("content-range", "bytes 0-3/100")
                .header("content-length", "4")
                .chunks(chunks(&[b"ID3\x04"])),
        ));

        let stream = downloader
            .stream(
                "https://x.io/a.mp3",
                Some("bytes=0-3".to_string()),
                Some("clip.mp3"),
            )
            .await
            .unwrap();

        assert_eq!(stream.status, 206);
        assert_eq!(stream.content_range.as_deref(), Some("bytes 0-3/100"));
        assert_eq!(stream.content_length.as_deref(), Some("4"));
        assert_eq!(
            stream.headers(),
            vec![
                ("content-type", "audio/mpeg".to_string()),
                (
                    "content-disposition",
                    "attachment; filename=\"clip.mp3\"".to_string()
                ),
                ("accept-ranges", "bytes".to_string()),
                ("content-range", "bytes 0-3/100".to_string()),
                ("content-length", "4".to_string()),
            ]
        );

        let body: Vec<Bytes> = stream.body.try_collect().await.unwrap();
        assert_eq!(body.concat(), b"ID3\x04");

        let request = &fetcher.requests()[0];
        assert_eq!(request.method, HttpMethod::Get);
        assert_eq!(request.mode, FetchMode::Streaming);
        assert_eq!(request.timeout, STREAM_TIMEOUT);
        assert_eq!(request.range.as_deref(), Some("bytes=0-3"));
    }

    #[tokio::test]
    async fn test_range_ignored_upstream_is_full_response() {
        let (downloader, fetcher) = downloader(FakeFetcher::new().respond(
            FakeResponse::new(200)
                .header("content-type", "audio/mpeg")
                .header("content-length", "6")
                .chunks(chunks(&[b"ID3", b"\x04\x00\x00"])),
        ));

        let stream = downloader
            .stream("https://x.io/a.mp3", Some("bytes=0-3".to_string()), None)
            .await
            .unwrap();

        assert_eq!(fetcher.requests()[0].range.as_deref(), Some("bytes=0-3"));
        assert_eq!(stream.status, 200);
        assert_eq!(stream.content_range, None);
        assert_eq!(stream.content_length.as_deref(), Some("6"));
        assert!(!stream.headers().iter().any(|(name, _)| *name == "content-range"));

        let body: Vec<Bytes> = stream.body.try_collect().await.unwrap();
        assert_eq!(body.concat(), b"ID3\x04\x00\x00");
    }

    #[tokio::test]
    async fn test_stream_upstream_status_error() {
        let (downloader, _) = downloader(FakeFetcher::new().respond(FakeResponse::new(404)));
        let err = downloader
            .stream("https://x.io/a.mp3", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_download_streams_media_with_probed_type() {
        let (downloader, fetcher) = downloader(
            FakeFetcher::new()
                .respond(
                    FakeResponse::new(200)
                        .header("content-type", "audio/ogg")
                        .header("content-length", "3"),
                )
                .respond(
                    FakeResponse::new(200)
                        .header("content-length", "3")
                        .chunks(chunks(&[b"abc"])),
                ),
        );

        let outcome = downloader
            .download(
                DownloadRequest::new("https://x.io/episode")
                    .download()
                    .range("bytes=0-"),
            )
            .await
            .unwrap();

        let DownloadOutcome::Stream(stream) = outcome else {
            panic!("expected a stream");
        };
        assert_eq!(stream.content_type, "audio/ogg");
        assert_eq!(stream.filename, "download.ogg");
        assert_eq!(stream.status, 200);

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, HttpMethod::Head);
        assert_eq!(requests[1].method, HttpMethod::Get);
        assert_eq!(requests[1].range.as_deref(), Some("bytes=0-"));
    }

    #[tokio::test]
    async fn test_download_describes_non_media() {
        let (downloader, fetcher) = downloader(FakeFetcher::new().respond(
            FakeResponse::new(200)
                .header("content-type", "text/html")
                .header("content-length", "1536"),
        ));

        let outcome = downloader
            .download(DownloadRequest::new("https://x.io/page").download())
            .await
            .unwrap();

        let DownloadOutcome::Info(info) = outcome else {
            panic!("expected info");
        };
        assert_eq!(info.content_type, "text/html");
        assert_eq!(info.file_size, 1536);
        assert_eq!(info.file_size_formatted, "1.5 KB");
        assert!(!info.is_media_file);
        assert!(!info.download_supported);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_download_without_flag_describes_media() {
        let (downloader, fetcher) = downloader(
            FakeFetcher::new().respond(FakeResponse::new(200).header("content-type", "image/png")),
        );

        let outcome = downloader
            .download(DownloadRequest::new("https://x.io/logo"))
            .await
            .unwrap();

        let DownloadOutcome::Info(info) = outcome else {
            panic!("expected info");
        };
        assert!(info.is_media_file);
        assert!(info.download_supported);
        assert_eq!(info.file_size, 0);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_custom_policy() {
        let fetcher = Arc::new(FakeFetcher::new().fail(FetchError::Timeout));
        let downloader = Downloader::new(fetcher)
            .with_policy(MediaPolicy::empty().with_extension("iso"))
            .with_timeouts(Duration::from_secs(1), Duration::from_secs(2));

        let probe = downloader.probe("https://x.io/debian.iso").await.unwrap();
        assert!(probe.is_media_file);
    }
}
