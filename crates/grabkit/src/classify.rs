//! Content classification from declared media type and URL suffix
//!
//! Classification never looks at the body: the declared `Content-Type` wins
//! when it is specific, and the URL path extension is consulted only when
//! the declared type is absent or generic.

use url::Url;

/// Media type prefixes treated as streamable media
const MEDIA_TYPE_PREFIXES: &[&str] = &["audio/", "video/", "image/"];

/// URL extensions treated as downloadable media or documents
const MEDIA_EXTENSIONS: &[&str] = &[
    "mp3", "mp4", "avi", "mov", "wav", "flac", "aac", "webm", "mkv", "m4a", "ogg", "pdf", "doc",
    "docx", "zip", "rar",
];

/// Declared types that say nothing about the payload
const GENERIC_TYPES: &[&str] = &[
    "application/octet-stream",
    "binary/octet-stream",
    "application/unknown",
    "application/binary",
];

/// Preferred file extension per media type
const TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/aac", "aac"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/flac", "flac"),
    ("audio/ogg", "ogg"),
    ("audio/webm", "weba"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/x-matroska", "mkv"),
    ("video/quicktime", "mov"),
    ("video/x-msvideo", "avi"),
    ("video/ogg", "ogv"),
    ("image/png", "png"),
    ("image/jpeg", "jpeg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/svg+xml", "svg"),
    ("image/avif", "avif"),
    ("application/pdf", "pdf"),
    ("application/zip", "zip"),
    ("application/gzip", "gz"),
    ("application/x-tar", "tar"),
    ("application/vnd.rar", "rar"),
    ("application/x-rar-compressed", "rar"),
    ("application/x-7z-compressed", "7z"),
    ("application/msword", "doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "docx",
    ),
    ("application/json", "json"),
    ("text/plain", "txt"),
    ("text/html", "html"),
    ("text/csv", "csv"),
];

/// Transformation path for a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Html,
    PlainText,
    Binary,
}

/// What the classification was based on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    /// The declared media type
    Declared,
    /// The URL path extension
    UrlSuffix,
    /// Neither said anything useful
    Unknown,
}

/// Outcome of [`classify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedContent {
    pub kind: ContentKind,
    pub source: ClassificationSource,
    /// Eligible for streaming download
    pub is_media: bool,
}

/// Configurable media allowlist.
///
/// Decides which resources count as streamable media: any declared type
/// starting with one of `type_prefixes`, or any URL whose path ends in one of
/// `extensions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPolicy {
    type_prefixes: Vec<String>,
    extensions: Vec<String>,
}

impl Default for MediaPolicy {
    fn default() -> Self {
        Self {
            type_prefixes: MEDIA_TYPE_PREFIXES.iter().map(|s| s.to_string()).collect(),
            extensions: MEDIA_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MediaPolicy {
    /// Policy with no prefixes or extensions
    pub fn empty() -> Self {
        Self {
            type_prefixes: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Add a media type prefix such as `"font/"`
    pub fn with_type_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.type_prefixes.push(prefix.into().to_lowercase());
        self
    }

    /// Add a URL extension, with or without the leading dot
    pub fn with_extension(mut self, ext: impl AsRef<str>) -> Self {
        let ext = ext.as_ref().trim_start_matches('.').to_lowercase();
        if !ext.is_empty() && !self.extensions.contains(&ext) {
            self.extensions.push(ext);
        }
        self
    }

    /// Replace the extension list
    pub fn with_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions.clear();
        for ext in exts {
            self = self.with_extension(ext);
        }
        self
    }

    pub fn type_prefixes(&self) -> &[String] {
        &self.type_prefixes
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// True if the URL path ends in an allowlisted extension
    pub fn matches_extension(&self, url: &str) -> bool {
        match url_extension(url) {
            Some(ext) => self.extensions.iter().any(|e| *e == ext),
            None => false,
        }
    }

    /// True if the declared type or URL suffix marks the resource as media
    pub fn is_media(&self, media_type: &str, url: &str) -> bool {
        let essence = essence(media_type);
        self.type_prefixes.iter().any(|p| essence.starts_with(p.as_str()))
            || self.matches_extension(url)
    }
}

/// Classify a resource from its declared media type and URL
pub fn classify(media_type: &str, url: &str, policy: &MediaPolicy) -> ClassifiedContent {
    let essence = essence(media_type);

    let declared = |kind| ClassifiedContent {
        kind,
        source: ClassificationSource::Declared,
        is_media: policy.is_media(&essence, url),
    };

    if essence == "application/json" || essence.ends_with("+json") {
        return declared(ContentKind::Json);
    }
    if essence == "text/html" || essence == "application/xhtml+xml" {
        return declared(ContentKind::Html);
    }
    if essence.starts_with("text/") {
        return declared(ContentKind::PlainText);
    }
    if !essence.is_empty() && !GENERIC_TYPES.contains(&essence.as_str()) {
        return declared(ContentKind::Binary);
    }

    if policy.matches_extension(url) {
        ClassifiedContent {
            kind: ContentKind::Binary,
            source: ClassificationSource::UrlSuffix,
            is_media: true,
        }
    } else {
        ClassifiedContent {
            kind: ContentKind::Binary,
            source: ClassificationSource::Unknown,
            is_media: false,
        }
    }
}

/// Lowercased media type without parameters
pub fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Preferred extension for a media type
pub fn extension_for_type(media_type: &str) -> Option<&'static str> {
    let essence = essence(media_type);
    TYPE_EXTENSIONS
        .iter()
        .find(|(t, _)| *t == essence)
        .map(|(_, ext)| *ext)
}

/// Lowercased extension of the last URL path segment.
///
/// Query string and fragment are ignored. Accepts bare paths such as
/// `"file.mp3"` as well as absolute URLs.
pub fn url_extension(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(ct: &str, url: &str) -> ContentKind {
        classify(ct, url, &MediaPolicy::default()).kind
    }

    #[test]
    fn test_json_wins_over_suffix() {
        for url in [
            "https://example.com/data",
            "https://example.com/song.mp3",
            "https://example.com/page.html",
        ] {
            let c = classify("application/json", url, &MediaPolicy::default());
            assert_eq!(c.kind, ContentKind::Json);
            assert_eq!(c.source, ClassificationSource::Declared);
        }
        assert_eq!(
            kind("application/json; charset=utf-8", "https://x.io/"),
            ContentKind::Json
        );
        assert_eq!(kind("application/ld+json", "https://x.io/"), ContentKind::Json);
    }

    #[test]
    fn test_html_and_text() {
        assert_eq!(kind("text/html", "https://x.io/"), ContentKind::Html);
        assert_eq!(
            kind("TEXT/HTML; charset=UTF-8", "https://x.io/"),
            ContentKind::Html
        );
        assert_eq!(kind("application/xhtml+xml", "https://x.io/"), ContentKind::Html);
        assert_eq!(kind("text/plain", "https://x.io/a.mp3"), ContentKind::PlainText);
        assert_eq!(kind("text/csv", "https://x.io/a.csv"), ContentKind::PlainText);
    }

    #[test]
    fn test_suffix_fallback_without_type() {
        let c = classify("", "file.mp3", &MediaPolicy::default());
        assert_eq!(c.kind, ContentKind::Binary);
        assert_eq!(c.source, ClassificationSource::UrlSuffix);
        assert!(c.is_media);

        let c = classify(
            "application/octet-stream",
            "https://cdn.example.com/Movie.MKV?token=abc",
            &MediaPolicy::default(),
        );
        assert_eq!(c.source, ClassificationSource::UrlSuffix);
        assert!(c.is_media);
    }

    #[test]
    fn test_unknown_binary() {
        let c = classify("", "https://example.com/blob", &MediaPolicy::default());
        assert_eq!(c.kind, ContentKind::Binary);
        assert_eq!(c.source, ClassificationSource::Unknown);
        assert!(!c.is_media);
    }

    #[test]
    fn test_declared_media() {
        let c = classify("video/mp4", "https://x.io/stream", &MediaPolicy::default());
        assert_eq!(c.kind, ContentKind::Binary);
        assert_eq!(c.source, ClassificationSource::Declared);
        assert!(c.is_media);

        let c = classify("application/x-shockwave-flash", "https://x.io/a", &MediaPolicy::default());
        assert!(!c.is_media);
    }

    #[test]
    fn test_policy_is_configurable() {
        let policy = MediaPolicy::empty().with_extension(".iso");
        assert!(policy.matches_extension("https://x.io/debian.iso"));
        assert!(!policy.matches_extension("https://x.io/song.mp3"));
        assert!(!policy.is_media("audio/mpeg", "https://x.io/a"));

        let policy = MediaPolicy::default().with_type_prefix("font/");
        assert!(policy.is_media("font/woff2", "https://x.io/a"));

        let policy = MediaPolicy::default().with_extensions(["epub", "MOBI"]);
        assert_eq!(policy.extensions(), &["epub".to_string(), "mobi".to_string()]);
    }

    #[test]
    fn test_url_extension() {
        assert_eq!(url_extension("https://x.io/a/b.PDF"), Some("pdf".to_string()));
        assert_eq!(url_extension("https://x.io/a.mp3?x=1.txt"), Some("mp3".to_string()));
        assert_eq!(url_extension("file.mp3"), Some("mp3".to_string()));
        assert_eq!(url_extension("https://x.io/"), None);
        assert_eq!(url_extension("https://x.io/readme"), None);
        assert_eq!(url_extension("https://example.com"), None);
    }

    #[test]
    fn test_extension_for_type() {
        assert_eq!(extension_for_type("audio/mpeg"), Some("mp3"));
        assert_eq!(extension_for_type("application/pdf; qs=0.9"), Some("pdf"));
        assert_eq!(extension_for_type("application/x-unknown"), None);
    }
}
