//! HTML document handling for conversions
//!
//! Wraps a parsed [`scraper::Html`] document: metadata is read from the
//! untouched document, then noise elements are detached from the tree before
//! the body is rendered as HTML or text.

use crate::types::ExtractedMetadata;
use scraper::{Html, Selector};

/// Elements removed before the body is rendered
const NOISE_SELECTOR: &str =
    "script, style, nav, header, footer, aside, .advertisement, .ads, .social-share";

/// Default document language
const DEFAULT_LANG: &str = "en";

/// A parsed HTML document
pub struct HtmlDocument {
    document: Html,
}

impl HtmlDocument {
    /// Parse a full HTML document
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    /// Extract page metadata.
    ///
    /// `url` is the canonical URL fallback.
    pub fn metadata(&self, url: &str) -> ExtractedMetadata {
        let title = self
            .first_text("title")
            .or_else(|| self.first_text("h1"))
            .unwrap_or_default();

        ExtractedMetadata {
            title,
            description: self
                .first_attr(r#"meta[name="description"]"#, "content")
                .or_else(|| self.first_attr(r#"meta[property="og:description"]"#, "content"))
                .unwrap_or_default(),
            author: self
                .first_attr(r#"meta[name="author"]"#, "content")
                .or_else(|| self.first_attr(r#"meta[property="article:author"]"#, "content"))
                .unwrap_or_default(),
            published_date: self
                .first_attr(r#"meta[property="article:published_time"]"#, "content")
                .or_else(|| self.first_attr("time[datetime]", "datetime"))
                .unwrap_or_default(),
            keywords: self
                .first_attr(r#"meta[name="keywords"]"#, "content")
                .unwrap_or_default(),
            og_image: self
                .first_attr(r#"meta[property="og:image"]"#, "content")
                .unwrap_or_default(),
            canonical_url: self
                .first_attr(r#"link[rel="canonical"]"#, "href")
                .unwrap_or_else(|| url.to_string()),
            lang: self
                .first_attr("html", "lang")
                .unwrap_or_else(|| DEFAULT_LANG.to_string()),
        }
    }

    /// Detach scripts, styles, navigation and ad containers from the tree
    pub fn remove_noise(&mut self) {
        let Ok(selector) = Selector::parse(NOISE_SELECTOR) else {
            return;
        };
        let ids: Vec<_> = self.document.select(&selector).map(|el| el.id()).collect();
        for id in ids {
            if let Some(mut node) = self.document.tree.get_mut(id) {
                node.detach();
            }
        }
    }

    /// Inner HTML of `<body>`, `None` when the body is empty
    pub fn body_html(&self) -> Option<String> {
        let selector = Selector::parse("body").ok()?;
        let body = self.document.select(&selector).next()?;
        let html = body.inner_html();
        if html.trim().is_empty() {
            None
        } else {
            Some(html)
        }
    }

    /// Text of `<body>` with whitespace runs collapsed
    pub fn body_text(&self) -> String {
        let Ok(selector) = Selector::parse("body") else {
            return String::new();
        };
        self.document
            .select(&selector)
            .next()
            .map(|body| collapse_whitespace(&body.text().collect::<String>()))
            .unwrap_or_default()
    }

    /// Trimmed text of the first matching element, if not empty
    fn first_text(&self, css: &str) -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        let element = self.document.select(&selector).next()?;
        let text = element.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Attribute of the first matching element, if not empty
    fn first_attr(&self, css: &str, attr: &str) -> Option<String> {
        let selector = Selector::parse(css).ok()?;
        let value = self.document.select(&selector).next()?.value().attr(attr)?;
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

/// Collapse every whitespace run to a single space and trim
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
