//! HTML to Markdown conversion
//!
//! The converter is an ordered list of textual rewrite rules, not a parser.
//! Order matters: later rules rely on earlier ones having already rewritten
//! certain tags (headings strip their own inner tags before emphasis runs,
//! blockquotes absorb their inner paragraphs before the paragraph rule, and
//! so on). Two simplifications are deliberate:
//!
//! - nested lists are flattened, every item becomes a top level `- ` line
//! - tables become pipe-delimited rows with no header separator row
//!
//! Malformed or overlapping markup degrades to flattened text. The output
//! never contains tag syntax.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Rewrite steps in application order
const RULES: &[fn(&str) -> String] = &[
    headings,
    code,
    blockquotes,
    paragraphs,
    emphasis,
    links,
    images,
    lists,
    tables,
    line_breaks,
    strip_tags,
    clean_blank_lines,
];

/// Upper bound on list item passes; each pass unwraps one nesting level
const MAX_LIST_PASSES: usize = 32;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<h([1-6])(?:\s[^>]*)?>(.*?)</h[1-6]\s*>").unwrap());
static PRE_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<pre(?:\s[^>]*)?>\s*<code(?:\s[^>]*)?>(.*?)</code\s*>\s*</pre\s*>").unwrap()
});
static INLINE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<code(?:\s[^>]*)?>(.*?)</code\s*>").unwrap());
static BLOCKQUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<blockquote(?:\s[^>]*)?>(.*?)</blockquote\s*>").unwrap());
static PARAGRAPH_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?p(?:\s[^>]*)?>").unwrap());
static PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p(?:\s[^>]*)?>(.*?)</p\s*>").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:strong|b)(?:\s[^>]*)?>(.*?)</(?:strong|b)\s*>").unwrap()
});
static ITALIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(?:em|i)(?:\s[^>]*)?>(.*?)</(?:em|i)\s*>").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<a(\s[^>]*)?>(.*?)</a\s*>").unwrap());
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<img(\s[^>]*)?>").unwrap());
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<li(?:\s[^>]*)?>(.*?)</li\s*>").unwrap());
static HEADING_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6} ").unwrap());
static LIST_CONTAINER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(?:ul|ol)(?:\s[^>]*)?>").unwrap());
static TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<table(?:\s[^>]*)?>(.*?)</table\s*>").unwrap());
static TABLE_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<tr(?:\s[^>]*)?>(.*?)</tr\s*>").unwrap());
static TABLE_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<t[hd](?:\s[^>]*)?>(.*?)</t[hd]\s*>").unwrap());
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br(?:\s[^>]*)?/?>").unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static UNTERMINATED_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<[A-Za-z/!?][^>]*$").unwrap());
static TRAILING_EMPTY_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\n)#{1,6}$").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n\s*\n").unwrap());

/// Convert an HTML fragment to markdown
pub fn html_to_markdown(html: &str) -> String {
    RULES
        .iter()
        .fold(html.to_string(), |acc, rule| rule(&acc))
}

fn headings(input: &str) -> String {
    HEADING
        .replace_all(input, |caps: &Captures| {
            let level = caps[1].parse::<usize>().unwrap_or(1);
            let text = collapse_inline(&ANY_TAG.replace_all(&caps[2], ""));
            format!("\n{} {}\n", "#".repeat(level), text)
        })
        .into_owned()
}

fn code(input: &str) -> String {
    let fenced = PRE_CODE.replace_all(input, |caps: &Captures| format!("\n```\n{}\n```\n", &caps[1]));
    INLINE_CODE
        .replace_all(&fenced, |caps: &Captures| format!("`{}`", &caps[1]))
        .into_owned()
}

fn blockquotes(input: &str) -> String {
    BLOCKQUOTE
        .replace_all(input, |caps: &Captures| {
            let inner = PARAGRAPH_TAG.replace_all(&caps[1], "\n");
            let inner = LINE_BREAK.replace_all(&inner, "\n");
            let mut out = String::from("\n\n");
            for line in inner.lines().map(str::trim_start) {
                // Headings stay unquoted on their own line
                if HEADING_LINE.is_match(line) {
                    out.push_str(&format!("\n{}\n\n", line));
                } else if !line.trim_end().is_empty() {
                    out.push_str(&format!("> {}\n", line.trim_end()));
                }
            }
            out.push('\n');
            out
        })
        .into_owned()
}

fn paragraphs(input: &str) -> String {
    PARAGRAPH
        .replace_all(input, |caps: &Captures| format!("\n\n{}\n\n", &caps[1]))
        .into_owned()
}

fn emphasis(input: &str) -> String {
    let bold = BOLD.replace_all(input, |caps: &Captures| format!("**{}**", &caps[1]));
    ITALIC
        .replace_all(&bold, |caps: &Captures| format!("*{}*", &caps[1]))
        .into_owned()
}

fn links(input: &str) -> String {
    LINK.replace_all(input, |caps: &Captures| {
        let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let text = &caps[2];
        match extract_attribute(attrs, "href") {
            Some(href) => format!("[{}]({})", text, href),
            None => text.to_string(),
        }
    })
    .into_owned()
}

fn images(input: &str) -> String {
    IMAGE
        .replace_all(input, |caps: &Captures| {
            let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            match extract_attribute(attrs, "src") {
                Some(src) => {
                    let alt = extract_attribute(attrs, "alt").unwrap_or_default();
                    format!("![{}]({})", alt, src)
                }
                None => String::new(),
            }
        })
        .into_owned()
}

fn lists(input: &str) -> String {
    let mut output = input.to_string();
    for _ in 0..MAX_LIST_PASSES {
        if !LIST_ITEM.is_match(&output) {
            break;
        }
        output = LIST_ITEM
            .replace_all(&output, |caps: &Captures| {
                let item = caps[1].trim_start();
                // A heading keeps its own line instead of becoming an item
                if HEADING_LINE.is_match(item) {
                    format!("\n{}\n", item.trim_end_matches(['\n', '\r']))
                } else {
                    format!("- {}\n", item.trim())
                }
            })
            .into_owned();
    }
    LIST_CONTAINER.replace_all(&output, "\n").into_owned()
}

fn tables(input: &str) -> String {
    TABLE
        .replace_all(input, |caps: &Captures| {
            if !TABLE_ROW.is_match(&caps[1]) {
                return format!("\n{}\n", &caps[1]);
            }
            let mut out = String::from("\n");
            for row in TABLE_ROW.captures_iter(&caps[1]) {
                let mut line = String::new();
                for cell in TABLE_CELL.captures_iter(&row[1]) {
                    let (cell_headings, text) = split_headings(&cell[1]);
                    // Headings inside a cell are lifted above their row
                    for heading in cell_headings {
                        out.push_str(&format!("\n{}\n\n", heading));
                    }
                    line.push_str("| ");
                    line.push_str(&text);
                    line.push(' ');
                }
                line.push_str("|\n");
                out.push_str(&line);
            }
            out.push('\n');
            out
        })
        .into_owned()
}

/// Separate heading lines from the rest of a fragment, collapsing the rest
fn split_headings(fragment: &str) -> (Vec<&str>, String) {
    let mut found = Vec::new();
    let mut rest = Vec::new();
    for line in fragment.lines() {
        let line = line.trim_start();
        if HEADING_LINE.is_match(line) {
            found.push(line);
        } else {
            rest.push(line);
        }
    }
    (found, collapse_inline(&rest.join(" ")))
}

fn line_breaks(input: &str) -> String {
    LINE_BREAK.replace_all(input, "\n").into_owned()
}

fn strip_tags(input: &str) -> String {
    let stripped = ANY_TAG.replace_all(input, "");
    UNTERMINATED_TAG.replace_all(&stripped, "").into_owned()
}

fn clean_blank_lines(input: &str) -> String {
    let collapsed = BLANK_LINES.replace_all(input, "\n\n");
    let trimmed = collapsed.trim();
    // An empty heading at the very end keeps its marker space
    if TRAILING_EMPTY_HEADING.is_match(trimmed) && collapsed.trim_start().len() > trimmed.len() {
        format!("{} ", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Collapse all whitespace runs to single spaces
fn collapse_inline(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract attribute value from the attribute part of a tag
fn extract_attribute(tag: &str, attr: &str) -> Option<String> {
    let pattern = format!("{}=", attr);
    let tag_lower = tag.to_lowercase();

    let mut search_from = 0;
    while let Some(found) = tag_lower[search_from..].find(&pattern) {
        let start = search_from + found;
        search_from = start + pattern.len();

        // Must be a whole attribute name, `data-src=` is not `src=`
        let boundary = tag_lower[..start]
            .chars()
            .last()
            .map_or(true, |c| c.is_whitespace());
        if !boundary {
            continue;
        }

        let rest = tag[start + pattern.len()..].trim_start();
        if let Some(rest) = rest.strip_prefix('"') {
            return rest.find('"').map(|end| rest[..end].to_string());
        } else if let Some(rest) = rest.strip_prefix('\'') {
            return rest.find('\'').map(|end| rest[..end].to_string());
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '>')
                .unwrap_or(rest.len());
            let value = rest[..end].trim_end_matches('/');
            return Some(value.to_string());
        }
    }
    None
}
