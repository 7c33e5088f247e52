//! Visible-text extraction from HTML documents.
//!
//! Reduces a fetched page to the text a reader would see in the page body.
//! Chrome and non-content elements (`script`, `style`, `nav`, `header`,
//! `footer`, ...) are dropped together with everything nested inside them.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Comments, doctype/processing instructions, and element tags.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<![^>]*>|<\?[^>]*>|<(/?)([A-Za-z][A-Za-z0-9:-]*)((?:[^>]*?))(/?)>")
        .expect("static regex is valid")
});

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").expect("static regex is valid")
});

static BODY_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<body\b[^>]*>").expect("static regex is valid"));

/// Elements whose text content is raw (not parsed as markup).
const RAW_TEXT: &[&str] = &["script", "style", "textarea", "title"];

/// Elements dropped together with all of their descendants.
const EXCLUDED: &[&str] = &[
    "script", "style", "nav", "header", "footer", "noscript", "template", "head", "svg",
    "iframe", "title",
];

/// Elements that start a new line in the flattened output.
const BLOCK: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "form", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "li", "main", "ol", "p", "pre",
    "section", "table", "tr", "ul",
];

/// Extract visible body text from an HTML document.
pub fn visible_text(document: &str) -> String {
    let body = body_slice(document);
    let lowered = body.to_ascii_lowercase();

    let mut out = String::with_capacity(body.len() / 2);
    let mut skip_depth = 0usize;
    let mut pos = 0;

    while let Some(caps) = TAG_RE.captures_at(body, pos) {
        let Some(whole) = caps.get(0) else { break };
        if skip_depth == 0 {
            out.push_str(&body[pos..whole.start()]);
        }
        pos = whole.end();

        let Some(name) = caps.get(2) else {
            // comment, doctype, or processing instruction
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let self_closing = caps.get(4).is_some_and(|m| !m.as_str().is_empty());

        if closing {
            if EXCLUDED.contains(&name.as_str()) {
                skip_depth = skip_depth.saturating_sub(1);
            }
        } else if !self_closing {
            if RAW_TEXT.contains(&name.as_str()) {
                let raw_end = find_raw_text_end(&lowered, pos, &name);
                if !EXCLUDED.contains(&name.as_str()) && skip_depth == 0 {
                    out.push_str(&body[pos..raw_end.content_end]);
                }
                pos = raw_end.resume_at;
                continue;
            }
            if EXCLUDED.contains(&name.as_str()) {
                skip_depth += 1;
            }
        }

        if skip_depth == 0 {
            if BLOCK.contains(&name.as_str()) {
                out.push('\n');
            } else if name == "td" || name == "th" {
                out.push(' ');
            }
        }
    }
    if skip_depth == 0 {
        out.push_str(&body[pos..]);
    }

    flatten_whitespace(&decode_entities(&out))
}

/// Slice out the `<body>` contents when the document has one.
fn body_slice(document: &str) -> &str {
    let Some(open) = BODY_OPEN_RE.find(document) else {
        return document;
    };
    let rest = &document[open.end()..];
    let end = rest.to_ascii_lowercase().rfind("</body").unwrap_or(rest.len());
    &rest[..end]
}

struct RawTextEnd {
    content_end: usize,
    resume_at: usize,
}

/// Locate the closing tag of a raw-text element starting at `from`.
/// An unterminated element runs to the end of the input.
fn find_raw_text_end(lowered: &str, from: usize, name: &str) -> RawTextEnd {
    let needle = format!("</{name}");
    match lowered[from..].find(&needle) {
        Some(offset) => {
            let content_end = from + offset;
            let resume_at = lowered[content_end..]
                .find('>')
                .map_or(lowered.len(), |gt| content_end + gt + 1);
            RawTextEnd {
                content_end,
                resume_at,
            }
        }
        None => RawTextEnd {
            content_end: lowered.len(),
            resume_at: lowered.len(),
        },
    }
}

/// Decode the common named entities and numeric character references.
/// Unknown entities are left untouched.
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Collapse whitespace runs within lines and drop blank lines.
fn flatten_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
