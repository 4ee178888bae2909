//! Content filtering by mirror mode
//!
//! The filter decides what of a parsed document survives into the mirror:
//! the document itself, a plain-text reduction of it, or nothing, plus the
//! subset of asset references worth fetching. It never affects hyperlink
//! discovery. Link recursion outside full mode is governed by the
//! follow-links configuration flag.

use std::fmt;
use std::str::FromStr;

use scraper::{ElementRef, Html};
use serde::{Deserialize, Serialize};

use crate::parser::{AssetKind, ParsedDocument};

/// What a mirror job captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MirrorMode {
    /// Everything: documents, rewritten references, all asset kinds
    #[default]
    Full,
    /// Plain-text reductions of documents, no assets
    Text,
    /// Image assets only
    Image,
    /// Video and embedded-media assets only
    Video,
}

impl MirrorMode {
    /// Whether this mode persists anything for a document entry
    pub fn persists_documents(self) -> bool {
        matches!(self, MirrorMode::Full | MirrorMode::Text)
    }

    /// Whether an asset of the given kind is fetched under this mode
    pub fn wants_asset(self, kind: AssetKind) -> bool {
        match self {
            MirrorMode::Full => true,
            MirrorMode::Text => false,
            MirrorMode::Image => kind == AssetKind::Image,
            MirrorMode::Video => kind == AssetKind::Video,
        }
    }

    /// Whether hyperlinks get scheduled, given the configured flag
    ///
    /// Full mode always follows; the other modes defer to the flag.
    pub fn follows_links(self, configured: bool) -> bool {
        matches!(self, MirrorMode::Full) || configured
    }
}

impl fmt::Display for MirrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MirrorMode::Full => "full",
            MirrorMode::Text => "text",
            MirrorMode::Image => "image",
            MirrorMode::Video => "video",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for MirrorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(MirrorMode::Full),
            "text" => Ok(MirrorMode::Text),
            "image" => Ok(MirrorMode::Image),
            "video" => Ok(MirrorMode::Video),
            other => Err(format!(
                "unknown mode '{}', expected full, text, image, or video",
                other
            )),
        }
    }
}

/// What gets persisted for a document entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentPayload {
    /// The original markup, with references rewritten at persistence time
    Markup,
    /// A plain-text reduction
    Text(String),
    /// Nothing; the document only contributes links and assets
    Omitted,
}

/// A parsed document after mode filtering
#[derive(Debug, Clone)]
pub struct FilteredDocument {
    pub payload: DocumentPayload,
    /// Asset references surviving the mode's kind filter, document order kept
    pub assets: Vec<crate::parser::AssetRef>,
    /// Whether this document's hyperlinks get scheduled
    pub follow_links: bool,
}

/// Applies a mode to a parsed document
///
/// # Arguments
/// * `mode` - The mirror mode in effect
/// * `follow_links` - Configured link-recursion flag for non-full modes
/// * `body` - The document source, used for the text reduction
/// * `parsed` - The full extraction; never mutated
pub fn apply(
    mode: MirrorMode,
    follow_links: bool,
    body: &str,
    parsed: &ParsedDocument,
) -> FilteredDocument {
    let payload = match mode {
        MirrorMode::Full => DocumentPayload::Markup,
        MirrorMode::Text => DocumentPayload::Text(reduce_to_text(body)),
        MirrorMode::Image | MirrorMode::Video => DocumentPayload::Omitted,
    };

    let assets = parsed
        .assets
        .iter()
        .filter(|asset| mode.wants_asset(asset.kind))
        .cloned()
        .collect();

    FilteredDocument {
        payload,
        assets,
        follow_links: mode.follows_links(follow_links),
    }
}

/// Subtrees that contribute nothing to a text reduction
const SKIPPED_SUBTREES: &[&str] = &[
    "script", "style", "form", "nav", "noscript", "template", "svg", "head",
];

/// Elements whose boundaries become line breaks
const BLOCK_ELEMENTS: &[&str] = &[
    "p",
    "div",
    "br",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "li",
    "tr",
    "blockquote",
    "pre",
    "section",
    "article",
    "header",
    "footer",
    "table",
    "ul",
    "ol",
];

/// Reduces a document to human-readable text
///
/// Text nodes are kept verbatim apart from edge trimming; block element
/// boundaries become line breaks, inline boundaries a single space.
pub fn reduce_to_text(body: &str) -> String {
    let document = Html::parse_document(body);
    let mut text = String::new();
    collect_text(&document.root_element(), &mut text);

    while text.ends_with('\n') || text.ends_with(' ') {
        text.pop();
    }
    text
}

fn collect_text(element: &ElementRef, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_SUBTREES.contains(&name) {
        return;
    }

    let is_block = BLOCK_ELEMENTS.contains(&name);
    if is_block {
        break_line(out);
    }

    for child in element.children() {
        if let Some(text_node) = child.value().as_text() {
            let trimmed = text_node.trim();
            if !trimmed.is_empty() {
                if !out.is_empty() && !out.ends_with('\n') && !out.ends_with(' ') {
                    out.push(' ');
                }
                out.push_str(trimmed);
            }
        } else if let Some(child_element) = ElementRef::wrap(child) {
            collect_text(&child_element, out);
        }
    }

    if is_block {
        break_line(out);
    }
}

fn break_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}
