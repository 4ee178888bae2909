//! Resource parser strategies
//!
//! Given a fetched document, a parser strategy extracts the ordered
//! hyperlinks (for recursion) and asset references (for mirroring), with
//! every relative reference resolved against the document's effective base.
//! Strategies are capability-based: each answers whether it can handle a
//! (content-type, URL, leading-bytes) triple, and [`parser_for`] picks the
//! first that claims the document. Non-markup content gets no parser and is
//! persisted as an opaque asset.
//!
//! Extraction is best-effort by construction: the HTML strategy rides on
//! html5ever's error-recovering parse, and the CSS strategy is a tolerant
//! token scan. Malformed input degrades to fewer references, never to a
//! failure.

mod css;
mod html;

pub use css::CssStrategy;
pub use html::HtmlStrategy;

use serde::Serialize;
use url::Url;

/// Kind of a referenced asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Script,
    Style,
    Font,
    /// Embedded media: video and audio sources
    Video,
    Other,
}

impl AssetKind {
    pub fn label(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Script => "script",
            AssetKind::Style => "style",
            AssetKind::Font => "font",
            AssetKind::Video => "video",
            AssetKind::Other => "other",
        }
    }
}

/// A reference to a sub-resource of a document
#[derive(Debug, Clone)]
pub struct AssetRef {
    /// Resolved absolute URL of the asset
    pub url: Url,
    pub kind: AssetKind,
    /// The document the reference appeared in
    pub referrer: Url,
    /// The verbatim reference text as written in the document, kept for
    /// rewriting the persisted copy
    pub original: String,
}

/// A hyperlink discovered in a document
#[derive(Debug, Clone)]
pub struct DiscoveredLink {
    /// Resolved absolute URL
    pub url: Url,
    /// The verbatim href as written in the document
    pub original: String,
}

/// Everything a strategy extracts from one document
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub title: Option<String>,
    /// Hyperlinks in document order
    pub links: Vec<DiscoveredLink>,
    /// Asset references in document order
    pub assets: Vec<AssetRef>,
}

/// A swappable extraction strategy for one family of markup
pub trait ResourceParser: Send + Sync {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    /// Whether this strategy can handle the document
    fn can_parse(&self, content_type: Option<&str>, url: &Url, body: &[u8]) -> bool;

    /// Extracts links and assets; infallible by contract (best effort)
    fn parse(&self, body: &str, origin: &Url) -> ParsedDocument;
}

static HTML_STRATEGY: HtmlStrategy = HtmlStrategy;
static CSS_STRATEGY: CssStrategy = CssStrategy;

/// Selects the strategy for a document, if any claims it
pub fn parser_for(
    content_type: Option<&str>,
    url: &Url,
    body: &[u8],
) -> Option<&'static dyn ResourceParser> {
    let strategies: [&'static dyn ResourceParser; 2] = [&HTML_STRATEGY, &CSS_STRATEGY];
    strategies
        .into_iter()
        .find(|s| s.can_parse(content_type, url, body))
}

/// Resolves a reference to an absolute fetchable URL
///
/// Returns None for references that are never links or assets:
/// empty, fragment-only, `javascript:`, `mailto:`, `tel:`, `data:`, and
/// anything that does not resolve to http(s).
pub fn resolve_reference(reference: &str, base: &Url) -> Option<Url> {
    let reference = reference.trim();

    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }

    let lower = reference.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    match base.join(reference) {
        Ok(resolved) if resolved.scheme() == "http" || resolved.scheme() == "https" => {
            Some(resolved)
        }
        _ => None,
    }
}

/// Classifies an asset URL by its path extension
///
/// Used where the referencing context does not already fix the kind (CSS
/// `url()` targets, generic embeds).
pub fn kind_from_extension(url: &Url) -> AssetKind {
    let path = url.path().to_ascii_lowercase();
    let extension = path.rsplit('.').next().unwrap_or_default();
    match extension {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "bmp" | "avif" => {
            AssetKind::Image
        }
        "js" | "mjs" => AssetKind::Script,
        "css" => AssetKind::Style,
        "woff" | "woff2" | "ttf" | "otf" | "eot" => AssetKind::Font,
        "mp4" | "webm" | "ogg" | "ogv" | "mp3" | "wav" | "m4a" | "mov" => AssetKind::Video,
        _ => AssetKind::Other,
    }
}
