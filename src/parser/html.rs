//! HTML extraction strategy
//!
//! Rides on html5ever's error-recovering parse, so malformed markup yields
//! whatever references the recovered tree still contains. Hyperlinks come
//! from anchor tags in document order; asset references are collected per
//! element family. A `<base href>` tag overrides the resolution base for
//! the whole document.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{
    kind_from_extension, resolve_reference, AssetKind, AssetRef, DiscoveredLink, ParsedDocument,
    ResourceParser,
};

/// Extraction strategy for HTML documents
pub struct HtmlStrategy;

impl ResourceParser for HtmlStrategy {
    fn name(&self) -> &'static str {
        "html"
    }

    fn can_parse(&self, content_type: Option<&str>, url: &Url, body: &[u8]) -> bool {
        if let Some(content_type) = content_type {
            if content_type.contains("html") {
                return true;
            }
            // A concrete non-HTML type is authoritative; only generic types
            // fall through to sniffing
            if content_type != "application/octet-stream" && content_type != "text/plain" {
                return false;
            }
        }

        if looks_like_html(body) {
            return true;
        }

        let path = url.path().to_ascii_lowercase();
        path.ends_with(".html") || path.ends_with(".htm")
    }

    fn parse(&self, body: &str, origin: &Url) -> ParsedDocument {
        let document = Html::parse_document(body);
        let base = effective_base(&document, origin);

        ParsedDocument {
            title: extract_title(&document),
            links: extract_links(&document, &base),
            assets: extract_assets(&document, &base, origin),
        }
    }
}

/// Checks the leading bytes for an HTML signature
fn looks_like_html(body: &[u8]) -> bool {
    let head = &body[..body.len().min(512)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    let trimmed = head.trim_start();
    trimmed.starts_with("<!doctype") || head.contains("<html")
}

/// Resolves the document's base URL, honoring a `<base href>` tag
fn effective_base(document: &Html, origin: &Url) -> Url {
    if let Ok(selector) = Selector::parse("base[href]") {
        if let Some(element) = document.select(&selector).next() {
            if let Some(href) = element.value().attr("href") {
                if let Ok(base) = origin.join(href.trim()) {
                    return base;
                }
            }
        }
    }
    origin.clone()
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Extracts hyperlinks in document order
fn extract_links(document: &Html, base: &Url) -> Vec<DiscoveredLink> {
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href], area[href]") {
        for element in document.select(&selector) {
            // Skip download links
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(url) = resolve_reference(href, base) {
                    links.push(DiscoveredLink {
                        url,
                        original: href.to_string(),
                    });
                }
            }
        }
    }

    links
}

/// Extracts asset references per element family
fn extract_assets(document: &Html, base: &Url, referrer: &Url) -> Vec<AssetRef> {
    let mut assets = Vec::new();

    collect_attr(
        document,
        "link[rel~=\"stylesheet\"][href]",
        "href",
        Some(AssetKind::Style),
        base,
        referrer,
        &mut assets,
    );
    collect_attr(
        document,
        "link[rel~=\"icon\"][href], link[rel~=\"apple-touch-icon\"][href]",
        "href",
        Some(AssetKind::Image),
        base,
        referrer,
        &mut assets,
    );
    collect_attr(
        document,
        "script[src]",
        "src",
        Some(AssetKind::Script),
        base,
        referrer,
        &mut assets,
    );
    collect_attr(
        document,
        "img[src]",
        "src",
        Some(AssetKind::Image),
        base,
        referrer,
        &mut assets,
    );
    collect_srcset(document, "img[srcset]", AssetKind::Image, base, referrer, &mut assets);
    collect_attr(
        document,
        "video[src], audio[src]",
        "src",
        Some(AssetKind::Video),
        base,
        referrer,
        &mut assets,
    );
    collect_attr(
        document,
        "video[poster]",
        "poster",
        Some(AssetKind::Image),
        base,
        referrer,
        &mut assets,
    );
    collect_sources(document, base, referrer, &mut assets);
    collect_attr(
        document,
        "iframe[src], embed[src]",
        "src",
        None,
        base,
        referrer,
        &mut assets,
    );

    assets
}

/// Collects one attribute across all elements matching a selector
///
/// A fixed kind classifies every match; `None` falls back to extension-based
/// classification.
fn collect_attr(
    document: &Html,
    selector: &str,
    attr: &str,
    kind: Option<AssetKind>,
    base: &Url,
    referrer: &Url,
    out: &mut Vec<AssetRef>,
) {
    if let Ok(selector) = Selector::parse(selector) {
        for element in document.select(&selector) {
            if let Some(value) = element.value().attr(attr) {
                if let Some(url) = resolve_reference(value, base) {
                    let kind = kind.unwrap_or_else(|| kind_from_extension(&url));
                    out.push(AssetRef {
                        url,
                        kind,
                        referrer: referrer.clone(),
                        original: value.to_string(),
                    });
                }
            }
        }
    }
}

/// Collects the first candidate of each srcset attribute
fn collect_srcset(
    document: &Html,
    selector: &str,
    kind: AssetKind,
    base: &Url,
    referrer: &Url,
    out: &mut Vec<AssetRef>,
) {
    if let Ok(selector) = Selector::parse(selector) {
        for element in document.select(&selector) {
            if let Some(srcset) = element.value().attr("srcset") {
                if let Some(candidate) = first_srcset_candidate(srcset) {
                    if let Some(url) = resolve_reference(candidate, base) {
                        out.push(AssetRef {
                            url,
                            kind,
                            referrer: referrer.clone(),
                            original: candidate.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// First URL token of a srcset value ("a.png 1x, b.png 2x" yields "a.png")
fn first_srcset_candidate(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .next()
        .and_then(|candidate| candidate.split_whitespace().next())
        .filter(|url| !url.is_empty())
}

/// Collects `<source>` elements, classified by their enclosing element
fn collect_sources(document: &Html, base: &Url, referrer: &Url, out: &mut Vec<AssetRef>) {
    if let Ok(selector) = Selector::parse("source[src], source[srcset]") {
        for element in document.select(&selector) {
            let kind = source_kind(&element);

            if let Some(src) = element.value().attr("src") {
                if let Some(url) = resolve_reference(src, base) {
                    out.push(AssetRef {
                        url,
                        kind,
                        referrer: referrer.clone(),
                        original: src.to_string(),
                    });
                }
            } else if let Some(srcset) = element.value().attr("srcset") {
                if let Some(candidate) = first_srcset_candidate(srcset) {
                    if let Some(url) = resolve_reference(candidate, base) {
                        out.push(AssetRef {
                            url,
                            kind,
                            referrer: referrer.clone(),
                            original: candidate.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// `<source>` under `<picture>` is an image; under `<video>`/`<audio>`, media
fn source_kind(element: &ElementRef) -> AssetKind {
    element
        .parent()
        .and_then(ElementRef::wrap)
        .map(|parent| match parent.value().name() {
            "picture" => AssetKind::Image,
            _ => AssetKind::Video,
        })
        .unwrap_or(AssetKind::Video)
}
