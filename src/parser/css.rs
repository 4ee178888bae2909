//! CSS extraction strategy
//!
//! A tolerant token scan rather than a real CSS parse: every `url(...)`
//! function and string-form `@import` contributes one asset reference.
//! Stylesheets have no hyperlinks, so the links list is always empty.
//! Unclosed tokens and syntax errors end the scan early instead of failing.

use url::Url;

use super::{
    kind_from_extension, resolve_reference, AssetKind, AssetRef, ParsedDocument, ResourceParser,
};

/// Extraction strategy for stylesheets
pub struct CssStrategy;

impl ResourceParser for CssStrategy {
    fn name(&self) -> &'static str {
        "css"
    }

    fn can_parse(&self, content_type: Option<&str>, url: &Url, _body: &[u8]) -> bool {
        if let Some(content_type) = content_type {
            if content_type == "text/css" {
                return true;
            }
            if content_type != "application/octet-stream" && content_type != "text/plain" {
                return false;
            }
        }
        url.path().to_ascii_lowercase().ends_with(".css")
    }

    fn parse(&self, body: &str, origin: &Url) -> ParsedDocument {
        let mut assets = Vec::new();
        scan_url_functions(body, origin, &mut assets);
        scan_string_imports(body, origin, &mut assets);

        ParsedDocument {
            title: None,
            links: Vec::new(),
            assets,
        }
    }
}

/// Collects the target of every `url(...)` function
///
/// Covers plain, single-quoted, and double-quoted forms, and the
/// `@import url(...)` spelling. `data:` URIs are skipped.
fn scan_url_functions(body: &str, origin: &Url, out: &mut Vec<AssetRef>) {
    // Byte-for-byte lowercase copy, so byte offsets line up
    let lower = body.to_ascii_lowercase();
    let mut position = 0;

    while let Some(found) = lower[position..].find("url(") {
        let start = position + found + 4;
        let Some(close) = lower[start..].find(')') else {
            break;
        };
        let end = start + close;
        position = end + 1;

        let reference = strip_quotes(body[start..end].trim());
        push_reference(reference, None, origin, out);
    }
}

/// Collects the target of every string-form `@import` rule
///
/// The `@import url(...)` form is already covered by the url scan.
fn scan_string_imports(body: &str, origin: &Url, out: &mut Vec<AssetRef>) {
    let lower = body.to_ascii_lowercase();
    let mut position = 0;

    while let Some(found) = lower[position..].find("@import") {
        let mut cursor = position + found + "@import".len();
        while cursor < body.len() && body.as_bytes()[cursor].is_ascii_whitespace() {
            cursor += 1;
        }
        position = cursor;

        let rest = &body[cursor..];
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        let Some(close) = rest[1..].find(quote) else {
            continue;
        };

        let reference = &rest[1..1 + close];
        position = cursor + close + 2;

        // Import targets are stylesheets regardless of extension
        push_reference(reference, Some(AssetKind::Style), origin, out);
    }
}

fn push_reference(reference: &str, kind: Option<AssetKind>, origin: &Url, out: &mut Vec<AssetRef>) {
    if reference.is_empty() || reference.to_ascii_lowercase().starts_with("data:") {
        return;
    }

    if let Some(url) = resolve_reference(reference, origin) {
        let kind = kind.unwrap_or_else(|| kind_from_extension(&url));
        out.push(AssetRef {
            url,
            kind,
            referrer: origin.clone(),
            original: reference.to_string(),
        });
    }
}

fn strip_quotes(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}
