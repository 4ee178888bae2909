//! Forensic page profiling
//!
//! Extracts structural and security-relevant metadata from one fetched page
//! into a `ForensicReport`: server identification, security-header presence,
//! cookie flags, meta tags, form records, script sources, favicon, and a
//! structural summary. Extraction is pure (no crawl state touched) and
//! per-field best effort: anything missing becomes an absent field, never a
//! failed report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::parser::{resolve_reference, ParsedDocument};
use crate::transport::FetchedResponse;
use crate::Result;

/// Per-page forensic profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicReport {
    pub url: String,
    pub generated_at: DateTime<Utc>,
    pub status: u16,
    /// Full response header map, duplicates preserved
    pub headers: BTreeMap<String, Vec<String>>,
    pub server: Option<String>,
    pub powered_by: Option<String>,
    pub security_headers: SecurityHeaders,
    pub cookies: Vec<CookieRecord>,
    pub meta_tags: Vec<MetaTag>,
    pub forms: Vec<FormRecord>,
    /// Resolved external script sources
    pub script_sources: Vec<String>,
    pub inline_script_count: usize,
    pub favicon: Option<String>,
    pub structure: StructuralSummary,
}

/// Presence of the headers a hardened deployment sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityHeaders {
    pub strict_transport_security: bool,
    pub content_security_policy: bool,
    pub x_frame_options: bool,
}

/// One Set-Cookie header, reduced to its session-safety flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub secure: bool,
    pub http_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTag {
    /// From `name` or `property`, whichever the tag carries
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormRecord {
    /// Resolved absolute action, absent when the form posts to itself
    pub action: Option<String>,
    pub method: String,
    pub input_names: Vec<String>,
    pub hidden_input_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralSummary {
    pub title: Option<String>,
    pub hyperlink_count: usize,
    /// Extracted asset references by kind
    pub asset_counts: BTreeMap<String, usize>,
    pub form_count: usize,
}

impl ForensicReport {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Profiles one fetched page
///
/// # Arguments
/// * `url` - The page's final URL
/// * `response` - The raw response, headers included
/// * `body` - Decoded document text
/// * `parsed` - The full extraction for the same document
pub fn profile(
    url: &Url,
    response: &FetchedResponse,
    body: &str,
    parsed: &ParsedDocument,
) -> ForensicReport {
    let document = Html::parse_document(body);

    let mut asset_counts = BTreeMap::new();
    for asset in &parsed.assets {
        *asset_counts.entry(asset.kind.label().to_string()).or_insert(0) += 1;
    }

    ForensicReport {
        url: url.as_str().to_string(),
        generated_at: Utc::now(),
        status: response.status,
        headers: header_map(response),
        server: response.header("server").map(str::to_string),
        powered_by: response.header("x-powered-by").map(str::to_string),
        security_headers: SecurityHeaders {
            strict_transport_security: response.header("strict-transport-security").is_some(),
            content_security_policy: response.header("content-security-policy").is_some(),
            x_frame_options: response.header("x-frame-options").is_some(),
        },
        cookies: extract_cookies(response),
        meta_tags: extract_meta_tags(&document),
        forms: extract_forms(&document, url),
        script_sources: extract_script_sources(&document, url),
        inline_script_count: count_inline_scripts(&document),
        favicon: extract_favicon(&document, url),
        structure: StructuralSummary {
            title: parsed.title.clone(),
            hyperlink_count: parsed.links.len(),
            asset_counts,
            form_count: count_elements(&document, "form"),
        },
    }
}

fn header_map(response: &FetchedResponse) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &response.headers {
        map.entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.clone());
    }
    map
}

/// Parses every Set-Cookie header into name + safety flags
fn extract_cookies(response: &FetchedResponse) -> Vec<CookieRecord> {
    response
        .headers_named("set-cookie")
        .filter_map(parse_cookie)
        .collect()
}

fn parse_cookie(header_value: &str) -> Option<CookieRecord> {
    let mut parts = header_value.split(';');
    let name = parts.next()?.split('=').next()?.trim();
    if name.is_empty() {
        return None;
    }

    let mut secure = false;
    let mut http_only = false;
    for attribute in parts {
        match attribute.trim().to_ascii_lowercase().as_str() {
            "secure" => secure = true,
            "httponly" => http_only = true,
            _ => {}
        }
    }

    Some(CookieRecord {
        name: name.to_string(),
        secure,
        http_only,
    })
}

fn extract_meta_tags(document: &Html) -> Vec<MetaTag> {
    let mut tags = Vec::new();

    if let Ok(selector) = Selector::parse("meta[content]") {
        for element in document.select(&selector) {
            let name = element
                .value()
                .attr("name")
                .or_else(|| element.value().attr("property"));
            if let (Some(name), Some(content)) = (name, element.value().attr("content")) {
                tags.push(MetaTag {
                    name: name.to_string(),
                    content: content.to_string(),
                });
            }
        }
    }

    tags
}

fn extract_forms(document: &Html, base: &Url) -> Vec<FormRecord> {
    let mut forms = Vec::new();

    let Ok(form_selector) = Selector::parse("form") else {
        return forms;
    };
    let input_selector = Selector::parse("input[name]").ok();
    let hidden_selector = Selector::parse("input[type=\"hidden\"]").ok();

    for form in document.select(&form_selector) {
        let action = form
            .value()
            .attr("action")
            .and_then(|action| resolve_reference(action, base))
            .map(|url| url.to_string());

        let method = form
            .value()
            .attr("method")
            .unwrap_or("get")
            .to_ascii_lowercase();

        let input_names = input_selector
            .as_ref()
            .map(|selector| {
                form.select(selector)
                    .filter_map(|input| input.value().attr("name"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let hidden_input_count = hidden_selector
            .as_ref()
            .map(|selector| form.select(selector).count())
            .unwrap_or(0);

        forms.push(FormRecord {
            action,
            method,
            input_names,
            hidden_input_count,
        });
    }

    forms
}

fn extract_script_sources(document: &Html, base: &Url) -> Vec<String> {
    let mut sources = Vec::new();

    if let Ok(selector) = Selector::parse("script[src]") {
        for element in document.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                if let Some(url) = resolve_reference(src, base) {
                    sources.push(url.to_string());
                }
            }
        }
    }

    sources
}

fn count_inline_scripts(document: &Html) -> usize {
    let Ok(selector) = Selector::parse("script:not([src])") else {
        return 0;
    };

    document
        .select(&selector)
        .filter(|element| !element.text().collect::<String>().trim().is_empty())
        .count()
}

fn extract_favicon(document: &Html, base: &Url) -> Option<String> {
    let selector =
        Selector::parse("link[rel~=\"icon\"][href], link[rel~=\"apple-touch-icon\"][href]").ok()?;

    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| resolve_reference(href, base))
        .map(|url| url.to_string())
}

fn count_elements(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|selector| document.select(&selector).count())
        .unwrap_or(0)
}
