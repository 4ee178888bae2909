//! Pluggable network transport
//!
//! The engine talks to the network through the [`Transport`] trait: an
//! object-safe async seam so jobs can run over a direct connection, through
//! a SOCKS proxy, or against a scripted stub in tests. The production
//! implementation is [`HttpTransport`].
//!
//! Redirects are followed inside the transport (manually, with a hop limit
//! and loop detection) so the scheduler only ever sees final responses or a
//! distinct redirect error.

mod http;

pub use http::HttpTransport;

use crate::state::FailureKind;
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Errors surfaced by a transport
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out: {url}")]
    Timeout { url: String },

    #[error("connection failed for {url}: {message}")]
    Connection { url: String, message: String },

    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("rate limited (429) by {url}")]
    RateLimited { url: String },

    #[error("redirect loop detected at {url}")]
    RedirectLoop { url: String },

    #[error("redirect chain from {url} exceeded {limit} hops")]
    TooManyRedirects { url: String, limit: u32 },

    #[error("unsupported URL scheme: {scheme}")]
    UnsupportedScheme { scheme: String },

    #[error("malformed URL: {0}")]
    Malformed(String),
}

impl TransportError {
    /// Returns true for failures worth retrying with backoff: timeouts,
    /// connection drops, and 5xx responses. 429 is not listed here; it is
    /// a politeness signal handled through [`TransportError::is_rate_limit`].
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true for a 429 response
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Maps this error to the terminal failure kind recorded on the entry
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => FailureKind::Network,
            Self::Status { status, .. } => FailureKind::HttpStatus(*status),
            Self::RateLimited { .. } => FailureKind::HttpStatus(429),
            Self::RedirectLoop { .. } | Self::TooManyRedirects { .. } => FailureKind::RedirectLoop,
            Self::UnsupportedScheme { .. } | Self::Malformed(_) => FailureKind::InvalidUrl,
        }
    }
}

/// A completed response: final URL after redirects, status, headers in
/// arrival order (duplicates preserved, e.g. repeated Set-Cookie), and body
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    /// First header value with the given name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All header values with the given name, case-insensitive
    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The Content-Type header without parameters, lowercased
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_lowercase())
    }
}

/// Object-safe async network client
///
/// Implementations must be safe to share across worker tasks; sessions are
/// configured at construction (no process-wide transport state).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches a URL with optional extra request headers, following
    /// redirects up to the session's hop limit
    async fn fetch(
        &self,
        url: &Url,
        headers: &[(String, String)],
    ) -> Result<FetchedResponse, TransportError>;

    /// Cheap liveness/content-type probe. The default downgrades to a full
    /// fetch and discards the body, for transports without HEAD support.
    async fn head(&self, url: &Url) -> Result<FetchedResponse, TransportError> {
        let mut response = self.fetch(url, &[]).await?;
        response.body.clear();
        Ok(response)
    }
}
