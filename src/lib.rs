//! Kagami: a site mirroring and forensic profiling engine
//!
//! This crate downloads a page or an entire site's reachable subtree into a
//! browsable local replica, preserving the remote directory structure, and
//! extracts a structural/security forensic report per page. Transports are
//! pluggable (direct or SOCKS-proxied), crawling is bounded-concurrency with
//! per-host politeness, and pages can be reduced to text-only or media-only
//! content before persistence.

pub mod config;
pub mod engine;
pub mod filter;
pub mod parser;
pub mod profiler;
pub mod state;
pub mod storage;
pub mod transport;
pub mod url;

use thiserror::Error;

/// Main error type for Kagami operations
#[derive(Debug, Error)]
pub enum KagamiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid seed URL {url}: {reason}")]
    Seed { url: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Job cancelled before completion")]
    Cancelled,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid proxy endpoint: {0}")]
    InvalidProxy(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Kagami operations
pub type Result<T> = std::result::Result<T, KagamiError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, SessionConfig};
pub use engine::{
    CompletionEvent, EntryOutcome, JobHandle, JobStatus, MirrorEngine, MirrorResult, SiteJob,
    SiteSummary,
};
pub use filter::MirrorMode;
pub use profiler::ForensicReport;
pub use transport::{FetchedResponse, Transport, TransportError};
pub use url::normalize_url;
