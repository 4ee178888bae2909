use crate::filter::MirrorMode;
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for a mirroring session
///
/// Every table and field has a default, so an empty file (or no file at
/// all) yields a working configuration: full-content mirror, depth 3,
/// direct connection, output under `./mirror`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub transport: SessionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Job-level behavior: what to capture and how far to recurse
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Content mode applied before persistence
    #[serde(default)]
    pub mode: MirrorMode,

    /// Maximum link depth from the seed (0 = seed page only)
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Whether asset-only modes still follow hyperlinks for recursion
    #[serde(rename = "follow-links", default = "default_true")]
    pub follow_links: bool,

    /// Extra in-scope hosts beyond the seed's ("cdn.example.com",
    /// "*.assets.org", "127.0.0.1:8080")
    #[serde(rename = "allowed-hosts", default)]
    pub allowed_hosts: Vec<String>,
}

/// Concurrency and retry limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Global cap on in-flight fetches
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Per-host cap on in-flight fetches (distinct from the global cap)
    #[serde(rename = "per-host-concurrency", default = "default_per_host_concurrency")]
    pub per_host_concurrency: u32,

    /// Minimum time between dispatches to the same host (milliseconds)
    #[serde(rename = "per-host-interval-ms", default = "default_per_host_interval_ms")]
    pub per_host_interval_ms: u64,

    /// Attempt budget per URL, counting the first try
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,
}

/// Transport session configuration: how requests leave the process
///
/// Passed to the transport at construction; there is no process-wide
/// transport state, so two engines in one process can use different
/// sessions (e.g. one direct, one through Tor).
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Whole-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Redirect hops before an entry fails with a redirect error
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: u32,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Proxy endpoint ("http://...", "socks5://...", "socks5h://...").
    /// Absent means a direct connection; `KAGAMI_PROXY` fills it when the
    /// file omits it.
    #[serde(default)]
    pub proxy: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory the mirrored tree is rooted under
    #[serde(rename = "root-dir", default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Write a forensic report next to each mirrored page
    #[serde(rename = "forensic-reports", default = "default_true")]
    pub forensic_reports: bool,
}

impl SessionConfig {
    /// Fills `proxy` from the `KAGAMI_PROXY` environment variable when the
    /// configuration left it unset. An explicit config value wins.
    pub fn apply_env_proxy(&mut self) {
        if self.proxy.is_none() {
            if let Ok(endpoint) = std::env::var("KAGAMI_PROXY") {
                if !endpoint.is_empty() {
                    self.proxy = Some(endpoint);
                }
            }
        }
    }
}

fn default_max_depth() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> u32 {
    8
}

fn default_per_host_concurrency() -> u32 {
    2
}

fn default_per_host_interval_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_redirects() -> u32 {
    5
}

fn default_user_agent() -> String {
    format!("kagami/{}", env!("CARGO_PKG_VERSION"))
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("./mirror")
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            mode: MirrorMode::default(),
            max_depth: default_max_depth(),
            follow_links: true,
            allowed_hosts: Vec::new(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            per_host_concurrency: default_per_host_concurrency(),
            per_host_interval_ms: default_per_host_interval_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            proxy: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            forensic_reports: true,
        }
    }
}
