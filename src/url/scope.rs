use url::Url;

/// Returns the host key of a URL: the lowercase host, with the explicit
/// port appended when one is present
///
/// The host key identifies a single server for both scope checks and
/// politeness accounting, so `example.com`, `example.com:8080`, and
/// `www.example.com` are three distinct keys.
pub fn host_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Checks if a host matches a pattern
///
/// Two pattern types are supported:
/// 1. Exact match: "example.com" matches only "example.com"
/// 2. Wildcard match: "*.example.com" matches "example.com" and any
///    subdomain depth ("blog.example.com", "api.v2.example.com")
///
/// A pattern containing a port ("127.0.0.1:8080") is compared against the
/// candidate's full host key; a pattern without one ignores the candidate's
/// port.
pub fn matches_host_pattern(pattern: &str, candidate_key: &str) -> bool {
    let candidate = if pattern.contains(':') {
        candidate_key
    } else {
        candidate_key.split(':').next().unwrap_or(candidate_key)
    };

    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Scope policy for a crawl job: which hosts recursive discovery may fetch
/// from
///
/// In-scope means the seed's exact host key, plus any host matching an
/// allowed pattern. Subdomains of the seed are not implicitly in scope.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    seed_host: String,
    allowed: Vec<String>,
}

impl ScopePolicy {
    /// Builds a policy from the seed URL and configured allow patterns
    pub fn new(seed: &Url, allowed_hosts: &[String]) -> Self {
        Self {
            seed_host: host_key(seed).unwrap_or_default(),
            allowed: allowed_hosts.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Returns the seed's host key
    pub fn seed_host(&self) -> &str {
        &self.seed_host
    }

    /// Returns true if the URL's host is within scope
    pub fn contains(&self, url: &Url) -> bool {
        let Some(key) = host_key(url) else {
            return false;
        };
        if key == self.seed_host {
            return true;
        }
        self.allowed.iter().any(|p| matches_host_pattern(p, &key))
    }
}
