use crate::config::types::{Config, LimitsConfig, OutputConfig, SessionConfig};
use crate::ConfigError;
use url::Url;

const PROXY_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_limits(&config.limits)?;
    validate_session(&config.transport)?;
    validate_output(&config.output)?;
    validate_allowed_hosts(&config.job.allowed_hosts)?;
    Ok(())
}

/// Validates concurrency and retry limits
fn validate_limits(limits: &LimitsConfig) -> Result<(), ConfigError> {
    if limits.concurrency < 1 || limits.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            limits.concurrency
        )));
    }

    if limits.per_host_concurrency < 1 {
        return Err(ConfigError::Validation(format!(
            "per-host-concurrency must be >= 1, got {}",
            limits.per_host_concurrency
        )));
    }

    if limits.per_host_concurrency > limits.concurrency {
        return Err(ConfigError::Validation(format!(
            "per-host-concurrency ({}) cannot exceed concurrency ({})",
            limits.per_host_concurrency, limits.concurrency
        )));
    }

    if limits.per_host_interval_ms > 3_600_000 {
        return Err(ConfigError::Validation(format!(
            "per-host-interval-ms must be <= 3600000 (one hour), got {}",
            limits.per_host_interval_ms
        )));
    }

    if limits.max_retries < 1 || limits.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be between 1 and 10, got {}",
            limits.max_retries
        )));
    }

    Ok(())
}

/// Validates the transport session configuration
fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.request_timeout_secs < 1 || session.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-secs must be between 1 and 300, got {}",
            session.request_timeout_secs
        )));
    }

    if session.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max-redirects must be <= 20, got {}",
            session.max_redirects
        )));
    }

    if session.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if let Some(proxy) = &session.proxy {
        validate_proxy_endpoint(proxy)?;
    }

    Ok(())
}

/// Validates a proxy endpoint URL and its scheme
fn validate_proxy_endpoint(proxy: &str) -> Result<(), ConfigError> {
    let url = Url::parse(proxy)
        .map_err(|e| ConfigError::InvalidProxy(format!("'{}': {}", proxy, e)))?;

    if !PROXY_SCHEMES.contains(&url.scheme()) {
        return Err(ConfigError::InvalidProxy(format!(
            "'{}': scheme must be one of {}, got '{}'",
            proxy,
            PROXY_SCHEMES.join(", "),
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidProxy(format!(
            "'{}': missing proxy host",
            proxy
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output(output: &OutputConfig) -> Result<(), ConfigError> {
    if output.root_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "root-dir cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates allowed-host patterns
fn validate_allowed_hosts(patterns: &[String]) -> Result<(), ConfigError> {
    for pattern in patterns {
        validate_host_pattern(pattern)?;
    }
    Ok(())
}

/// Validates a host pattern (optionally wildcard-prefixed, optionally with
/// a port)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    let bare = pattern.strip_prefix("*.").unwrap_or(pattern);

    if bare.is_empty() {
        return Err(ConfigError::Validation(format!(
            "allowed-hosts pattern '{}' has no host part",
            pattern
        )));
    }

    if !bare
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':')
    {
        return Err(ConfigError::Validation(format!(
            "allowed-hosts pattern '{}' contains invalid characters",
            pattern
        )));
    }

    if bare.starts_with('.') || bare.ends_with('.') || bare.contains("..") {
        return Err(ConfigError::Validation(format!(
            "allowed-hosts pattern '{}' is not a valid host",
            pattern
        )));
    }

    Ok(())
}
