use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;

/// Loads, parses, and validates a configuration file
///
/// After parsing, the `KAGAMI_PROXY` environment variable fills the proxy
/// endpoint when the file omits one (an explicit value in the file wins).
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let mut config: Config = toml::from_str(&content)?;

    config.transport.apply_env_proxy();

    validate(&config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::MirrorMode;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), content).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[job]
mode = "text"
max-depth = 5
allowed-hosts = ["cdn.example.com"]

[limits]
concurrency = 4
per-host-concurrency = 2
per-host-interval-ms = 250
max-retries = 2

[transport]
request-timeout-secs = 15
max-redirects = 8
user-agent = "test-mirror/1.0"

[output]
root-dir = "/tmp/mirror-out"
forensic-reports = false
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.job.mode, MirrorMode::Text);
        assert_eq!(config.job.max_depth, 5);
        assert_eq!(config.job.allowed_hosts, vec!["cdn.example.com"]);
        assert_eq!(config.limits.concurrency, 4);
        assert_eq!(config.transport.max_redirects, 8);
        assert!(!config.output.forensic_reports);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = create_temp_config("");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.job.mode, MirrorMode::Full);
        assert_eq!(config.job.max_depth, 3);
        assert!(config.job.follow_links);
        assert_eq!(config.limits.concurrency, 8);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let file = create_temp_config("[job]\nmax-depth = 1\n");
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.job.max_depth, 1);
        assert_eq!(config.limits.per_host_concurrency, 2);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let file = create_temp_config("[limits]\nconcurrency = 0\n");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let file = create_temp_config("[job]\nmode = \"audio\"\n");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
