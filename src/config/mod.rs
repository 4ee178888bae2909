//! Configuration for mirroring sessions
//!
//! Handles loading, parsing, and validating TOML configuration files, plus
//! the `KAGAMI_PROXY` environment fallback for the proxy endpoint.
//!
//! # Example
//!
//! ```no_run
//! use kagami::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("kagami.toml")).unwrap();
//! println!("Mirroring up to depth {}", config.job.max_depth);
//! ```

mod parser;
mod types;
mod validation;

pub use parser::load_config;
pub use types::{Config, JobConfig, LimitsConfig, OutputConfig, SessionConfig};
