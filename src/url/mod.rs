//! URL handling for the mirroring engine
//!
//! Provides the canonical normalization used by the visited set and storage
//! mapper, plus the scope policy governing which hosts recursive discovery
//! may fetch from.

mod normalize;
mod scope;

pub use normalize::normalize_url;
pub use scope::{host_key, matches_host_pattern, ScopePolicy};
