//! Storage: URL to path mapping and mirror persistence
//!
//! This module turns remote URLs into a deterministic local file tree and
//! writes it:
//! - Path mapping with first-claim collision handling (`PathMapper`)
//! - Async persistence of documents, raw assets, and reports (`SiteStore`)
//! - Reference rewriting so the mirrored tree browses offline

mod mapper;
mod site;

pub use mapper::{relative_path, PathMapper};
pub use site::{report_path, rewrite_references, Rewrite, SiteStore, REPORT_SUFFIX};
