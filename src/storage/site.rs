//! Mirror tree persistence
//!
//! `SiteStore` owns the output root and writes mirrored files under it,
//! creating parent directories as needed. Document persistence rewrites
//! extracted references to relative local paths first, so the saved tree
//! browses offline. Forensic reports land next to their document with a
//! `.report.json` suffix.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::storage::mapper::relative_path;
use crate::Result;

/// Filename suffix for per-document forensic reports
pub const REPORT_SUFFIX: &str = ".report.json";

/// One reference rewrite: the verbatim text in the document and the mapped
/// path of its target
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub original: String,
    pub target: PathBuf,
}

/// Writes mirrored files under one output root
#[derive(Debug, Clone)]
pub struct SiteStore {
    root: PathBuf,
}

impl SiteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a mapped path
    pub fn absolute(&self, path: &Path) -> PathBuf {
        self.root.join(path)
    }

    /// Persists a text document with its references rewritten
    ///
    /// # Arguments
    /// * `path` - Mapped path relative to the root
    /// * `body` - Document text
    /// * `rewrites` - References to point at their local copies
    pub async fn persist_document(
        &self,
        path: &Path,
        body: &str,
        rewrites: &[Rewrite],
    ) -> Result<u64> {
        let rewritten = rewrite_references(body, path, rewrites);
        self.write(path, rewritten.as_bytes()).await
    }

    /// Persists bytes untouched
    pub async fn persist_raw(&self, path: &Path, bytes: &[u8]) -> Result<u64> {
        self.write(path, bytes).await
    }

    /// Persists a forensic report next to its document
    ///
    /// # Returns
    /// The report's path relative to the root
    pub async fn persist_report(&self, document_path: &Path, json: &str) -> Result<PathBuf> {
        let path = report_path(document_path);
        self.write(&path, json.as_bytes()).await?;
        Ok(path)
    }

    /// Writes bytes under the root and returns how many were written
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<u64> {
        let absolute = self.absolute(path);
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&absolute, bytes).await?;

        tracing::debug!(path = %absolute.display(), bytes = bytes.len(), "Persisted file");
        Ok(bytes.len() as u64)
    }
}

/// Report filename for a mapped document path
pub fn report_path(document_path: &Path) -> PathBuf {
    let mut name = document_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(REPORT_SUFFIX);
    document_path.with_file_name(name)
}

/// Rewrites extracted references to relative local paths
///
/// Each original reference is replaced where it appears as a quoted
/// attribute value or a CSS `url()` argument. References with no rewrite
/// entry (external links, unfetched targets) stay untouched.
pub fn rewrite_references(body: &str, from: &Path, rewrites: &[Rewrite]) -> String {
    let mut rewritten = body.to_string();
    let mut seen: HashSet<&str> = HashSet::new();

    for rewrite in rewrites {
        if !seen.insert(rewrite.original.as_str()) {
            continue;
        }

        let relative = relative_path(from, &rewrite.target);
        if relative == rewrite.original {
            continue;
        }

        let patterns = [
            (
                format!("\"{}\"", rewrite.original),
                format!("\"{}\"", relative),
            ),
            (
                format!("'{}'", rewrite.original),
                format!("'{}'", relative),
            ),
            (
                format!("url({})", rewrite.original),
                format!("url({})", relative),
            ),
        ];
        for (pattern, replacement) in &patterns {
            rewritten = rewritten.replace(pattern, replacement);
        }
    }

    rewritten
}
