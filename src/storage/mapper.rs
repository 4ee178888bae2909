//! URL to local path mapping
//!
//! Derivation: the host (with explicit port) becomes the root directory,
//! path segments become nested directories, and the trailing segment becomes
//! the filename. A segment without a dot is treated as directory-like and
//! gets an `index.html` inside it, so `/about` and `/about/team` never fight
//! over one name. Query strings fold into the filename as `name@query`.
//!
//! Assignment is first-claim within a job: the first URL to claim a
//! candidate path keeps it, later distinct URLs claiming the same path get
//! an 8-hex SHA-256 disambiguator inserted before the extension. Repeated
//! resolution of the same URL always returns the assigned path, which is
//! what keeps re-runs overwriting in place.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use url::Url;

use crate::url::host_key;

const INDEX_FILENAME: &str = "index.html";

/// Components longer than this get truncated and tagged with a hash
const MAX_COMPONENT_LEN: usize = 150;
const TRUNCATED_COMPONENT_LEN: usize = 120;

/// Hex characters of the collision disambiguator
const DISAMBIGUATOR_LEN: usize = 8;

/// Suffix appended to a directory component whose name a file already owns
const DIRECTORY_DIVERSION: &str = ".d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    File,
    Directory,
}

/// Deterministic URL to relative-path assignment for one job
#[derive(Debug, Default)]
pub struct PathMapper {
    /// Normalized URL string to assigned path
    assignments: HashMap<String, PathBuf>,
    /// Every path handed out or implied as a directory
    claims: HashMap<PathBuf, Claim>,
}

impl PathMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a URL to its local path, relative to the mirror root
    ///
    /// The first call for a URL assigns the path; every later call returns
    /// the same assignment.
    pub fn resolve(&mut self, url: &Url) -> PathBuf {
        if let Some(assigned) = self.assignments.get(url.as_str()) {
            return assigned.clone();
        }

        let (dirs, filename) = derive_components(url);

        // Divert around any ancestor a file already owns
        let mut prefix = PathBuf::new();
        let mut resolved_dirs = Vec::with_capacity(dirs.len());
        for mut dir in dirs {
            prefix.push(&dir);
            if self.claims.get(&prefix) == Some(&Claim::File) {
                prefix.pop();
                dir.push_str(DIRECTORY_DIVERSION);
                prefix.push(&dir);
            }
            resolved_dirs.push(dir);
        }

        let mut candidate = prefix.join(&filename);
        if self.claims.contains_key(&candidate) {
            candidate = with_disambiguator(&candidate, url, DISAMBIGUATOR_LEN);
            if self.claims.contains_key(&candidate) {
                candidate = with_disambiguator(&prefix.join(&filename), url, 64);
            }
        }

        let mut ancestor = PathBuf::new();
        for dir in &resolved_dirs {
            ancestor.push(dir);
            self.claims
                .entry(ancestor.clone())
                .or_insert(Claim::Directory);
        }
        self.claims.insert(candidate.clone(), Claim::File);
        self.assignments
            .insert(url.as_str().to_string(), candidate.clone());

        candidate
    }

    /// Returns the assigned path without assigning one
    pub fn lookup(&self, url: &Url) -> Option<&Path> {
        self.assignments.get(url.as_str()).map(PathBuf::as_path)
    }

    /// Number of assigned paths
    pub fn assigned_count(&self) -> usize {
        self.assignments.len()
    }
}

/// Splits a URL into sanitized directory components and a filename
fn derive_components(url: &Url) -> (Vec<String>, String) {
    let mut dirs = vec![sanitize_component(&host_key(url).unwrap_or_default())];

    let segments: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|segment| !segment.is_empty())
                .map(sanitize_component)
                .collect()
        })
        .unwrap_or_default();

    let query = url.query().map(sanitize_component);

    let filename = match segments.split_last() {
        None => match query {
            Some(query) => clamp_component(format!("{}@{}", INDEX_FILENAME, query)),
            None => INDEX_FILENAME.to_string(),
        },
        Some((last, head)) => {
            if let Some(query) = query {
                dirs.extend(head.iter().cloned());
                clamp_component(format!("{}@{}", last, query))
            } else if last.contains('.') {
                dirs.extend(head.iter().cloned());
                last.clone()
            } else {
                dirs.extend(segments);
                INDEX_FILENAME.to_string()
            }
        }
    };

    (dirs, filename)
}

/// Replaces filesystem-hostile characters and clamps the length
///
/// URL segments arrive percent-encoded, so the allowed set is ASCII. Empty
/// and dot-only segments are replaced outright.
fn sanitize_component(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c,
            '.' | '_' | '-' | '~' | '@' | '=' | '&' | '+' | '%' => c,
            _ => '_',
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return "_".to_string();
    }

    clamp_component(cleaned)
}

fn clamp_component(component: String) -> String {
    if component.len() <= MAX_COMPONENT_LEN {
        return component;
    }
    format!(
        "{}.{}",
        &component[..TRUNCATED_COMPONENT_LEN],
        short_hash(&component, DISAMBIGUATOR_LEN)
    )
}

/// Inserts a truncated URL hash before the filename's extension
fn with_disambiguator(path: &Path, url: &Url, width: usize) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(INDEX_FILENAME);
    let tag = short_hash(url.as_str(), width);

    let disambiguated = match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}.{}.{}", &name[..dot], tag, &name[dot + 1..]),
        _ => format!("{}.{}", name, tag),
    };

    path.with_file_name(disambiguated)
}

fn short_hash(input: &str, width: usize) -> String {
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[..width.min(digest.len())].to_string()
}

/// Relative reference from one mapped file to another
///
/// Both paths are relative to the mirror root. The result uses `/`
/// separators so it can go straight into a rewritten attribute.
pub fn relative_path(from: &Path, to: &Path) -> String {
    let from_dir: Vec<Component> = from
        .parent()
        .map(|parent| parent.components().collect())
        .unwrap_or_default();
    let to_components: Vec<Component> = to.components().collect();

    let common = from_dir
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from_dir.len() {
        parts.push("..".to_string());
    }
    for component in &to_components[common..] {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }

    parts.join("/")
}
