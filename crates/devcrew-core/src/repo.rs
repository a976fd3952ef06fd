//! Target-repository kinds
//!
//! A `RepoKind` bundles what the pipeline needs to know about the repository
//! it is mutating: which files are canonical (their absence is fatal), which
//! path prefixes the Developer must never touch, and which content markers
//! indicate a forbidden new runtime dependency.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Per-repository override file, read from the working tree root when present
const OVERRIDE_FILE: &str = "devcrew.toml";

/// Kind of repository the pipeline targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoKind {
    /// A pure static frontend: HTML + CSS + vanilla JS, no backend, no
    /// package installs at runtime
    Frontend,
    /// A repository with explicit overrides loaded from `devcrew.toml`
    Custom(RepoProfile),
}

/// Resolved profile for a repository kind
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoProfile {
    /// Files whose absence or emptiness aborts the pipeline (Gate 1)
    pub canonical_files: Vec<String>,
    /// Repository-relative path prefixes the Developer may never touch
    #[serde(default)]
    pub forbidden_prefixes: Vec<String>,
    /// Content substrings that signal a forbidden new runtime dependency
    #[serde(default)]
    pub forbidden_dependency_markers: Vec<String>,
}

impl RepoKind {
    /// Load the kind for a working tree: `devcrew.toml` overrides when
    /// present, else the frontend defaults.
    pub fn detect(root: &Path) -> Result<Self> {
        let override_path = root.join(OVERRIDE_FILE);
        if override_path.is_file() {
            let raw = std::fs::read_to_string(&override_path)?;
            let profile: RepoProfile = toml::from_str(&raw)
                .map_err(|e| Error::Config(format!("invalid {OVERRIDE_FILE}: {e}")))?;
            if profile.canonical_files.is_empty() {
                return Err(Error::Config(format!(
                    "{OVERRIDE_FILE} must declare at least one canonical file"
                )));
            }
            return Ok(RepoKind::Custom(profile));
        }
        Ok(RepoKind::Frontend)
    }

    /// Files declared essential to the repository's interface
    pub fn canonical_files(&self) -> Vec<String> {
        match self {
            RepoKind::Frontend => vec![
                "index.html".to_string(),
                "styles.css".to_string(),
                "app.js".to_string(),
            ],
            RepoKind::Custom(profile) => profile.canonical_files.clone(),
        }
    }

    /// Path prefixes the Developer must never write under
    pub fn forbidden_prefixes(&self) -> Vec<String> {
        match self {
            RepoKind::Frontend => ["api/", "routes/", "controllers/", "models/", "backend/", "server/"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            RepoKind::Custom(profile) => profile.forbidden_prefixes.clone(),
        }
    }

    /// Content substrings that indicate a forbidden new runtime dependency
    pub fn forbidden_dependency_markers(&self) -> Vec<String> {
        match self {
            RepoKind::Frontend => ["require(", "import axios", "node_modules/"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            RepoKind::Custom(profile) => profile.forbidden_dependency_markers.clone(),
        }
    }

    /// Whether a repository-relative path is a canonical file
    pub fn is_canonical(&self, path: &str) -> bool {
        self.canonical_files().iter().any(|c| c == path)
    }
}
