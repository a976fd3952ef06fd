//! Path allowlist
//!
//! A snapshot of the repository's files taken at pipeline start. The
//! Developer may only touch paths in the snapshot (canonical files are
//! always allowed, so a missing-but-declared file can be created) and never
//! anything under a forbidden prefix.

use std::collections::BTreeSet;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::Result;
use crate::repo::RepoKind;

/// Extensions included in the snapshot
const SNAPSHOT_EXTENSIONS: &[&str] = &["html", "css", "js", "json", "md", "txt", "svg"];

/// Directories excluded from the snapshot
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "dist", "build", "implementations", "data"];

/// Set of repository-relative paths the Developer may touch
#[derive(Debug, Clone)]
pub struct PathAllowlist {
    allowed: BTreeSet<String>,
    canonical: Vec<String>,
    forbidden_prefixes: Vec<String>,
}

impl PathAllowlist {
    /// Snapshot the working tree's files for a repository kind
    pub fn snapshot(root: &Path, kind: &RepoKind) -> Result<Self> {
        let mut allowed = BTreeSet::new();
        for entry in WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let rel = rel.to_string_lossy().replace('\\', "/");
            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            if ext.is_some_and(|e| SNAPSHOT_EXTENSIONS.contains(&e.as_str())) {
                allowed.insert(rel);
            }
        }

        Ok(Self {
            allowed,
            canonical: kind.canonical_files(),
            forbidden_prefixes: kind.forbidden_prefixes(),
        })
    }

    /// Build from explicit parts (tests, custom callers)
    pub fn from_parts(
        allowed: impl IntoIterator<Item = String>,
        canonical: Vec<String>,
        forbidden_prefixes: Vec<String>,
    ) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            canonical,
            forbidden_prefixes,
        }
    }

    /// Whether a repository-relative path may be touched.
    ///
    /// Canonical files are always allowed; forbidden prefixes always win.
    pub fn is_allowed(&self, path: &str) -> bool {
        if self.is_forbidden(path) {
            return false;
        }
        self.canonical.iter().any(|c| c == path) || self.allowed.contains(path)
    }

    /// Whether the path sits under a forbidden prefix
    pub fn is_forbidden(&self, path: &str) -> bool {
        self.forbidden_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn forbidden_prefixes(&self) -> &[String] {
        &self.forbidden_prefixes
    }

    /// Top-N entries for prompt display, canonical files first
    pub fn prompt_entries(&self, limit: usize) -> Vec<String> {
        let mut entries: Vec<String> = Vec::new();
        for canonical in &self.canonical {
            if !entries.contains(canonical) {
                entries.push(canonical.clone());
            }
        }
        for path in &self.allowed {
            if entries.len() >= limit {
                break;
            }
            if !entries.contains(path) {
                entries.push(path.clone());
            }
        }
        entries.truncate(limit.max(self.canonical.len()));
        entries
    }
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| SKIP_DIRS.contains(&name))
}
