//! Change application
//!
//! Applies validated changes in input order against a pre-captured content
//! snapshot. Any failure restores every touched file to its pre-state, so
//! application is atomic. Changed files are reported by byte comparison
//! against the snapshot, which makes re-application of an already-applied
//! change set report zero changed files.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::error::ApplyError;

use super::{Change, FORBIDDEN_PLACEHOLDERS, css, js};

/// Pre-state of every touched path; `None` means the file did not exist
pub type Snapshot = BTreeMap<String, Option<String>>;

/// Result of a successful application
#[derive(Debug)]
pub struct ApplyOutcome {
    /// Files whose bytes differ from their pre-state
    pub changed_files: BTreeSet<String>,
    /// Pre-state of every touched path, kept for later rollback
    pub snapshot: Snapshot,
}

/// Applies validated change sets to one working tree
pub struct Applier {
    root: PathBuf,
}

impl Applier {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Apply changes in order. On any failure the snapshot is restored and
    /// the error describes the failing change; no partial state survives.
    pub fn apply(&self, changes: &[Change]) -> Result<ApplyOutcome, ApplyError> {
        let mut snapshot = Snapshot::new();
        for change in changes {
            let path = change.path().to_string();
            if !snapshot.contains_key(&path) {
                snapshot.insert(path.clone(), read_optional(&self.root.join(&path)));
            }
        }

        for (index, change) in changes.iter().enumerate() {
            if let Err(e) = self.apply_one(change) {
                self.restore(&snapshot);
                return Err(ApplyError::InvalidChange(format!(
                    "change {} ({}) on {}: {e}",
                    index + 1,
                    change.operation(),
                    change.path()
                )));
            }
        }

        let mut changed_files = BTreeSet::new();
        for (path, pre) in &snapshot {
            let post = read_optional(&self.root.join(path));
            if &post != pre {
                changed_files.insert(path.clone());
            }
        }
        debug!(changed = changed_files.len(), "apply finished");

        Ok(ApplyOutcome {
            changed_files,
            snapshot,
        })
    }

    /// Restore every snapshotted path to its pre-state
    pub fn restore(&self, snapshot: &Snapshot) {
        for (path, pre) in snapshot {
            let full = self.root.join(path);
            match pre {
                Some(content) => {
                    let _ = std::fs::write(&full, content);
                }
                None => {
                    let _ = std::fs::remove_file(&full);
                }
            }
        }
    }

    fn apply_one(&self, change: &Change) -> Result<(), ApplyError> {
        match change {
            Change::Create { path, content } => {
                let full = self.root.join(path);
                if full.exists() {
                    return Err(ApplyError::AlreadyExists(path.clone()));
                }
                write_creating_dirs(&full, content)
            }
            Change::ReplaceFile { path, content } => {
                write_creating_dirs(&self.root.join(path), content)
            }
            Change::UpsertFunctionJs {
                path,
                function_name,
                content,
            } => {
                let full = self.root.join(path);
                let src = read_required(&full, path)?;
                let (out, changed) = js::upsert_function(&src, function_name, content);
                if changed {
                    std::fs::write(&full, out)?;
                }
                Ok(())
            }
            Change::UpsertCssSelector {
                path,
                selector,
                content,
            } => {
                let full = self.root.join(path);
                let src = read_required(&full, path)?;
                let (out, changed) = css::upsert_selector(&src, selector, content);
                if changed {
                    std::fs::write(&full, out)?;
                }
                Ok(())
            }
            Change::InsertAfterAnchor {
                path,
                anchor,
                content,
                use_regex,
            } => self.insert_at_anchor(path, anchor, content, *use_regex, true),
            Change::InsertBeforeAnchor {
                path,
                anchor,
                content,
                use_regex,
            } => self.insert_at_anchor(path, anchor, content, *use_regex, false),
            Change::AppendIfMissing {
                path,
                signature,
                content,
            } => {
                let full = self.root.join(path);
                let src = read_required(&full, path)?;
                let normalized = src.replace("\r\n", "\n");
                if normalized.contains(&signature.replace("\r\n", "\n")) {
                    return Ok(());
                }
                let mut out = src;
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(content);
                out.push('\n');
                std::fs::write(&full, out)?;
                Ok(())
            }
            Change::Edit { path, edits } => {
                let full = self.root.join(path);
                let mut src = read_required(&full, path)?;
                for edit in edits {
                    if src.contains(&edit.find) {
                        src = src.replace(&edit.find, &edit.replace);
                        continue;
                    }
                    let re = Regex::new(&edit.find).map_err(|e| ApplyError::BadRegex {
                        path: path.clone(),
                        message: e.to_string(),
                    })?;
                    if !re.is_match(&src) {
                        return Err(ApplyError::EditNoMatch {
                            path: path.clone(),
                            find: edit.find.clone(),
                        });
                    }
                    src = re.replace_all(&src, edit.replace.as_str()).to_string();
                }
                std::fs::write(&full, src)?;
                Ok(())
            }
            Change::Delete { path } => {
                let full = self.root.join(path);
                if full.exists() {
                    std::fs::remove_file(&full)?;
                }
                Ok(())
            }
        }
    }

    /// Insert content relative to the first anchor match. The operation is
    /// idempotent: content already present in the file is left alone. A
    /// missing anchor fails rather than silently appending.
    fn insert_at_anchor(
        &self,
        path: &str,
        anchor: &str,
        content: &str,
        use_regex: bool,
        after: bool,
    ) -> Result<(), ApplyError> {
        let full = self.root.join(path);
        let src = read_required(&full, path)?;

        if !content.trim().is_empty() && src.contains(content.trim()) {
            return Ok(());
        }

        let (match_start, match_end) = if use_regex {
            let re = Regex::new(anchor).map_err(|e| ApplyError::BadRegex {
                path: path.to_string(),
                message: e.to_string(),
            })?;
            match re.find(&src) {
                Some(found) => (found.start(), found.end()),
                None => {
                    return Err(ApplyError::AnchorNotFound {
                        path: path.to_string(),
                        anchor: anchor.to_string(),
                    });
                }
            }
        } else {
            match src.find(anchor) {
                Some(start) => (start, start + anchor.len()),
                None => {
                    return Err(ApplyError::AnchorNotFound {
                        path: path.to_string(),
                        anchor: anchor.to_string(),
                    });
                }
            }
        };

        let mut out = String::with_capacity(src.len() + content.len() + 1);
        if after {
            out.push_str(&src[..match_end]);
            out.push('\n');
            out.push_str(content);
            out.push_str(&src[match_end..]);
        } else {
            out.push_str(&src[..match_start]);
            out.push_str(content);
            out.push('\n');
            out.push_str(&src[match_start..]);
        }
        std::fs::write(&full, out)?;
        Ok(())
    }
}

/// Re-scan written files for forbidden placeholders; returns one message per
/// hit. Feeds Gate 5.
pub fn scan_placeholders(
    root: &Path,
    files: &BTreeSet<String>,
    extra_markers: &[String],
) -> Vec<String> {
    let mut hits = Vec::new();
    for path in files {
        let Ok(content) = std::fs::read_to_string(root.join(path)) else {
            continue;
        };
        let lowered = content.to_lowercase();
        for marker in FORBIDDEN_PLACEHOLDERS {
            if lowered.contains(marker) {
                hits.push(format!("{path}: contains forbidden placeholder '{marker}'"));
            }
        }
        for marker in extra_markers {
            if lowered.contains(&marker.to_lowercase()) {
                hits.push(format!("{path}: contains forbidden marker '{marker}'"));
            }
        }
    }
    hits
}

fn read_optional(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

fn read_required(path: &Path, rel: &str) -> Result<String, ApplyError> {
    if !path.exists() {
        return Err(ApplyError::NotFound(rel.to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

fn write_creating_dirs(path: &Path, content: &str) -> Result<(), ApplyError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}
