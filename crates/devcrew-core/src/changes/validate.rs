//! Change-set validation
//!
//! All-or-nothing: every change is checked and every problem reported; a
//! single error means nothing is written. Checks cover schema normalization
//! (`file` → `path`), required fields per operation, unified-diff markers,
//! forbidden placeholders, dependency markers, and path safety (relative,
//! no `..`, symlink-resolved strictly inside the repository root, in the
//! allowlist).

use std::path::{Component, Path, PathBuf};

use crate::allowlist::PathAllowlist;
use crate::repo::RepoKind;

use super::{Change, DIFF_MARKERS, FORBIDDEN_PLACEHOLDERS, RawChange, RawChangeSet};

/// Result of validating a raw change set
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    /// Typed changes, in input order; meaningful only when `errors` is empty
    pub changes: Vec<Change>,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate a raw change set against the repository
pub fn validate(
    raw: &RawChangeSet,
    root: &Path,
    allowlist: &PathAllowlist,
    kind: &RepoKind,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    if raw.changes.is_empty() {
        outcome.errors.push("change set is empty".to_string());
        return outcome;
    }

    let dependency_markers = kind.forbidden_dependency_markers();

    for (index, change) in raw.changes.iter().enumerate() {
        let label = format!("change {} ({})", index + 1, change.operation);

        let Some(path) = change.target_path() else {
            outcome.errors.push(format!("{label}: missing path"));
            continue;
        };
        let path = path.replace('\\', "/");

        if let Err(reason) = check_path_safety(&path, root) {
            outcome.errors.push(format!("{label}: {reason}"));
            continue;
        }
        if allowlist.is_forbidden(&path) {
            outcome
                .errors
                .push(format!("{label}: path is under a forbidden prefix: {path}"));
            continue;
        }
        if !kind.is_canonical(&path) && !allowlist.is_allowed(&path) {
            outcome
                .errors
                .push(format!("{label}: path is not in the allowlist: {path}"));
            continue;
        }

        for field in change.content_fields() {
            for marker in DIFF_MARKERS {
                if field.contains(marker) {
                    outcome.errors.push(format!(
                        "{label}: content contains unified-diff marker '{marker}'"
                    ));
                }
            }
            let lowered = field.to_lowercase();
            for marker in FORBIDDEN_PLACEHOLDERS {
                if lowered.contains(marker) {
                    outcome.errors.push(format!(
                        "{label}: content contains forbidden placeholder '{marker}'"
                    ));
                }
            }
            for marker in &dependency_markers {
                if lowered.contains(&marker.to_lowercase()) {
                    outcome.errors.push(format!(
                        "{label}: content introduces a forbidden dependency ('{marker}')"
                    ));
                }
            }
        }

        match to_typed(change, &path) {
            Ok(typed) => outcome.changes.push(typed),
            Err(reason) => outcome.errors.push(format!("{label}: {reason}")),
        }
    }

    if !outcome.errors.is_empty() {
        outcome.changes.clear();
    }
    outcome
}

fn to_typed(raw: &RawChange, path: &str) -> Result<Change, String> {
    let path = path.to_string();
    let content = || {
        raw.content
            .clone()
            .ok_or_else(|| "missing content".to_string())
    };

    match raw.operation.as_str() {
        "create" => Ok(Change::Create {
            path,
            content: content()?,
        }),
        "replace_file" => Ok(Change::ReplaceFile {
            path,
            content: content()?,
        }),
        "upsert_function_js" => Ok(Change::UpsertFunctionJs {
            path,
            function_name: raw
                .function_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| "missing function_name".to_string())?,
            content: content()?,
        }),
        "upsert_css_selector" => Ok(Change::UpsertCssSelector {
            path,
            selector: raw
                .selector
                .clone()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| "missing selector".to_string())?,
            content: content()?,
        }),
        "insert_after_anchor" | "insert_before_anchor" => {
            let anchor = raw
                .anchor
                .clone()
                .filter(|a| !a.is_empty())
                .ok_or_else(|| "missing anchor".to_string())?;
            let content = content()?;
            if raw.operation == "insert_after_anchor" {
                Ok(Change::InsertAfterAnchor {
                    path,
                    anchor,
                    content,
                    use_regex: raw.use_regex,
                })
            } else {
                Ok(Change::InsertBeforeAnchor {
                    path,
                    anchor,
                    content,
                    use_regex: raw.use_regex,
                })
            }
        }
        "append_if_missing" => Ok(Change::AppendIfMissing {
            path,
            signature: raw
                .signature
                .clone()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| "missing signature".to_string())?,
            content: content()?,
        }),
        "edit" => {
            let edits = raw
                .edits
                .clone()
                .filter(|e| !e.is_empty())
                .ok_or_else(|| "missing edits".to_string())?;
            if edits.iter().any(|e| e.find.is_empty()) {
                return Err("edit with empty find".to_string());
            }
            Ok(Change::Edit { path, edits })
        }
        "delete" => Ok(Change::Delete { path }),
        "" => Err("missing operation".to_string()),
        other => Err(format!("unknown operation: {other}")),
    }
}

/// Path-safety check: relative, no `..`, resolves (after symlinks) strictly
/// inside the repository root.
fn check_path_safety(path: &str, root: &Path) -> Result<(), String> {
    if path.trim().is_empty() {
        return Err("empty path".to_string());
    }
    let candidate = Path::new(path);
    if candidate.is_absolute() || path.starts_with('/') {
        return Err(format!("absolute paths are rejected: {path}"));
    }
    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                return Err(format!("parent traversal ('..') is rejected: {path}"));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(format!("absolute paths are rejected: {path}"));
            }
            _ => {}
        }
    }

    let resolved = resolve_with_symlinks(root, candidate);
    let resolved_root = dunce::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    if !resolved.starts_with(&resolved_root) {
        return Err(format!("path escapes the repository root: {path}"));
    }
    Ok(())
}

/// Resolve `root/rel` through symlinks by canonicalizing the deepest existing
/// ancestor and re-appending the remainder.
fn resolve_with_symlinks(root: &Path, rel: &Path) -> PathBuf {
    let joined = root.join(rel);
    let mut existing = joined.as_path();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();

    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                remainder.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = dunce::canonicalize(existing).unwrap_or_else(|_| existing.to_path_buf());
    for part in remainder.iter().rev() {
        resolved.push(part);
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{FindReplace, parse_changeset};

    fn frontend_setup() -> (tempfile::TempDir, PathAllowlist, RepoKind) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("app.js"), "function init() {}").unwrap();
        std::fs::write(dir.path().join("styles.css"), ".x{}").unwrap();
        std::fs::write(dir.path().join("helpers.js"), "x").unwrap();
        let kind = RepoKind::Frontend;
        let allowlist = PathAllowlist::snapshot(dir.path(), &kind).unwrap();
        (dir, allowlist, kind)
    }

    fn raw(json: &str) -> RawChangeSet {
        parse_changeset(json).unwrap()
    }

    #[test]
    fn accepts_file_alias_and_normalizes_to_path() {
        let (dir, allowlist, kind) = frontend_setup();
        let set = raw(r#"{"changes": [{"operation": "replace_file", "file": "app.js", "content": "function init() { run(); }"}]}"#);
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(outcome.is_valid(), "{:?}", outcome.errors);
        assert_eq!(outcome.changes[0].path(), "app.js");
    }

    #[test]
    fn rejects_absolute_paths() {
        let (dir, allowlist, kind) = frontend_setup();
        let set = raw(r#"{"changes": [{"operation": "replace_file", "path": "/etc/hosts", "content": "x"}]}"#);
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(!outcome.is_valid());
        assert!(outcome.errors[0].contains("absolute"), "{:?}", outcome.errors);
        assert!(outcome.changes.is_empty());
    }

    #[test]
    fn rejects_parent_traversal() {
        let (dir, allowlist, kind) = frontend_setup();
        let set = raw(r#"{"changes": [{"operation": "create", "path": "../escape.js", "content": "x"}]}"#);
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(!outcome.is_valid());
        assert!(outcome.errors[0].contains(".."));
    }

    #[test]
    fn rejects_symlink_escape() {
        #[cfg(unix)]
        {
            let (dir, _, kind) = frontend_setup();
            let outside = tempfile::tempdir().unwrap();
            std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
            let allowlist = PathAllowlist::from_parts(
                ["link/leak.js".to_string()],
                kind.canonical_files(),
                kind.forbidden_prefixes(),
            );
            let set = raw(r#"{"changes": [{"operation": "create", "path": "link/leak.js", "content": "x"}]}"#);
            let outcome = validate(&set, dir.path(), &allowlist, &kind);
            assert!(!outcome.is_valid());
            assert!(outcome.errors[0].contains("escapes"), "{:?}", outcome.errors);
        }
    }

    #[test]
    fn rejects_diff_markers_in_content() {
        let (dir, allowlist, kind) = frontend_setup();
        for marker in ["diff --git a b", "--- a/app.js", "+++ b/app.js", "@@ -1 +1 @@"] {
            let set = RawChangeSet {
                changes: vec![RawChange {
                    operation: "replace_file".to_string(),
                    path: Some("app.js".to_string()),
                    content: Some(format!("code\n{marker}\ncode")),
                    ..Default::default()
                }],
                notes: String::new(),
            };
            let outcome = validate(&set, dir.path(), &allowlist, &kind);
            assert!(!outcome.is_valid(), "marker {marker} accepted");
            assert!(outcome.errors[0].contains("unified-diff"));
        }
    }

    #[test]
    fn rejects_placeholders_case_insensitively() {
        let (dir, allowlist, kind) = frontend_setup();
        let set = raw(r#"{"changes": [{"operation": "replace_file", "path": "app.js", "content": "// ToDo: implement"}]}"#);
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(!outcome.is_valid());
        assert!(outcome.errors[0].contains("todo"));
    }

    #[test]
    fn rejects_forbidden_dependency_markers() {
        let (dir, allowlist, kind) = frontend_setup();
        let set = raw(r#"{"changes": [{"operation": "replace_file", "path": "app.js", "content": "const axios = require('axios');"}]}"#);
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(!outcome.is_valid());
        assert!(outcome.errors[0].contains("dependency"));
    }

    #[test]
    fn rejects_forbidden_prefixes_and_unknown_paths() {
        let (dir, allowlist, kind) = frontend_setup();
        let set = raw(r#"{"changes": [{"operation": "create", "path": "backend/api.js", "content": "x"}]}"#);
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(outcome.errors[0].contains("forbidden prefix"));

        let set = raw(r#"{"changes": [{"operation": "create", "path": "mystery.js", "content": "x"}]}"#);
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(outcome.errors[0].contains("allowlist"));
    }

    #[test]
    fn canonical_files_are_auto_allowed() {
        let (dir, _, kind) = frontend_setup();
        // An allowlist that never saw index.html still admits it
        let allowlist = PathAllowlist::from_parts(
            std::iter::empty(),
            kind.canonical_files(),
            kind.forbidden_prefixes(),
        );
        let set = raw(r#"{"changes": [{"operation": "replace_file", "path": "index.html", "content": "<html><body></body></html>"}]}"#);
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(outcome.is_valid(), "{:?}", outcome.errors);
    }

    #[test]
    fn required_fields_are_enforced_per_operation() {
        let (dir, allowlist, kind) = frontend_setup();
        let set = raw(r#"{"changes": [{"operation": "upsert_function_js", "path": "app.js", "content": "function a() {}"}]}"#);
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(outcome.errors[0].contains("function_name"));

        let set = raw(r#"{"changes": [{"operation": "insert_after_anchor", "path": "index.html", "content": "<p>hi</p>"}]}"#);
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(outcome.errors[0].contains("anchor"));

        let set = raw(r#"{"changes": [{"operation": "teleport", "path": "app.js"}]}"#);
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(outcome.errors[0].contains("unknown operation"));
    }

    #[test]
    fn one_bad_change_invalidates_the_whole_set() {
        let (dir, allowlist, kind) = frontend_setup();
        let set = RawChangeSet {
            changes: vec![
                RawChange {
                    operation: "replace_file".to_string(),
                    path: Some("app.js".to_string()),
                    content: Some("function init() { run(); }".to_string()),
                    ..Default::default()
                },
                RawChange {
                    operation: "edit".to_string(),
                    path: Some("helpers.js".to_string()),
                    edits: Some(vec![FindReplace {
                        find: String::new(),
                        replace: "y".to_string(),
                    }]),
                    ..Default::default()
                },
            ],
            notes: String::new(),
        };
        let outcome = validate(&set, dir.path(), &allowlist, &kind);
        assert!(!outcome.is_valid());
        assert!(outcome.changes.is_empty());
    }

    #[test]
    fn empty_change_set_is_an_error() {
        let (dir, allowlist, kind) = frontend_setup();
        let outcome = validate(&RawChangeSet::default(), dir.path(), &allowlist, &kind);
        assert!(!outcome.is_valid());
    }
}
