//! Context bundler
//!
//! Loads the target repository's canonical files in full, samples the rest of
//! the tree head-bounded, and produces both a manifest (with fatal errors for
//! missing or empty canonical files) and a capped context slice for prompts.
//! A fatal manifest aborts the pipeline before any agent runs.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::defaults;
use crate::error::Result;
use crate::repo::RepoKind;

/// Fixed vocabulary used to pull interesting snippet lines out of sampled files
pub const SNIPPET_KEYWORDS: &[&str] = &["modal", "session", "toast", "tooltip", "dropdown"];

/// Extensions considered text for sampling purposes
const TEXT_EXTENSIONS: &[&str] = &["html", "css", "js", "json", "md", "txt"];

/// Directories never sampled
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "dist", "build", "implementations", "data"];

/// One file in the context manifest
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub required: bool,
    pub bytes: u64,
    pub chars: usize,
    pub empty: bool,
}

/// Ordered record of what the bundler loaded
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextManifest {
    pub entries: Vec<FileEntry>,
    /// Non-empty iff a required entry is missing or empty
    pub fatal_errors: Vec<String>,
}

impl ContextManifest {
    pub fn is_fatal(&self) -> bool {
        !self.fatal_errors.is_empty()
    }
}

/// Manifest plus the concatenated prompt slice
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub manifest: ContextManifest,
    pub text: String,
}

/// Loads repository context for prompt assembly
pub struct ContextBundler {
    root: PathBuf,
    kind: RepoKind,
    head_bytes: usize,
    max_sampled: usize,
    prompt_cap: usize,
}

impl ContextBundler {
    pub fn new(root: impl Into<PathBuf>, kind: RepoKind) -> Self {
        Self {
            root: root.into(),
            kind,
            head_bytes: defaults::SAMPLE_HEAD_BYTES,
            max_sampled: defaults::MAX_SAMPLED_FILES,
            prompt_cap: defaults::CONTEXT_PROMPT_CAP,
        }
    }

    /// Load canonical files in full and sample the rest of the tree.
    ///
    /// Missing or empty canonical files land in `fatal_errors`; sampling
    /// problems are skipped silently (a sampled file is best-effort context).
    pub fn bundle(&self) -> Result<ContextBundle> {
        let mut manifest = ContextManifest::default();
        let mut sections: Vec<(String, String)> = Vec::new();

        for name in self.kind.canonical_files() {
            let path = self.root.join(&name);
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    let empty = content.trim().is_empty();
                    manifest.entries.push(FileEntry {
                        path: name.clone(),
                        required: true,
                        bytes: content.len() as u64,
                        chars: content.chars().count(),
                        empty,
                    });
                    if empty {
                        manifest
                            .fatal_errors
                            .push(format!("canonical file is empty: {name}"));
                    } else {
                        sections.push((name, content));
                    }
                }
                Err(_) => {
                    manifest.entries.push(FileEntry {
                        path: name.clone(),
                        required: true,
                        bytes: 0,
                        chars: 0,
                        empty: true,
                    });
                    manifest
                        .fatal_errors
                        .push(format!("canonical file is missing: {name}"));
                }
            }
        }

        for path in self.sampled_paths() {
            let Ok(content) = std::fs::read_to_string(self.root.join(&path)) else {
                continue;
            };
            manifest.entries.push(FileEntry {
                path: path.clone(),
                required: false,
                bytes: content.len() as u64,
                chars: content.chars().count(),
                empty: content.trim().is_empty(),
            });
            sections.push((path, sample_text(&content, self.head_bytes)));
        }

        let text = render_sections(&sections, self.prompt_cap);
        debug!(
            entries = manifest.entries.len(),
            fatal = manifest.fatal_errors.len(),
            chars = text.chars().count(),
            "context bundled"
        );
        Ok(ContextBundle { manifest, text })
    }

    /// Non-canonical text files under the root, sorted, bounded
    fn sampled_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !is_skipped_dir(e.path()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let rel = e.path().strip_prefix(&self.root).ok()?;
                let rel = rel.to_string_lossy().replace('\\', "/");
                let ext = e.path().extension()?.to_str()?.to_ascii_lowercase();
                (TEXT_EXTENSIONS.contains(&ext.as_str()) && !self.kind.is_canonical(&rel))
                    .then_some(rel)
            })
            .collect();
        paths.sort();
        paths.truncate(self.max_sampled);
        paths
    }
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| SKIP_DIRS.contains(&name))
}

/// Head-bounded slice of a sampled file plus keyword-matching snippet lines
fn sample_text(content: &str, head_bytes: usize) -> String {
    let head = truncate_chars(content, head_bytes);
    let mut out = head.to_string();

    for line in content[head.len()..].lines() {
        let lower = line.to_ascii_lowercase();
        if SNIPPET_KEYWORDS.iter().any(|k| lower.contains(k)) {
            out.push('\n');
            out.push_str(line.trim_end());
        }
    }
    out
}

fn render_sections(sections: &[(String, String)], cap: usize) -> String {
    let mut text = String::new();
    for (path, content) in sections {
        text.push_str(&format!("=== {path} ===\n{content}\n\n"));
    }
    truncate_chars(&text, cap).to_string()
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character
fn truncate_chars(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontend_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html><header></header></html>").unwrap();
        std::fs::write(dir.path().join("styles.css"), ".header { color: red; }").unwrap();
        std::fs::write(dir.path().join("app.js"), "function init() {}\n").unwrap();
        dir
    }

    #[test]
    fn bundle_loads_canonical_files() {
        let dir = frontend_tree();
        let bundle = ContextBundler::new(dir.path(), RepoKind::Frontend)
            .bundle()
            .unwrap();
        assert!(!bundle.manifest.is_fatal());
        assert_eq!(
            bundle.manifest.entries.iter().filter(|e| e.required).count(),
            3
        );
        assert!(bundle.text.contains("=== index.html ==="));
        assert!(bundle.text.contains("function init()"));
    }

    #[test]
    fn missing_canonical_file_is_fatal() {
        let dir = frontend_tree();
        std::fs::remove_file(dir.path().join("app.js")).unwrap();
        let bundle = ContextBundler::new(dir.path(), RepoKind::Frontend)
            .bundle()
            .unwrap();
        assert!(bundle.manifest.is_fatal());
        assert!(
            bundle.manifest.fatal_errors[0].contains("app.js"),
            "{:?}",
            bundle.manifest.fatal_errors
        );
    }

    #[test]
    fn empty_canonical_file_is_fatal() {
        let dir = frontend_tree();
        std::fs::write(dir.path().join("styles.css"), "   \n").unwrap();
        let bundle = ContextBundler::new(dir.path(), RepoKind::Frontend)
            .bundle()
            .unwrap();
        assert!(bundle.manifest.is_fatal());
        assert!(bundle.manifest.fatal_errors[0].contains("styles.css"));
    }

    #[test]
    fn sampled_files_are_head_bounded_with_snippets() {
        let dir = frontend_tree();
        let long = format!("{}\nconst modalHelper = 1;\n", "x".repeat(3000));
        std::fs::write(dir.path().join("extra.js"), &long).unwrap();

        let bundle = ContextBundler::new(dir.path(), RepoKind::Frontend)
            .bundle()
            .unwrap();
        // The snippet line past the head window still shows up
        assert!(bundle.text.contains("modalHelper"));
        let entry = bundle
            .manifest
            .entries
            .iter()
            .find(|e| e.path == "extra.js")
            .unwrap();
        assert!(!entry.required);
        assert_eq!(entry.bytes as usize, long.len());
    }

    #[test]
    fn prompt_slice_is_capped() {
        let dir = frontend_tree();
        std::fs::write(dir.path().join("index.html"), "y".repeat(40_000)).unwrap();
        let bundle = ContextBundler::new(dir.path(), RepoKind::Frontend)
            .bundle()
            .unwrap();
        assert!(bundle.text.len() <= defaults::CONTEXT_PROMPT_CAP);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo";
        let t = truncate_chars(s, 2);
        assert_eq!(t, "h");
    }
}
