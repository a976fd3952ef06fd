//! Structured repository changes
//!
//! The Developer agent emits a single JSON change list. It is parsed here
//! into tagged variants per operation, validated all-or-nothing against the
//! path allowlist and content rules, and applied idempotently with a
//! snapshot-based rollback.

mod apply;
mod css;
mod js;
mod validate;

pub use apply::{Applier, ApplyOutcome, Snapshot, scan_placeholders};
pub use css::{selector_exists, upsert_selector};
pub use js::{function_exists, upsert_function};
pub use validate::{ValidationOutcome, validate};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::outputs::extract_json_object;

/// Unified-diff markers rejected in change content
pub const DIFF_MARKERS: &[&str] = &["diff --git", "--- a/", "+++ b/", "@@"];

/// Forbidden placeholder substrings (matched case-insensitively)
pub const FORBIDDEN_PLACEHOLDERS: &[&str] =
    &["todo", "placeholder", "logic to ", "tbd", "replace_me", "fill in"];

/// One literal-then-regex edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindReplace {
    pub find: String,
    pub replace: String,
}

/// A validated repository mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Create {
        path: String,
        content: String,
    },
    ReplaceFile {
        path: String,
        content: String,
    },
    UpsertFunctionJs {
        path: String,
        function_name: String,
        content: String,
    },
    UpsertCssSelector {
        path: String,
        selector: String,
        content: String,
    },
    InsertAfterAnchor {
        path: String,
        anchor: String,
        content: String,
        use_regex: bool,
    },
    InsertBeforeAnchor {
        path: String,
        anchor: String,
        content: String,
        use_regex: bool,
    },
    AppendIfMissing {
        path: String,
        signature: String,
        content: String,
    },
    Edit {
        path: String,
        edits: Vec<FindReplace>,
    },
    Delete {
        path: String,
    },
}

impl Change {
    pub fn operation(&self) -> &'static str {
        match self {
            Change::Create { .. } => "create",
            Change::ReplaceFile { .. } => "replace_file",
            Change::UpsertFunctionJs { .. } => "upsert_function_js",
            Change::UpsertCssSelector { .. } => "upsert_css_selector",
            Change::InsertAfterAnchor { .. } => "insert_after_anchor",
            Change::InsertBeforeAnchor { .. } => "insert_before_anchor",
            Change::AppendIfMissing { .. } => "append_if_missing",
            Change::Edit { .. } => "edit",
            Change::Delete { .. } => "delete",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Change::Create { path, .. }
            | Change::ReplaceFile { path, .. }
            | Change::UpsertFunctionJs { path, .. }
            | Change::UpsertCssSelector { path, .. }
            | Change::InsertAfterAnchor { path, .. }
            | Change::InsertBeforeAnchor { path, .. }
            | Change::AppendIfMissing { path, .. }
            | Change::Edit { path, .. }
            | Change::Delete { path } => path,
        }
    }
}

/// A raw change as the Developer emitted it, before validation.
///
/// Both `path` and `file` are accepted; validation normalizes to `path`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawChange {
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub anchor: Option<String>,
    #[serde(default)]
    pub use_regex: bool,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub edits: Option<Vec<FindReplace>>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

impl RawChange {
    /// The target path after `file` → `path` normalization
    pub fn target_path(&self) -> Option<&str> {
        self.path.as_deref().or(self.file.as_deref())
    }

    /// Content-bearing fields, scanned for diff markers and placeholders
    pub fn content_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for field in [&self.content, &self.before, &self.after] {
            if let Some(value) = field {
                fields.push(value);
            }
        }
        if let Some(edits) = &self.edits {
            for edit in edits {
                fields.push(&edit.replace);
            }
        }
        fields
    }
}

/// The Developer's change list, as emitted
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawChangeSet {
    #[serde(default)]
    pub changes: Vec<RawChange>,
    #[serde(default)]
    pub notes: String,
}

/// Parse the Developer's textual output into a raw change set.
///
/// Accepts either `{"changes": [...], "notes": "..."}` or a bare array of
/// changes, with or without surrounding prose and code fences.
pub fn parse_changeset(text: &str) -> Result<RawChangeSet> {
    let json = extract_json_object(text)
        .ok_or_else(|| Error::Provider("developer output contains no JSON".to_string()))?;

    if json.trim_start().starts_with('[') {
        let changes: Vec<RawChange> = serde_json::from_str(json)
            .map_err(|e| Error::Provider(format!("malformed change list: {e}")))?;
        return Ok(RawChangeSet {
            changes,
            notes: String::new(),
        });
    }

    serde_json::from_str(json).map_err(|e| Error::Provider(format!("malformed change set: {e}")))
}
