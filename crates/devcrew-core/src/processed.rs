//! Processed-issue bookkeeping
//!
//! A persistent set of issue numbers already handled, stored as a JSON array.
//! Batch mode consults it; single-issue mode bypasses it. Written once, at
//! successful completion.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Persistent set of handled issue numbers
#[derive(Debug)]
pub struct ProcessedIssues {
    path: PathBuf,
    numbers: BTreeSet<u64>,
}

impl ProcessedIssues {
    /// Load from disk; a missing file is an empty set
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let numbers = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str::<Vec<u64>>(&raw)?.into_iter().collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, numbers })
    }

    pub fn contains(&self, number: u64) -> bool {
        self.numbers.contains(&number)
    }

    /// Record a completed issue and persist immediately
    pub fn mark(&mut self, number: u64) -> Result<()> {
        if self.numbers.insert(number) {
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let numbers: Vec<u64> = self.numbers.iter().copied().collect();
        std::fs::write(&self.path, serde_json::to_string_pretty(&numbers)?)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let processed = ProcessedIssues::load(dir.path().join("data/processed_issues.json")).unwrap();
        assert!(!processed.contains(1));
    }

    #[test]
    fn mark_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/processed_issues.json");

        let mut processed = ProcessedIssues::load(&path).unwrap();
        processed.mark(7).unwrap();
        processed.mark(3).unwrap();
        processed.mark(7).unwrap();

        let reloaded = ProcessedIssues::load(&path).unwrap();
        assert!(reloaded.contains(7));
        assert!(reloaded.contains(3));
        assert!(!reloaded.contains(4));

        let raw = std::fs::read_to_string(&path).unwrap();
        let numbers: Vec<u64> = serde_json::from_str(&raw).unwrap();
        assert_eq!(numbers, vec![3, 7]);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(ProcessedIssues::load(&path).is_err());
    }
}
