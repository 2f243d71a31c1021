// File snapshots
//
// A snapshot is one complete version of a generated app. It is never patched
// in place: every generate/fix call yields a brand-new snapshot and helpers
// that "change" a file return a new value.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::config::constants::ENTRY_FILE;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub path: String,
    pub content: String,
}

impl SnapshotFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Ordered set of files with unique, relative, traversal-free paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FileSnapshot {
    files: Vec<SnapshotFile>,
}

impl FileSnapshot {
    pub fn new(files: Vec<SnapshotFile>) -> Result<Self> {
        let mut seen = HashSet::new();
        for file in &files {
            validate_relative_path(&file.path)?;
            if !seen.insert(file.path.as_str()) {
                bail!("Duplicate file path in snapshot: {}", file.path);
            }
        }
        Ok(Self { files })
    }

    pub fn files(&self) -> &[SnapshotFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&SnapshotFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// The entry document (`index.html`), if present
    pub fn entry(&self) -> Option<&SnapshotFile> {
        self.get(ENTRY_FILE)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }

    /// New snapshot with each file's content passed through `f`
    pub fn map_contents<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&SnapshotFile) -> String,
    {
        Self {
            files: self
                .files
                .iter()
                .map(|file| SnapshotFile::new(file.path.clone(), f(file)))
                .collect(),
        }
    }

    /// SHA-256 over every path and content, in snapshot order
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for file in &self.files {
            hasher.update(file.path.as_bytes());
            hasher.update([0u8]);
            hasher.update(file.content.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

impl<'de> Deserialize<'de> for FileSnapshot {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let files = Vec::<SnapshotFile>::deserialize(deserializer)?;
        FileSnapshot::new(files).map_err(serde::de::Error::custom)
    }
}

/// Reject absolute paths, `..`, empty segments and segments the store keeps
/// for itself or never reads back (dot-prefixed, `node_modules`).
pub fn validate_relative_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("Empty file path");
    }
    if path.starts_with('/') || path.starts_with('\\') || path.contains(':') {
        bail!("Absolute file path not allowed: {}", path);
    }
    for segment in path.split(['/', '\\']) {
        match segment {
            "" => bail!("Empty path segment in: {}", path),
            "." | ".." => bail!("Relative traversal not allowed: {}", path),
            "node_modules" => bail!("node_modules not allowed in snapshot: {}", path),
            s if s.starts_with('.') => bail!("Hidden path not allowed: {}", path),
            _ => {}
        }
    }
    Ok(())
}
