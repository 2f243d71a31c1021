// Artifact store
//
// Durable home for generated snapshots. Layout on disk:
//
//   <root>/<session>/...                 current snapshot (materialized)
//   <root>/<session>/.versions/<id>/...  archived snapshots
//   <root>/<session>/.versions/manifest.json

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::snapshot::{FileSnapshot, SnapshotFile};
use crate::config::constants::VERSIONS_DIR;
use crate::errors::{ForgeError, ForgeResult};

const MANIFEST_FILE: &str = "manifest.json";

/// One archived snapshot, as listed in the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionMeta {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub file_count: usize,
    /// SHA-256 of the archived snapshot
    pub digest: String,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Replace the session's current snapshot wholesale
    async fn write(&self, session_id: &str, snapshot: &FileSnapshot) -> ForgeResult<()>;

    async fn read(&self, session_id: &str) -> ForgeResult<FileSnapshot>;

    /// Archive a snapshot and return its version id
    async fn snapshot_version(
        &self,
        session_id: &str,
        snapshot: &FileSnapshot,
        label: &str,
    ) -> ForgeResult<String>;

    async fn list_versions(&self, session_id: &str) -> ForgeResult<Vec<VersionMeta>>;

    /// Directory the current snapshot is materialized in
    fn materialized_path(&self, session_id: &str) -> ForgeResult<PathBuf>;
}

/// Filesystem-backed store rooted at the workspace directory
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        if session_id.is_empty()
            || session_id.starts_with('.')
            || session_id.contains(['/', '\\', ':'])
        {
            bail!("Invalid session id for workspace: {:?}", session_id);
        }
        Ok(self.root.join(session_id))
    }

    fn versions_dir(&self, session_id: &str) -> Result<PathBuf> {
        Ok(self.session_dir(session_id)?.join(VERSIONS_DIR))
    }

    async fn write_files(dir: &Path, snapshot: &FileSnapshot) -> Result<()> {
        for file in snapshot.files() {
            let path = dir.join(&file.path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::write(&path, &file.content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(())
    }

    async fn write_inner(&self, session_id: &str, snapshot: &FileSnapshot) -> Result<()> {
        let dir = self.session_dir(session_id)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create workspace {}", dir.display()))?;

        // Drop files from the previous snapshot that the new one no longer has
        let keep: HashSet<&str> = snapshot.paths().collect();
        let existing = list_relative_files(dir.clone()).await?;
        for stale in existing.iter().filter(|p| !keep.contains(p.as_str())) {
            let path = dir.join(stale);
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to remove stale file {}", path.display()))?;
        }

        Self::write_files(&dir, snapshot).await
    }

    async fn read_inner(&self, session_id: &str) -> Result<FileSnapshot> {
        let dir = self.session_dir(session_id)?;
        if !dir.is_dir() {
            bail!("No workspace for session {}", session_id);
        }

        let mut files = Vec::new();
        for rel in list_relative_files(dir.clone()).await? {
            let content = tokio::fs::read_to_string(dir.join(&rel))
                .await
                .with_context(|| format!("Failed to read {}", rel))?;
            files.push(SnapshotFile::new(rel, content));
        }
        FileSnapshot::new(files)
    }

    async fn load_manifest(&self, session_id: &str) -> Result<Vec<VersionMeta>> {
        let path = self.versions_dir(session_id)?.join(MANIFEST_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data)
                .with_context(|| format!("Corrupt version manifest {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn snapshot_inner(
        &self,
        session_id: &str,
        snapshot: &FileSnapshot,
        label: &str,
    ) -> Result<String> {
        let versions = self.versions_dir(session_id)?;
        let mut manifest = self.load_manifest(session_id).await?;

        // Millisecond ids, bumped past the last entry so they stay monotonic
        let now = Utc::now();
        let last = manifest
            .last()
            .and_then(|v| v.id.parse::<i64>().ok())
            .unwrap_or(0);
        let id = now.timestamp_millis().max(last + 1).to_string();

        let version_dir = versions.join(&id);
        tokio::fs::create_dir_all(&version_dir)
            .await
            .with_context(|| format!("Failed to create {}", version_dir.display()))?;
        Self::write_files(&version_dir, snapshot).await?;

        manifest.push(VersionMeta {
            id: id.clone(),
            timestamp: now,
            label: label.to_string(),
            file_count: snapshot.len(),
            digest: snapshot.digest(),
        });
        let data = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(versions.join(MANIFEST_FILE), data)
            .await
            .context("Failed to write version manifest")?;

        Ok(id)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write(&self, session_id: &str, snapshot: &FileSnapshot) -> ForgeResult<()> {
        self.write_inner(session_id, snapshot)
            .await
            .map_err(ForgeError::store)
    }

    async fn read(&self, session_id: &str) -> ForgeResult<FileSnapshot> {
        self.read_inner(session_id).await.map_err(ForgeError::store)
    }

    async fn snapshot_version(
        &self,
        session_id: &str,
        snapshot: &FileSnapshot,
        label: &str,
    ) -> ForgeResult<String> {
        let id = self
            .snapshot_inner(session_id, snapshot, label)
            .await
            .map_err(ForgeError::store)?;
        tracing::debug!(session = %session_id, version = %id, "Archived snapshot");
        Ok(id)
    }

    async fn list_versions(&self, session_id: &str) -> ForgeResult<Vec<VersionMeta>> {
        self.load_manifest(session_id)
            .await
            .map_err(ForgeError::store)
    }

    fn materialized_path(&self, session_id: &str) -> ForgeResult<PathBuf> {
        self.session_dir(session_id).map_err(ForgeError::store)
    }
}

/// Relative paths of every file under `dir`, sorted, skipping hidden
/// directories (including `.versions`) and `node_modules`.
pub(crate) async fn list_relative_files(dir: PathBuf) -> Result<Vec<String>> {
    tokio::task::spawn_blocking(move || walk_relative_files(&dir))
        .await
        .context("File walk task panicked")?
}

fn walk_relative_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    // Same exclusions as `validate_relative_path`, so a walk never yields a
    // path a snapshot would reject
    let walker = WalkDir::new(dir).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        !name.starts_with('.') && name != "node_modules"
    });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .context("Walked outside workspace")?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push(rel);
    }
    files.sort();
    Ok(files)
}
