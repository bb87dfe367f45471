//! Local snapshot persistence
//!
//! Saves the whole workspace tree, including saved flags and the GUI state,
//! as JSON so unsent edits survive a restart. Uses atomic writes (write to
//! temp file, then rename) to prevent corruption.
//!
//! Storage location: `<data_dir>/workspaces.json` (configurable via `Config`)

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use super::error::{StorageError, StorageResult};
use crate::config::Config;
use crate::store::WorkspaceStore;

/// Snapshot of the workspace store on disk
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file at the configured location
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.snapshot_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a snapshot exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Save the store using an atomic write
    pub fn save(&self, store: &WorkspaceStore) -> Result<()> {
        let json = serde_json::to_vec_pretty(store).context("Failed to serialize workspaces")?;
        atomic_write(&self.path, &json)
            .with_context(|| format!("Failed to save snapshot to {:?}", self.path))?;
        Ok(())
    }

    /// Load the store from disk
    ///
    /// Returns `None` if there is no snapshot. A snapshot that cannot be
    /// parsed is moved aside to `<name>.corrupt.backup` and reported as
    /// [`StorageError::CorruptSnapshot`].
    pub fn load(&self) -> Result<Option<WorkspaceStore>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)
            .map_err(|e| StorageError::from_read_io(e, self.path.clone()))?;

        match serde_json::from_slice(&bytes) {
            Ok(store) => Ok(Some(store)),
            Err(e) => {
                let backup_path = self.backup_path();
                fs::rename(&self.path, &backup_path)
                    .with_context(|| format!("Failed to back up corrupt snapshot {:?}", self.path))?;
                warn!("Corrupt snapshot moved to {:?}", backup_path);
                Err(StorageError::CorruptSnapshot {
                    path: self.path.clone(),
                    backup_path,
                    details: e.to_string(),
                }
                .into())
            }
        }
    }

    /// Load the snapshot or start with an empty store
    pub fn load_or_default(&self) -> Result<WorkspaceStore> {
        Ok(self.load()?.unwrap_or_default())
    }

    /// Delete the snapshot
    pub fn delete(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to delete {:?}", self.path))?;
        }
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".corrupt.backup");
        PathBuf::from(name)
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    // Same directory, so the rename stays on one filesystem
    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_write_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| StorageError::from_write_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| StorageError::from_write_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::Rename {
        from: temp_path,
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkspaceId;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = SnapshotFile::from_config(&test_config(&temp_dir));

        // Initially no snapshot
        assert!(!snapshot.exists());
        assert!(snapshot.load().unwrap().is_none());

        let mut store = WorkspaceStore::new();
        let ws = store.create_workspace(7, "Homework");
        let file = store.create_file(ws, "Main.java", "class Main {}").unwrap();
        store.set_current_workspace(Some(ws));
        store.gui_state_mut().set(json!({"theme": "dark"}));

        snapshot.save(&store).unwrap();
        assert!(snapshot.exists());

        let loaded = snapshot.load().unwrap().unwrap();
        assert_eq!(loaded, store);
        assert!(!loaded.file(file).unwrap().is_saved());
        assert!(loaded.gui_state().is_dirty());
    }

    #[test]
    fn test_placeholder_counter_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = SnapshotFile::from_config(&test_config(&temp_dir));

        let mut store = WorkspaceStore::new();
        let first = store.create_workspace(7, "A");
        snapshot.save(&store).unwrap();

        let mut loaded = snapshot.load_or_default().unwrap();
        let second = loaded.create_workspace(7, "B");
        assert_ne!(first, second);
        assert_eq!(second, WorkspaceId(first.0 - 1));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = SnapshotFile::new(temp_dir.path().join("missing.json"));
        let store = snapshot.load_or_default().unwrap();
        assert!(store.workspaces().is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_backed_up() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = SnapshotFile::from_config(&test_config(&temp_dir));
        fs::write(snapshot.path(), b"{ not json").unwrap();

        let err = snapshot.load().unwrap_err();
        let storage_err = err.downcast_ref::<StorageError>().unwrap();
        assert!(matches!(storage_err, StorageError::CorruptSnapshot { .. }));
        assert!(storage_err.hint().is_some());

        assert!(!snapshot.exists());
        assert!(temp_dir
            .path()
            .join("workspaces.json.corrupt.backup")
            .exists());
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let snapshot = SnapshotFile::from_config(&test_config(&temp_dir));
        snapshot.save(&WorkspaceStore::new()).unwrap();

        snapshot.delete().unwrap();
        assert!(!snapshot.exists());
        // Deleting twice is fine
        snapshot.delete().unwrap();
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir
            .path()
            .join("a")
            .join("b")
            .join("c")
            .join("file.txt");

        atomic_write(&nested_path, b"test data").unwrap();

        assert!(nested_path.exists());
        let content = fs::read_to_string(&nested_path).unwrap();
        assert_eq!(content, "test data");
    }
}
