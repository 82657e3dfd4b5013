//! Versioned engine-config storage.
//!
//! Configs are never mutated in place: every save produces an immutable
//! timestamped `ConfigVersion`, and the active version is selected by a
//! single atomically swapped "current" pointer. Readers therefore see a
//! fully-old or fully-new config, never a torn one.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::store::StoreError;

/// Immutable, timestamped snapshot of an `EngineConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigVersion {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Explicitly validated as a rollback target.
    pub rollback_safe: bool,
    pub config: EngineConfig,
}

impl ConfigVersion {
    fn new(config: EngineConfig, rollback_safe: bool) -> Self {
        let created_at = Utc::now();
        let id = format!(
            "v{:013}-{}",
            created_at.timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        Self {
            id,
            created_at,
            rollback_safe,
            config,
        }
    }
}

/// Backing storage for config versions and the current pointer.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn put_version(&self, version: &ConfigVersion) -> Result<(), StoreError>;
    async fn get_version(&self, id: &str) -> Result<Option<ConfigVersion>, StoreError>;
    /// All versions, newest first.
    async fn list_versions(&self) -> Result<Vec<ConfigVersion>, StoreError>;
    async fn delete_version(&self, id: &str) -> Result<(), StoreError>;
    /// Atomically repoint the current version.
    async fn set_current(&self, id: &str) -> Result<(), StoreError>;
    async fn current_id(&self) -> Result<Option<String>, StoreError>;
}

// ============================================================================
// File-backed store
// ============================================================================

/// One JSON file per version under `<root>/<name>/versions/`, plus a
/// `CURRENT` pointer file written via temp-file + rename so the swap is
/// atomic on the filesystem.
pub struct FsConfigStore {
    dir: PathBuf,
}

impl FsConfigStore {
    pub fn new(root: impl Into<PathBuf>, name: &str) -> Self {
        Self {
            dir: root.into().join(name),
        }
    }

    fn versions_dir(&self) -> PathBuf {
        self.dir.join("versions")
    }

    fn version_path(&self, id: &str) -> PathBuf {
        self.versions_dir().join(format!("{}.json", id))
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join("CURRENT")
    }

    async fn write_atomic(&self, path: &PathBuf, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for FsConfigStore {
    async fn put_version(&self, version: &ConfigVersion) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(self.versions_dir()).await?;
        let bytes = serde_json::to_vec_pretty(version)?;
        self.write_atomic(&self.version_path(&version.id), &bytes)
            .await
    }

    async fn get_version(&self, id: &str) -> Result<Option<ConfigVersion>, StoreError> {
        match tokio::fs::read(self.version_path(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_versions(&self) -> Result<Vec<ConfigVersion>, StoreError> {
        let mut versions = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.versions_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(versions),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let bytes = tokio::fs::read(&path).await?;
                match serde_json::from_slice::<ConfigVersion>(&bytes) {
                    Ok(version) => versions.push(version),
                    Err(e) => warn!(path = %path.display(), "skipping unreadable config version: {}", e),
                }
            }
        }

        versions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(versions)
    }

    async fn delete_version(&self, id: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.version_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_current(&self, id: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        self.write_atomic(&self.current_path(), id.as_bytes()).await
    }

    async fn current_id(&self) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.current_path()).await {
            Ok(id) => Ok(Some(id.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory store used by tests and embedded runs.
#[derive(Default)]
pub struct MemoryConfigStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    versions: Vec<ConfigVersion>,
    current: Option<String>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn put_version(&self, version: &ConfigVersion) -> Result<(), StoreError> {
        self.inner.lock().versions.push(version.clone());
        Ok(())
    }

    async fn get_version(&self, id: &str) -> Result<Option<ConfigVersion>, StoreError> {
        Ok(self
            .inner
            .lock()
            .versions
            .iter()
            .find(|v| v.id == id)
            .cloned())
    }

    async fn list_versions(&self) -> Result<Vec<ConfigVersion>, StoreError> {
        let mut versions = self.inner.lock().versions.clone();
        versions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(versions)
    }

    async fn delete_version(&self, id: &str) -> Result<(), StoreError> {
        self.inner.lock().versions.retain(|v| v.id != id);
        Ok(())
    }

    async fn set_current(&self, id: &str) -> Result<(), StoreError> {
        self.inner.lock().current = Some(id.to_string());
        Ok(())
    }

    async fn current_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().current.clone())
    }
}

// ============================================================================
// Version manager
// ============================================================================

/// Save/list/rollback/prune operations over a `ConfigStore`.
///
/// Storage failures propagate as `StoreError` — configuration persistence
/// has no silent fallback.
#[derive(Clone)]
pub struct ConfigVersionManager {
    store: Arc<dyn ConfigStore>,
}

impl ConfigVersionManager {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Persist a new immutable version and point "current" at it.
    pub async fn save(
        &self,
        config: &EngineConfig,
        mark_safe: bool,
    ) -> Result<String, StoreError> {
        let version = ConfigVersion::new(config.clone(), mark_safe);
        self.store.put_version(&version).await?;
        self.store.set_current(&version.id).await?;
        info!(version = %version.id, rollback_safe = mark_safe, "saved config version");
        Ok(version.id)
    }

    /// The active config, if a current version exists.
    pub async fn current(&self) -> Result<Option<ConfigVersion>, StoreError> {
        match self.store.current_id().await? {
            Some(id) => self.store.get_version(&id).await,
            None => Ok(None),
        }
    }

    /// Rollback-safe versions, newest first.
    pub async fn list_safe_versions(&self) -> Result<Vec<ConfigVersion>, StoreError> {
        Ok(self
            .store
            .list_versions()
            .await?
            .into_iter()
            .filter(|v| v.rollback_safe)
            .collect())
    }

    /// Point "current" at a specific version. Fails without side effects if
    /// the target is missing or was never marked rollback-safe — rolling
    /// back to an unvalidated snapshot is not allowed.
    pub async fn rollback_to_version(&self, id: &str) -> Result<(), StoreError> {
        let version = self
            .store
            .get_version(id)
            .await?
            .ok_or_else(|| StoreError::VersionNotFound(id.to_string()))?;
        if !version.rollback_safe {
            return Err(StoreError::VersionNotSafe(id.to_string()));
        }
        self.store.set_current(id).await?;
        info!(version = %id, "rolled back config");
        Ok(())
    }

    /// Roll back to the newest safe version. Returns `None` when no safe
    /// version exists (the caller escalates).
    pub async fn rollback_to_latest_safe(&self) -> Result<Option<String>, StoreError> {
        match self.list_safe_versions().await?.into_iter().next() {
            Some(version) => {
                self.store.set_current(&version.id).await?;
                info!(version = %version.id, "rolled back config to latest safe");
                Ok(Some(version.id))
            }
            None => Ok(None),
        }
    }

    /// Retain only the newest `keep_count` versions. The current version is
    /// never deleted; a store holding fewer versions is left untouched.
    pub async fn cleanup(&self, keep_count: usize) -> Result<usize, StoreError> {
        let versions = self.store.list_versions().await?;
        if versions.len() <= keep_count {
            return Ok(0);
        }
        let current = self.store.current_id().await?;
        let mut deleted = 0;
        for version in versions.into_iter().skip(keep_count) {
            if Some(&version.id) == current.as_ref() {
                continue;
            }
            self.store.delete_version(&version.id).await?;
            deleted += 1;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Feature;

    fn temp_store() -> FsConfigStore {
        let root = std::env::temp_dir().join(format!("winprob-cfg-{}", Uuid::new_v4().simple()));
        FsConfigStore::new(root, "engine")
    }

    async fn save_n(manager: &ConfigVersionManager, n: usize, safe: bool) -> Vec<String> {
        let mut ids = Vec::new();
        for _ in 0..n {
            // Distinct timestamps keep the newest-first ordering deterministic.
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            ids.push(manager.save(&EngineConfig::default(), safe).await.unwrap());
        }
        ids
    }

    #[tokio::test]
    async fn test_save_sets_current() {
        for store in [
            Arc::new(MemoryConfigStore::new()) as Arc<dyn ConfigStore>,
            Arc::new(temp_store()) as Arc<dyn ConfigStore>,
        ] {
            let manager = ConfigVersionManager::new(store);
            let id = manager.save(&EngineConfig::default(), true).await.unwrap();
            let current = manager.current().await.unwrap().unwrap();
            assert_eq!(current.id, id);
            assert!(current.rollback_safe);
        }
    }

    #[tokio::test]
    async fn test_list_safe_versions_newest_first() {
        let manager = ConfigVersionManager::new(Arc::new(MemoryConfigStore::new()));
        let ids = save_n(&manager, 3, true).await;
        save_n(&manager, 1, false).await;

        let safe = manager.list_safe_versions().await.unwrap();
        assert_eq!(safe.len(), 3);
        assert_eq!(safe[0].id, ids[2]);
        assert_eq!(safe[2].id, ids[0]);
    }

    #[tokio::test]
    async fn test_rollback_guard_rejects_unsafe_version() {
        let manager = ConfigVersionManager::new(Arc::new(MemoryConfigStore::new()));
        let safe_id = manager.save(&EngineConfig::default(), true).await.unwrap();

        let mut degraded = EngineConfig::default();
        degraded.disable(Feature::Fatigue);
        let unsafe_id = manager.save(&degraded, false).await.unwrap();

        // Current points at the unsafe version; a rollback onto it must fail
        // and must not move the pointer.
        let err = manager.rollback_to_version(&unsafe_id).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionNotSafe(_)));
        assert_eq!(manager.current().await.unwrap().unwrap().id, unsafe_id);

        manager.rollback_to_version(&safe_id).await.unwrap();
        assert_eq!(manager.current().await.unwrap().unwrap().id, safe_id);
    }

    #[tokio::test]
    async fn test_rollback_unknown_version() {
        let manager = ConfigVersionManager::new(Arc::new(MemoryConfigStore::new()));
        manager.save(&EngineConfig::default(), true).await.unwrap();
        let err = manager.rollback_to_version("v000-missing").await.unwrap_err();
        assert!(matches!(err, StoreError::VersionNotFound(_)));
    }

    #[tokio::test]
    async fn test_rollback_to_latest_safe() {
        let manager = ConfigVersionManager::new(Arc::new(MemoryConfigStore::new()));
        assert_eq!(manager.rollback_to_latest_safe().await.unwrap(), None);

        let ids = save_n(&manager, 2, true).await;
        save_n(&manager, 1, false).await;

        let rolled = manager.rollback_to_latest_safe().await.unwrap();
        assert_eq!(rolled, Some(ids[1].clone()));
        assert_eq!(manager.current().await.unwrap().unwrap().id, ids[1]);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_newest_and_current() {
        let manager = ConfigVersionManager::new(Arc::new(MemoryConfigStore::new()));
        let ids = save_n(&manager, 5, true).await;

        // Current is the newest; pruning to 2 removes the three oldest.
        let deleted = manager.cleanup(2).await.unwrap();
        assert_eq!(deleted, 3);
        let remaining = manager.list_safe_versions().await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].id, ids[4]);

        // Fewer versions than the keep count is a silent no-op.
        assert_eq!(manager.cleanup(10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fs_store_round_trip_and_pointer_swap() {
        let store = Arc::new(temp_store());
        let manager = ConfigVersionManager::new(store.clone());

        let first = manager.save(&EngineConfig::default(), true).await.unwrap();
        let mut tweaked = EngineConfig::default();
        tweaked.smoothing.base_alpha = 0.5;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = manager.save(&tweaked, false).await.unwrap();

        // The pointer file holds exactly one id at any observation point.
        assert_eq!(store.current_id().await.unwrap(), Some(second.clone()));
        let loaded = manager.current().await.unwrap().unwrap();
        assert_eq!(loaded.config.smoothing.base_alpha, 0.5);

        manager.rollback_to_version(&first).await.unwrap();
        assert_eq!(store.current_id().await.unwrap(), Some(first));
    }
}
