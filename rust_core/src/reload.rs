//! Hot-swappable engine configuration.
//!
//! The prediction path reads an `Arc<EngineConfig>` from a watch channel; a
//! reload loads whatever version the config store's current pointer names
//! and swaps the whole Arc. Readers therefore observe a fully-old or
//! fully-new config, never a partially updated one. Reload is idempotent:
//! with no pending change it is a no-op.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::config::EngineConfig;
use crate::config_store::ConfigVersionManager;
use crate::store::StoreError;

/// Read side: cheap clone, handed to every predictor.
#[derive(Clone)]
pub struct ConfigHandle {
    rx: watch::Receiver<Arc<EngineConfig>>,
}

impl ConfigHandle {
    /// The active config at this instant.
    pub fn current(&self) -> Arc<EngineConfig> {
        self.rx.borrow().clone()
    }

    /// A handle pinned to one config, for tests and offline tools.
    pub fn fixed(config: EngineConfig) -> ConfigHandle {
        let (_tx, rx) = watch::channel(Arc::new(config));
        ConfigHandle { rx }
    }
}

/// Write side: owned by the composition root, invoked by the admin reload
/// listener and by the guardrail after a remediation step.
pub struct ReloadHandle {
    tx: watch::Sender<Arc<EngineConfig>>,
    manager: ConfigVersionManager,
}

impl ReloadHandle {
    /// Re-read the store's current version and swap it in. Returns whether
    /// the active config actually changed.
    pub async fn reload(&self) -> Result<bool, StoreError> {
        let Some(version) = self.manager.current().await? else {
            // No current pointer yet; nothing to swap.
            return Ok(false);
        };
        let next = Arc::new(version.config);
        let changed = **self.tx.borrow() != *next;
        if changed {
            self.tx.send_replace(next);
            metrics::counter!("winprob_guardrail_reloads_total").increment(1);
            info!(version = %version.id, "engine config reloaded");
        }
        Ok(changed)
    }
}

/// Build the reload/read pair seeded with `initial`.
pub fn config_channel(
    initial: EngineConfig,
    manager: ConfigVersionManager,
) -> (ReloadHandle, ConfigHandle) {
    let (tx, rx) = watch::channel(Arc::new(initial));
    (ReloadHandle { tx, manager }, ConfigHandle { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Feature;
    use crate::config_store::MemoryConfigStore;

    #[tokio::test]
    async fn test_reload_swaps_current_version() {
        let manager = ConfigVersionManager::new(Arc::new(MemoryConfigStore::new()));
        manager.save(&EngineConfig::default(), true).await.unwrap();
        let (reload, handle) = config_channel(EngineConfig::default(), manager.clone());

        assert!(handle.current().fatigue.enabled);

        let mut degraded = EngineConfig::default();
        degraded.disable(Feature::Fatigue);
        manager.save(&degraded, false).await.unwrap();

        assert!(reload.reload().await.unwrap());
        assert!(!handle.current().fatigue.enabled);
    }

    #[tokio::test]
    async fn test_reload_without_change_is_noop() {
        let manager = ConfigVersionManager::new(Arc::new(MemoryConfigStore::new()));
        manager.save(&EngineConfig::default(), true).await.unwrap();
        let (reload, handle) = config_channel(EngineConfig::default(), manager);

        assert!(!reload.reload().await.unwrap());
        assert!(!reload.reload().await.unwrap());
        assert!(handle.current().fatigue.enabled);
    }

    #[tokio::test]
    async fn test_reload_with_empty_store_is_noop() {
        let manager = ConfigVersionManager::new(Arc::new(MemoryConfigStore::new()));
        let (reload, _handle) = config_channel(EngineConfig::default(), manager);
        assert!(!reload.reload().await.unwrap());
    }
}
