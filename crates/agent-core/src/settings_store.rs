use std::sync::Arc;

use ai_agent::{Settings, SettingsPatch};
use anyhow::{Context, Result};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::storage::{KeyValueStore, StorageChange};

pub const SETTINGS_KEY: &str = "general-settings";

struct SettingsCache {
    value: Option<Settings>,
    changes: broadcast::Receiver<StorageChange>,
}

impl SettingsCache {
    /// Drops the cached value if the store reported a change to our key.
    fn invalidate_if_changed(&mut self) {
        loop {
            match self.changes.try_recv() {
                Ok(change) if change.key == SETTINGS_KEY => self.value = None,
                Ok(_) => {}
                Err(TryRecvError::Lagged(_)) => self.value = None,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

/// Typed, lazily loaded view of the persisted general settings.
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
    cache: Arc<Mutex<SettingsCache>>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let changes = store.subscribe();
        Self {
            store,
            cache: Arc::new(Mutex::new(SettingsCache {
                value: None,
                changes,
            })),
        }
    }

    pub async fn get_settings(&self) -> Result<Settings> {
        let mut cache = self.cache.lock().await;
        cache.invalidate_if_changed();
        if let Some(settings) = &cache.value {
            return Ok(settings.clone());
        }

        let settings = match self.store.get(SETTINGS_KEY).await? {
            Some(value) => serde_json::from_value(value)
                .context("persisted settings do not match the settings schema")?,
            None => Settings::default(),
        };
        debug!(target: "agent_core", ?settings, "loaded settings");
        cache.value = Some(settings.clone());
        Ok(settings)
    }

    pub async fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings> {
        let lock = self.store.write_lock();
        let _guard = lock.lock().await;
        let current = self.get_settings().await?;
        let next = current.merged(patch);
        self.store
            .set(SETTINGS_KEY, serde_json::to_value(&next)?)
            .await?;
        info!(target: "agent_core", ?patch, "settings updated");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn defaults_when_nothing_is_stored() {
        let store = SettingsStore::new(Arc::new(MemoryStore::new()));
        assert_eq!(store.get_settings().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn older_settings_without_new_flags_still_load() {
        let backing = Arc::new(MemoryStore::new());
        backing
            .set(SETTINGS_KEY, json!({ "maxSteps": 20, "planningInterval": 2 }))
            .await
            .unwrap();
        let settings = SettingsStore::new(backing).get_settings().await.unwrap();
        assert_eq!(settings.max_steps, 20);
        assert!(!settings.fast_js_mode);
        assert!(!settings.allow_code_generation);
    }

    #[tokio::test]
    async fn external_writes_invalidate_the_cache() {
        let backing = Arc::new(MemoryStore::new());
        let store = SettingsStore::new(backing.clone());
        assert!(!store.get_settings().await.unwrap().fast_js_mode);

        backing
            .set(SETTINGS_KEY, json!({ "fastJsMode": true, "allowCodeGeneration": true }))
            .await
            .unwrap();
        assert!(store.get_settings().await.unwrap().fast_js_mode_enabled());
    }

    #[tokio::test]
    async fn update_applies_patch_and_persists() {
        let backing = Arc::new(MemoryStore::new());
        let store = SettingsStore::new(backing.clone());
        store
            .update_settings(&SettingsPatch {
                allow_code_generation: Some(true),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();

        let fresh = SettingsStore::new(backing);
        let settings = fresh.get_settings().await.unwrap();
        assert!(settings.allow_code_generation);
        assert!(!settings.fast_js_mode);
    }
}
