use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::keys;
use crate::error::Result;
use crate::store::{load_json, load_json_or_default, save_json, KeyValueStore};

/// Permanent record of rule/market combinations that already fired.
///
/// Persisted as a JSON list of history keys under `alert_history:v1`, separate
/// from the rule list, so deleting a rule does not re-arm it.
pub struct AlertHistoryTracker {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl AlertHistoryTracker {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Every fired key. Missing or corrupt data reads as an empty set.
    pub async fn load(&self) -> HashSet<String> {
        let keys: Vec<String> = load_json_or_default(self.kv.as_ref(), keys::ALERT_HISTORY).await;
        keys.into_iter().collect()
    }

    /// Whether `key` already fired. A failed read is returned, never reported
    /// as "not fired".
    pub async fn has_fired(&self, key: &str) -> Result<bool> {
        Ok(self.try_load().await?.contains(key))
    }

    pub async fn mark_fired(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut fired = self.try_load().await?;
        if fired.insert(key.to_string()) {
            self.write(&fired).await?;
        }
        Ok(())
    }

    /// Drop one key so its rule can fire again. Returns whether it was present.
    pub async fn forget(&self, key: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut fired = self.try_load().await?;
        let removed = fired.remove(key);
        if removed {
            self.write(&fired).await?;
        }
        Ok(removed)
    }

    async fn try_load(&self) -> Result<HashSet<String>> {
        let keys: Vec<String> = load_json(self.kv.as_ref(), keys::ALERT_HISTORY).await?;
        Ok(keys.into_iter().collect())
    }

    async fn write(&self, fired: &HashSet<String>) -> Result<()> {
        let mut sorted: Vec<&String> = fired.iter().collect();
        sorted.sort();
        save_json(self.kv.as_ref(), keys::ALERT_HISTORY, &sorted).await
    }
}
