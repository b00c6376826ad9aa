use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::keys;
use crate::error::Result;
use crate::store::{load_json, load_json_or_default, save_json, KeyValueStore};
use crate::types::WatchlistItem;

/// Markets the user follows. Persisted as a JSON list under `watchlist:v1`.
pub struct WatchlistStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl WatchlistStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Watched markets. Missing or corrupt data reads as an empty list and
    /// malformed entries are dropped.
    pub async fn list(&self) -> Vec<WatchlistItem> {
        let raw: Value = load_json_or_default(self.kv.as_ref(), keys::WATCHLIST).await;
        decode_items(raw)
    }

    pub async fn contains(&self, platform: &str, market_id: &str) -> bool {
        self.list().await.iter().any(|i| i.is_market(platform, market_id))
    }

    /// Returns false when the market was already watched.
    pub async fn add(&self, platform: &str, market_id: &str, title: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.load().await?;
        if items.iter().any(|i| i.is_market(platform, market_id)) {
            return Ok(false);
        }
        push_item(&mut items, platform, market_id, title);
        self.write(&items).await?;
        Ok(true)
    }

    /// Returns false when the market was not watched.
    pub async fn remove(&self, platform: &str, market_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.load().await?;
        if !remove_item(&mut items, platform, market_id) {
            return Ok(false);
        }
        self.write(&items).await?;
        Ok(true)
    }

    /// Flip membership. Returns true when the market is watched afterwards.
    pub async fn toggle(&self, platform: &str, market_id: &str, title: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.load().await?;
        let watched = if remove_item(&mut items, platform, market_id) {
            false
        } else {
            push_item(&mut items, platform, market_id, title);
            true
        };
        self.write(&items).await?;
        Ok(watched)
    }

    /// Current list for a read-modify-write. A failed read is returned.
    async fn load(&self) -> Result<Vec<WatchlistItem>> {
        let raw: Value = load_json(self.kv.as_ref(), keys::WATCHLIST).await?;
        Ok(decode_items(raw))
    }

    async fn write(&self, items: &[WatchlistItem]) -> Result<()> {
        save_json(self.kv.as_ref(), keys::WATCHLIST, items).await
    }
}

fn push_item(items: &mut Vec<WatchlistItem>, platform: &str, market_id: &str, title: &str) {
    items.push(WatchlistItem {
        platform: platform.to_string(),
        market_id: market_id.to_string(),
        title: title.to_string(),
        added_at: Utc::now(),
    });
}

fn remove_item(items: &mut Vec<WatchlistItem>, platform: &str, market_id: &str) -> bool {
    let before = items.len();
    items.retain(|i| !i.is_market(platform, market_id));
    items.len() < before
}

/// Decode entry by entry so one malformed record does not hide the rest.
fn decode_items(raw: Value) -> Vec<WatchlistItem> {
    let items = match raw {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        other => {
            warn!(key = keys::WATCHLIST, "Stored watchlist is not a list: {other}");
            return Vec::new();
        }
    };

    let total = items.len();
    let decoded: Vec<WatchlistItem> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if decoded.len() < total {
        warn!(
            dropped = total - decoded.len(),
            "Dropped {} malformed watchlist entries",
            total - decoded.len()
        );
    }
    decoded
}
