//! Durable key-value capability shared by the rule store, the alert history
//! and the watchlist. Constructed once in `main` and passed around as
//! `Arc<dyn KeyValueStore>`.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;

pub use memory::MemoryKvStore;
#[cfg(test)]
pub use memory::FlakyKvStore;
pub use sqlite::SqliteKvStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Stored value, or `None` when the key was never written.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrite the value under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Read and decode a JSON document for a read-modify-write.
///
/// Missing or undecodable data yields `T::default()`. A failed read is
/// returned, so callers never write back a list they could not see.
pub async fn load_json<T>(store: &dyn KeyValueStore, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(raw) = store.get(key).await? else {
        return Ok(T::default());
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(key, "Discarding corrupt stored value: {e}");
            Ok(T::default())
        }
    }
}

/// Like [`load_json`], but a failed read is logged and yields `T::default()`.
/// Only for read-only paths.
pub async fn load_json_or_default<T>(store: &dyn KeyValueStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match load_json(store, key).await {
        Ok(value) => value,
        Err(e) => {
            warn!(key, "Store read failed, using empty value: {e}");
            T::default()
        }
    }
}

pub async fn save_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}
