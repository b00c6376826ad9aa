use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::store::KeyValueStore;

/// Process-lifetime store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, String>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Wraps a [`MemoryKvStore`] and fails the next `n` reads or writes of a key
/// on demand.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FlakyKvStore {
    inner: MemoryKvStore,
    failing_reads: DashMap<String, usize>,
    failing_writes: DashMap<String, usize>,
}

#[cfg(test)]
impl FlakyKvStore {
    pub fn fail_next_reads(&self, key: &str, n: usize) {
        self.failing_reads.insert(key.to_string(), n);
    }

    pub fn fail_next_writes(&self, key: &str, n: usize) {
        self.failing_writes.insert(key.to_string(), n);
    }

    fn take_failure(failing: &DashMap<String, usize>, key: &str) -> bool {
        match failing.get_mut(key) {
            Some(mut left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl KeyValueStore for FlakyKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if Self::take_failure(&self.failing_reads, key) {
            return Err(sqlx::Error::PoolTimedOut.into());
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if Self::take_failure(&self.failing_writes, key) {
            return Err(sqlx::Error::PoolTimedOut.into());
        }
        self.inner.set(key, value).await
    }
}
