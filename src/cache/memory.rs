//! In-memory [`CacheBackend`] for tests and `cache.durable = "memory"`.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::CacheBackend;

pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn lookup(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("cache lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    async fn insert(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("cache lock poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn len(&self) -> Result<u64> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("cache lock poisoned"))?;
        Ok(entries.len() as u64)
    }

    async fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| anyhow!("cache lock poisoned"))?
            .clear();
        Ok(())
    }
}
