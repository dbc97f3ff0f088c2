//! Two-tier cache for LLM generations.
//!
//! ```text
//!   get_or_compute(key)
//!         │
//!         ▼
//!   ┌─────────────┐ hit
//!   │ session map │──────────────────────────────▶ value
//!   └──────┬──────┘
//!          │ miss
//!          ▼
//!   ┌─────────────┐ hit   populate session
//!   │   durable   │──────────────────────────────▶ value
//!   │ (backend)   │
//!   └──────┬──────┘
//!          │ miss
//!          ▼
//!      compute() ──▶ write durable ──▶ write session ──▶ value
//! ```
//!
//! The durable tier is any [`CacheBackend`]: a small `{lookup, insert}`
//! interface with [`SqliteBackend`] for persistence and [`InMemoryBackend`]
//! for tests. Values are stored as JSON text in both tiers so a session hit
//! and a durable hit for the same key decode to the same value.
//!
//! There is no eviction and no TTL. Entries live until `adsmith cache clear`.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

pub use memory::InMemoryBackend;
pub use sqlite::SqliteBackend;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[source] anyhow::Error),

    #[error("session cache lock poisoned")]
    SessionPoisoned,

    #[error("cached value for {key} could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("value for {key} could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable key-value tier.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch the stored value for `key`, if any.
    async fn lookup(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn insert(&self, key: &str, value: &str) -> Result<()>;

    /// Number of stored entries.
    async fn len(&self) -> Result<u64>;

    /// Remove every entry.
    async fn clear(&self) -> Result<()>;
}

/// A namespaced content fingerprint.
///
/// Rendered as `"{namespace}:{sha256-hex}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Fingerprint `parts` under `namespace`.
    ///
    /// Each part is length-prefixed before hashing, so `["ab", "c"]` and
    /// `["a", "bc"]` produce different keys.
    pub fn from_parts<S: AsRef<str>>(namespace: &str, parts: &[S]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            let bytes = part.as_ref().as_bytes();
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        Self(format!("{}:{:x}", namespace, hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hit/miss counters since the cache was created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub session_entries: usize,
    pub session_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
}

/// Session tier in front of a durable [`CacheBackend`].
pub struct TwoTierCache {
    session: RwLock<HashMap<String, String>>,
    durable: Arc<dyn CacheBackend>,
    session_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
}

impl TwoTierCache {
    pub fn new(durable: Arc<dyn CacheBackend>) -> Self {
        Self {
            session: RwLock::new(HashMap::new()),
            durable,
            session_hits: AtomicU64::new(0),
            durable_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache with an in-memory durable tier; nothing survives the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()))
    }

    /// The durable tier, for direct queries that bypass the session map.
    pub fn durable(&self) -> &Arc<dyn CacheBackend> {
        &self.durable
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    ///
    /// Errors from `compute` are returned unchanged and nothing is cached.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &CacheKey, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let k = key.as_str();

        if let Some(raw) = self.session_get(k)? {
            self.session_hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(namespace = key.namespace(), "session cache hit");
            return Ok(decode(k, &raw)?);
        }

        if let Some(raw) = self
            .durable
            .lookup(k)
            .await
            .map_err(CacheError::Backend)?
        {
            self.durable_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(namespace = key.namespace(), "durable cache hit");
            let value = decode(k, &raw)?;
            self.session_put(k, raw)?;
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(namespace = key.namespace(), "cache miss, computing");
        let value = compute().await?;

        let raw = serde_json::to_string(&value).map_err(|source| CacheError::Encode {
            key: k.to_string(),
            source,
        })?;
        self.durable
            .insert(k, &raw)
            .await
            .map_err(CacheError::Backend)?;
        self.session_put(k, raw)?;

        Ok(value)
    }

    /// Drop the session tier. The durable tier is untouched.
    pub fn clear_session(&self) -> Result<(), CacheError> {
        self.session
            .write()
            .map_err(|_| CacheError::SessionPoisoned)?
            .clear();
        Ok(())
    }

    /// Drop both tiers.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        self.clear_session()?;
        self.durable.clear().await.map_err(CacheError::Backend)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            session_entries: self.session.read().map(|s| s.len()).unwrap_or(0),
            session_hits: self.session_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn session_get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let session = self.session.read().map_err(|_| CacheError::SessionPoisoned)?;
        Ok(session.get(key).cloned())
    }

    fn session_put(&self, key: &str, raw: String) -> Result<(), CacheError> {
        self.session
            .write()
            .map_err(|_| CacheError::SessionPoisoned)?
            .insert(key.to_string(), raw);
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, CacheError> {
    serde_json::from_str(raw).map_err(|source| CacheError::Decode {
        key: key.to_string(),
        source,
    })
}
