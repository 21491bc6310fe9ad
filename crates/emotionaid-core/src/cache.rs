//! Expiring cache stored through the KV store.
//!
//! Each entry is an ordinary KV record under a `cache_` prefixed key, wrapped
//! with an optional UTC expiry. The cache is advisory: a value that was never
//! cached and one that has expired look the same to callers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CompanionError, CompanionResult};
use crate::store::{keyspace, KvStore};
use crate::time::{Clock, SystemClock};

/// Time-to-live for a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The entry never expires
    Never,
    /// The entry expires this long after it is written
    For(Duration),
}

/// A cached value with its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// `None` means the entry never expires
    pub expiry: Option<DateTime<Utc>>,
}

impl<T> CacheEntry<T> {
    /// Whether the entry can still be served at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            None => true,
            Some(expiry) => now < expiry,
        }
    }
}

/// Expiring cache on top of a [`KvStore`].
#[derive(Clone)]
pub struct CacheLayer {
    store: KvStore,
    clock: Arc<dyn Clock>,
}

impl CacheLayer {
    pub fn new(store: KvStore) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: KvStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Cache `value` under `key` for `ttl`.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Ttl) -> CompanionResult<()> {
        let expiry = match ttl {
            Ttl::Never => None,
            Ttl::For(duration) => {
                let duration = chrono::Duration::from_std(duration)
                    .map_err(|e| CompanionError::InvalidInput(format!("ttl out of range: {}", e)))?;
                let expiry = self
                    .clock
                    .now()
                    .checked_add_signed(duration)
                    .ok_or_else(|| CompanionError::InvalidInput("ttl out of range".into()))?;
                Some(expiry)
            }
        };

        self.store
            .save(&keyspace::cache(key), &CacheEntry { data: value, expiry })
            .await?;
        debug!(key, ?expiry, "Cached value");
        Ok(())
    }

    /// Fetch a cached value.
    ///
    /// An expired entry is deleted and reported as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> CompanionResult<Option<T>> {
        let record_key = keyspace::cache(key);
        let Some(entry) = self.store.load::<CacheEntry<T>>(&record_key).await? else {
            return Ok(None);
        };

        if entry.is_fresh(self.clock.now()) {
            return Ok(Some(entry.data));
        }

        debug!(key, "Cache entry expired");
        self.store.remove(&record_key).await?;
        Ok(None)
    }

    /// Remove every cache entry whose key starts with `prefix`.
    ///
    /// Non-cache records are never touched. Returns the number removed.
    pub async fn clear(&self, prefix: &str) -> CompanionResult<usize> {
        let scoped = keyspace::cache(prefix);
        let mut removed = 0;
        for key in self.store.keys().await? {
            if key.starts_with(&scoped) && self.store.remove(&key).await? {
                removed += 1;
            }
        }
        debug!(prefix, removed, "Cleared cache entries");
        Ok(removed)
    }
}
