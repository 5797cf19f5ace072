//! In-memory installation token cache
//!
//! Minted installation tokens are held in process memory only, keyed by
//! `app_<app_id>_inst_<installation_id>`, and never serialized. Entries past
//! their expiry are invisible to readers immediately and are physically
//! removed by a background sweeper, so `get` never needs a write lock.
//!
//! Token bytes are wrapped in [`SecretString`], which zeroes its buffer on
//! drop. This is best-effort: the runtime may have copied the string before
//! the cache ever saw it.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// How often the background sweeper removes expired entries
pub const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Cache key for an App/installation pair.
pub fn cache_key(app_id: i64, installation_id: i64) -> String {
    format!("app_{}_inst_{}", app_id, installation_id)
}

/// A cached installation token with its lifetime bounds.
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// The token value (kept secret, zeroed on drop)
    pub token: SecretString,
    /// When the token was minted
    pub created_at: DateTime<Utc>,
    /// When the token stops being served
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Counters describing the cache's current contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries physically present, live or not
    pub entries: usize,
    /// Entries a `get` would serve
    pub live: usize,
    /// Entries waiting for the sweeper
    pub expired: usize,
}

/// Thread-safe TTL map of installation tokens.
///
/// Readers share the lock; writers are exclusive; a reader can never observe
/// a partially written entry. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    entries: Arc<RwLock<HashMap<String, CachedToken>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a live token. Expired entries yield `None` but are left in
    /// place for the sweeper, keeping this a read-lock-only path.
    pub async fn get(&self, key: &str) -> Option<CachedToken> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired(Utc::now()) => Some(entry.clone()),
            Some(_) => {
                trace!(key, "cache entry expired");
                None
            }
            None => None,
        }
    }

    /// Store a token valid for `ttl` from now.
    pub async fn set(&self, key: &str, token: SecretString, ttl: std::time::Duration) {
        let now = Utc::now();
        let entry = CachedToken {
            token,
            created_at: now,
            expires_at: now + Duration::from_std(ttl).unwrap_or_default(),
        };
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);
        debug!(key, "cached installation token");
    }

    /// Drop one entry; its token buffer is zeroed as the entry drops.
    pub async fn delete(&self, key: &str) {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_some() {
            debug!(key, "evicted cached token");
        }
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        debug!(count, "cleared token cache");
    }

    /// Number of entries physically present.
    pub async fn size(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Live/expired breakdown of the current contents.
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let now = Utc::now();
        let expired = entries.values().filter(|e| e.is_expired(now)).count();
        CacheStats {
            entries: entries.len(),
            live: entries.len() - expired,
            expired,
        }
    }

    /// Remove expired entries now.
    pub async fn sweep(&self) {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "swept expired tokens");
        }
    }

    /// Launch the background sweeper. It wakes every `interval`, checks the
    /// cancellation token on each tick, and exits promptly at shutdown.
    pub fn spawn_sweeper(
        &self,
        interval: std::time::Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("token cache sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => cache.sweep().await,
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "token_cache_tests.rs"]
mod tests;
