//! Lazily-populated provider handle cache with idle eviction.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::Provider;
use crate::errors::LorebookError;

/// Cache key: one handle per (provider name, api-key identifier) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderKey {
    /// Provider name (e.g. "openai").
    pub provider_name: String,
    /// Identifier for the credential in use, never the credential itself.
    pub key_id: String,
}

impl ProviderKey {
    /// Creates a cache key.
    #[must_use]
    pub fn new(provider_name: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            key_id: key_id.into(),
        }
    }
}

struct CachedProvider {
    handle: Arc<dyn Provider>,
    last_used: DateTime<Utc>,
}

/// Caches provider handles keyed by (provider, credential).
///
/// Handles are created lazily on first use and evicted by
/// [`sweep_idle`](ProviderCache::sweep_idle) once idle past the
/// threshold (default one hour). The cache is an explicitly constructed,
/// dependency-injected value — one per process by convention, never a
/// hidden global.
pub struct ProviderCache {
    entries: Mutex<HashMap<ProviderKey, CachedProvider>>,
    idle_threshold: Duration,
}

impl ProviderCache {
    /// Creates a cache with the default one-hour idle threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::with_idle_threshold(Duration::hours(1))
    }

    /// Creates a cache with a custom idle threshold.
    #[must_use]
    pub fn with_idle_threshold(idle_threshold: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle_threshold,
        }
    }

    /// Returns the cached handle for the key, creating it via `factory`
    /// on first use. Refreshes the entry's `last_used` stamp.
    pub fn get_or_create<F>(
        &self,
        key: &ProviderKey,
        factory: F,
    ) -> Result<Arc<dyn Provider>, LorebookError>
    where
        F: FnOnce() -> Result<Arc<dyn Provider>, LorebookError>,
    {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(key) {
            entry.last_used = Utc::now();
            return Ok(Arc::clone(&entry.handle));
        }

        let handle = factory()?;
        tracing::info!(
            provider = %key.provider_name,
            key_id = %key.key_id,
            "Created provider handle"
        );
        entries.insert(
            key.clone(),
            CachedProvider {
                handle: Arc::clone(&handle),
                last_used: Utc::now(),
            },
        );
        Ok(handle)
    }

    /// Returns the number of cached handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no handles are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Evicts handles idle past the configured threshold.
    ///
    /// Each evicted handle's cleanup hook is invoked; cleanup failures
    /// are logged and tolerated, never propagated. Returns the number
    /// of evicted handles.
    pub async fn sweep_idle(&self) -> usize {
        self.sweep_older_than(self.idle_threshold).await
    }

    /// Evicts every handle regardless of idle time (teardown path).
    pub async fn sweep_all(&self) -> usize {
        self.sweep_older_than(Duration::zero()).await
    }

    async fn sweep_older_than(&self, threshold: Duration) -> usize {
        let cutoff = Utc::now() - threshold;
        let expired: Vec<(ProviderKey, Arc<dyn Provider>)> = {
            let mut entries = self.entries.lock();
            let keys: Vec<ProviderKey> = entries
                .iter()
                .filter(|(_, e)| e.last_used <= cutoff)
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e.handle)))
                .collect()
        };

        let count = expired.len();
        for (key, handle) in expired {
            if let Err(err) = handle.close().await {
                tracing::warn!(
                    provider = %key.provider_name,
                    key_id = %key.key_id,
                    error = %err,
                    "Provider cleanup failed during eviction"
                );
            } else {
                tracing::info!(
                    provider = %key.provider_name,
                    key_id = %key.key_id,
                    "Evicted idle provider handle"
                );
            }
        }
        count
    }
}

impl Default for ProviderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCache")
            .field("entries", &self.len())
            .field("idle_threshold", &self.idle_threshold)
            .finish()
    }
}
