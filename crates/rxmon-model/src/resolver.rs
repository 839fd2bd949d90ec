//! Watch-once, replay-forever resolution of forward references.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use rxmon_feed::{Feed, ReplayFeed};

use crate::cache::KeyedEntityCache;

/// Resolves keys against a [`KeyedEntityCache`], one watch per key.
///
/// The first `resolve(k)` establishes the cache watch for `k` and wires its
/// first value into a single-item replay feed. Every later `resolve(k)`,
/// before or after the entity arrives, gets a handle to that same feed, so
/// the cache is never touched again for `k`.
///
/// A resolution feed closes right after its value. A key that never arrives
/// leaves its feed open and empty until the cache is closed.
pub struct ForwardRefResolver<K, V> {
    cache: Arc<KeyedEntityCache<K, V>>,
    resolutions: Mutex<HashMap<K, Feed<V>>>,
}

impl<K, V> fmt::Debug for ForwardRefResolver<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardRefResolver").finish_non_exhaustive()
    }
}

impl<K, V> ForwardRefResolver<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new(cache: Arc<KeyedEntityCache<K, V>>) -> Self {
        Self {
            cache,
            resolutions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the feed that carries the entity for `key` once it exists.
    pub fn resolve(&self, key: K) -> Feed<V> {
        let mut resolutions = self.resolutions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(resolved) = resolutions.get(&key) {
            return resolved.clone();
        }

        let resolved = ReplayFeed::new();
        let tx = resolved.clone();
        let mut taken = false;
        let watch = self.cache.watch(key.clone());
        watch.forward_to(move |value| {
            if !taken {
                taken = true;
                tx.publish(value.clone());
                tx.close();
            }
        });
        let tx = resolved.clone();
        watch.when_closed(move || tx.close());

        let feed = resolved.feed();
        resolutions.insert(key, feed.clone());
        feed
    }

    /// Returns the resolved value if the entity has already arrived.
    pub fn resolved_now(&self, key: &K) -> Option<V> {
        let resolutions = self.resolutions.lock().unwrap_or_else(|e| e.into_inner());
        match resolutions.get(key) {
            Some(resolved) => resolved.latest(),
            None => self.cache.get(key),
        }
    }

    /// Number of distinct keys resolution has been requested for.
    pub fn resolution_count(&self) -> usize {
        self.resolutions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn cache(&self) -> &Arc<KeyedEntityCache<K, V>> {
        &self.cache
    }
}
