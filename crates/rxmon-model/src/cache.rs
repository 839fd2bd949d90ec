//! Live keyed map of materialised entities.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use rxmon_feed::{Feed, FeedCursor, ReplayFeed};

/// An "add" notification from a [`KeyedEntityCache`].
#[derive(Debug, Clone, PartialEq)]
pub struct Added<K, V> {
    pub key: K,
    pub value: V,
}

/// Outcome of [`KeyedEntityCache::insert_or_get`].
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion<V> {
    /// The key was new; the factory ran and its value was stored.
    Inserted(V),
    /// The key already existed; the stored value is returned unchanged.
    Existing(V),
}

impl<V> Insertion<V> {
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    pub fn into_value(self) -> V {
        match self {
            Self::Inserted(value) | Self::Existing(value) => value,
        }
    }
}

struct CacheState<K, V> {
    entries: HashMap<K, V>,
    pending: HashMap<K, ReplayFeed<V>>,
    closed: bool,
}

/// A thread-safe, append-only map from key to entity.
///
/// Every insert is also appended to a change feed, so [`connect`] can hand
/// out history-then-live readers without ever re-reading the map. The change
/// feed is written under the map lock, which keeps a reader from seeing a key
/// in the map that is not yet in the feed or the other way round.
///
/// [`connect`]: KeyedEntityCache::connect
pub struct KeyedEntityCache<K, V> {
    kind: &'static str,
    state: Mutex<CacheState<K, V>>,
    changes: ReplayFeed<Added<K, V>>,
    watches_established: AtomicUsize,
    duplicates_rejected: AtomicUsize,
}

impl<K, V: Clone + Send + 'static> fmt::Debug for KeyedEntityCache<K, V>
where
    K: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedEntityCache")
            .field("kind", &self.kind)
            .field("len", &self.changes.feed().len())
            .finish()
    }
}

impl<K, V> KeyedEntityCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Creates an empty cache. `kind` names the entity type in logs.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                pending: HashMap::new(),
                closed: false,
            }),
            changes: ReplayFeed::new(),
            watches_established: AtomicUsize::new(0),
            duplicates_rejected: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Stores the value built by `make` under `key` unless the key is taken.
    ///
    /// First writer wins: a duplicate is counted, logged, and dropped without
    /// running `make`.
    pub fn insert_or_get<F>(&self, key: K, make: F) -> Insertion<V>
    where
        F: FnOnce() -> V,
    {
        let (value, waiting) = {
            let mut state = self.lock();
            if let Some(existing) = state.entries.get(&key) {
                let existing = existing.clone();
                drop(state);
                self.duplicates_rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(kind = self.kind, key = ?key, "ignoring duplicate entity");
                return Insertion::Existing(existing);
            }
            let value = make();
            state.entries.insert(key.clone(), value.clone());
            self.changes.publish(Added {
                key: key.clone(),
                value: value.clone(),
            });
            (value, state.pending.remove(&key))
        };

        // Watchers may forward into other feeds; keep them off the map lock.
        if let Some(watch) = waiting {
            watch.publish(value.clone());
        }
        Insertion::Inserted(value)
    }

    /// Returns the value stored under `key`, if it has arrived.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every value in insertion order.
    pub fn snapshot(&self) -> Vec<V> {
        self.changes
            .feed()
            .snapshot()
            .into_iter()
            .map(|added| added.value)
            .collect()
    }

    /// Starts a reader over every add, past and future, in insertion order.
    pub fn connect(&self) -> FeedCursor<Added<K, V>> {
        self.changes.feed().subscribe()
    }

    /// A feed that emits the value for `key` once it exists.
    ///
    /// The feed carries at most one item and is never closed by the cache
    /// before [`close`](Self::close). Watching a missing key after `close`
    /// returns a feed that is already complete. Each call counts as one
    /// established watch; callers that want one watch per key go through a
    /// [`ForwardRefResolver`](crate::ForwardRefResolver).
    pub fn watch(&self, key: K) -> Feed<V> {
        self.watches_established.fetch_add(1, Ordering::Relaxed);
        let mut state = self.lock();
        if let Some(value) = state.entries.get(&key) {
            return ReplayFeed::with_items([value.clone()]).feed();
        }
        if state.closed {
            return Feed::empty();
        }
        state.pending.entry(key).or_default().feed()
    }

    /// Number of [`watch`](Self::watch) calls made so far.
    pub fn watches_established(&self) -> usize {
        self.watches_established.load(Ordering::Relaxed)
    }

    /// Number of inserts dropped because their key already existed.
    pub fn duplicates_rejected(&self) -> usize {
        self.duplicates_rejected.load(Ordering::Relaxed)
    }

    /// Ends the change feed and every watch still waiting for its key.
    ///
    /// Stored entities stay readable.
    pub fn close(&self) {
        let pending: Vec<ReplayFeed<V>> = {
            let mut state = self.lock();
            state.closed = true;
            state.pending.drain().map(|(_, feed)| feed).collect()
        };
        self.changes.close();
        for watch in pending {
            watch.close();
        }
    }
}
