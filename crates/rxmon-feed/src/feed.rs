//! Append-only multicast channel with replay for late joiners.
//!
//! A [`ReplayFeed`] is the write side; [`Feed`] is a cloneable read-only
//! handle; [`FeedCursor`] is one reader's position. Items are stored once and
//! shared by every reader, so fanning a feed out to N consumers costs N
//! cursors rather than N copies of the history.
//!
//! Forwarding sinks registered with [`Feed::forward_to`] run synchronously on
//! the publishing thread, under the feed's lock, so a sink always sees the
//! replayed history before any live item. A sink must therefore never publish
//! into or subscribe to the feed it is attached to.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::Stream;
use tokio::sync::Notify;

type Sink<T> = Box<dyn FnMut(&T) + Send>;
type CloseHook = Box<dyn FnOnce() + Send>;

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

struct State<T> {
    items: Vec<T>,
    sinks: Vec<Sink<T>>,
    close_hooks: Vec<CloseHook>,
    closed: bool,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Items are only ever appended, so a panic mid-publish cannot leave a
        // half-written entry behind.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Write side of a multicast feed.
///
/// Cloning a `ReplayFeed` yields another handle to the same channel.
pub struct ReplayFeed<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ReplayFeed<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Default for ReplayFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> ReplayFeed<T> {
    /// Creates an empty, open feed.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: Vec::new(),
                    sinks: Vec::new(),
                    close_hooks: Vec::new(),
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Creates an open feed whose history already holds `items`.
    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        let feed = Self::new();
        feed.shared.lock().items.extend(items);
        feed
    }

    /// Appends an item and wakes every waiting reader.
    ///
    /// Returns `false` (and drops the item) if the feed is closed.
    pub fn publish(&self, item: T) -> bool {
        let mut state = self.shared.lock();
        if state.closed {
            return false;
        }
        let State { items, sinks, .. } = &mut *state;
        for sink in sinks.iter_mut() {
            sink(&item);
        }
        items.push(item);
        drop(state);
        self.shared.notify.notify_waiters();
        true
    }

    /// Marks the feed complete. Readers drain the history and then end.
    pub fn close(&self) {
        let hooks = {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.sinks.clear();
            std::mem::take(&mut state.close_hooks)
        };
        self.shared.notify.notify_waiters();
        for hook in hooks {
            hook();
        }
    }

    /// Returns a read-only handle to this feed.
    pub fn feed(&self) -> Feed<T> {
        Feed {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Read-only handle to a multicast feed.
pub struct Feed<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Feed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Feed")
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Feed<T> {
    /// A completed feed holding exactly one item.
    pub fn ready(item: T) -> Self {
        let feed = ReplayFeed::with_items([item]);
        feed.close();
        feed.feed()
    }

    /// A completed feed with no items.
    pub fn empty() -> Self {
        let feed = ReplayFeed::new();
        feed.close();
        feed.feed()
    }

    /// Starts a new reader at the beginning of the history.
    pub fn subscribe(&self) -> FeedCursor<T> {
        FeedCursor {
            shared: Arc::clone(&self.shared),
            position: 0,
        }
    }

    /// Returns a copy of every item published so far.
    pub fn snapshot(&self) -> Vec<T> {
        self.shared.lock().items.clone()
    }

    /// Returns the most recently published item.
    pub fn latest(&self) -> Option<T> {
        self.shared.lock().items.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Returns `true` if both handles point at the same channel.
    pub fn same_channel(&self, other: &Feed<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Pushes every item, past and future, into `sink`.
    ///
    /// History is replayed before this call returns; live items are delivered
    /// on the publishing thread for as long as the feed stays open.
    pub fn forward_to<F>(&self, mut sink: F)
    where
        F: FnMut(&T) + Send + 'static,
    {
        let mut state = self.shared.lock();
        for item in &state.items {
            sink(item);
        }
        if !state.closed {
            state.sinks.push(Box::new(sink));
        }
    }

    /// Derives a feed that emits `initial` first and then mirrors this feed.
    pub fn starting_with(&self, initial: T) -> Feed<T> {
        let derived = ReplayFeed::with_items([initial]);
        let tx = derived.clone();
        self.forward_to(move |item| {
            tx.publish(item.clone());
        });
        let tx = derived.clone();
        self.when_closed(move || tx.close());
        derived.feed()
    }

    /// Derives a feed carrying the items of both feeds in arrival order.
    ///
    /// The derived feed completes once both sources have completed.
    pub fn merge(&self, other: &Feed<T>) -> Feed<T> {
        let derived = ReplayFeed::new();
        let remaining = Arc::new(AtomicUsize::new(2));
        for source in [self, other] {
            let tx = derived.clone();
            source.forward_to(move |item| {
                tx.publish(item.clone());
            });
            let tx = derived.clone();
            let remaining = Arc::clone(&remaining);
            source.when_closed(move || {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    tx.close();
                }
            });
        }
        derived.feed()
    }

    /// Runs `hook` once the feed is closed, or right away if it already is.
    pub fn when_closed<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.lock();
        if state.closed {
            drop(state);
            hook();
        } else {
            state.close_hooks.push(Box::new(hook));
        }
    }
}

enum Next<T> {
    Item(T),
    Closed,
    Empty,
}

/// One reader's position in a feed.
///
/// Dropping a cursor cancels only that reader; the feed and every other
/// reader are unaffected.
pub struct FeedCursor<T> {
    shared: Arc<Shared<T>>,
    position: usize,
}

impl<T: Clone + Send + 'static> FeedCursor<T> {
    fn poll_item(&mut self) -> Next<T> {
        let state = self.shared.lock();
        if let Some(item) = state.items.get(self.position) {
            self.position += 1;
            Next::Item(item.clone())
        } else if state.closed {
            Next::Closed
        } else {
            Next::Empty
        }
    }

    /// Returns the next item if one is already available.
    pub fn try_recv(&mut self) -> Option<T> {
        match self.poll_item() {
            Next::Item(item) => Some(item),
            Next::Closed | Next::Empty => None,
        }
    }

    /// Waits for the next item; `None` once the feed is closed and drained.
    ///
    /// There is no timeout: a reader of a feed that never receives another
    /// item waits until the feed is closed.
    pub async fn recv(&mut self) -> Option<T> {
        let shared = Arc::clone(&self.shared);
        loop {
            let notified = shared.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a publish between the
            // check and the await is not missed.
            notified.as_mut().enable();
            match self.poll_item() {
                Next::Item(item) => return Some(item),
                Next::Closed => return None,
                Next::Empty => notified.await,
            }
        }
    }

    /// Takes every item that is available right now.
    pub fn drain_ready(&mut self) -> Vec<T> {
        let state = self.shared.lock();
        let ready = state.items[self.position.min(state.items.len())..].to_vec();
        self.position += ready.len();
        ready
    }

    /// Number of items this reader has consumed.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Converts the cursor into a `Stream` of the remaining items.
    pub fn into_stream(self) -> impl Stream<Item = T> + Send {
        futures_util::stream::unfold(self, |mut cursor| async move {
            let item = cursor.recv().await?;
            Some((item, cursor))
        })
    }
}
