//! Parent-key to children feeds, built from a raw child-record stream.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use rxmon_feed::{Feed, ReplayFeed};

type ParentKeyFn<R, P> = Box<dyn Fn(&R) -> P + Send + Sync>;
type ResolveFn<R, C> = Box<dyn Fn(&R) -> Feed<C> + Send + Sync>;

/// Groups child records by their parent key.
///
/// Each parent key gets one replay feed of materialised children, created the
/// first time either a child for it arrives or someone asks for it, and kept
/// for the rest of the session. Children are appended as soon as they
/// resolve, whether or not anyone is reading, so a late reader still sees all
/// of them.
pub struct GroupedChildIndex<P, R, C> {
    relation: &'static str,
    parent_key: ParentKeyFn<R, P>,
    resolve_child: ResolveFn<R, C>,
    groups: Mutex<HashMap<P, ReplayFeed<C>>>,
    closed: AtomicBool,
}

impl<P, R, C> fmt::Debug for GroupedChildIndex<P, R, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupedChildIndex")
            .field("relation", &self.relation)
            .finish_non_exhaustive()
    }
}

impl<P, R, C> GroupedChildIndex<P, R, C>
where
    P: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    C: Clone + Send + 'static,
{
    /// Creates an index.
    ///
    /// `parent_key` extracts the foreign key from a raw record;
    /// `resolve_child` maps the record to a feed whose first item is the
    /// materialised child.
    pub fn new<F, G>(relation: &'static str, parent_key: F, resolve_child: G) -> Self
    where
        F: Fn(&R) -> P + Send + Sync + 'static,
        G: Fn(&R) -> Feed<C> + Send + Sync + 'static,
    {
        Self {
            relation,
            parent_key: Box::new(parent_key),
            resolve_child: Box::new(resolve_child),
            groups: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<P, ReplayFeed<C>>> {
        self.groups.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The group for `parent`. Groups created after [`close`](Self::close)
    /// start out complete.
    fn group(&self, parent: P) -> ReplayFeed<C> {
        let mut groups = self.lock();
        let closed = self.closed.load(Ordering::Acquire);
        groups
            .entry(parent)
            .or_insert_with(|| {
                let group = ReplayFeed::new();
                if closed {
                    group.close();
                }
                group
            })
            .clone()
    }

    /// Files one raw child record under its parent.
    pub fn ingest(&self, raw: &R) {
        let parent = (self.parent_key)(raw);
        let group = self.group(parent.clone());
        let child = (self.resolve_child)(raw);
        if child.is_empty() {
            tracing::trace!(relation = self.relation, parent = ?parent, "child pending resolution");
        }

        let mut taken = false;
        child.forward_to(move |value| {
            if !taken {
                taken = true;
                group.publish(value.clone());
            }
        });
    }

    /// The children of `parent`: everything so far, then live arrivals.
    pub fn children_of(&self, parent: P) -> Feed<C> {
        self.group(parent).feed()
    }

    /// Number of parent keys with a group.
    pub fn group_count(&self) -> usize {
        self.lock().len()
    }

    /// Ends every group feed.
    pub fn close(&self) {
        let groups: Vec<ReplayFeed<C>> = {
            let groups = self.lock();
            self.closed.store(true, Ordering::Release);
            groups.values().cloned().collect()
        };
        for group in groups {
            group.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Child {
        parent: u64,
        name: &'static str,
    }

    fn by_parent() -> GroupedChildIndex<u64, Child, &'static str> {
        GroupedChildIndex::new("children", |c: &Child| c.parent, |c: &Child| Feed::ready(c.name))
    }

    #[test]
    fn late_reader_sees_every_child() {
        let index = by_parent();
        index.ingest(&Child { parent: 1, name: "a" });
        index.ingest(&Child { parent: 2, name: "x" });
        index.ingest(&Child { parent: 1, name: "b" });

        let children = index.children_of(1);
        assert_eq!(children.snapshot(), vec!["a", "b"]);

        index.ingest(&Child { parent: 1, name: "c" });
        assert_eq!(children.snapshot(), vec!["a", "b", "c"]);
    }

    #[test]
    fn early_request_starts_empty_and_fills() {
        let index = by_parent();
        let children = index.children_of(5);
        assert!(children.is_empty());
        assert!(!children.is_closed());

        index.ingest(&Child { parent: 5, name: "first" });
        assert_eq!(children.snapshot(), vec!["first"]);
        assert!(children.same_channel(&index.children_of(5)));
        assert_eq!(index.group_count(), 1);
    }

    #[test]
    fn close_ends_existing_and_later_groups() {
        let index = by_parent();
        index.ingest(&Child { parent: 1, name: "a" });
        let existing = index.children_of(1);

        index.close();
        assert!(existing.is_closed());
        assert_eq!(existing.snapshot(), vec!["a"]);

        let later = index.children_of(2);
        assert!(later.is_closed());
        assert!(later.is_empty());
    }

    #[test]
    fn children_appear_in_resolution_order() {
        let pending = ReplayFeed::new();
        let slow = pending.feed();
        let index = GroupedChildIndex::new(
            "links",
            |raw: &(u64, &'static str)| raw.0,
            move |raw: &(u64, &'static str)| {
                if raw.1 == "slow" {
                    slow.clone()
                } else {
                    Feed::ready(raw.1)
                }
            },
        );

        index.ingest(&(1, "slow"));
        index.ingest(&(1, "fast"));
        pending.publish("slow");
        pending.publish("ignored");

        assert_eq!(index.children_of(1).snapshot(), vec!["fast", "slow"]);
    }
}
