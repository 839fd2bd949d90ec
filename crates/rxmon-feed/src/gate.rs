//! Flow-control combinators that freeze and thaw a live stream.
//!
//! Both gates share one engine. The control stream is deduplicated first: a
//! repeated `false` must not flush values held since an earlier `false`.
//! Until the control emits its first value the gate is closed. Once the
//! control stream ends the gate stays open for good.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::{future, Stream, StreamExt};

/// Suppresses consecutive repeats of the same value.
pub fn dedup_consecutive<S>(stream: S) -> impl Stream<Item = S::Item>
where
    S: Stream,
    S::Item: PartialEq + Clone,
{
    stream
        .scan(None, |last, value: S::Item| {
            let fresh = last.as_ref() != Some(&value);
            *last = Some(value.clone());
            future::ready(Some(fresh.then_some(value)))
        })
        .filter_map(future::ready)
}

/// Holds `source` back while the latest `control` value is `false`.
///
/// Held values are released in source order when the control turns `true`;
/// while it stays `true` values pass straight through. If `source` ends while
/// the gate is closed, the end is deferred until the held values have been
/// released.
pub fn gate<S, C>(source: S, control: C) -> impl Stream<Item = S::Item>
where
    S: Stream,
    C: Stream<Item = bool>,
{
    gated(source, control, HoldAll)
}

/// Like [`gate`], but never re-hides what has already been exposed.
///
/// `key` extracts a monotonically non-decreasing ordering value from each
/// item. The gate remembers the greatest key it has released (its high-water
/// mark, starting at `K::default()`); while closed, items at or below the mark
/// pass immediately and only items above it are held. Closing the gate again
/// keeps the mark.
pub fn sequence_gate<S, C, K, F>(source: S, control: C, key: F) -> impl Stream<Item = S::Item>
where
    S: Stream,
    C: Stream<Item = bool>,
    K: Ord + Copy + Default,
    F: Fn(&S::Item) -> K,
{
    gated(
        source,
        control,
        HighWaterMark {
            key,
            mark: K::default(),
        },
    )
}

/// Decides which items may bypass a closed gate.
trait HoldPolicy<T> {
    /// Returns `true` if `item` may pass while the gate is closed.
    fn bypasses(&self, item: &T) -> bool;

    /// Called for every item the gate releases while open.
    fn released(&mut self, item: &T);
}

struct HoldAll;

impl<T> HoldPolicy<T> for HoldAll {
    fn bypasses(&self, _item: &T) -> bool {
        false
    }

    fn released(&mut self, _item: &T) {}
}

struct HighWaterMark<F, K> {
    key: F,
    mark: K,
}

impl<T, F, K> HoldPolicy<T> for HighWaterMark<F, K>
where
    F: Fn(&T) -> K,
    K: Ord + Copy,
{
    fn bypasses(&self, item: &T) -> bool {
        (self.key)(item) <= self.mark
    }

    fn released(&mut self, item: &T) {
        self.mark = self.mark.max((self.key)(item));
    }
}

fn gated<S, C, P>(source: S, control: C, policy: P) -> impl Stream<Item = S::Item>
where
    S: Stream,
    C: Stream<Item = bool>,
    P: HoldPolicy<S::Item>,
{
    let state = GateState {
        source: Box::pin(source),
        control: Box::pin(dedup_consecutive(control)),
        policy,
        held: VecDeque::new(),
        open: false,
        source_done: false,
        control_done: false,
    };
    futures_util::stream::unfold(state, |mut state| async move {
        let item = state.next_release().await?;
        Some((item, state))
    })
}

struct GateState<S: Stream, C, P> {
    source: Pin<Box<S>>,
    control: Pin<Box<C>>,
    policy: P,
    held: VecDeque<S::Item>,
    open: bool,
    source_done: bool,
    control_done: bool,
}

impl<S, C, P> GateState<S, C, P>
where
    S: Stream,
    C: Stream<Item = bool>,
    P: HoldPolicy<S::Item>,
{
    fn passing(&self) -> bool {
        self.open || self.control_done
    }

    async fn next_release(&mut self) -> Option<S::Item> {
        loop {
            if self.passing() {
                if let Some(item) = self.held.pop_front() {
                    self.policy.released(&item);
                    return Some(item);
                }
                if self.source_done {
                    return None;
                }
            }

            tokio::select! {
                biased;

                signal = self.control.next(), if !self.control_done => match signal {
                    Some(open) => {
                        tracing::trace!(open, held = self.held.len(), "gate control changed");
                        self.open = open;
                    }
                    None => self.control_done = true,
                },
                item = self.source.next(), if !self.source_done => match item {
                    Some(item) => {
                        if self.passing() {
                            self.policy.released(&item);
                            return Some(item);
                        }
                        if self.policy.bypasses(&item) {
                            return Some(item);
                        }
                        self.held.push_back(item);
                    }
                    None => self.source_done = true,
                },
                else => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn dedup_drops_consecutive_repeats_only() {
        let values = stream::iter([false, false, true, true, false, true]);
        let deduped: Vec<bool> = dedup_consecutive(values).collect().await;
        assert_eq!(deduped, vec![false, true, false, true]);
    }

    #[tokio::test]
    async fn exhausted_control_opens_the_gate() {
        let source = stream::iter([1, 2, 3]);
        let control = stream::iter(Vec::<bool>::new());
        let released: Vec<i32> = gate(source, control).collect().await;
        assert_eq!(released, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn closed_control_that_ends_releases_everything() {
        let source = stream::iter([4, 5]);
        let control = stream::iter([false]);
        let released: Vec<i32> = sequence_gate(source, control, |v: &i32| *v).collect().await;
        assert_eq!(released, vec![4, 5]);
    }

    #[test]
    fn high_water_mark_only_grows() {
        let mut policy = HighWaterMark {
            key: |v: &i64| *v,
            mark: 0,
        };
        policy.released(&10);
        policy.released(&4);
        assert!(policy.bypasses(&10));
        assert!(policy.bypasses(&7));
        assert!(!policy.bypasses(&11));
    }
}
