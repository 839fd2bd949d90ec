//! Demultiplexes the upstream record stream into one feed per kind.

use std::sync::atomic::{AtomicU64, Ordering};

use rxmon_feed::{Feed, ReplayFeed};
use rxmon_types::{
    CallInstrumented, ClientEventRecord, EventKind, ModuleLoaded, ObjectPropertiesDescribed,
    ObservableCreated, ObservablesLinked, ProfilerEvent, StreamNotification, Subscribed,
    TypeDescribed, Unsubscribed,
};

use crate::entity::StreamEventKind;

/// A notification tagged with what kind of notification it is.
pub type TaggedNotification = (StreamEventKind, StreamNotification);

/// Per-kind replay feeds over a single upstream record stream.
///
/// Every feed replays from the start of the session, so a component wired up
/// late still sees every record of its kind. `stream_events` carries on-next,
/// on-completed and on-error records together in arrival order.
pub struct EventIngest {
    modules: ReplayFeed<ModuleLoaded>,
    calls: ReplayFeed<CallInstrumented>,
    observables: ReplayFeed<ObservableCreated>,
    links: ReplayFeed<ObservablesLinked>,
    subscribed: ReplayFeed<Subscribed>,
    unsubscribed: ReplayFeed<Unsubscribed>,
    on_next: ReplayFeed<StreamNotification>,
    on_completed: ReplayFeed<StreamNotification>,
    on_error: ReplayFeed<StreamNotification>,
    stream_events: ReplayFeed<TaggedNotification>,
    types: ReplayFeed<TypeDescribed>,
    object_properties: ReplayFeed<ObjectPropertiesDescribed>,
    client_events: ReplayFeed<ClientEventRecord>,
    counts: [AtomicU64; EventKind::ALL.len()],
}

impl Default for EventIngest {
    fn default() -> Self {
        Self::new()
    }
}

impl EventIngest {
    pub fn new() -> Self {
        Self {
            modules: ReplayFeed::new(),
            calls: ReplayFeed::new(),
            observables: ReplayFeed::new(),
            links: ReplayFeed::new(),
            subscribed: ReplayFeed::new(),
            unsubscribed: ReplayFeed::new(),
            on_next: ReplayFeed::new(),
            on_completed: ReplayFeed::new(),
            on_error: ReplayFeed::new(),
            stream_events: ReplayFeed::new(),
            types: ReplayFeed::new(),
            object_properties: ReplayFeed::new(),
            client_events: ReplayFeed::new(),
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Routes one record to the feed for its kind.
    pub fn publish(&self, event: ProfilerEvent) {
        self.counts[event.kind() as usize].fetch_add(1, Ordering::Relaxed);
        match event {
            ProfilerEvent::ModuleLoaded(r) => {
                self.modules.publish(r);
            }
            ProfilerEvent::CallInstrumented(r) => {
                self.calls.publish(r);
            }
            ProfilerEvent::ObservableCreated(r) => {
                self.observables.publish(r);
            }
            ProfilerEvent::ObservablesLinked(r) => {
                self.links.publish(r);
            }
            ProfilerEvent::Subscribed(r) => {
                self.subscribed.publish(r);
            }
            ProfilerEvent::Unsubscribed(r) => {
                self.unsubscribed.publish(r);
            }
            ProfilerEvent::OnNext(r) => self.notify(&self.on_next, StreamEventKind::OnNext, r),
            ProfilerEvent::OnCompleted(r) => {
                self.notify(&self.on_completed, StreamEventKind::OnCompleted, r)
            }
            ProfilerEvent::OnError(r) => self.notify(&self.on_error, StreamEventKind::OnError, r),
            ProfilerEvent::TypeDescribed(r) => {
                self.types.publish(r);
            }
            ProfilerEvent::ObjectPropertiesDescribed(r) => {
                self.object_properties.publish(r);
            }
            ProfilerEvent::ClientEvent(r) => {
                self.client_events.publish(r);
            }
        }
    }

    fn notify(
        &self,
        feed: &ReplayFeed<StreamNotification>,
        kind: StreamEventKind,
        record: StreamNotification,
    ) {
        feed.publish(record.clone());
        self.stream_events.publish((kind, record));
    }

    /// Number of records of `kind` seen so far.
    pub fn ingest_count(&self, kind: EventKind) -> u64 {
        self.counts[kind as usize].load(Ordering::Relaxed)
    }

    /// Total number of records seen so far.
    pub fn total_count(&self) -> u64 {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn modules(&self) -> Feed<ModuleLoaded> {
        self.modules.feed()
    }

    pub fn calls(&self) -> Feed<CallInstrumented> {
        self.calls.feed()
    }

    pub fn observables(&self) -> Feed<ObservableCreated> {
        self.observables.feed()
    }

    pub fn links(&self) -> Feed<ObservablesLinked> {
        self.links.feed()
    }

    pub fn subscribed(&self) -> Feed<Subscribed> {
        self.subscribed.feed()
    }

    pub fn unsubscribed(&self) -> Feed<Unsubscribed> {
        self.unsubscribed.feed()
    }

    pub fn on_next(&self) -> Feed<StreamNotification> {
        self.on_next.feed()
    }

    pub fn on_completed(&self) -> Feed<StreamNotification> {
        self.on_completed.feed()
    }

    pub fn on_error(&self) -> Feed<StreamNotification> {
        self.on_error.feed()
    }

    pub fn stream_events(&self) -> Feed<TaggedNotification> {
        self.stream_events.feed()
    }

    pub fn types(&self) -> Feed<TypeDescribed> {
        self.types.feed()
    }

    pub fn object_properties(&self) -> Feed<ObjectPropertiesDescribed> {
        self.object_properties.feed()
    }

    pub fn client_events(&self) -> Feed<ClientEventRecord> {
        self.client_events.feed()
    }

    /// Ends every per-kind feed.
    pub fn close(&self) {
        self.modules.close();
        self.calls.close();
        self.observables.close();
        self.links.close();
        self.subscribed.close();
        self.unsubscribed.close();
        self.on_next.close();
        self.on_completed.close();
        self.on_error.close();
        self.stream_events.close();
        self.types.close();
        self.object_properties.close();
        self.client_events.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rxmon_types::EventInfo;

    fn notification(subscription_id: i64, sequence_id: i64) -> StreamNotification {
        StreamNotification {
            subscription_id,
            info: EventInfo::new(sequence_id, DateTime::<Utc>::UNIX_EPOCH, 1),
            payload: None,
        }
    }

    #[test]
    fn records_land_in_their_kind_feed() {
        let ingest = EventIngest::new();
        ingest.publish(ProfilerEvent::ObservablesLinked(ObservablesLinked {
            input_id: 1,
            output_id: 2,
        }));
        ingest.publish(ProfilerEvent::OnNext(notification(5, 6)));

        assert_eq!(ingest.links().len(), 1);
        assert_eq!(ingest.on_next().len(), 1);
        assert!(ingest.modules().is_empty());
        assert_eq!(ingest.ingest_count(EventKind::ObservablesLinked), 1);
        assert_eq!(ingest.ingest_count(EventKind::OnNext), 1);
        assert_eq!(ingest.total_count(), 2);
    }

    #[test]
    fn notifications_share_one_ordered_feed() {
        let ingest = EventIngest::new();
        ingest.publish(ProfilerEvent::OnNext(notification(5, 6)));
        ingest.publish(ProfilerEvent::OnError(notification(5, 7)));
        ingest.publish(ProfilerEvent::OnCompleted(notification(8, 9)));

        let kinds: Vec<StreamEventKind> = ingest
            .stream_events()
            .snapshot()
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                StreamEventKind::OnNext,
                StreamEventKind::OnError,
                StreamEventKind::OnCompleted
            ]
        );
    }
}
