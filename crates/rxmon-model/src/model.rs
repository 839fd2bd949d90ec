//! The materialised reactivity graph.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, Weak};

use rxmon_feed::{Feed, FeedCursor, ReplayFeed};
use rxmon_types::{
    CallId, CallInstrumented, ClientEventRecord, EventKind, ModuleId, ModuleLoaded, ObjectId,
    ObjectPropertiesDescribed, ObservableCreated, ObservablesLinked, ProfilerEvent, SequenceId,
    Subscribed, TypeDescribed, TypeId, Unsubscribed,
};
use serde::Serialize;

use crate::cache::{Added, KeyedEntityCache};
use crate::entity::{
    ClientEvent, InstrumentedCall, Module, ObjectProperties, ObservableInstance, ObservableLink,
    StreamEvent, Subscription, TypeDescriptor,
};
use crate::index::GroupedChildIndex;
use crate::ingest::{EventIngest, TaggedNotification};
use crate::resolver::ForwardRefResolver;

type Cache<K, V> = Arc<KeyedEntityCache<K, Arc<V>>>;
type Resolver<K, V> = Arc<ForwardRefResolver<K, Arc<V>>>;

/// Counts for one entity cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub kind: &'static str,
    pub entries: usize,
    pub watches_established: usize,
    pub duplicates_rejected: usize,
}

/// A summary of what has been materialised so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStats {
    pub records_ingested: u64,
    pub modules: usize,
    pub instrumented_calls: usize,
    pub observables: usize,
    pub links: usize,
    pub subscriptions: usize,
    pub stream_events: u64,
    pub client_events: usize,
    pub caches: Vec<CacheStats>,
}

impl ModelStats {
    /// Duplicate inserts rejected across every cache.
    pub fn duplicates_rejected(&self) -> usize {
        self.caches.iter().map(|c| c.duplicates_rejected).sum()
    }
}

/// Memoised per-entity navigation feeds.
struct Memo<K, V> {
    feeds: Mutex<HashMap<K, Feed<V>>>,
}

impl<K, V> Memo<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + 'static,
{
    fn new() -> Self {
        Self {
            feeds: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_build(&self, key: K, build: impl FnOnce() -> Feed<V>) -> Feed<V> {
        let mut feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        feeds.entry(key).or_insert_with(build).clone()
    }
}

fn cache_stats<K, V>(cache: &KeyedEntityCache<K, V>) -> CacheStats
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
    V: Clone + Send + 'static,
{
    CacheStats {
        kind: cache.kind(),
        entries: cache.len(),
        watches_established: cache.watches_established(),
        duplicates_rejected: cache.duplicates_rejected(),
    }
}

struct Sentinels {
    module: Arc<Module>,
    call: Arc<InstrumentedCall>,
    observable: Arc<ObservableInstance>,
    type_info: Arc<TypeDescriptor>,
}

struct Inner {
    ingest: EventIngest,

    modules: Cache<ModuleId, Module>,
    calls: Cache<CallId, InstrumentedCall>,
    observables: Cache<SequenceId, ObservableInstance>,
    links: Cache<(SequenceId, SequenceId), ObservableLink>,
    subscriptions: Cache<SequenceId, Subscription>,
    disposals: Cache<SequenceId, StreamEvent>,
    types: Cache<TypeId, TypeDescriptor>,
    object_properties: Cache<ObjectId, ObjectProperties>,

    module_refs: Resolver<ModuleId, Module>,
    call_refs: Resolver<CallId, InstrumentedCall>,
    observable_refs: Resolver<SequenceId, ObservableInstance>,
    disposal_refs: Resolver<SequenceId, StreamEvent>,
    type_refs: Resolver<TypeId, TypeDescriptor>,
    object_refs: Resolver<ObjectId, ObjectProperties>,

    calls_by_module: GroupedChildIndex<ModuleId, Arc<InstrumentedCall>, Arc<InstrumentedCall>>,
    observables_by_call:
        GroupedChildIndex<CallId, Arc<ObservableInstance>, Arc<ObservableInstance>>,
    inputs_by_output: GroupedChildIndex<SequenceId, ObservableLink, Arc<ObservableInstance>>,
    subscriptions_by_observable:
        GroupedChildIndex<SequenceId, Arc<Subscription>, Arc<Subscription>>,
    events_by_subscription: GroupedChildIndex<SequenceId, Arc<StreamEvent>, Arc<StreamEvent>>,

    client_events: ReplayFeed<Arc<ClientEvent>>,

    sentinels: Sentinels,
    call_module: Memo<CallId, Arc<Module>>,
    observable_call: Memo<SequenceId, Arc<InstrumentedCall>>,
    subscription_observable: Memo<SequenceId, Arc<ObservableInstance>>,
    subscription_events: Memo<SequenceId, Arc<StreamEvent>>,
    type_info: Memo<TypeId, Arc<TypeDescriptor>>,
}

fn cache<K, V>(kind: &'static str) -> Cache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
    V: Send + Sync + 'static,
{
    Arc::new(KeyedEntityCache::new(kind))
}

fn resolver<K, V>(cache: &Cache<K, V>) -> Resolver<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
    V: Send + Sync + 'static,
{
    Arc::new(ForwardRefResolver::new(Arc::clone(cache)))
}

/// The live graph for one monitoring session.
///
/// Records go in through [`ingest`](Self::ingest); everything else is a read.
/// Each record kind is routed from its [`EventIngest`] feed into the cache
/// and indices that care about it. Navigation between entities never stores
/// references: every relationship is a feed built on first request from an
/// index or a resolver and memoised for the rest of the session.
///
/// Cloning the model yields another handle to the same graph.
#[derive(Clone)]
pub struct ReactivityModel {
    inner: Arc<Inner>,
}

impl Default for ReactivityModel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReactivityModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactivityModel")
            .field("stats", &self.stats())
            .finish()
    }
}

impl ReactivityModel {
    pub fn new() -> Self {
        let modules = cache("module");
        let calls = cache("instrumented_call");
        let observables = cache("observable");
        let links = cache("observable_link");
        let subscriptions = cache("subscription");
        let disposals = cache("disposal");
        let types = cache("type");
        let object_properties = cache("object_properties");

        let module_refs = resolver(&modules);
        let call_refs = resolver(&calls);
        let observable_refs = resolver(&observables);
        let disposal_refs = resolver(&disposals);
        let type_refs = resolver(&types);
        let object_refs = resolver(&object_properties);

        let calls_by_module = {
            let refs = Arc::clone(&call_refs);
            GroupedChildIndex::new(
                "calls_by_module",
                |call: &Arc<InstrumentedCall>| call.module_id,
                move |call: &Arc<InstrumentedCall>| refs.resolve(call.id),
            )
        };
        let observables_by_call = {
            let refs = Arc::clone(&observable_refs);
            GroupedChildIndex::new(
                "observables_by_call",
                |obs: &Arc<ObservableInstance>| obs.call_id,
                move |obs: &Arc<ObservableInstance>| refs.resolve(obs.id()),
            )
        };
        let inputs_by_output = {
            let refs = Arc::clone(&observable_refs);
            GroupedChildIndex::new(
                "inputs_by_output",
                |link: &ObservableLink| link.output_id,
                move |link: &ObservableLink| refs.resolve(link.input_id),
            )
        };
        let subscriptions_by_observable = {
            let refs = resolver(&subscriptions);
            GroupedChildIndex::new(
                "subscriptions_by_observable",
                |sub: &Arc<Subscription>| sub.observable_id,
                move |sub: &Arc<Subscription>| refs.resolve(sub.id()),
            )
        };
        let events_by_subscription = GroupedChildIndex::new(
            "events_by_subscription",
            |event: &Arc<StreamEvent>| event.subscription_id,
            |event: &Arc<StreamEvent>| Feed::ready(Arc::clone(event)),
        );

        let inner = Arc::new(Inner {
            ingest: EventIngest::new(),
            modules,
            calls,
            observables,
            links,
            subscriptions,
            disposals,
            types,
            object_properties,
            module_refs,
            call_refs,
            observable_refs,
            disposal_refs,
            type_refs,
            object_refs,
            calls_by_module,
            observables_by_call,
            inputs_by_output,
            subscriptions_by_observable,
            events_by_subscription,
            client_events: ReplayFeed::new(),
            sentinels: Sentinels {
                module: Arc::new(Module::unknown()),
                call: Arc::new(InstrumentedCall::unknown()),
                observable: Arc::new(ObservableInstance::unknown()),
                type_info: Arc::new(TypeDescriptor::unknown()),
            },
            call_module: Memo::new(),
            observable_call: Memo::new(),
            subscription_observable: Memo::new(),
            subscription_events: Memo::new(),
            type_info: Memo::new(),
        });

        let ingest = &inner.ingest;
        route(&inner, ingest.modules(), Inner::on_module);
        route(&inner, ingest.calls(), Inner::on_call);
        route(&inner, ingest.observables(), Inner::on_observable);
        route(&inner, ingest.links(), Inner::on_link);
        route(&inner, ingest.subscribed(), Inner::on_subscribed);
        route(&inner, ingest.unsubscribed(), Inner::on_unsubscribed);
        route(&inner, ingest.stream_events(), Inner::on_notification);
        route(&inner, ingest.types(), Inner::on_type);
        route(&inner, ingest.object_properties(), Inner::on_object_properties);
        route(&inner, ingest.client_events(), Inner::on_client_event);

        Self { inner }
    }

    /// Feeds one upstream record into the graph.
    pub fn ingest(&self, event: ProfilerEvent) {
        self.inner.ingest.publish(event);
    }

    /// The per-kind record feeds.
    pub fn events(&self) -> &EventIngest {
        &self.inner.ingest
    }

    /// Every module, past and future, in arrival order.
    pub fn modules(&self) -> FeedCursor<Added<ModuleId, Arc<Module>>> {
        self.inner.modules.connect()
    }

    pub fn instrumented_calls(&self) -> FeedCursor<Added<CallId, Arc<InstrumentedCall>>> {
        self.inner.calls.connect()
    }

    pub fn observable_instances(&self) -> FeedCursor<Added<SequenceId, Arc<ObservableInstance>>> {
        self.inner.observables.connect()
    }

    pub fn subscriptions(&self) -> FeedCursor<Added<SequenceId, Arc<Subscription>>> {
        self.inner.subscriptions.connect()
    }

    pub fn module(&self, id: ModuleId) -> Option<Arc<Module>> {
        self.inner.modules.get(&id)
    }

    pub fn instrumented_call(&self, id: CallId) -> Option<Arc<InstrumentedCall>> {
        self.inner.calls.get(&id)
    }

    pub fn observable_instance(&self, id: SequenceId) -> Option<Arc<ObservableInstance>> {
        self.inner.observables.get(&id)
    }

    pub fn subscription(&self, id: SequenceId) -> Option<Arc<Subscription>> {
        self.inner.subscriptions.get(&id)
    }

    /// Calls instrumented in `module_id`, in arrival order.
    pub fn module_calls(&self, module_id: ModuleId) -> Feed<Arc<InstrumentedCall>> {
        self.inner.calls_by_module.children_of(module_id)
    }

    /// Observables created at `call_id`.
    pub fn call_observables(&self, call_id: CallId) -> Feed<Arc<ObservableInstance>> {
        self.inner.observables_by_call.children_of(call_id)
    }

    /// Observables `observable_id` was built from, in resolution order.
    pub fn observable_inputs(&self, observable_id: SequenceId) -> Feed<Arc<ObservableInstance>> {
        self.inner.inputs_by_output.children_of(observable_id)
    }

    pub fn observable_subscriptions(&self, observable_id: SequenceId) -> Feed<Arc<Subscription>> {
        self.inner.subscriptions_by_observable.children_of(observable_id)
    }

    /// The module a call lives in.
    ///
    /// Starts with the unknown module; the real one follows at most once.
    /// If the module never arrives the placeholder is all there is.
    pub fn call_module(&self, call: &InstrumentedCall) -> Feed<Arc<Module>> {
        let inner = &self.inner;
        if call.is_unknown() {
            return Feed::ready(Arc::clone(&inner.sentinels.module));
        }
        inner.call_module.get_or_build(call.id, || {
            inner
                .module_refs
                .resolve(call.module_id)
                .starting_with(Arc::clone(&inner.sentinels.module))
        })
    }

    /// The call site that created an observable, starting with the unknown call.
    pub fn observable_call(&self, observable: &ObservableInstance) -> Feed<Arc<InstrumentedCall>> {
        let inner = &self.inner;
        if observable.is_unknown() {
            return Feed::ready(Arc::clone(&inner.sentinels.call));
        }
        inner.observable_call.get_or_build(observable.id(), || {
            inner
                .call_refs
                .resolve(observable.call_id)
                .starting_with(Arc::clone(&inner.sentinels.call))
        })
    }

    /// The observable a subscription is attached to, starting with the
    /// unknown observable.
    pub fn subscription_observable(
        &self,
        subscription: &Subscription,
    ) -> Feed<Arc<ObservableInstance>> {
        let inner = &self.inner;
        inner.subscription_observable.get_or_build(subscription.id(), || {
            inner
                .observable_refs
                .resolve(subscription.observable_id)
                .starting_with(Arc::clone(&inner.sentinels.observable))
        })
    }

    /// A subscription's whole timeline.
    ///
    /// The synthetic subscribe event comes first, then notifications and the
    /// disposal in arrival order, so a late reader still sees the timeline
    /// from its start. The timeline is built on first request: if a
    /// notification arrived after the disposal before then, the disposal is
    /// listed last rather than in arrival order.
    pub fn subscription_events(&self, subscription: &Subscription) -> Feed<Arc<StreamEvent>> {
        let inner = &self.inner;
        let id = subscription.id();
        inner.subscription_events.get_or_build(id, || {
            let notifications = inner.events_by_subscription.children_of(id);
            let disposal = inner.disposal_refs.resolve(id);
            notifications
                .merge(&disposal)
                .starting_with(Arc::new(StreamEvent::subscribe(subscription)))
        })
    }

    /// Type metadata for `type_id`, starting with the unknown type.
    pub fn type_info(&self, type_id: TypeId) -> Feed<Arc<TypeDescriptor>> {
        let inner = &self.inner;
        inner.type_info.get_or_build(type_id, || {
            inner
                .type_refs
                .resolve(type_id)
                .starting_with(Arc::clone(&inner.sentinels.type_info))
        })
    }

    /// Property values of a payload object, once the producer sends them.
    pub fn object_properties(&self, object_id: ObjectId) -> Feed<Arc<ObjectProperties>> {
        self.inner.object_refs.resolve(object_id)
    }

    pub fn client_events(&self) -> Feed<Arc<ClientEvent>> {
        self.inner.client_events.feed()
    }

    pub fn stats(&self) -> ModelStats {
        let inner = &self.inner;
        let ingest = &inner.ingest;
        ModelStats {
            records_ingested: ingest.total_count(),
            modules: inner.modules.len(),
            instrumented_calls: inner.calls.len(),
            observables: inner.observables.len(),
            links: inner.links.len(),
            subscriptions: inner.subscriptions.len(),
            stream_events: ingest.ingest_count(EventKind::OnNext)
                + ingest.ingest_count(EventKind::OnCompleted)
                + ingest.ingest_count(EventKind::OnError)
                + ingest.ingest_count(EventKind::Unsubscribed),
            client_events: inner.client_events.feed().len(),
            caches: vec![
                cache_stats(&inner.modules),
                cache_stats(&inner.calls),
                cache_stats(&inner.observables),
                cache_stats(&inner.links),
                cache_stats(&inner.subscriptions),
                cache_stats(&inner.disposals),
                cache_stats(&inner.types),
                cache_stats(&inner.object_properties),
            ],
        }
    }

    /// Ends every feed the model owns, including navigation feeds still
    /// waiting on a forward reference. Materialised entities stay readable;
    /// records ingested afterwards are dropped.
    pub fn close(&self) {
        let inner = &self.inner;
        inner.ingest.close();
        inner.modules.close();
        inner.calls.close();
        inner.observables.close();
        inner.links.close();
        inner.subscriptions.close();
        inner.disposals.close();
        inner.types.close();
        inner.object_properties.close();
        inner.calls_by_module.close();
        inner.observables_by_call.close();
        inner.inputs_by_output.close();
        inner.subscriptions_by_observable.close();
        inner.events_by_subscription.close();
        inner.client_events.close();
        tracing::debug!("reactivity model closed");
    }
}

/// Forwards every record of one kind to an `Inner` handler.
///
/// The sink holds a weak handle: the ingest feeds live inside `Inner`.
fn route<T>(inner: &Arc<Inner>, feed: Feed<T>, handle: fn(&Inner, &T))
where
    T: Clone + Send + 'static,
{
    let weak: Weak<Inner> = Arc::downgrade(inner);
    feed.forward_to(move |record| {
        if let Some(inner) = weak.upgrade() {
            handle(&inner, record);
        }
    });
}

impl Inner {
    fn on_module(&self, record: &ModuleLoaded) {
        self.modules
            .insert_or_get(record.module_id, || Arc::new(Module::from(record)));
    }

    fn on_call(&self, record: &CallInstrumented) {
        let inserted = self
            .calls
            .insert_or_get(record.call_id, || Arc::new(InstrumentedCall::from(record)));
        if inserted.is_new() {
            self.calls_by_module.ingest(&inserted.into_value());
        }
    }

    fn on_observable(&self, record: &ObservableCreated) {
        let inserted = self.observables.insert_or_get(record.created.sequence_id, || {
            Arc::new(ObservableInstance::from(record))
        });
        if inserted.is_new() {
            self.observables_by_call.ingest(&inserted.into_value());
        }
    }

    fn on_link(&self, record: &ObservablesLinked) {
        let link = ObservableLink {
            input_id: record.input_id,
            output_id: record.output_id,
        };
        let inserted = self.links.insert_or_get(link.key(), || Arc::new(link));
        if inserted.is_new() {
            self.inputs_by_output.ingest(&link);
        }
    }

    fn on_subscribed(&self, record: &Subscribed) {
        let inserted = self
            .subscriptions
            .insert_or_get(record.subscribed.sequence_id, || {
                Arc::new(Subscription::from(record))
            });
        if inserted.is_new() {
            self.subscriptions_by_observable
                .ingest(&inserted.into_value());
        }
    }

    fn on_unsubscribed(&self, record: &Unsubscribed) {
        self.disposals.insert_or_get(record.subscription_id, || {
            Arc::new(StreamEvent::unsubscribe(record))
        });
    }

    fn on_notification(&self, (kind, record): &TaggedNotification) {
        let event = Arc::new(StreamEvent::notification(*kind, record));
        self.events_by_subscription.ingest(&event);
    }

    fn on_type(&self, record: &TypeDescribed) {
        self.types
            .insert_or_get(record.type_id, || Arc::new(TypeDescriptor::from(record)));
    }

    fn on_object_properties(&self, record: &ObjectPropertiesDescribed) {
        self.object_properties
            .insert_or_get(record.object_id, || Arc::new(ObjectProperties::from(record)));
    }

    fn on_client_event(&self, record: &ClientEventRecord) {
        self.client_events
            .publish(Arc::new(ClientEvent::from(record)));
    }
}
