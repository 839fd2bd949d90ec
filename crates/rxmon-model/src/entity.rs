//! Materialised graph entities.
//!
//! Entities are plain immutable data keyed by their natural id. They hold no
//! references to each other: relationships are navigated through the
//! [`ReactivityModel`], which owns the caches and indices.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rxmon_feed::Feed;
use rxmon_types::{
    CallId, CallInstrumented, ClientEventRecord, EventInfo, ModuleId, ModuleLoaded, ObjectId,
    ObjectPropertiesDescribed, ObservableCreated, PayloadValue, SequenceId, StreamNotification,
    Subscribed, TypeDescribed, TypeId, Unsubscribed,
};
use serde::Serialize;

use crate::ReactivityModel;

/// Name given to every placeholder entity.
pub const UNKNOWN_NAME: &str = "[unknown]";

const UNKNOWN_MODULE_ID: ModuleId = 0;
const UNKNOWN_CALL_ID: CallId = -1;
const UNKNOWN_SEQUENCE_ID: SequenceId = -1;
const UNKNOWN_TYPE_ID: TypeId = -1;

fn unknown_info() -> EventInfo {
    EventInfo::new(UNKNOWN_SEQUENCE_ID, DateTime::<Utc>::MIN_UTC, -1)
}

/// A loaded module of the instrumented process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    pub id: ModuleId,
    pub path: String,
    pub assembly_name: String,
}

impl Module {
    /// Placeholder for a module that has not arrived.
    pub fn unknown() -> Self {
        Self {
            id: UNKNOWN_MODULE_ID,
            path: String::new(),
            assembly_name: UNKNOWN_NAME.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.id == UNKNOWN_MODULE_ID
    }

    /// Calls instrumented in this module.
    pub fn instrumented_calls(&self, model: &ReactivityModel) -> Feed<Arc<InstrumentedCall>> {
        model.module_calls(self.id)
    }
}

impl From<&ModuleLoaded> for Module {
    fn from(record: &ModuleLoaded) -> Self {
        Self {
            id: record.module_id,
            path: record.path.clone(),
            assembly_name: record.assembly_name.clone(),
        }
    }
}

/// An instrumentation point: a call site that returns an observable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentedCall {
    pub id: CallId,
    pub module_id: ModuleId,
    pub calling_type: String,
    pub calling_method: String,
    pub called_method: String,
    pub instruction_offset: i32,
}

impl InstrumentedCall {
    /// Placeholder for a call that has not arrived.
    pub fn unknown() -> Self {
        Self {
            id: UNKNOWN_CALL_ID,
            module_id: UNKNOWN_MODULE_ID,
            calling_type: String::new(),
            calling_method: String::new(),
            called_method: UNKNOWN_NAME.to_string(),
            instruction_offset: 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.id == UNKNOWN_CALL_ID
    }

    /// The module this call lives in, preceded by the unknown module.
    pub fn module(&self, model: &ReactivityModel) -> Feed<Arc<Module>> {
        model.call_module(self)
    }

    /// Observables created at this call site.
    pub fn observable_instances(&self, model: &ReactivityModel) -> Feed<Arc<ObservableInstance>> {
        model.call_observables(self.id)
    }
}

impl From<&CallInstrumented> for InstrumentedCall {
    fn from(record: &CallInstrumented) -> Self {
        Self {
            id: record.call_id,
            module_id: record.module_id,
            calling_type: record.calling_type.clone(),
            calling_method: record.calling_method.clone(),
            called_method: record.called_method.clone(),
            instruction_offset: record.instruction_offset,
        }
    }
}

impl fmt::Display for InstrumentedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {} @{}",
            self.calling_type, self.calling_method, self.called_method, self.instruction_offset
        )
    }
}

/// One observable created at runtime, keyed by its creation sequence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ObservableInstance {
    pub created: EventInfo,
    pub call_id: CallId,
}

impl ObservableInstance {
    /// Placeholder for an observable that has not arrived.
    pub fn unknown() -> Self {
        Self {
            created: unknown_info(),
            call_id: UNKNOWN_CALL_ID,
        }
    }

    pub fn id(&self) -> SequenceId {
        self.created.sequence_id
    }

    pub fn is_unknown(&self) -> bool {
        self.id() == UNKNOWN_SEQUENCE_ID
    }

    /// The call site that created this observable, preceded by the unknown call.
    pub fn call(&self, model: &ReactivityModel) -> Feed<Arc<InstrumentedCall>> {
        model.observable_call(self)
    }

    /// Observables this one was built from.
    pub fn inputs(&self, model: &ReactivityModel) -> Feed<Arc<ObservableInstance>> {
        model.observable_inputs(self.id())
    }

    pub fn subscriptions(&self, model: &ReactivityModel) -> Feed<Arc<Subscription>> {
        model.observable_subscriptions(self.id())
    }
}

impl From<&ObservableCreated> for ObservableInstance {
    fn from(record: &ObservableCreated) -> Self {
        Self {
            created: record.created,
            call_id: record.instrumentation_point_id,
        }
    }
}

/// An input-to-output edge between two observables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObservableLink {
    pub input_id: SequenceId,
    pub output_id: SequenceId,
}

impl ObservableLink {
    pub fn key(&self) -> (SequenceId, SequenceId) {
        (self.input_id, self.output_id)
    }
}

/// A subscription to an observable, keyed by its sequence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub subscribed: EventInfo,
    pub observable_id: SequenceId,
}

impl Subscription {
    pub fn id(&self) -> SequenceId {
        self.subscribed.sequence_id
    }

    /// The observable subscribed to, preceded by the unknown observable.
    pub fn observable(&self, model: &ReactivityModel) -> Feed<Arc<ObservableInstance>> {
        model.subscription_observable(self)
    }

    /// The full timeline: subscribe, notifications, and the disposal.
    pub fn events(&self, model: &ReactivityModel) -> Feed<Arc<StreamEvent>> {
        model.subscription_events(self)
    }
}

impl From<&Subscribed> for Subscription {
    fn from(record: &Subscribed) -> Self {
        Self {
            subscribed: record.subscribed,
            observable_id: record.observable_id,
        }
    }
}

/// What happened on a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    Subscribe,
    OnNext,
    OnCompleted,
    OnError,
    Unsubscribe,
}

impl StreamEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::OnNext => "on_next",
            Self::OnCompleted => "on_completed",
            Self::OnError => "on_error",
            Self::Unsubscribe => "unsubscribe",
        }
    }

    /// Returns `true` for kinds that end a subscription's stream.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::OnCompleted | Self::OnError | Self::Unsubscribe)
    }
}

impl fmt::Display for StreamEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a subscription's timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvent {
    pub subscription_id: SequenceId,
    pub info: EventInfo,
    pub kind: StreamEventKind,
    /// The value (on-next) or exception (on-error).
    pub payload: Option<PayloadValue>,
}

impl StreamEvent {
    /// The synthetic first event of every subscription timeline.
    pub fn subscribe(subscription: &Subscription) -> Self {
        Self {
            subscription_id: subscription.id(),
            info: subscription.subscribed,
            kind: StreamEventKind::Subscribe,
            payload: None,
        }
    }

    pub fn unsubscribe(record: &Unsubscribed) -> Self {
        Self {
            subscription_id: record.subscription_id,
            info: record.info,
            kind: StreamEventKind::Unsubscribe,
            payload: None,
        }
    }

    pub fn notification(kind: StreamEventKind, record: &StreamNotification) -> Self {
        Self {
            subscription_id: record.subscription_id,
            info: record.info,
            kind,
            payload: record.payload.clone(),
        }
    }

    pub fn sequence_id(&self) -> SequenceId {
        self.info.sequence_id
    }
}

/// Metadata for a payload type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeDescriptor {
    pub type_id: TypeId,
    pub type_name: String,
    pub property_names: Vec<String>,
}

impl TypeDescriptor {
    /// Placeholder for a type whose description has not arrived.
    pub fn unknown() -> Self {
        Self {
            type_id: UNKNOWN_TYPE_ID,
            type_name: UNKNOWN_NAME.to_string(),
            property_names: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.type_id == UNKNOWN_TYPE_ID
    }
}

impl From<&TypeDescribed> for TypeDescriptor {
    fn from(record: &TypeDescribed) -> Self {
        Self {
            type_id: record.type_id,
            type_name: record.type_name.clone(),
            property_names: record.property_names.clone(),
        }
    }
}

/// Property values of one payload object, in the order of its type's
/// property names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectProperties {
    pub object_id: ObjectId,
    pub property_values: Vec<PayloadValue>,
}

impl From<&ObjectPropertiesDescribed> for ObjectProperties {
    fn from(record: &ObjectPropertiesDescribed) -> Self {
        Self {
            object_id: record.object_id,
            property_values: record.property_values.clone(),
        }
    }
}

/// A marker the instrumented application emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientEvent {
    pub info: EventInfo,
    pub name: String,
    pub description: String,
}

impl ClientEvent {
    pub fn id(&self) -> SequenceId {
        self.info.sequence_id
    }
}

impl From<&ClientEventRecord> for ClientEvent {
    fn from(record: &ClientEventRecord) -> Self {
        Self {
            info: record.info,
            name: record.name.clone(),
            description: record.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_recognisable() {
        assert!(Module::unknown().is_unknown());
        assert!(InstrumentedCall::unknown().is_unknown());
        assert!(ObservableInstance::unknown().is_unknown());
        assert_eq!(TypeDescriptor::unknown().type_name, UNKNOWN_NAME);
        assert_eq!(ObservableInstance::unknown().id(), -1);
    }

    #[test]
    fn terminal_kinds() {
        assert!(!StreamEventKind::Subscribe.is_terminal());
        assert!(!StreamEventKind::OnNext.is_terminal());
        assert!(StreamEventKind::OnError.is_terminal());
        assert!(StreamEventKind::Unsubscribe.is_terminal());
    }
}
