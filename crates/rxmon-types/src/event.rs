//! Upstream record types produced by the instrumented process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CallId, ModuleId, ObjectId, PayloadValue, SequenceId, TypeId, UNSEQUENCED};

/// Common details attached to every sequenced event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventInfo {
    /// Position in the session-wide sequence.
    pub sequence_id: SequenceId,
    /// When the event happened in the instrumented process.
    pub timestamp: DateTime<Utc>,
    /// Thread the event happened on.
    pub thread_id: i32,
}

impl EventInfo {
    /// Creates event details.
    pub fn new(sequence_id: SequenceId, timestamp: DateTime<Utc>, thread_id: i32) -> Self {
        Self {
            sequence_id,
            timestamp,
            thread_id,
        }
    }
}

/// A module was loaded into the instrumented process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleLoaded {
    pub module_id: ModuleId,
    pub path: String,
    pub assembly_name: String,
}

/// The producer instrumented a call site that returns an observable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInstrumented {
    pub call_id: CallId,
    pub module_id: ModuleId,
    pub calling_type: String,
    pub calling_method: String,
    pub called_method: String,
    pub instruction_offset: i32,
}

/// An observable was created at an instrumentation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservableCreated {
    pub created: EventInfo,
    pub instrumentation_point_id: CallId,
}

/// One observable was built from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObservablesLinked {
    pub input_id: SequenceId,
    pub output_id: SequenceId,
}

/// A subscription was made to an observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscribed {
    pub subscribed: EventInfo,
    pub observable_id: SequenceId,
}

/// A subscription was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unsubscribed {
    pub subscription_id: SequenceId,
    pub info: EventInfo,
}

/// An on-next, on-completed, or on-error notification on a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamNotification {
    pub subscription_id: SequenceId,
    pub info: EventInfo,
    /// The value (on-next) or exception (on-error); absent for on-completed.
    #[serde(default)]
    pub payload: Option<PayloadValue>,
}

/// Metadata describing a payload type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescribed {
    pub type_id: TypeId,
    pub type_name: String,
    pub property_names: Vec<String>,
}

/// Property values of a payload object, sent in response to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPropertiesDescribed {
    pub object_id: ObjectId,
    pub property_values: Vec<PayloadValue>,
}

/// A marker the instrumented application emitted on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEventRecord {
    /// The event's position in the sequence doubles as its id.
    pub info: EventInfo,
    pub name: String,
    pub description: String,
}

impl ClientEventRecord {
    /// Returns the client event's id.
    pub fn id(&self) -> SequenceId {
        self.info.sequence_id
    }
}

/// One typed record from the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProfilerEvent {
    ModuleLoaded(ModuleLoaded),
    CallInstrumented(CallInstrumented),
    ObservableCreated(ObservableCreated),
    ObservablesLinked(ObservablesLinked),
    Subscribed(Subscribed),
    Unsubscribed(Unsubscribed),
    OnNext(StreamNotification),
    OnCompleted(StreamNotification),
    OnError(StreamNotification),
    TypeDescribed(TypeDescribed),
    ObjectPropertiesDescribed(ObjectPropertiesDescribed),
    ClientEvent(ClientEventRecord),
}

impl ProfilerEvent {
    /// Returns the kind of this record.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ModuleLoaded(_) => EventKind::ModuleLoaded,
            Self::CallInstrumented(_) => EventKind::CallInstrumented,
            Self::ObservableCreated(_) => EventKind::ObservableCreated,
            Self::ObservablesLinked(_) => EventKind::ObservablesLinked,
            Self::Subscribed(_) => EventKind::Subscribed,
            Self::Unsubscribed(_) => EventKind::Unsubscribed,
            Self::OnNext(_) => EventKind::OnNext,
            Self::OnCompleted(_) => EventKind::OnCompleted,
            Self::OnError(_) => EventKind::OnError,
            Self::TypeDescribed(_) => EventKind::TypeDescribed,
            Self::ObjectPropertiesDescribed(_) => EventKind::ObjectPropertiesDescribed,
            Self::ClientEvent(_) => EventKind::ClientEvent,
        }
    }

    /// Returns the ordering key used to gate this record while paused.
    ///
    /// Records without a sequence id of their own report [`UNSEQUENCED`].
    pub fn sequence_key(&self) -> SequenceId {
        match self {
            Self::ObservableCreated(r) => r.created.sequence_id,
            Self::Subscribed(r) => r.subscribed.sequence_id,
            Self::Unsubscribed(r) => r.info.sequence_id,
            Self::OnNext(r) | Self::OnCompleted(r) | Self::OnError(r) => r.info.sequence_id,
            Self::ModuleLoaded(_)
            | Self::CallInstrumented(_)
            | Self::ObservablesLinked(_)
            | Self::TypeDescribed(_)
            | Self::ObjectPropertiesDescribed(_)
            | Self::ClientEvent(_) => UNSEQUENCED,
        }
    }
}

/// The kinds of upstream record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ModuleLoaded,
    CallInstrumented,
    ObservableCreated,
    ObservablesLinked,
    Subscribed,
    Unsubscribed,
    OnNext,
    OnCompleted,
    OnError,
    TypeDescribed,
    ObjectPropertiesDescribed,
    ClientEvent,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 12] = [
        Self::ModuleLoaded,
        Self::CallInstrumented,
        Self::ObservableCreated,
        Self::ObservablesLinked,
        Self::Subscribed,
        Self::Unsubscribed,
        Self::OnNext,
        Self::OnCompleted,
        Self::OnError,
        Self::TypeDescribed,
        Self::ObjectPropertiesDescribed,
        Self::ClientEvent,
    ];

    /// Returns the canonical string label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModuleLoaded => "module_loaded",
            Self::CallInstrumented => "call_instrumented",
            Self::ObservableCreated => "observable_created",
            Self::ObservablesLinked => "observables_linked",
            Self::Subscribed => "subscribed",
            Self::Unsubscribed => "unsubscribed",
            Self::OnNext => "on_next",
            Self::OnCompleted => "on_completed",
            Self::OnError => "on_error",
            Self::TypeDescribed => "type_described",
            Self::ObjectPropertiesDescribed => "object_properties_described",
            Self::ClientEvent => "client_event",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = ParseEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseEventKindError(s.to_string()))
    }
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone)]
pub struct ParseEventKindError(pub String);

impl std::fmt::Display for ParseEventKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for ParseEventKindError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(sequence_id: SequenceId) -> EventInfo {
        EventInfo::new(sequence_id, DateTime::<Utc>::UNIX_EPOCH, 1)
    }

    #[test]
    fn event_kind_labels_parse_back() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("observable_destroyed".parse::<EventKind>().is_err());
    }

    #[test]
    fn structural_records_are_unsequenced() {
        let module = ProfilerEvent::ModuleLoaded(ModuleLoaded {
            module_id: 1,
            path: "/app/Core.dll".to_string(),
            assembly_name: "Core".to_string(),
        });
        let link = ProfilerEvent::ObservablesLinked(ObservablesLinked {
            input_id: 4,
            output_id: 9,
        });
        assert_eq!(module.sequence_key(), UNSEQUENCED);
        assert_eq!(link.sequence_key(), UNSEQUENCED);
    }

    #[test]
    fn sequenced_records_report_their_sequence_id() {
        let created = ProfilerEvent::ObservableCreated(ObservableCreated {
            created: info(17),
            instrumentation_point_id: 2,
        });
        let completed = ProfilerEvent::OnCompleted(StreamNotification {
            subscription_id: 18,
            info: info(25),
            payload: None,
        });
        assert_eq!(created.sequence_key(), 17);
        assert_eq!(completed.sequence_key(), 25);
        assert_eq!(completed.kind(), EventKind::OnCompleted);
    }

    #[test]
    fn records_decode_from_tagged_json() {
        let json = r#"{
            "event": "subscribed",
            "subscribed": {"sequence_id": 5, "timestamp": "2024-01-01T00:00:00Z", "thread_id": 3},
            "observable_id": 4
        }"#;
        let event: ProfilerEvent = serde_json::from_str(json).unwrap();
        match event {
            ProfilerEvent::Subscribed(sub) => {
                assert_eq!(sub.subscribed.sequence_id, 5);
                assert_eq!(sub.observable_id, 4);
            }
            other => panic!("unexpected record: {other:?}"),
        }
    }
}
