//! Shared record types, identifiers, and error definitions for rxmon.
//!
//! This crate holds the vocabulary spoken between the instrumented process
//! (the producer) and the monitoring side: the typed upstream records, the
//! payload values they carry, the control requests sent back to the
//! producer, and the ingest error taxonomy.
//!
//! Nothing in here knows how records are materialised into a graph; that is
//! `rxmon-model`'s job. Keeping these definitions dependency-light lets the
//! data-file codec and the model agree on one set of types without depending
//! on each other.

mod control;
mod error;
mod event;
mod payload;

pub use control::ControlRequest;
pub use error::IngestError;
pub use event::{
    CallInstrumented, ClientEventRecord, EventInfo, EventKind, ModuleLoaded,
    ObjectPropertiesDescribed, ObservableCreated, ObservablesLinked, ParseEventKindError,
    ProfilerEvent, StreamNotification, Subscribed, TypeDescribed, Unsubscribed,
};
pub use payload::{PayloadValue, Primitive};

/// Identifier the producer assigns to a loaded module.
pub type ModuleId = u64;

/// Identifier of an instrumentation point (one instrumented call site).
pub type CallId = i32;

/// Value of the session-wide monotonically increasing sequence counter.
///
/// Observables and subscriptions are keyed by the sequence id of the event
/// that created them.
pub type SequenceId = i64;

/// Identifier of a payload type described by a `TypeDescribed` record.
pub type TypeId = i32;

/// Identifier of a payload object whose properties may be requested.
pub type ObjectId = i64;

/// Sequence key used for records that carry no sequence id of their own.
///
/// Structural records (modules, calls, links, type metadata) use this key so
/// that a paused session never holds them back.
pub const UNSEQUENCED: SequenceId = 0;
