//! Live graph materialisation for rxmon.
//!
//! Turns the producer's unordered, forward-referencing record stream into a
//! queryable graph of modules, instrumented calls, observables, and
//! subscriptions that any number of readers can follow concurrently.
//!
//! # Building blocks
//!
//! | Type | Role |
//! |------|------|
//! | [`EventIngest`] | one replay feed per record kind |
//! | [`KeyedEntityCache`] | append-only keyed map with a change feed and per-key watches |
//! | [`ForwardRefResolver`] | one cache watch per key, result replayed to every caller |
//! | [`GroupedChildIndex`] | parent key to a lazily created, session-long children feed |
//! | [`ReactivityModel`] | wires the above into the domain entities |
//! | [`Session`] | owns a model, pumps a producer stream into it, pause/resume |
//!
//! # Usage
//!
//! ```rust,ignore
//! use rxmon_model::{Session, SessionConfig};
//!
//! let session = Session::new(SessionConfig::default());
//! session.attach(records);
//!
//! let mut modules = session.model().modules();
//! while let Some(added) = modules.recv().await {
//!     println!("{}", added.value.path);
//! }
//! ```

mod cache;
mod entity;
mod index;
mod ingest;
mod model;
mod resolver;
mod session;

pub use cache::{Added, Insertion, KeyedEntityCache};
pub use entity::{
    ClientEvent, InstrumentedCall, Module, ObjectProperties, ObservableInstance, ObservableLink,
    StreamEvent, StreamEventKind, Subscription, TypeDescriptor, UNKNOWN_NAME,
};
pub use index::GroupedChildIndex;
pub use ingest::{EventIngest, TaggedNotification};
pub use model::{CacheStats, ModelStats, ReactivityModel};
pub use resolver::ForwardRefResolver;
pub use rxmon_types::IngestError;
pub use session::{ConnectionState, Diagnostic, Session, SessionConfig};
