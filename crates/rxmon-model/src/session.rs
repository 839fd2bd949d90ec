//! One monitoring session: the model plus its controls.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use rxmon_feed::{gate, sequence_gate, Feed, ReplayFeed};
use rxmon_types::{
    CallId, ControlRequest, IngestError, ObjectId, ProfilerEvent, SequenceId, UNSEQUENCED,
};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use uuid::Uuid;

use crate::ReactivityModel;

/// Session behaviour that can be set from configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Begin with updates held back until [`Session::resume`].
    pub start_paused: bool,
}

/// Whether a producer stream is feeding the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No stream has been attached yet.
    Detached,
    /// A stream is attached and being pumped.
    Connected,
    /// The attached stream ended normally.
    Disconnected,
    /// The attached stream ended with an unrecoverable error.
    Failed(String),
}

impl ConnectionState {
    /// Returns `true` once the attached stream has ended, either way.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detached => f.write_str("detached"),
            Self::Connected => f.write_str("connected"),
            Self::Disconnected => f.write_str("disconnected"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// A problem reported on the session's side channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub at: DateTime<Utc>,
    pub message: String,
    /// `false` if the problem ended the attached stream.
    pub recoverable: bool,
}

impl Diagnostic {
    fn from_error(error: &IngestError) -> Self {
        Self {
            at: Utc::now(),
            message: error.to_string(),
            recoverable: error.is_recoverable(),
        }
    }
}

/// Owns the model for one monitoring session and everything that steers it.
///
/// The pause control is a watch channel holding `true` while paused. It
/// drives a [`sequence_gate`] in front of the model, so pausing holds back
/// new sequenced records but never re-hides anything already shown, and
/// structural records keep flowing.
pub struct Session {
    id: Uuid,
    model: ReactivityModel,
    paused: watch::Sender<bool>,
    connection: Arc<watch::Sender<ConnectionState>>,
    diagnostics: ReplayFeed<Diagnostic>,
    monitoring: Mutex<BTreeSet<CallId>>,
    requests: ReplayFeed<ControlRequest>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("paused", &self.is_paused())
            .field("connection", &self.connection_state())
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(session = %id, start_paused = config.start_paused, "session created");
        Self {
            id,
            model: ReactivityModel::new(),
            paused: watch::Sender::new(config.start_paused),
            connection: Arc::new(watch::Sender::new(ConnectionState::Detached)),
            diagnostics: ReplayFeed::new(),
            monitoring: Mutex::new(BTreeSet::new()),
            requests: ReplayFeed::new(),
            pump: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn model(&self) -> &ReactivityModel {
        &self.model
    }

    fn lock_pump(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_monitoring(&self) -> MutexGuard<'_, BTreeSet<CallId>> {
        self.monitoring.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The gate control: `true` while open, i.e. not paused.
    fn open_signal(&self) -> impl Stream<Item = bool> + Send + 'static {
        WatchStream::new(self.paused.subscribe()).map(|paused| !paused)
    }

    /// Starts pumping a producer stream into the model.
    ///
    /// Must be called from within a Tokio runtime. A stream already attached
    /// is stopped first; the model and everything materialised so far are
    /// kept.
    pub fn attach<S>(&self, stream: S)
    where
        S: Stream<Item = Result<ProfilerEvent, IngestError>> + Send + 'static,
    {
        let gated = sequence_gate(stream, self.open_signal(), sequence_key);
        let pump = Pump {
            session: self.id,
            model: self.model.clone(),
            connection: Arc::clone(&self.connection),
            diagnostics: self.diagnostics.clone(),
        };

        let mut slot = self.lock_pump();
        if let Some(previous) = slot.take() {
            tracing::info!(session = %self.id, "replacing attached stream");
            previous.abort();
        }
        self.connection.send_replace(ConnectionState::Connected);
        tracing::info!(session = %self.id, "producer stream attached");
        *slot = Some(tokio::spawn(pump.run(gated)));
    }

    /// Holds back new sequenced records until [`resume`](Self::resume).
    pub fn pause(&self) {
        if !self.paused.send_replace(true) {
            tracing::info!(session = %self.id, "session paused");
        }
    }

    /// Releases held records in order and lets new ones through.
    pub fn resume(&self) {
        if self.paused.send_replace(false) {
            tracing::info!(session = %self.id, "session resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Wraps a consumer stream so it is held back while the session is paused.
    pub fn pausable<S>(&self, stream: S) -> impl Stream<Item = S::Item>
    where
        S: Stream,
    {
        gate(stream, self.open_signal())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.borrow().clone()
    }

    /// A receiver that observes every connection state change.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    /// Problems reported while pumping, in the order they happened.
    pub fn diagnostics(&self) -> Feed<Diagnostic> {
        self.diagnostics.feed()
    }

    /// Asks the producer to report observables created at `call_id`.
    ///
    /// Returns `false`, and sends nothing, if the call is already monitored.
    pub fn start_monitoring(&self, call_id: CallId) -> bool {
        let added = self.lock_monitoring().insert(call_id);
        if added {
            tracing::debug!(session = %self.id, call_id, "start monitoring");
            self.requests
                .publish(ControlRequest::StartMonitoring { call_id });
        }
        added
    }

    /// Asks the producer to stop reporting `call_id`.
    ///
    /// Returns `false`, and sends nothing, if the call was not monitored.
    pub fn stop_monitoring(&self, call_id: CallId) -> bool {
        let removed = self.lock_monitoring().remove(&call_id);
        if removed {
            tracing::debug!(session = %self.id, call_id, "stop monitoring");
            self.requests
                .publish(ControlRequest::StopMonitoring { call_id });
        }
        removed
    }

    /// Calls currently being monitored, in ascending order.
    pub fn requested_calls(&self) -> Vec<CallId> {
        self.lock_monitoring().iter().copied().collect()
    }

    /// Asks the producer to describe a payload object's properties.
    ///
    /// The answer arrives as an `ObjectPropertiesDescribed` record and shows
    /// up in [`ReactivityModel::object_properties`].
    pub fn request_object_properties(&self, object_id: ObjectId) {
        tracing::debug!(session = %self.id, object_id, "requesting object properties");
        self.requests
            .publish(ControlRequest::GetObjectProperties { object_id });
    }

    /// Every request sent to the producer, in order.
    pub fn control_requests(&self) -> Feed<ControlRequest> {
        self.requests.feed()
    }

    /// Stops the pump and ends every feed the session owns.
    pub fn shutdown(&self) {
        if let Some(pump) = self.lock_pump().take() {
            pump.abort();
        }
        self.connection.send_if_modified(|state| {
            let attached = *state == ConnectionState::Connected;
            if attached {
                *state = ConnectionState::Disconnected;
            }
            attached
        });
        self.model.close();
        self.diagnostics.close();
        self.requests.close();
        tracing::info!(session = %self.id, "session shut down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(pump) = self.lock_pump().take() {
            pump.abort();
        }
    }
}

/// Ordering key used to gate producer records. Errors are never held.
fn sequence_key(item: &Result<ProfilerEvent, IngestError>) -> SequenceId {
    match item {
        Ok(event) => event.sequence_key(),
        Err(_) => UNSEQUENCED,
    }
}

struct Pump {
    session: Uuid,
    model: ReactivityModel,
    connection: Arc<watch::Sender<ConnectionState>>,
    diagnostics: ReplayFeed<Diagnostic>,
}

impl Pump {
    async fn run<S>(self, records: S)
    where
        S: Stream<Item = Result<ProfilerEvent, IngestError>>,
    {
        tokio::pin!(records);
        let mut skipped = 0u64;
        while let Some(record) = records.next().await {
            match record {
                Ok(event) => self.model.ingest(event),
                Err(e) if e.is_recoverable() => {
                    skipped += 1;
                    tracing::warn!(session = %self.session, error = %e, "skipping malformed record");
                    self.diagnostics.publish(Diagnostic::from_error(&e));
                }
                Err(e) => {
                    tracing::error!(session = %self.session, error = %e, "producer stream failed");
                    self.diagnostics.publish(Diagnostic::from_error(&e));
                    self.connection
                        .send_replace(ConnectionState::Failed(e.to_string()));
                    return;
                }
            }
        }
        tracing::info!(session = %self.session, skipped, "producer stream ended");
        self.connection.send_replace(ConnectionState::Disconnected);
    }
}
