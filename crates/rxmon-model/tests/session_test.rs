//! Integration tests for session control: pause/resume, monitoring
//! requests, diagnostics, and connection state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use rxmon_model::{ConnectionState, Session, SessionConfig};
use rxmon_types::{
    CallInstrumented, ControlRequest, EventInfo, IngestError, ModuleLoaded, ObservableCreated,
    ProfilerEvent, Subscribed,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Record = Result<ProfilerEvent, IngestError>;

fn module(module_id: u64) -> Record {
    Ok(ProfilerEvent::ModuleLoaded(ModuleLoaded {
        module_id,
        path: format!("/app/Module{module_id}.dll"),
        assembly_name: format!("Module{module_id}"),
    }))
}

fn observable(sequence_id: i64) -> Record {
    Ok(ProfilerEvent::ObservableCreated(ObservableCreated {
        created: EventInfo::new(sequence_id, DateTime::<Utc>::UNIX_EPOCH, 1),
        instrumentation_point_id: 1,
    }))
}

/// A producer stream the test feeds by hand.
fn producer() -> (mpsc::UnboundedSender<Record>, UnboundedReceiverStream<Record>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, UnboundedReceiverStream::new(rx))
}

/// Lets the pump task drain whatever is ready.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

async fn wait_until_finished(session: &Session) -> ConnectionState {
    let mut state = session.watch_connection();
    let finished = state
        .wait_for(ConnectionState::is_finished)
        .await
        .expect("connection state should stay observable")
        .clone();
    finished
}

// ── pause / resume ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn paused_session_holds_sequenced_records_only() {
    let session = Session::new(SessionConfig { start_paused: true });
    let (tx, records) = producer();
    session.attach(records);

    tx.send(module(1)).expect("pump should be running");
    tx.send(observable(5)).expect("pump should be running");
    settle().await;

    let stats = session.model().stats();
    assert_eq!(stats.modules, 1, "structural records are never held");
    assert_eq!(stats.observables, 0, "sequenced records wait for resume");

    session.resume();
    settle().await;
    assert_eq!(session.model().stats().observables, 1);
}

#[tokio::test(start_paused = true)]
async fn repausing_never_hides_already_released_sequence_ids() {
    let session = Session::new(SessionConfig::default());
    let (tx, records) = producer();
    session.attach(records);

    tx.send(observable(10)).expect("pump should be running");
    settle().await;
    session.pause();
    assert!(session.is_paused());

    tx.send(observable(7)).expect("pump should be running");
    tx.send(observable(11)).expect("pump should be running");
    settle().await;
    let model = session.model();
    assert!(model.observable_instance(7).is_some(), "below the mark passes");
    assert!(model.observable_instance(11).is_none(), "above the mark is held");

    session.resume();
    settle().await;
    assert!(model.observable_instance(11).is_some());
}

#[tokio::test(start_paused = true)]
async fn stream_end_while_paused_waits_for_resume() {
    let session = Session::new(SessionConfig { start_paused: true });
    session.attach(stream::iter(vec![module(1), observable(3)]));
    settle().await;
    assert_eq!(session.connection_state(), ConnectionState::Connected);

    session.resume();
    assert_eq!(wait_until_finished(&session).await, ConnectionState::Disconnected);
    assert_eq!(session.model().stats().observables, 1);
}

#[tokio::test(start_paused = true)]
async fn pausable_consumer_stream_follows_the_session_control() {
    let session = Session::new(SessionConfig { start_paused: true });
    let (tx, rx) = mpsc::unbounded_channel::<u32>();
    let mut gated = Box::pin(session.pausable(UnboundedReceiverStream::new(rx)));

    tx.send(1).expect("receiver alive");
    tokio::select! {
        _ = gated.next() => panic!("paused stream should not release"),
        _ = settle() => {}
    }

    session.resume();
    assert_eq!(gated.next().await, Some(1));
}

// ── errors and connection state ──────────────────────────────────────

#[tokio::test]
async fn malformed_records_become_diagnostics_and_the_stream_continues() {
    let session = Session::new(SessionConfig::default());
    session.attach(stream::iter(vec![
        module(1),
        Err(IngestError::Decode("unknown event kind".to_string())),
        module(2),
    ]));

    assert_eq!(wait_until_finished(&session).await, ConnectionState::Disconnected);
    assert_eq!(session.model().stats().modules, 2);

    let diagnostics = session.diagnostics().snapshot();
    assert_eq!(diagnostics.len(), 1);
    assert!(diagnostics[0].recoverable);
    assert!(diagnostics[0].message.contains("unknown event kind"));
}

#[tokio::test]
async fn invalid_data_fails_the_connection_but_keeps_the_graph() {
    let session = Session::new(SessionConfig::default());
    session.attach(stream::iter(vec![
        module(1),
        Err(IngestError::InvalidData("truncated record".to_string())),
        module(2),
    ]));

    let state = wait_until_finished(&session).await;
    assert!(matches!(state, ConnectionState::Failed(ref reason) if reason.contains("truncated")));
    assert_eq!(session.model().stats().modules, 1);

    session.attach(stream::iter(vec![module(3)]));
    assert_eq!(wait_until_finished(&session).await, ConnectionState::Disconnected);
    assert_eq!(session.model().stats().modules, 2, "reattaching reuses the model");
}

// ── monitoring requests ──────────────────────────────────────────────

#[test]
fn monitoring_requests_are_sent_only_on_change() {
    let session = Session::new(SessionConfig::default());
    assert!(session.start_monitoring(4));
    assert!(!session.start_monitoring(4));
    assert!(session.start_monitoring(2));
    assert!(!session.stop_monitoring(9));
    assert!(session.stop_monitoring(4));
    session.request_object_properties(31);

    assert_eq!(session.requested_calls(), vec![2]);
    assert_eq!(
        session.control_requests().snapshot(),
        vec![
            ControlRequest::StartMonitoring { call_id: 4 },
            ControlRequest::StartMonitoring { call_id: 2 },
            ControlRequest::StopMonitoring { call_id: 4 },
            ControlRequest::GetObjectProperties { object_id: 31 },
        ]
    );
}

#[tokio::test]
async fn shutdown_closes_the_session_feeds() {
    let session = Session::new(SessionConfig::default());
    let (_tx, records) = producer();
    session.attach(records);
    session.shutdown();

    assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    assert!(session.control_requests().is_closed());
    assert!(session.diagnostics().is_closed());
    assert_eq!(session.model().modules().recv().await, None);
}

#[tokio::test]
async fn shutdown_ends_navigation_feeds_still_waiting_on_a_reference() {
    let session = Session::new(SessionConfig::default());
    let model = session.model();
    model.ingest(ProfilerEvent::CallInstrumented(CallInstrumented {
        call_id: 1,
        module_id: 40,
        calling_type: "App.Feed".to_string(),
        calling_method: "Start".to_string(),
        called_method: "Interval".to_string(),
        instruction_offset: 2,
    }));
    model.ingest(observable(2).expect("record is well formed"));
    model.ingest(ProfilerEvent::Subscribed(Subscribed {
        subscribed: EventInfo::new(3, DateTime::<Utc>::UNIX_EPOCH, 1),
        observable_id: 2,
    }));

    let call = model.instrumented_call(1).expect("call should exist");
    let subscription = model.subscription(3).expect("subscription should exist");
    let mut module_reader = call.module(model).subscribe();
    let mut events_reader = subscription.events(model).subscribe();

    session.shutdown();

    let modules = tokio::time::timeout(Duration::from_secs(1), async {
        let mut seen = Vec::new();
        while let Some(module) = module_reader.recv().await {
            seen.push(module);
        }
        seen
    })
    .await
    .expect("module feed should end after shutdown");
    assert_eq!(modules.len(), 1);
    assert!(modules[0].is_unknown());

    let events = tokio::time::timeout(Duration::from_secs(1), async {
        let mut seen = Vec::new();
        while let Some(event) = events_reader.recv().await {
            seen.push(event.kind);
        }
        seen
    })
    .await
    .expect("subscription timeline should end after shutdown");
    assert_eq!(events, vec![rxmon_model::StreamEventKind::Subscribe]);

    let observable = model.observable_instance(2).expect("observable should exist");
    let late = observable.call(model);
    assert!(late.is_closed(), "feeds built after shutdown start complete");
}
