//! Replaying a recorded data file through a session.

use chrono::{DateTime, Utc};
use rxmon_datafile::{ingest_stream, open, DataFileWriter};
use rxmon_model::{ConnectionState, Session, SessionConfig};
use rxmon_types::{
    CallInstrumented, EventInfo, ModuleLoaded, ObservableCreated, ProfilerEvent, Subscribed,
};
use tokio::io::AsyncWriteExt;

fn info(sequence_id: i64) -> EventInfo {
    EventInfo::new(sequence_id, DateTime::<Utc>::UNIX_EPOCH, 1)
}

fn recorded_session() -> Vec<ProfilerEvent> {
    vec![
        ProfilerEvent::ObservableCreated(ObservableCreated {
            created: info(1),
            instrumentation_point_id: 7,
        }),
        ProfilerEvent::Subscribed(Subscribed {
            subscribed: info(2),
            observable_id: 1,
        }),
        ProfilerEvent::CallInstrumented(CallInstrumented {
            call_id: 7,
            module_id: 1,
            calling_type: "App.Feed".to_string(),
            calling_method: "Start".to_string(),
            called_method: "Where".to_string(),
            instruction_offset: 12,
        }),
        ProfilerEvent::ModuleLoaded(ModuleLoaded {
            module_id: 1,
            path: "/app/App.dll".to_string(),
            assembly_name: "App".to_string(),
        }),
    ]
}

async fn finished(session: &Session) -> ConnectionState {
    let mut state = session.watch_connection();
    let finished = state
        .wait_for(ConnectionState::is_finished)
        .await
        .expect("connection state should stay observable")
        .clone();
    finished
}

#[tokio::test]
async fn recorded_file_materialises_the_graph() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("session.rxm");

    let mut writer = DataFileWriter::create(&path).await.expect("should create file");
    for event in recorded_session() {
        writer.write(&event).await.expect("should write record");
    }
    writer.finish().await.expect("should flush file");

    let session = Session::new(SessionConfig::default());
    let reader = open(&path).await.expect("should open file");
    session.attach(ingest_stream(reader));

    assert_eq!(finished(&session).await, ConnectionState::Disconnected);
    let model = session.model();
    let stats = model.stats();
    assert_eq!((stats.modules, stats.instrumented_calls), (1, 1));
    assert_eq!((stats.observables, stats.subscriptions), (1, 1));

    let call = model.instrumented_call(7).expect("call should exist");
    let module = call.module(model).latest().expect("module should resolve");
    assert_eq!(module.assembly_name, "App");
    assert_eq!(model.call_observables(7).len(), 1);
}

#[tokio::test]
async fn truncated_file_fails_the_replay() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let path = dir.path().join("cut.rxm");

    let mut writer = DataFileWriter::create(&path).await.expect("should create file");
    writer
        .write(&recorded_session()[3])
        .await
        .expect("should write record");
    let mut file = writer.finish().await.expect("should flush file");
    file.write_all(&[200, 0, 0, 0, b'{']).await.expect("should append partial record");
    file.flush().await.expect("should flush partial record");

    let session = Session::new(SessionConfig::default());
    session.attach(ingest_stream(open(&path).await.expect("should open file")));

    match finished(&session).await {
        ConnectionState::Failed(reason) => assert!(reason.contains("invalid data")),
        other => panic!("expected failure, got {other}"),
    }
    assert_eq!(session.model().stats().modules, 1);
    assert_eq!(session.diagnostics().len(), 1);
}
