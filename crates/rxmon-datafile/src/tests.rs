//! Unit tests for the data file codec.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use rxmon_types::{EventInfo, ModuleLoaded, ObservableCreated, ProfilerEvent};

use crate::{read_events, DataFileError, DataFileReader, DataFileWriter};

fn module(module_id: u64) -> ProfilerEvent {
    ProfilerEvent::ModuleLoaded(ModuleLoaded {
        module_id,
        path: "/app/Core.dll".to_string(),
        assembly_name: "Core".to_string(),
    })
}

fn observable(sequence_id: i64) -> ProfilerEvent {
    ProfilerEvent::ObservableCreated(ObservableCreated {
        created: EventInfo::new(sequence_id, DateTime::<Utc>::UNIX_EPOCH, 1),
        instrumentation_point_id: 3,
    })
}

/// Encodes `events` into an in-memory data file.
async fn encode(events: &[ProfilerEvent]) -> Vec<u8> {
    let mut writer = DataFileWriter::new(Vec::new());
    for event in events {
        writer.write(event).await.expect("write should succeed");
    }
    assert_eq!(writer.records_written(), events.len() as u64);
    writer.finish().await.expect("finish should succeed")
}

fn frame(body: &[u8]) -> Vec<u8> {
    let mut bytes = (body.len() as u32).to_le_bytes().to_vec();
    bytes.extend_from_slice(body);
    bytes
}

async fn read_all(bytes: &[u8]) -> Vec<Result<ProfilerEvent, DataFileError>> {
    read_events(bytes).collect().await
}

// ── framing ──────────────────────────────────────────────────────────

#[tokio::test]
async fn records_read_back_in_order() {
    let bytes = encode(&[module(1), observable(2), module(3)]).await;
    let records = read_all(&bytes).await;
    let events: Vec<ProfilerEvent> = records
        .into_iter()
        .map(|r| r.expect("record should decode"))
        .collect();
    assert_eq!(events, vec![module(1), observable(2), module(3)]);
}

#[tokio::test]
async fn length_prefix_is_little_endian() {
    let bytes = encode(&[module(1)]).await;
    let length = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    assert_eq!(length, bytes.len() - 4);
}

#[tokio::test]
async fn empty_file_is_an_empty_stream() {
    assert!(read_all(&[]).await.is_empty());
}

#[tokio::test]
async fn truncated_prefix_is_invalid_data() {
    let mut bytes = encode(&[module(1)]).await;
    let boundary = bytes.len() as u64;
    bytes.extend_from_slice(&[7, 0]);

    let records = read_all(&bytes).await;
    assert_eq!(records.len(), 2);
    assert!(records[0].is_ok());
    match &records[1] {
        Err(DataFileError::Truncated {
            offset,
            expected,
            actual,
        }) => {
            assert_eq!(*offset, boundary);
            assert_eq!(*expected, 4);
            assert_eq!(*actual, 2);
        }
        other => panic!("expected truncation, got {other:?}"),
    }
}

#[tokio::test]
async fn truncated_body_ends_the_stream() {
    let mut bytes = encode(&[module(1), module(2)]).await;
    bytes.truncate(bytes.len() - 3);

    let records = read_all(&bytes).await;
    assert_eq!(records.len(), 2);
    let err = records[1].as_ref().expect_err("second record is cut short");
    assert!(!err.is_recoverable());
    assert!(matches!(err, DataFileError::Truncated { actual, expected, .. } if actual + 3 == *expected));
}

#[tokio::test]
async fn undecodable_record_is_skipped() {
    let mut bytes = frame(br#"{"event":"observable_destroyed"}"#);
    bytes.extend(encode(&[module(9)]).await);

    let records = read_all(&bytes).await;
    assert_eq!(records.len(), 2);
    let err = records[0].as_ref().expect_err("unknown kind should not decode");
    assert!(err.is_recoverable());
    assert_eq!(*records[1].as_ref().expect("next record decodes"), module(9));
}

#[tokio::test]
async fn oversized_length_is_rejected_before_allocating() {
    let mut bytes = u32::MAX.to_le_bytes().to_vec();
    bytes.extend_from_slice(b"{}");

    let mut reader = DataFileReader::new(bytes.as_slice()).with_max_record_bytes(1024);
    match reader.next_record().await {
        Some(Err(DataFileError::RecordTooLarge { offset, length })) => {
            assert_eq!(offset, 0);
            assert_eq!(length, u32::MAX as usize);
        }
        other => panic!("expected RecordTooLarge, got {other:?}"),
    }
    assert!(reader.next_record().await.is_none());
}

#[test]
fn framing_errors_map_to_invalid_data() {
    let err = rxmon_types::IngestError::from(DataFileError::Truncated {
        offset: 12,
        expected: 40,
        actual: 3,
    });
    assert!(matches!(err, rxmon_types::IngestError::InvalidData(_)));
    assert!(err.to_string().starts_with("invalid data: truncated record at offset 12"));
}
