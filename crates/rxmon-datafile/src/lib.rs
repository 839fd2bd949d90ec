//! Data file codec for recorded rxmon sessions.
//!
//! A data file is the producer's record stream written to disk: each record
//! is a 4-byte little-endian length followed by that many bytes of a
//! JSON-encoded [`ProfilerEvent`](rxmon_types::ProfilerEvent). End of file
//! must fall exactly on a record boundary; anything else is reported as
//! [`DataFileError::Truncated`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let reader = rxmon_datafile::open("session.rxm").await?;
//! session.attach(rxmon_datafile::ingest_stream(reader));
//! ```

mod error;
mod reader;
mod writer;

use futures_util::{Stream, StreamExt};
use rxmon_types::{IngestError, ProfilerEvent};
use tokio::io::AsyncRead;

pub use error::DataFileError;
pub use reader::{open, read_events, DataFileReader};
pub use writer::DataFileWriter;

/// Size of the length prefix in front of every record.
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Largest record body accepted unless configured otherwise.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

/// Adapts a reader into the record stream a session consumes.
pub fn ingest_stream<R>(
    reader: DataFileReader<R>,
) -> impl Stream<Item = Result<ProfilerEvent, IngestError>>
where
    R: AsyncRead + Unpin,
{
    reader.into_stream().map(|record| record.map_err(IngestError::from))
}

#[cfg(test)]
mod tests;
