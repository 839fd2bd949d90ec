//! Reading length-prefixed records.

use std::path::Path;

use futures_util::Stream;
use rxmon_types::ProfilerEvent;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

use crate::{DataFileError, DEFAULT_MAX_RECORD_BYTES, LENGTH_PREFIX_BYTES};

/// Reads records from a data file, one at a time.
///
/// Wire format: `[u32 little-endian length][JSON ProfilerEvent]`, repeated
/// until end of file.
pub struct DataFileReader<R> {
    reader: R,
    offset: u64,
    max_record_bytes: usize,
    finished: bool,
}

/// Opens the data file at `path` for reading.
///
/// # Errors
///
/// Returns `DataFileError::Io` if the file cannot be opened.
pub async fn open(path: impl AsRef<Path>) -> Result<DataFileReader<BufReader<File>>, DataFileError> {
    let file = File::open(path.as_ref()).await?;
    tracing::debug!(path = %path.as_ref().display(), "opened data file");
    Ok(DataFileReader::new(BufReader::new(file)))
}

/// Streams every record of `reader`.
///
/// A record that fails to decode yields `Err(Decode)` and reading carries on.
/// Any other error is the last item of the stream.
pub fn read_events<R>(reader: R) -> impl Stream<Item = Result<ProfilerEvent, DataFileError>>
where
    R: AsyncRead + Unpin,
{
    DataFileReader::new(reader).into_stream()
}

impl<R: AsyncRead + Unpin> DataFileReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            offset: 0,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            finished: false,
        }
    }

    /// Sets the largest record body the reader will accept.
    pub fn with_max_record_bytes(mut self, max_record_bytes: usize) -> Self {
        self.max_record_bytes = max_record_bytes;
        self
    }

    /// Byte offset of the next unread record.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads up to `buf.len()` bytes, stopping early only at end of file.
    async fn fill(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn fail(&mut self, err: DataFileError) -> Option<Result<ProfilerEvent, DataFileError>> {
        self.finished = true;
        Some(Err(err))
    }

    /// Reads the next record; `None` at a clean end of file.
    pub async fn next_record(&mut self) -> Option<Result<ProfilerEvent, DataFileError>> {
        if self.finished {
            return None;
        }

        let start = self.offset;
        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        let read = match self.fill(&mut prefix).await {
            Ok(n) => n,
            Err(e) => return self.fail(e.into()),
        };
        if read == 0 {
            self.finished = true;
            return None;
        }
        if read < LENGTH_PREFIX_BYTES {
            return self.fail(DataFileError::Truncated {
                offset: start,
                expected: LENGTH_PREFIX_BYTES,
                actual: read,
            });
        }

        let length = u32::from_le_bytes(prefix) as usize;
        if length > self.max_record_bytes {
            return self.fail(DataFileError::RecordTooLarge {
                offset: start,
                length,
            });
        }

        let body_offset = start + LENGTH_PREFIX_BYTES as u64;
        let mut body = vec![0u8; length];
        let read = match self.fill(&mut body).await {
            Ok(n) => n,
            Err(e) => return self.fail(e.into()),
        };
        if read < length {
            return self.fail(DataFileError::Truncated {
                offset: body_offset,
                expected: length,
                actual: read,
            });
        }
        self.offset = body_offset + length as u64;

        match serde_json::from_slice::<ProfilerEvent>(&body) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::debug!(offset = start, error = %e, "undecodable record in data file");
                Some(Err(e.into()))
            }
        }
    }

    /// Converts the reader into a `Stream` of the remaining records.
    pub fn into_stream(self) -> impl Stream<Item = Result<ProfilerEvent, DataFileError>> {
        futures_util::stream::unfold(self, |mut reader| async move {
            let record = reader.next_record().await?;
            Some((record, reader))
        })
    }
}
