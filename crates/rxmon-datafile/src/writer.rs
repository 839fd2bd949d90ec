//! Recording records into a data file.

use std::path::Path;

use rxmon_types::ProfilerEvent;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::DataFileError;

/// Appends length-prefixed records to a writer.
pub struct DataFileWriter<W> {
    writer: W,
    records_written: u64,
}

impl DataFileWriter<BufWriter<File>> {
    /// Creates (or truncates) the data file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `DataFileError::Io` if the file cannot be created.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, DataFileError> {
        let file = File::create(path.as_ref()).await?;
        tracing::debug!(path = %path.as_ref().display(), "created data file");
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: AsyncWrite + Unpin> DataFileWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records_written: 0,
        }
    }

    /// Encodes and appends one record.
    pub async fn write(&mut self, event: &ProfilerEvent) -> Result<(), DataFileError> {
        let body = serde_json::to_vec(event)?;
        let length = u32::try_from(body.len()).map_err(|_| DataFileError::RecordTooLarge {
            offset: 0,
            length: body.len(),
        })?;
        self.writer.write_all(&length.to_le_bytes()).await?;
        self.writer.write_all(&body).await?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub async fn flush(&mut self) -> Result<(), DataFileError> {
        self.writer.flush().await?;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    pub async fn finish(mut self) -> Result<W, DataFileError> {
        self.writer.flush().await?;
        tracing::debug!(records = self.records_written, "data file finished");
        Ok(self.writer)
    }
}
