//! Error types for data file reading and writing.

use rxmon_types::IngestError;
use thiserror::Error;

/// Errors that can occur while reading or writing a data file.
#[derive(Debug, Error)]
pub enum DataFileError {
    /// The underlying file or reader failed.
    #[error("data file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file ends inside a length prefix or a record body.
    #[error(
        "truncated record at offset {offset} (expected {expected} bytes, found {actual})"
    )]
    Truncated {
        /// Byte offset of the incomplete prefix or body.
        offset: u64,
        /// Bytes the prefix or body should have had.
        expected: usize,
        /// Bytes actually present before end of file.
        actual: usize,
    },

    /// One record's bytes are not a valid encoded record.
    #[error("malformed record: {0}")]
    Decode(#[from] serde_json::Error),

    /// A length prefix exceeds the configured maximum record size.
    #[error("record at offset {offset} claims {length} bytes, over the limit")]
    RecordTooLarge {
        /// Byte offset of the length prefix.
        offset: u64,
        /// The length the prefix claimed.
        length: usize,
    },
}

impl DataFileError {
    /// Returns `true` if reading can continue with the next record.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

impl From<DataFileError> for IngestError {
    fn from(err: DataFileError) -> Self {
        match err {
            DataFileError::Io(e) => IngestError::Io(e),
            DataFileError::Decode(e) => IngestError::Decode(e.to_string()),
            other @ (DataFileError::Truncated { .. } | DataFileError::RecordTooLarge { .. }) => {
                IngestError::InvalidData(other.to_string())
            }
        }
    }
}
