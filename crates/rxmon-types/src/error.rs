//! Error types for record ingestion.

/// Errors that can occur while feeding upstream records into a session.
///
/// Only [`IngestError::Decode`] is recoverable: the offending record is
/// skipped and the stream continues. The other variants end the stream they
/// came from.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// A single record could not be decoded.
    #[error("malformed record: {0}")]
    Decode(String),

    /// The stream itself is corrupt (for example a truncated trailing record).
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The underlying transport or file failed.
    #[error("ingest I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Returns `true` if the stream may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_decode_errors_are_recoverable() {
        assert!(IngestError::Decode("bad kind".to_string()).is_recoverable());
        assert!(!IngestError::InvalidData("truncated".to_string()).is_recoverable());
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(!IngestError::from(io).is_recoverable());
    }

    #[test]
    fn display_names_the_failure_class() {
        let err = IngestError::InvalidData("events.bin contains invalid data".to_string());
        assert_eq!(err.to_string(), "invalid data: events.bin contains invalid data");
    }
}
