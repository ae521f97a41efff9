use thiserror::Error;

/// Errors raised by the capture-and-mux pipeline.
///
/// Fatal variants (`Connection`, `WriterOpen`) stop the owning session;
/// the rest are reported and the pipeline keeps running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Required settings are missing or invalid. Raised before any thread starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The configured source is not currently enumerated.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The acquisition handle could not be created or dropped mid-run.
    #[error("connection error: {0}")]
    Connection(String),

    /// Container or encoder setup failed.
    #[error("writer open failed: {0}")]
    WriterOpen(String),

    /// A single frame failed to encode or write.
    #[error("encode failed: {0}")]
    WriterEncode(String),

    /// Audio device resolution or activation failed.
    #[error("audio device error: {0}")]
    Device(String),

    /// The post-stop remux pass failed. The original recording is preserved.
    #[error("remux failed: {0}")]
    Remux(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CaptureError {
    /// Whether this error tears down the whole session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::WriterOpen(_))
    }

    /// Stable identifier for event payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::Connection(_) => "connection",
            Self::WriterOpen(_) => "writer_open",
            Self::WriterEncode(_) => "writer_encode",
            Self::Device(_) => "device",
            Self::Remux(_) => "remux",
            Self::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_and_writer_open_are_fatal() {
        assert!(CaptureError::Connection("x".into()).is_fatal());
        assert!(CaptureError::WriterOpen("x".into()).is_fatal());
        assert!(!CaptureError::WriterEncode("x".into()).is_fatal());
        assert!(!CaptureError::Device("x".into()).is_fatal());
        assert!(!CaptureError::Remux("x".into()).is_fatal());
    }

    #[test]
    fn display_includes_reason() {
        let err = CaptureError::SourceUnavailable("CAM1".into());
        assert_eq!(err.to_string(), "source unavailable: CAM1");
        assert_eq!(err.kind(), "source_unavailable");
    }
}
