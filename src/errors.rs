//! Error types for the codec adapter

use thiserror::Error;

/// Errors surfaced by the encoder/decoder adapters and the sample pipeline.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Codec settings failed validation (wrong codec type, bad geometry,
    /// zero frame rate). Reported before any state is touched.
    #[error("invalid codec parameter: {0}")]
    InvalidParameter(String),

    /// Encode/SetRates called before a successful init.
    #[error("codec used before successful initialization")]
    Uninitialized,

    /// The sample pipeline failed to build, reconfigure, or accept a sample.
    /// Reconfiguration failures surface here as well since reconfiguration
    /// reuses the init path.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// The negotiated format is not handled by this factory.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result alias used across the crate.
pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = CodecError::InvalidParameter("frame rate must be > 0".to_string());
        assert!(err.to_string().contains("frame rate"));

        let err = CodecError::Uninitialized;
        assert!(err.to_string().contains("initialization"));

        let err = CodecError::Pipeline("sink refused sample".to_string());
        assert!(err.to_string().contains("sink refused sample"));
    }
}
