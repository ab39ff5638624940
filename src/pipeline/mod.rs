//! Asynchronous sample pipeline boundary
//!
//! The hardware transform is modeled as a request/response channel: the
//! encoder submits raw samples and the pipeline notifies a completion
//! handler with encoded samples from its own worker thread. Nothing in this
//! crate depends on a particular OS media stack vocabulary; a platform
//! integration supplies a [`SinkFactory`] and the adapter drives it through
//! the [`SampleSink`] trait.

mod worker;

#[cfg(feature = "software-fallback")]
mod software;

pub use worker::WorkerSink;

#[cfg(feature = "software-fallback")]
pub use software::{OpenH264Transform, SoftwareSinkFactory};

use bytes::Bytes;

use crate::config::{H264Profile, RcMode};
use crate::errors::CodecResult;

/// Output stream configuration for one pipeline session
///
/// Built by the encoder from the negotiated codec settings plus tuning;
/// consumed once at sink construction. Geometry is post-rounding: `height`
/// is the encoded height.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub width: u32,
    /// Encoded frame height (already rounded per the tuning)
    pub height: u32,
    pub frame_rate: u32,
    /// Average target bitrate in bit/s
    pub target_bps: u32,
    pub profile: H264Profile,
    /// Applied only when set; otherwise the transform default is kept
    pub rc_mode: Option<RcMode>,
    /// Applied only when below the codec maximum of 51
    pub max_qp: Option<u32>,
    /// Applied only when within 0..=100
    pub quality: Option<u32>,
    /// Request hardware-backed transforms
    pub hardware_transforms: bool,
    /// Request low-latency operation
    pub low_latency: bool,
    /// Request CABAC entropy coding (effective only for profiles that
    /// support it)
    pub cabac: bool,
}

/// Raw NV12 sample submitted to a sink
#[derive(Debug, Clone)]
pub struct RawSample {
    /// Presentation timestamp in hundred-nanosecond units
    pub timestamp_hns: i64,
    /// Duration since the previous sample, hundred-nanosecond units
    pub duration_hns: i64,
    /// Semi-planar NV12 pixel data
    pub data: Bytes,
    /// Set on the first sample after a dropped frame
    pub discontinuity: bool,
}

/// Encoded sample emitted by a sink
///
/// The payload is an owned copy; the sink must not retain references into
/// its internal buffers once the completion handler returns.
#[derive(Debug, Clone)]
pub struct EncodedSample {
    /// Timestamp of the raw sample this encode corresponds to
    pub timestamp_hns: i64,
    /// Annex-B byte stream
    pub data: Bytes,
    /// Whether the sink marked this sample as a clean point (key frame)
    pub clean_point: bool,
}

/// A pipeline-native opaque sample
///
/// Used by the decoder adapter to hand encoded bytes to a downstream
/// hardware decoder without interpreting them.
#[derive(Debug, Clone)]
pub struct MediaSample {
    pub data: Bytes,
}

impl MediaSample {
    /// Copy encoded bytes into a new native sample
    pub fn from_bytes(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Handler invoked by the sink for every completed sample
///
/// Runs on the sink's worker thread, concurrently with submissions.
pub type CompletionHandler = std::sync::Arc<dyn Fn(EncodedSample) + Send + Sync>;

/// One active encode session of the pipeline
///
/// Submission-side contract of the request/response channel. All methods
/// may be called from the encode thread while completions are in flight.
pub trait SampleSink: Send {
    /// Queue a raw sample for encoding
    fn submit(&self, sample: RawSample) -> CodecResult<()>;

    /// Advance the pipeline clock without encoding (sent for dropped frames)
    fn send_tick(&self, timestamp_hns: i64) -> CodecResult<()>;

    /// Force the next encoded sample to be a key frame
    fn request_key_frame(&self) -> CodecResult<()>;

    /// Stop accepting samples and release pipeline resources
    ///
    /// Completions already in flight may still be delivered before this
    /// returns; none are delivered after.
    fn shutdown(&mut self);
}

/// Builds pipeline sessions
///
/// The platform integration implements this once; the encoder calls it on
/// every init and reconfiguration, passing the completion handler for the
/// new session.
pub trait SinkFactory: Send + Sync {
    fn build(
        &self,
        config: &SinkConfig,
        on_encoded: CompletionHandler,
    ) -> CodecResult<Box<dyn SampleSink>>;
}

/// A synchronous encode step wrapped into the async channel model by
/// [`WorkerSink`]
///
/// Implementations hold the actual codec state. `encode` may return `None`
/// when the transform buffers the sample internally.
pub trait Transform: Send {
    fn encode(&mut self, sample: &RawSample) -> Result<Option<EncodedSample>, String>;

    /// Mark the next encoded sample as a forced key frame
    fn force_key_frame(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_sample_copies_bytes() {
        let src = vec![1u8, 2, 3, 4];
        let sample = MediaSample::from_bytes(&src);
        drop(src);
        assert_eq!(&sample.data[..], &[1, 2, 3, 4]);
        assert_eq!(sample.len(), 4);
        assert!(!sample.is_empty());
    }
}
