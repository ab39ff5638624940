//! Core types shared between the media engine and the codec adapters
//!
//! These mirror the engine's codec negotiation contract: codec settings,
//! raw frames in, encoded images out, plus the encoder/decoder traits the
//! adapters implement.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::CodecResult;
use crate::pipeline::MediaSample;

/// Video codec kinds the engine can negotiate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodecType {
    H264,
    Vp8,
    Vp9,
}

/// Operating mode hint from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodecMode {
    RealtimeVideo,
    Screensharing,
}

/// H.264-specific codec options
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct H264Settings {
    /// Whether the encoder is allowed to drop frames under load
    pub frame_dropping_on: bool,
    /// Requested key frame interval in frames (0 = encoder default)
    pub key_frame_interval: u32,
}

impl Default for H264Settings {
    fn default() -> Self {
        Self {
            frame_dropping_on: true,
            key_frame_interval: 0,
        }
    }
}

/// Negotiated codec settings passed to `init_encode`
///
/// Bitrates are in kbit/s, matching the engine convention; the adapter
/// converts to bit/s internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecSettings {
    pub codec_type: VideoCodecType,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Maximum frame rate; also used as the initial frame rate
    pub max_framerate: u32,
    /// Initial bitrate in kbit/s
    pub start_bitrate_kbit: u32,
    /// Explicit target bitrate in kbit/s (takes priority over start bitrate)
    pub target_bitrate_kbit: u32,
    /// Bitrate ceiling in kbit/s
    pub max_bitrate_kbit: u32,
    /// Maximum QP the engine allows
    pub qp_max: u32,
    pub mode: CodecMode,
    pub h264: H264Settings,
}

impl CodecSettings {
    /// Create H.264 settings with explicit geometry and frame rate
    pub fn h264(width: u32, height: u32, max_framerate: u32) -> Self {
        Self {
            codec_type: VideoCodecType::H264,
            width,
            height,
            max_framerate,
            start_bitrate_kbit: 0,
            target_bitrate_kbit: 0,
            max_bitrate_kbit: 0,
            qp_max: 51,
            mode: CodecMode::RealtimeVideo,
            h264: H264Settings::default(),
        }
    }

    /// Set the start bitrate in kbit/s
    pub fn with_start_bitrate(mut self, kbit: u32) -> Self {
        self.start_bitrate_kbit = kbit;
        self
    }

    /// Set the explicit target bitrate in kbit/s
    pub fn with_target_bitrate(mut self, kbit: u32) -> Self {
        self.target_bitrate_kbit = kbit;
        self
    }

    /// Set the bitrate ceiling in kbit/s
    pub fn with_max_bitrate(mut self, kbit: u32) -> Self {
        self.max_bitrate_kbit = kbit;
        self
    }

    /// Set the maximum QP
    pub fn with_qp_max(mut self, qp: u32) -> Self {
        self.qp_max = qp;
        self
    }
}

/// Planar 4:2:0 frame buffer (I420)
///
/// Three independent planes with per-plane strides. Chroma planes are
/// half resolution in both dimensions.
#[derive(Debug, Clone)]
pub struct I420Buffer {
    width: u32,
    height: u32,
    stride_y: usize,
    stride_u: usize,
    stride_v: usize,
    data_y: Vec<u8>,
    data_u: Vec<u8>,
    data_v: Vec<u8>,
}

impl I420Buffer {
    /// Allocate a black frame of the given dimensions with tight strides
    pub fn new(width: u32, height: u32) -> Self {
        let w = width as usize;
        let h = height as usize;
        let cw = (w + 1) / 2;
        let ch = (h + 1) / 2;
        Self {
            width,
            height,
            stride_y: w,
            stride_u: cw,
            stride_v: cw,
            data_y: vec![0u8; w * h],
            data_u: vec![128u8; cw * ch],
            data_v: vec![128u8; cw * ch],
        }
    }

    /// Build a buffer from existing planes
    ///
    /// Plane lengths must cover `stride * rows` for their resolution.
    pub fn from_planes(
        width: u32,
        height: u32,
        data_y: Vec<u8>,
        data_u: Vec<u8>,
        data_v: Vec<u8>,
        stride_y: usize,
        stride_u: usize,
        stride_v: usize,
    ) -> Self {
        let h = height as usize;
        let ch = (h + 1) / 2;
        assert!(data_y.len() >= stride_y * h, "Y plane too small");
        assert!(data_u.len() >= stride_u * ch, "U plane too small");
        assert!(data_v.len() >= stride_v * ch, "V plane too small");
        Self {
            width,
            height,
            stride_y,
            stride_u,
            stride_v,
            data_y,
            data_u,
            data_v,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride_y(&self) -> usize {
        self.stride_y
    }

    pub fn stride_u(&self) -> usize {
        self.stride_u
    }

    pub fn stride_v(&self) -> usize {
        self.stride_v
    }

    pub fn data_y(&self) -> &[u8] {
        &self.data_y
    }

    pub fn data_u(&self) -> &[u8] {
        &self.data_u
    }

    pub fn data_v(&self) -> &[u8] {
        &self.data_v
    }
}

/// Raw video frame handed to the encoder
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub buffer: I420Buffer,
    /// Presentation timestamp on the 90 kHz RTP clock
    pub rtp_timestamp: u32,
    /// Capture/render time in milliseconds
    pub render_time_ms: i64,
    /// NTP wall-clock time in milliseconds
    pub ntp_time_ms: i64,
}

impl VideoFrame {
    pub fn new(buffer: I420Buffer, rtp_timestamp: u32) -> Self {
        Self {
            buffer,
            rtp_timestamp,
            render_time_ms: 0,
            ntp_time_ms: 0,
        }
    }

    pub fn with_render_time(mut self, render_time_ms: i64) -> Self {
        self.render_time_ms = render_time_ms;
        self
    }

    pub fn with_ntp_time(mut self, ntp_time_ms: i64) -> Self {
        self.ntp_time_ms = ntp_time_ms;
        self
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }
}

/// Encoded frame kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    /// Self-contained decodable frame (IDR)
    Key,
    /// Predicted frame referencing prior frames
    Delta,
}

/// One NAL unit location inside an encoded buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    /// Byte offset of the NAL payload (past the start code)
    pub offset: usize,
    /// Payload length in bytes
    pub length: usize,
}

/// NAL unit boundaries of an encoded image, for downstream packetization
#[derive(Debug, Clone, Default)]
pub struct FragmentationHeader {
    pub fragments: Vec<Fragment>,
}

impl FragmentationHeader {
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Encoded image delivered to the engine
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Annex-B byte stream, owned (decoupled from any pipeline buffer)
    pub data: Bytes,
    /// Original 90 kHz RTP timestamp of the source frame
    pub rtp_timestamp: u32,
    pub ntp_time_ms: i64,
    pub capture_time_ms: i64,
    pub encoded_width: u32,
    pub encoded_height: u32,
    pub frame_type: FrameType,
    /// Whether the image is a complete clean point
    pub complete: bool,
}

/// H.264 packetization modes (RFC 6184)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketizationMode {
    NonInterleaved,
    SingleNalUnit,
}

/// Codec-specific details attached to each encoded image
#[derive(Debug, Clone, Copy)]
pub struct CodecSpecificInfo {
    pub codec_type: VideoCodecType,
    pub packetization_mode: PacketizationMode,
}

impl CodecSpecificInfo {
    /// The info this adapter always produces: H.264, non-interleaved
    pub fn h264() -> Self {
        Self {
            codec_type: VideoCodecType::H264,
            packetization_mode: PacketizationMode::NonInterleaved,
        }
    }
}

/// QP thresholds driving the engine's adaptive resolution scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingSettings {
    pub low: u32,
    pub high: u32,
}

/// Decoded frame buffer variants
///
/// This adapter only produces native-handle buffers: the encoded sample is
/// wrapped for a downstream hardware decoder, not decoded in place.
#[derive(Debug, Clone)]
pub enum FrameBuffer {
    /// A pipeline-native sample tagged with display dimensions
    Native {
        sample: Arc<MediaSample>,
        width: u32,
        height: u32,
    },
}

impl FrameBuffer {
    pub fn width(&self) -> u32 {
        match self {
            FrameBuffer::Native { width, .. } => *width,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            FrameBuffer::Native { height, .. } => *height,
        }
    }
}

/// Output of the decoder adapter
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub buffer: FrameBuffer,
    pub rtp_timestamp: u32,
    pub render_time_ms: i64,
    pub ntp_time_ms: i64,
}

/// Observer for completed encodes
///
/// Invoked from the pipeline's worker thread, concurrently with `encode`
/// calls. Implementations must be cheap or hand off quickly; a slow
/// consumer delays subsequent completions but never frame submission.
pub trait EncodedImageCallback: Send + Sync {
    fn on_encoded_image(
        &self,
        image: &EncodedImage,
        info: &CodecSpecificInfo,
        fragmentation: &FragmentationHeader,
    );
}

/// Observer for completed decodes, invoked synchronously on the decode
/// caller's thread.
pub trait DecodedImageCallback: Send + Sync {
    fn on_decoded_frame(&self, frame: &DecodedFrame);
}

/// Engine-facing video encoder contract
pub trait VideoEncoder: Send + Sync {
    fn init_encode(
        &self,
        settings: &CodecSettings,
        number_of_cores: usize,
        max_payload_size: usize,
    ) -> CodecResult<()>;

    fn register_encode_complete_callback(&self, callback: Arc<dyn EncodedImageCallback>);

    fn encode(&self, frame: &VideoFrame, frame_types: &[FrameType]) -> CodecResult<()>;

    /// Request new target bitrate (kbit/s) and frame rate
    fn set_rates(&self, bitrate_kbit: u32, framerate: u32) -> CodecResult<()>;

    /// Channel feedback from the engine; accepted and ignored by this adapter
    fn set_channel_parameters(&self, _packet_loss: u32, _rtt_ms: i64) -> CodecResult<()> {
        Ok(())
    }

    fn release(&self) -> CodecResult<()>;

    fn scaling_settings(&self) -> ScalingSettings;

    fn implementation_name(&self) -> &'static str;
}

/// Engine-facing video decoder contract
pub trait VideoDecoder: Send + Sync {
    fn init_decode(&self, settings: &CodecSettings, number_of_cores: usize) -> CodecResult<()>;

    fn register_decode_complete_callback(&self, callback: Arc<dyn DecodedImageCallback>);

    fn decode(
        &self,
        image: &EncodedImage,
        missing_frames: bool,
        render_time_ms: i64,
    ) -> CodecResult<()>;

    fn release(&self) -> CodecResult<()>;

    fn implementation_name(&self) -> &'static str;
}
