//! CrabCodec: Hardware H.264 codec adapter for real-time media engines
//!
//! This crate bridges a media engine's synchronous encode/decode contract
//! to an asynchronous, queue-based hardware sample pipeline.
//!
//! # Features
//! - H.264 encoder adapter with out-of-band frame metadata reattachment
//! - Annex-B NAL fragmentation reconstruction for RTP packetization
//! - Throttled live reconfiguration (resolution, bitrate, frame rate)
//! - Backpressure by frame dropping with pipeline clock ticks
//! - Passthrough decoder wrapping samples for downstream hardware decode
//! - Pluggable pipeline backends through a request/response channel contract
//!
//! # Usage
//! ```rust,ignore
//! use std::sync::Arc;
//! use crabcodec::{EncoderTuning, HardwareCodecFactory, SdpVideoFormat};
//!
//! let factory = HardwareCodecFactory::new(platform_sink_factory, EncoderTuning::default());
//! let encoder = factory
//!     .create_encoder(&SdpVideoFormat::new("H264"))
//!     .expect("H264 is always supported");
//! ```
pub mod config;
pub mod convert;
pub mod decoder;
pub mod encoder;
pub mod errors;
pub mod factory;
pub mod metadata;
pub mod nal;
pub mod pipeline;
pub mod types;

// Testing utilities - scripted pipeline and synthetic frames for offline
// testing
pub mod testing;

// Re-exports for convenience
pub use config::{EncoderTuning, H264Profile, HeightRound, RcMode};
pub use decoder::H264Decoder;
pub use encoder::{EncoderStats, H264Encoder};
pub use errors::{CodecError, CodecResult};
pub use factory::{CodecInfo, HardwareCodecFactory, SdpVideoFormat, SoftwareCodecProvider};
pub use types::{
    CodecSettings, CodecSpecificInfo, DecodedFrame, DecodedImageCallback, EncodedImage,
    EncodedImageCallback, FragmentationHeader, FrameType, I420Buffer, ScalingSettings,
    VideoCodecType, VideoDecoder, VideoEncoder, VideoFrame,
};

/// Initialize logging for the codec adapter
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabcodec=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
