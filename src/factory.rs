//! Codec format selection and adapter construction
//!
//! The engine negotiates codecs by SDP format name; this factory claims
//! H.264 for the hardware adapter and delegates VP8/VP9 to an injected
//! software codec provider.

use std::sync::Arc;

use log::error;
use serde::{Deserialize, Serialize};

use crate::config::EncoderTuning;
use crate::decoder::H264Decoder;
use crate::encoder::H264Encoder;
use crate::pipeline::SinkFactory;
use crate::types::{VideoDecoder, VideoEncoder};

pub const H264_FORMAT_NAME: &str = "H264";
pub const VP8_FORMAT_NAME: &str = "VP8";
pub const VP9_FORMAT_NAME: &str = "VP9";

/// A negotiated video format, identified by its SDP name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdpVideoFormat {
    pub name: String,
}

impl SdpVideoFormat {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Capability descriptor consumed by the engine's codec preference ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecInfo {
    pub is_hardware_accelerated: bool,
    pub has_internal_source: bool,
}

/// External collaborator supplying software VP8/VP9 codecs
pub trait SoftwareCodecProvider: Send + Sync {
    fn create_encoder(&self, format: &SdpVideoFormat) -> Option<Box<dyn VideoEncoder>>;
    fn create_decoder(&self, format: &SdpVideoFormat) -> Option<Box<dyn VideoDecoder>>;
}

/// Builds encoder/decoder adapters per negotiated format
///
/// H.264 gets the hardware adapter built from the injected sink factory and
/// tuning; VP8/VP9 are delegated to the software provider when one is
/// present.
pub struct HardwareCodecFactory {
    sink_factory: Arc<dyn SinkFactory>,
    tuning: EncoderTuning,
    software: Option<Arc<dyn SoftwareCodecProvider>>,
}

impl HardwareCodecFactory {
    pub fn new(sink_factory: Arc<dyn SinkFactory>, tuning: EncoderTuning) -> Self {
        Self {
            sink_factory,
            tuning,
            software: None,
        }
    }

    /// Build against the openh264-backed software pipeline
    #[cfg(feature = "software-fallback")]
    pub fn with_software_pipeline(tuning: EncoderTuning) -> Self {
        Self::new(
            Arc::new(crate::pipeline::SoftwareSinkFactory::new()),
            tuning,
        )
    }

    /// Attach the collaborator handling VP8/VP9
    pub fn with_software_provider(mut self, provider: Arc<dyn SoftwareCodecProvider>) -> Self {
        self.software = Some(provider);
        self
    }

    pub fn supported_formats(&self) -> Vec<SdpVideoFormat> {
        vec![
            SdpVideoFormat::new(VP8_FORMAT_NAME),
            SdpVideoFormat::new(VP9_FORMAT_NAME),
            SdpVideoFormat::new(H264_FORMAT_NAME),
        ]
    }

    pub fn is_format_supported(&self, format: &SdpVideoFormat) -> bool {
        self.supported_formats()
            .iter()
            .any(|supported| supported.matches(&format.name))
    }

    pub fn query_encoder(&self, format: &SdpVideoFormat) -> CodecInfo {
        CodecInfo {
            is_hardware_accelerated: format.matches(H264_FORMAT_NAME),
            has_internal_source: false,
        }
    }

    pub fn create_encoder(&self, format: &SdpVideoFormat) -> Option<Box<dyn VideoEncoder>> {
        if format.matches(H264_FORMAT_NAME) {
            return Some(Box::new(H264Encoder::new(
                Arc::clone(&self.sink_factory),
                self.tuning.clone(),
            )));
        }
        if format.matches(VP8_FORMAT_NAME) || format.matches(VP9_FORMAT_NAME) {
            return self
                .software
                .as_ref()
                .and_then(|provider| provider.create_encoder(format));
        }
        error!("trying to create encoder of unsupported format {}", format.name);
        None
    }

    pub fn create_decoder(&self, format: &SdpVideoFormat) -> Option<Box<dyn VideoDecoder>> {
        if !self.is_format_supported(format) {
            error!("trying to create decoder for unsupported format {}", format.name);
            return None;
        }
        if format.matches(H264_FORMAT_NAME) {
            return Some(Box::new(H264Decoder::new()));
        }
        self.software
            .as_ref()
            .and_then(|provider| provider.create_decoder(format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSinkFactory;

    fn factory() -> HardwareCodecFactory {
        HardwareCodecFactory::new(Arc::new(MockSinkFactory::new()), EncoderTuning::default())
    }

    #[test]
    fn h264_is_hardware_accelerated() {
        let factory = factory();
        let info = factory.query_encoder(&SdpVideoFormat::new("H264"));
        assert!(info.is_hardware_accelerated);
        assert!(!info.has_internal_source);

        let info = factory.query_encoder(&SdpVideoFormat::new("VP8"));
        assert!(!info.is_hardware_accelerated);
    }

    #[test]
    fn format_names_match_case_insensitively() {
        let factory = factory();
        assert!(factory.create_encoder(&SdpVideoFormat::new("h264")).is_some());
        assert!(factory.create_decoder(&SdpVideoFormat::new("H264")).is_some());
    }

    #[test]
    fn software_formats_without_provider_yield_none() {
        let factory = factory();
        assert!(factory.create_encoder(&SdpVideoFormat::new("VP8")).is_none());
        assert!(factory.create_decoder(&SdpVideoFormat::new("VP9")).is_none());
    }

    #[test]
    fn unknown_formats_are_rejected() {
        let factory = factory();
        assert!(factory.create_encoder(&SdpVideoFormat::new("AV1")).is_none());
        assert!(factory.create_decoder(&SdpVideoFormat::new("AV1")).is_none());
        assert!(!factory.is_format_supported(&SdpVideoFormat::new("AV1")));
    }

    #[test]
    fn supported_formats_list_all_three() {
        let formats = factory().supported_formats();
        assert_eq!(formats.len(), 3);
        assert!(formats.iter().any(|f| f.matches("H264")));
        assert!(formats.iter().any(|f| f.matches("VP8")));
        assert!(formats.iter().any(|f| f.matches("VP9")));
    }
}
