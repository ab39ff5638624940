//! Software reference transform backed by openh264
//!
//! Used as the pipeline backend when no hardware sink factory is supplied,
//! and by integration setups that need a real bitstream without hardware.
//! Not a substitute for the platform transform in production: it encodes on
//! the CPU and reports itself accordingly through the factory capability
//! query.

use bytes::Bytes;
use log::debug;
use openh264::encoder::{Encoder, FrameType as Openh264FrameType};
use openh264::formats::YUVBuffer;

use crate::convert::nv12_to_i420;
use crate::errors::{CodecError, CodecResult};
use crate::pipeline::{
    CompletionHandler, EncodedSample, RawSample, SampleSink, SinkConfig, SinkFactory, Transform,
    WorkerSink,
};

/// CPU H.264 transform implementing the pipeline [`Transform`] contract
pub struct OpenH264Transform {
    encoder: Encoder,
    width: u32,
    height: u32,
    force_key: bool,
}

impl OpenH264Transform {
    pub fn new(config: &SinkConfig) -> CodecResult<Self> {
        let encoder = Encoder::new()
            .map_err(|e| CodecError::Pipeline(format!("openh264 init failed: {}", e)))?;
        debug!(
            "software transform: {}x{} @ {}fps, {} bps target",
            config.width, config.height, config.frame_rate, config.target_bps
        );
        Ok(Self {
            encoder,
            width: config.width,
            height: config.height,
            force_key: false,
        })
    }
}

impl Transform for OpenH264Transform {
    fn encode(&mut self, sample: &RawSample) -> Result<Option<EncodedSample>, String> {
        if self.force_key {
            self.force_key = false;
            self.encoder.force_intra_frame();
        }

        let i420 = nv12_to_i420(&sample.data, self.width, self.height)
            .map_err(|e| format!("NV12 conversion failed: {}", e))?;
        let yuv = YUVBuffer::from_vec(i420, self.width as usize, self.height as usize);

        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| format!("openh264 encode failed: {}", e))?;

        let data = bitstream.to_vec();
        if data.is_empty() {
            return Ok(None);
        }

        let clean_point = matches!(
            bitstream.frame_type(),
            Openh264FrameType::IDR | Openh264FrameType::I
        );

        Ok(Some(EncodedSample {
            timestamp_hns: sample.timestamp_hns,
            data: Bytes::from(data),
            clean_point,
        }))
    }

    fn force_key_frame(&mut self) {
        self.force_key = true;
    }
}

/// Builds worker-backed software sessions
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareSinkFactory;

impl SoftwareSinkFactory {
    pub fn new() -> Self {
        Self
    }
}

impl SinkFactory for SoftwareSinkFactory {
    fn build(
        &self,
        config: &SinkConfig,
        on_encoded: CompletionHandler,
    ) -> CodecResult<Box<dyn SampleSink>> {
        let transform = OpenH264Transform::new(config)?;
        Ok(Box::new(WorkerSink::spawn(Box::new(transform), on_encoded)))
    }
}
