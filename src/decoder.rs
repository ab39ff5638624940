//! Hardware H.264 decoder adapter
//!
//! A passthrough: decoding happens downstream on a pipeline-native sample,
//! so this adapter only wraps the encoded bytes, tracks display dimensions,
//! and completes synchronously on the caller's thread.

use std::sync::{Arc, Mutex, RwLock};

use log::debug;

use crate::errors::CodecResult;
use crate::pipeline::MediaSample;
use crate::types::{
    CodecSettings, DecodedFrame, DecodedImageCallback, EncodedImage, FrameBuffer, FrameType,
    VideoDecoder,
};

const IMPLEMENTATION_NAME: &str = "H264HardwarePipeline";

/// Passthrough decoder wrapping encoded samples for a downstream hardware
/// decoder
#[derive(Default)]
pub struct H264Decoder {
    /// Dimensions taken from the last trusted (key) frame
    dimensions: Mutex<(u32, u32)>,
    callback: RwLock<Option<Arc<dyn DecodedImageCallback>>>,
}

impl H264Decoder {
    pub fn new() -> Self {
        Self {
            dimensions: Mutex::new((0, 0)),
            callback: RwLock::new(None),
        }
    }

    /// Dimensions from delta frames are not trusted; only a key frame with
    /// nonzero dimensions updates the tracked size.
    fn update_dimensions(&self, image: &EncodedImage) {
        if image.frame_type == FrameType::Key
            && image.encoded_width > 0
            && image.encoded_height > 0
        {
            let mut dims = self.dimensions.lock().unwrap();
            *dims = (image.encoded_width, image.encoded_height);
        }
    }
}

impl VideoDecoder for H264Decoder {
    fn init_decode(&self, _settings: &CodecSettings, _number_of_cores: usize) -> CodecResult<()> {
        // Nothing to do here, the decoder acts as a passthrough.
        debug!("init_decode");
        Ok(())
    }

    fn register_decode_complete_callback(&self, callback: Arc<dyn DecodedImageCallback>) {
        *self.callback.write().unwrap() = Some(callback);
    }

    fn decode(
        &self,
        image: &EncodedImage,
        _missing_frames: bool,
        render_time_ms: i64,
    ) -> CodecResult<()> {
        self.update_dimensions(image);
        let (width, height) = *self.dimensions.lock().unwrap();

        let sample = Arc::new(MediaSample::from_bytes(&image.data));
        let frame = DecodedFrame {
            buffer: FrameBuffer::Native {
                sample,
                width,
                height,
            },
            rtp_timestamp: image.rtp_timestamp,
            render_time_ms,
            ntp_time_ms: image.ntp_time_ms,
        };

        let guard = self.callback.read().unwrap();
        if let Some(cb) = guard.as_ref() {
            cb.on_decoded_frame(&frame);
        }
        Ok(())
    }

    fn release(&self) -> CodecResult<()> {
        // No pipeline resources are owned by this adapter directly.
        Ok(())
    }

    fn implementation_name(&self) -> &'static str {
        IMPLEMENTATION_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Mutex as StdMutex;

    struct CollectingCallback {
        frames: StdMutex<Vec<DecodedFrame>>,
    }

    impl DecodedImageCallback for CollectingCallback {
        fn on_decoded_frame(&self, frame: &DecodedFrame) {
            self.frames.lock().unwrap().push(frame.clone());
        }
    }

    fn image(frame_type: FrameType, width: u32, height: u32) -> EncodedImage {
        EncodedImage {
            data: Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88]),
            rtp_timestamp: 9000,
            ntp_time_ms: 1111,
            capture_time_ms: 2222,
            encoded_width: width,
            encoded_height: height,
            frame_type,
            complete: frame_type == FrameType::Key,
        }
    }

    #[test]
    fn key_frames_update_tracked_dimensions() {
        let decoder = H264Decoder::new();
        let callback = Arc::new(CollectingCallback {
            frames: StdMutex::new(Vec::new()),
        });
        decoder.register_decode_complete_callback(callback.clone());

        decoder
            .decode(&image(FrameType::Key, 640, 480), false, 0)
            .expect("decode should succeed");
        decoder
            .decode(&image(FrameType::Delta, 1280, 720), false, 0)
            .expect("decode should succeed");

        let frames = callback.frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].buffer.width(), 640);
        assert_eq!(frames[1].buffer.width(), 640, "delta dims are not trusted");
        assert_eq!(frames[1].buffer.height(), 480);
    }

    #[test]
    fn zero_sized_key_frames_do_not_update_dimensions() {
        let decoder = H264Decoder::new();
        decoder
            .decode(&image(FrameType::Key, 640, 480), false, 0)
            .expect("decode should succeed");
        decoder
            .decode(&image(FrameType::Key, 0, 0), false, 0)
            .expect("decode should succeed");
        assert_eq!(*decoder.dimensions.lock().unwrap(), (640, 480));
    }

    #[test]
    fn decode_completes_synchronously_with_times() {
        let decoder = H264Decoder::new();
        let callback = Arc::new(CollectingCallback {
            frames: StdMutex::new(Vec::new()),
        });
        decoder.register_decode_complete_callback(callback.clone());

        decoder
            .decode(&image(FrameType::Key, 320, 240), false, 777)
            .expect("decode should succeed");

        let frames = callback.frames.lock().unwrap();
        assert_eq!(frames.len(), 1, "completion is synchronous");
        assert_eq!(frames[0].rtp_timestamp, 9000);
        assert_eq!(frames[0].render_time_ms, 777);
        assert_eq!(frames[0].ntp_time_ms, 1111);
        let FrameBuffer::Native { sample, .. } = &frames[0].buffer;
        assert_eq!(sample.len(), 6, "payload bytes are carried in the sample");
    }

    #[test]
    fn decode_without_callback_is_not_an_error() {
        let decoder = H264Decoder::new();
        decoder
            .decode(&image(FrameType::Key, 320, 240), false, 0)
            .expect("decode should succeed with no callback registered");
        assert!(decoder.release().is_ok());
    }
}
