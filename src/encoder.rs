//! Hardware H.264 encoder adapter
//!
//! Bridges the engine's synchronous encode contract to the asynchronous
//! sample pipeline: frames are converted, stamped, and submitted with their
//! metadata cached out-of-band; the pipeline's worker thread delivers
//! encoded samples back through a completion handler that reattaches the
//! metadata and reconstructs NAL fragmentation.
//!
//! Two locks protect the adapter, deliberately kept apart: the submission
//! lock over session/geometry/pacing state, and the callback lock over the
//! registered completion observer. A slow consumer of encoded output can
//! therefore never stall frame submission, and release can clear state
//! without racing an in-flight completion.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::EncoderTuning;
use crate::convert::i420_to_nv12;
use crate::errors::{CodecError, CodecResult};
use crate::metadata::{FrameAttributes, FrameMetadataQueue};
use crate::nal::scan_fragments;
use crate::pipeline::{
    CompletionHandler, EncodedSample, RawSample, SinkConfig, SinkFactory,
};
use crate::types::{
    CodecMode, CodecSettings, CodecSpecificInfo, EncodedImage, EncodedImageCallback, FrameType,
    ScalingSettings, VideoCodecType, VideoEncoder, VideoFrame,
};

/// QP thresholds reported to the engine's resolution scaler
const LOW_QP_THRESHOLD: u32 = 24;
const HIGH_QP_THRESHOLD: u32 = 37;

const MAX_H264_QP: u32 = 51;

/// Relative rate variation below which a change request is ignored
const MIN_RATE_VARIATION: f64 = 0.1;

/// Frames allowed in flight through the pipeline before submissions are
/// dropped in favor of stream ticks
const MAX_FRAMES_IN_FLIGHT: usize = 3;

const IMPLEMENTATION_NAME: &str = "H264HardwarePipeline";

#[derive(Debug, Clone, Copy)]
struct PendingRateChange {
    target_bps: u32,
    frame_rate: u32,
}

/// Submission-side state, guarded by the submission lock
struct EncoderState {
    session: Option<Box<dyn crate::pipeline::SampleSink>>,
    width: u32,
    height: u32,
    frame_rate: u32,
    target_bps: u32,
    max_bps: u32,
    qp_max: u32,
    mode: CodecMode,
    frame_dropping_on: bool,
    key_frame_interval: u32,
    start_timestamp: u32,
    last_timestamp_hns: i64,
    first_frame: bool,
    last_frame_dropped: bool,
    last_rate_change: Instant,
    pending_rate_change: Option<PendingRateChange>,
    frames_submitted: u64,
    frames_dropped: u64,
}

impl EncoderState {
    fn empty() -> Self {
        Self {
            session: None,
            width: 0,
            height: 0,
            frame_rate: 0,
            target_bps: 0,
            max_bps: 0,
            qp_max: MAX_H264_QP,
            mode: CodecMode::RealtimeVideo,
            frame_dropping_on: true,
            key_frame_interval: 0,
            start_timestamp: 0,
            last_timestamp_hns: 0,
            first_frame: true,
            last_frame_dropped: false,
            last_rate_change: Instant::now(),
            pending_rate_change: None,
            frames_submitted: 0,
            frames_dropped: 0,
        }
    }
}

/// Snapshot of encoder activity counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderStats {
    /// Frames handed to the pipeline
    pub frames_submitted: u64,
    /// Frames dropped by backpressure
    pub frames_dropped: u64,
    /// Completed encodes delivered to the callback path
    pub frames_completed: u64,
    /// Frames currently in flight through the pipeline
    pub frames_in_flight: usize,
    /// Queued rate change waiting out the cooldown, (kbit/s, fps)
    pub pending_rate_change: Option<(u32, u32)>,
}

/// H.264 encoder backed by an asynchronous hardware sample pipeline
///
/// Construction takes the pipeline's sink factory and the tuning that every
/// session is built with; the engine drives it through [`VideoEncoder`].
pub struct H264Encoder {
    sink_factory: Arc<dyn SinkFactory>,
    tuning: EncoderTuning,
    /// Submission lock: session handle, geometry, pacing
    state: Mutex<EncoderState>,
    /// Shared with the completion path; push on submit, pop on completion
    queue: Arc<Mutex<FrameMetadataQueue>>,
    /// Callback lock: the registered completion observer
    callback: Arc<RwLock<Option<Arc<dyn EncodedImageCallback>>>>,
    frames_completed: Arc<AtomicU64>,
}

/// Rescale a 90 kHz RTP timestamp to hundred-nanosecond units relative to
/// the first frame.
///
/// H.264 RTP clock rate is 90 kHz (RFC 6184):
/// `hns = ticks_90khz / 90_000 * 10_000_000`.
fn derive_timestamp_hns(rtp_timestamp: u32, start_timestamp: u32) -> i64 {
    (rtp_timestamp.wrapping_sub(start_timestamp) as i64) * 10_000 / 90
}

impl H264Encoder {
    pub fn new(sink_factory: Arc<dyn SinkFactory>, tuning: EncoderTuning) -> Self {
        Self {
            sink_factory,
            tuning,
            state: Mutex::new(EncoderState::empty()),
            queue: Arc::new(Mutex::new(FrameMetadataQueue::new())),
            callback: Arc::new(RwLock::new(None)),
            frames_completed: Arc::new(AtomicU64::new(0)),
        }
    }

    fn rate_change_interval(&self) -> Duration {
        Duration::from_millis(self.tuning.rate_change_interval_ms)
    }

    /// Completion handler for a new session; runs on the pipeline's worker
    /// thread and touches only the metadata queue and the callback slot.
    fn completion_handler(&self) -> CompletionHandler {
        let queue = Arc::clone(&self.queue);
        let callback = Arc::clone(&self.callback);
        let completed = Arc::clone(&self.frames_completed);

        Arc::new(move |sample: EncodedSample| {
            // Pop the attributes even if the sample is discarded later, or
            // the queue clogs.
            let attributes = match queue.lock().unwrap().pop(sample.timestamp_hns) {
                Some(attributes) => attributes,
                None => {
                    // Cannot attribute this sample to a frame; drop it.
                    debug!(
                        "discarding sample at {} hns with no cached attributes",
                        sample.timestamp_hns
                    );
                    return;
                }
            };

            if sample.data.is_empty() {
                warn!("got empty sample at {} hns", sample.timestamp_hns);
                return;
            }

            let (fragmentation, has_idr) = scan_fragments(&sample.data);
            let is_key = sample.clean_point || has_idr;

            let image = EncodedImage {
                data: sample.data,
                rtp_timestamp: attributes.rtp_timestamp,
                ntp_time_ms: attributes.ntp_time_ms,
                capture_time_ms: attributes.capture_time_ms,
                encoded_width: attributes.frame_width,
                encoded_height: attributes.frame_height,
                frame_type: if is_key { FrameType::Key } else { FrameType::Delta },
                complete: is_key,
            };
            let info = CodecSpecificInfo::h264();

            completed.fetch_add(1, Ordering::Relaxed);

            let guard = callback.read().unwrap();
            if let Some(cb) = guard.as_ref() {
                cb.on_encoded_image(&image, &info, &fragmentation);
            }
        })
    }

    /// Build a session from the current state and tuning. One-shot: a
    /// failure leaves the adapter uninitialized.
    fn build_session(&self, state: &mut EncoderState) -> CodecResult<()> {
        let encoded_height = self.tuning.height_round.apply(state.height);

        let mut max_qp = state.qp_max.min(MAX_H264_QP);
        // Manual tuning overrides the value passed by the engine.
        if let Some(tuned) = self.tuning.max_qp {
            if tuned < MAX_H264_QP {
                max_qp = tuned;
            }
        }

        let config = SinkConfig {
            width: state.width,
            height: encoded_height,
            frame_rate: state.frame_rate,
            target_bps: state.target_bps,
            profile: self.tuning.profile,
            rc_mode: self.tuning.rc_mode,
            max_qp: (max_qp < MAX_H264_QP).then_some(max_qp),
            quality: self.tuning.quality.filter(|quality| *quality <= 100),
            hardware_transforms: true,
            low_latency: true,
            cabac: true,
        };

        let session = self.sink_factory.build(&config, self.completion_handler())?;
        state.session = Some(session);
        state.last_rate_change = Instant::now();
        info!(
            "encoder session: {}x{} @ {}fps, {} kbit/s, profile {:?}",
            state.width,
            encoded_height,
            state.frame_rate,
            state.target_bps / 1000,
            self.tuning.profile
        );
        Ok(())
    }

    /// Tear down the session and reset per-stream state. The callback slot
    /// is left untouched so reconfiguration keeps the registration.
    fn teardown(&self, state: &mut EncoderState) {
        if let Some(mut session) = state.session.take() {
            session.shutdown();
        }
        self.queue.lock().unwrap().clear();
        state.start_timestamp = 0;
        state.last_timestamp_hns = 0;
        state.first_frame = true;
        state.last_frame_dropped = false;
        state.pending_rate_change = None;
    }

    /// Apply a geometry/rate change, rebuilding the session when anything
    /// actually changed. Rates under the variation threshold are ignored to
    /// avoid oscillation.
    fn reconfigure(
        &self,
        state: &mut EncoderState,
        new_width: u32,
        new_height: u32,
        new_target_bps: u32,
        new_frame_rate: u32,
    ) -> CodecResult<()> {
        debug!(
            "reconfigure: {}x{} @ {}fps, {} kbit/s",
            new_width,
            new_height,
            new_frame_rate,
            new_target_bps / 1000
        );

        let mut res_updated = false;
        if state.width != new_width || state.height != new_height {
            res_updated = true;
            state.width = new_width;
            state.height = new_height;
        }

        let mut bitrate_updated = false;
        if (state.target_bps as f64 - new_target_bps as f64).abs()
            > state.target_bps as f64 * MIN_RATE_VARIATION
        {
            bitrate_updated = true;
            state.target_bps = new_target_bps;
        }

        let mut fps_updated = false;
        if (state.frame_rate as f64 - new_frame_rate as f64).abs()
            > state.frame_rate as f64 * MIN_RATE_VARIATION
        {
            fps_updated = true;
            state.frame_rate = new_frame_rate;
        }

        if res_updated || bitrate_updated || fps_updated {
            self.teardown(state);
            self.build_session(state)?;
        }
        Ok(())
    }

    /// Activity counters, including pipeline depth
    pub fn stats(&self) -> EncoderStats {
        let state = self.state.lock().unwrap();
        EncoderStats {
            frames_submitted: state.frames_submitted,
            frames_dropped: state.frames_dropped,
            frames_completed: self.frames_completed.load(Ordering::Relaxed),
            frames_in_flight: self.queue.lock().unwrap().len(),
            pending_rate_change: state
                .pending_rate_change
                .map(|pending| (pending.target_bps / 1000, pending.frame_rate)),
        }
    }
}

impl VideoEncoder for H264Encoder {
    fn init_encode(
        &self,
        settings: &CodecSettings,
        _number_of_cores: usize,
        _max_payload_size: usize,
    ) -> CodecResult<()> {
        if settings.codec_type != VideoCodecType::H264 {
            return Err(CodecError::InvalidParameter(
                "encoder not registered as an H264 codec".to_string(),
            ));
        }
        if settings.max_framerate == 0 {
            return Err(CodecError::InvalidParameter(
                "no frame rate defined".to_string(),
            ));
        }
        if settings.width < 1 || settings.height < 1 {
            return Err(CodecError::InvalidParameter(
                "no valid frame size defined".to_string(),
            ));
        }

        let mut state = self.state.lock().unwrap();
        if state.session.is_some() {
            self.teardown(&mut state);
        }

        state.width = settings.width;
        state.height = settings.height;
        // The engine only passes the max frame rate; use it as the initial
        // desired rate too.
        state.frame_rate = settings.max_framerate;
        state.mode = settings.mode;
        state.frame_dropping_on = settings.h264.frame_dropping_on;
        state.key_frame_interval = settings.h264.key_frame_interval;
        state.max_bps = settings.max_bitrate_kbit * 1000;
        state.target_bps = if settings.target_bitrate_kbit > 0 {
            settings.target_bitrate_kbit * 1000
        } else if settings.start_bitrate_kbit > 0 {
            settings.start_bitrate_kbit * 1000
        } else {
            // width*height*2 bit/s balances quality against what low-end
            // devices can sustain.
            settings.width * settings.height * 2
        };
        state.qp_max = settings.qp_max.min(MAX_H264_QP);

        debug!(
            "init_encode: mode {:?}, frame dropping {}, key frame interval {}, max {} kbit/s",
            state.mode,
            state.frame_dropping_on,
            state.key_frame_interval,
            state.max_bps / 1000
        );

        self.build_session(&mut state)
    }

    fn register_encode_complete_callback(&self, callback: Arc<dyn EncodedImageCallback>) {
        *self.callback.write().unwrap() = Some(callback);
    }

    fn encode(&self, frame: &VideoFrame, frame_types: &[FrameType]) -> CodecResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.session.is_none() {
            return Err(CodecError::Uninitialized);
        }

        let cur_width = frame.width();
        let cur_height = frame.height();
        let res_changed = cur_width != state.width || cur_height != state.height;
        let rate_change_due = state.pending_rate_change.is_some()
            && state.last_rate_change.elapsed() >= self.rate_change_interval();
        if res_changed || rate_change_due {
            let (target_bps, frame_rate) = match state.pending_rate_change.take() {
                Some(pending) => (pending.target_bps, pending.frame_rate),
                None => (state.target_bps, state.frame_rate),
            };
            self.reconfigure(&mut state, cur_width, cur_height, target_bps, frame_rate)?;
        }

        if frame_types.contains(&FrameType::Key) {
            info!("key frame requested");
            if let Some(session) = state.session.as_ref() {
                session.request_key_frame()?;
            }
        }

        if state.first_frame {
            state.first_frame = false;
            state.start_timestamp = frame.rtp_timestamp;
        }
        let timestamp_hns = derive_timestamp_hns(frame.rtp_timestamp, state.start_timestamp);

        // Only encode the frame if the pipeline is not full; otherwise drop
        // it and send a tick to keep the pipeline clock advancing.
        let depth = self.queue.lock().unwrap().len();
        if depth >= MAX_FRAMES_IN_FLIGHT {
            debug!(
                "pipeline full ({} in flight), dropping frame at {} hns",
                depth, timestamp_hns
            );
            state.last_frame_dropped = true;
            state.frames_dropped += 1;
            if let Some(session) = state.session.as_ref() {
                if let Err(e) = session.send_tick(timestamp_hns) {
                    warn!("stream tick failed: {}", e);
                }
            }
            state.last_timestamp_hns = timestamp_hns;
            return Ok(());
        }

        let encoded_height = self.tuning.height_round.apply(state.height);
        let nv12 = i420_to_nv12(&frame.buffer, encoded_height)?;
        let duration_hns = timestamp_hns - state.last_timestamp_hns;
        state.last_timestamp_hns = timestamp_hns;
        let discontinuity = std::mem::take(&mut state.last_frame_dropped);

        // Cache the frame attributes before submission so the completion
        // path can always resolve them.
        self.queue.lock().unwrap().push(
            timestamp_hns,
            FrameAttributes {
                rtp_timestamp: frame.rtp_timestamp,
                ntp_time_ms: frame.ntp_time_ms,
                capture_time_ms: frame.render_time_ms,
                frame_width: cur_width,
                frame_height: encoded_height,
            },
        );

        let sample = RawSample {
            timestamp_hns,
            duration_hns,
            data: Bytes::from(nv12),
            discontinuity,
        };
        let submit_result = match state.session.as_ref() {
            Some(session) => session.submit(sample),
            None => Err(CodecError::Uninitialized),
        };
        if let Err(e) = submit_result {
            // The cached attributes will never match a completion now.
            self.queue.lock().unwrap().pop(timestamp_hns);
            return Err(e);
        }

        state.frames_submitted += 1;
        Ok(())
    }

    fn set_rates(&self, bitrate_kbit: u32, framerate: u32) -> CodecResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.session.is_none() {
            return Err(CodecError::Uninitialized);
        }
        info!("set_rates({} kbit/s, {} fps)", bitrate_kbit, framerate);

        // Engines are known to send this; ignore it.
        if framerate == 0 {
            return Ok(());
        }

        let elapsed = state.last_rate_change.elapsed();
        let interval = self.rate_change_interval();
        if elapsed < interval {
            info!(
                "postponing this rate change for {} ms",
                (interval - elapsed).as_millis()
            );
            state.pending_rate_change = Some(PendingRateChange {
                target_bps: bitrate_kbit * 1000,
                frame_rate: framerate,
            });
            return Ok(());
        }

        let (width, height) = (state.width, state.height);
        self.reconfigure(&mut state, width, height, bitrate_kbit * 1000, framerate)
    }

    fn release(&self) -> CodecResult<()> {
        let mut state = self.state.lock().unwrap();
        self.teardown(&mut state);
        Ok(())
    }

    fn scaling_settings(&self) -> ScalingSettings {
        ScalingSettings {
            low: LOW_QP_THRESHOLD,
            high: HIGH_QP_THRESHOLD,
        }
    }

    fn implementation_name(&self) -> &'static str {
        IMPLEMENTATION_NAME
    }
}

impl Drop for H264Encoder {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        self.teardown(&mut state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_rescales_90khz_to_hns() {
        // One second of 90 kHz ticks is 10^7 hundred-nanosecond units.
        assert_eq!(derive_timestamp_hns(90_000, 0), 10_000_000);
        assert_eq!(derive_timestamp_hns(0, 0), 0);
        assert_eq!(derive_timestamp_hns(3_000, 0), 333_333);
        assert_eq!(derive_timestamp_hns(93_000, 90_000), 333_333);
    }

    #[test]
    fn timestamp_handles_rtp_wraparound() {
        // Start near the top of the u32 range, first frame after the wrap.
        let start = u32::MAX - 89_999;
        let ts = derive_timestamp_hns(start.wrapping_add(90_000), start);
        assert_eq!(ts, 10_000_000);
    }

    #[test]
    fn scaling_settings_expose_qp_thresholds() {
        let encoder = H264Encoder::new(
            Arc::new(crate::testing::MockSinkFactory::new()),
            EncoderTuning::default(),
        );
        let scaling = encoder.scaling_settings();
        assert_eq!(scaling.low, 24);
        assert_eq!(scaling.high, 37);
        assert_eq!(encoder.implementation_name(), "H264HardwarePipeline");
    }
}
