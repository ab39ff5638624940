//! Testing utilities: scripted pipeline and synthetic frames
//!
//! A mock sink factory that records every pipeline interaction and can
//! complete samples immediately or on demand, plus synthetic I420 frames
//! and Annex-B payloads. Enables offline testing of the adapters without
//! any hardware or codec library.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::errors::CodecResult;
use crate::pipeline::{
    CompletionHandler, EncodedSample, RawSample, SampleSink, SinkConfig, SinkFactory,
};
use crate::types::{I420Buffer, VideoFrame};

/// When the mock delivers completions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Complete each sample synchronously inside `submit`
    Immediate,
    /// Hold samples until [`MockSinkFactory::complete_next`] is called
    Manual,
}

#[derive(Default)]
struct PipelineRecord {
    configs: Vec<SinkConfig>,
    submitted: Vec<RawSample>,
    ticks: Vec<i64>,
    key_frame_requests: usize,
    shutdowns: usize,
    force_next_key: bool,
    pending: VecDeque<(EncodedSample, CompletionHandler)>,
}

/// Records every interaction with the pipeline and synthesizes Annex-B
/// completions
///
/// Each `build` call returns a fresh session sharing this factory's record,
/// so tests observe reconfiguration as additional built sessions.
pub struct MockSinkFactory {
    mode: CompletionMode,
    record: Arc<Mutex<PipelineRecord>>,
}

impl MockSinkFactory {
    pub fn new() -> Self {
        Self::with_mode(CompletionMode::Immediate)
    }

    pub fn with_mode(mode: CompletionMode) -> Self {
        Self {
            mode,
            record: Arc::new(Mutex::new(PipelineRecord::default())),
        }
    }

    /// Number of sessions built (1 after init, +1 per reconfiguration)
    pub fn built_count(&self) -> usize {
        self.record.lock().unwrap().configs.len()
    }

    pub fn last_config(&self) -> Option<SinkConfig> {
        self.record.lock().unwrap().configs.last().cloned()
    }

    pub fn submitted_count(&self) -> usize {
        self.record.lock().unwrap().submitted.len()
    }

    pub fn submitted(&self) -> Vec<RawSample> {
        self.record.lock().unwrap().submitted.clone()
    }

    pub fn ticks(&self) -> Vec<i64> {
        self.record.lock().unwrap().ticks.clone()
    }

    pub fn key_frame_requests(&self) -> usize {
        self.record.lock().unwrap().key_frame_requests
    }

    pub fn shutdown_count(&self) -> usize {
        self.record.lock().unwrap().shutdowns
    }

    /// Deliver the oldest held completion (manual mode); returns whether
    /// one was pending
    pub fn complete_next(&self) -> bool {
        let entry = self.record.lock().unwrap().pending.pop_front();
        match entry {
            Some((sample, handler)) => {
                handler(sample);
                true
            }
            None => false,
        }
    }

    /// Deliver every held completion in order
    pub fn complete_all(&self) -> usize {
        let mut delivered = 0;
        while self.complete_next() {
            delivered += 1;
        }
        delivered
    }
}

impl Default for MockSinkFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkFactory for MockSinkFactory {
    fn build(
        &self,
        config: &SinkConfig,
        on_encoded: CompletionHandler,
    ) -> CodecResult<Box<dyn SampleSink>> {
        self.record.lock().unwrap().configs.push(config.clone());
        Ok(Box::new(MockSink {
            mode: self.mode,
            record: Arc::clone(&self.record),
            handler: on_encoded,
            first_sample: AtomicBool::new(true),
        }))
    }
}

struct MockSink {
    mode: CompletionMode,
    record: Arc<Mutex<PipelineRecord>>,
    handler: CompletionHandler,
    first_sample: AtomicBool,
}

impl SampleSink for MockSink {
    fn submit(&self, sample: RawSample) -> CodecResult<()> {
        let encoded = {
            let mut record = self.record.lock().unwrap();
            record.submitted.push(sample.clone());
            let is_key = self.first_sample.swap(false, Ordering::SeqCst)
                || std::mem::take(&mut record.force_next_key);
            let payload = if is_key {
                annex_b_key_frame()
            } else {
                annex_b_delta_frame()
            };
            let encoded = EncodedSample {
                timestamp_hns: sample.timestamp_hns,
                data: Bytes::from(payload),
                clean_point: is_key,
            };
            if self.mode == CompletionMode::Manual {
                record
                    .pending
                    .push_back((encoded, Arc::clone(&self.handler)));
                return Ok(());
            }
            encoded
        };
        // Immediate mode: deliver outside the record lock, like a real
        // worker thread would.
        (self.handler)(encoded);
        Ok(())
    }

    fn send_tick(&self, timestamp_hns: i64) -> CodecResult<()> {
        self.record.lock().unwrap().ticks.push(timestamp_hns);
        Ok(())
    }

    fn request_key_frame(&self) -> CodecResult<()> {
        let mut record = self.record.lock().unwrap();
        record.key_frame_requests += 1;
        record.force_next_key = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut record = self.record.lock().unwrap();
        record.shutdowns += 1;
        record.pending.clear();
    }
}

/// SPS + PPS + IDR slice with mixed 4- and 3-byte start codes
pub fn annex_b_key_frame() -> Vec<u8> {
    vec![
        0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1e, 0xab, // SPS
        0x00, 0x00, 0x00, 0x01, 0x68, 0xce, 0x3c, 0x80, // PPS
        0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x21, 0xa0, // IDR slice
    ]
}

/// Single P slice behind a 4-byte start code
pub fn annex_b_delta_frame() -> Vec<u8> {
    vec![0x00, 0x00, 0x00, 0x01, 0x41, 0x9a, 0x24, 0x6c, 0x41, 0x4f]
}

/// Build a synthetic I420 frame with content varying per frame number
///
/// Timestamps advance at 30 fps on the 90 kHz clock; render and NTP times
/// advance in lockstep.
pub fn synthetic_frame(frame_number: u64, width: u32, height: u32) -> VideoFrame {
    let w = width as usize;
    let h = height as usize;
    let cw = (w + 1) / 2;
    let ch = (h + 1) / 2;

    let base = (frame_number % 256) as u8;
    let mut data_y = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            data_y[y * w + x] = base.wrapping_add((x + y) as u8);
        }
    }
    let data_u = vec![base.wrapping_add(64); cw * ch];
    let data_v = vec![base.wrapping_add(192); cw * ch];

    let buffer = I420Buffer::from_planes(width, height, data_y, data_u, data_v, w, cw, cw);

    VideoFrame::new(buffer, (frame_number as u32).wrapping_mul(3000))
        .with_render_time(frame_number as i64 * 33)
        .with_ntp_time(1_700_000_000_000 + frame_number as i64 * 33)
}
