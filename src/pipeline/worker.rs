//! Worker-thread sink wrapping a synchronous transform

use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use log::{debug, error, warn};

use crate::errors::{CodecError, CodecResult};
use crate::pipeline::{CompletionHandler, RawSample, SampleSink, Transform};

enum Command {
    Sample(RawSample),
    Tick(i64),
    KeyFrame,
    Stop,
}

/// Runs a [`Transform`] on a dedicated worker thread, turning the
/// synchronous encode step into the submit/notify channel contract.
///
/// Submissions enqueue and return immediately; the worker invokes the
/// completion handler for every sample the transform produces. Shutdown
/// drains nothing: queued samples are dropped.
pub struct WorkerSink {
    tx: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl WorkerSink {
    /// Spawn the worker around a transform and completion handler
    pub fn spawn(mut transform: Box<dyn Transform>, on_encoded: CompletionHandler) -> Self {
        let (tx, rx) = unbounded::<Command>();

        let worker = std::thread::Builder::new()
            .name("crabcodec-sink".to_string())
            .spawn(move || {
                while let Ok(command) = rx.recv() {
                    match command {
                        Command::Sample(sample) => match transform.encode(&sample) {
                            Ok(Some(encoded)) => on_encoded(encoded),
                            Ok(None) => {
                                debug!(
                                    "transform buffered sample at {} hns",
                                    sample.timestamp_hns
                                );
                            }
                            Err(e) => {
                                error!("transform failed at {} hns: {}", sample.timestamp_hns, e);
                            }
                        },
                        Command::Tick(timestamp_hns) => {
                            debug!("stream tick at {} hns", timestamp_hns);
                        }
                        Command::KeyFrame => transform.force_key_frame(),
                        Command::Stop => break,
                    }
                }
            })
            .expect("failed to spawn sink worker thread");

        Self {
            tx,
            worker: Some(worker),
        }
    }

    fn send(&self, command: Command) -> CodecResult<()> {
        self.tx
            .send(command)
            .map_err(|_| CodecError::Pipeline("sink worker is gone".to_string()))
    }
}

impl SampleSink for WorkerSink {
    fn submit(&self, sample: RawSample) -> CodecResult<()> {
        self.send(Command::Sample(sample))
    }

    fn send_tick(&self, timestamp_hns: i64) -> CodecResult<()> {
        self.send(Command::Tick(timestamp_hns))
    }

    fn request_key_frame(&self) -> CodecResult<()> {
        self.send(Command::KeyFrame)
    }

    fn shutdown(&mut self) {
        let _ = self.tx.send(Command::Stop);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("sink worker panicked during shutdown");
            }
        }
    }
}

impl Drop for WorkerSink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::EncodedSample;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct EchoTransform {
        force_key: bool,
    }

    impl Transform for EchoTransform {
        fn encode(&mut self, sample: &RawSample) -> Result<Option<EncodedSample>, String> {
            let clean_point = std::mem::take(&mut self.force_key);
            Ok(Some(EncodedSample {
                timestamp_hns: sample.timestamp_hns,
                data: sample.data.clone(),
                clean_point,
            }))
        }

        fn force_key_frame(&mut self) {
            self.force_key = true;
        }
    }

    fn wait_until(check: impl Fn() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        panic!("condition not reached within timeout");
    }

    #[test]
    fn worker_sink_completes_submitted_samples() {
        let completed = Arc::new(AtomicUsize::new(0));
        let completed_clone = Arc::clone(&completed);
        let handler: CompletionHandler = Arc::new(move |sample: EncodedSample| {
            assert_eq!(sample.timestamp_hns, 1234);
            completed_clone.fetch_add(1, Ordering::SeqCst);
        });

        let mut sink = WorkerSink::spawn(Box::new(EchoTransform { force_key: false }), handler);
        sink.submit(RawSample {
            timestamp_hns: 1234,
            duration_hns: 333_333,
            data: Bytes::from_static(&[0u8; 16]),
            discontinuity: false,
        })
        .expect("submit should succeed");

        wait_until(|| completed.load(Ordering::SeqCst) == 1);
        sink.shutdown();
    }

    #[test]
    fn key_frame_request_marks_next_sample() {
        let saw_key = Arc::new(AtomicBool::new(false));
        let saw_key_clone = Arc::clone(&saw_key);
        let handler: CompletionHandler = Arc::new(move |sample: EncodedSample| {
            if sample.clean_point {
                saw_key_clone.store(true, Ordering::SeqCst);
            }
        });

        let mut sink = WorkerSink::spawn(Box::new(EchoTransform { force_key: false }), handler);
        sink.request_key_frame().expect("request should succeed");
        sink.submit(RawSample {
            timestamp_hns: 0,
            duration_hns: 0,
            data: Bytes::from_static(&[0u8; 4]),
            discontinuity: false,
        })
        .expect("submit should succeed");

        wait_until(|| saw_key.load(Ordering::SeqCst));
        sink.shutdown();
    }

    #[test]
    fn submit_after_shutdown_is_a_pipeline_error() {
        let handler: CompletionHandler = Arc::new(|_| {});
        let mut sink = WorkerSink::spawn(Box::new(EchoTransform { force_key: false }), handler);
        sink.shutdown();

        let result = sink.submit(RawSample {
            timestamp_hns: 0,
            duration_hns: 0,
            data: Bytes::new(),
            discontinuity: false,
        });
        assert!(matches!(result, Err(CodecError::Pipeline(_))));
    }
}
