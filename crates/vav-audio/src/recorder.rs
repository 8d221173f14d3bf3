//! Output recording
//!
//! Captures the stereo output to WAV without touching the audio thread's
//! timing: the callback pushes interleaved samples into a wait-free ring
//! only while recording is active, and a background thread drains the
//! ring to disk. Files are auto-numbered takes under the configured
//! directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::{AudioError, AudioResult};

/// Ring capacity between callback and disk thread, in samples.
const RECORD_RING_CAPACITY: usize = 1 << 18;

/// Disk thread poll interval while idle.
const DRAIN_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    /// File prefix: "take" -> take_001.wav, take_002.wav, ...
    pub file_prefix: String,
    pub sample_rate: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            file_prefix: "take".to_string(),
            sample_rate: 48_000,
        }
    }
}

/// Handle the audio callback holds: a producer plus the shared active
/// flag. Pushing is wait-free and drops samples when the disk thread is
/// behind (counted, never blocking).
pub struct RecordTap {
    producer: Producer<f32>,
    active: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl RecordTap {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Push one interleaved stereo frame.
    #[inline(always)]
    pub fn push(&mut self, left: f32, right: f32) {
        if self.producer.push(left).is_err() || self.producer.push(right).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Control side: owns the disk thread and the current take.
pub struct OutputRecorder {
    config: RecorderConfig,
    active: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    writer: Arc<Mutex<Option<WavWriter<std::io::BufWriter<std::fs::File>>>>>,
    handle: Option<JoinHandle<()>>,
    current_file: Option<PathBuf>,
    take: u32,
}

impl OutputRecorder {
    /// Build the recorder and the tap for the audio callback.
    pub fn new(config: RecorderConfig) -> (Self, RecordTap) {
        let (producer, consumer) = RingBuffer::<f32>::new(RECORD_RING_CAPACITY);
        let active = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let dropped = Arc::new(AtomicU64::new(0));
        let writer = Arc::new(Mutex::new(None));

        let handle = spawn_drain_thread(consumer, Arc::clone(&running), Arc::clone(&writer));

        (
            Self {
                config,
                active: Arc::clone(&active),
                running,
                dropped: Arc::clone(&dropped),
                writer,
                handle: Some(handle),
                current_file: None,
                take: 0,
            },
            RecordTap {
                producer,
                active,
                dropped,
            },
        )
    }

    pub fn is_recording(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Frames dropped because the disk thread fell behind.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current_file.as_deref()
    }

    /// Open the next take and start capturing. No-op when already rolling.
    pub fn start(&mut self) -> AudioResult<PathBuf> {
        if self.is_recording() {
            return self
                .current_file
                .clone()
                .ok_or_else(|| AudioError::BackendError("recording without a file".into()));
        }

        std::fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| AudioError::BackendError(e.to_string()))?;
        let path = self.next_take_path();
        let spec = WavSpec {
            channels: 2,
            sample_rate: self.config.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let wav =
            WavWriter::create(&path, spec).map_err(|e| AudioError::BackendError(e.to_string()))?;

        *self.writer.lock() = Some(wav);
        self.current_file = Some(path.clone());
        self.active.store(true, Ordering::Release);
        log::info!("recording to {}", path.display());
        Ok(path)
    }

    /// Stop capturing and finalize the file. Returns the finished take.
    pub fn stop(&mut self) -> Option<PathBuf> {
        if !self.is_recording() {
            return None;
        }
        self.active.store(false, Ordering::Release);
        // Give the drain thread a moment to flush the tail.
        std::thread::sleep(DRAIN_INTERVAL * 4);

        if let Some(wav) = self.writer.lock().take() {
            if let Err(e) = wav.finalize() {
                log::error!("finalizing recording: {e}");
            }
        }
        self.current_file.take()
    }

    fn next_take_path(&mut self) -> PathBuf {
        loop {
            self.take += 1;
            let candidate = self
                .config
                .output_dir
                .join(format!("{}_{:03}.wav", self.config.file_prefix, self.take));
            if !candidate.exists() {
                return candidate;
            }
        }
    }
}

impl Drop for OutputRecorder {
    fn drop(&mut self) {
        self.stop();
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn spawn_drain_thread(
    mut consumer: Consumer<f32>,
    running: Arc<AtomicBool>,
    writer: Arc<Mutex<Option<WavWriter<std::io::BufWriter<std::fs::File>>>>>,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name("vav-record".into())
        .spawn(move || {
            while running.load(Ordering::Acquire) {
                let mut guard = writer.lock();
                if let Some(wav) = guard.as_mut() {
                    while let Ok(sample) = consumer.pop() {
                        if wav.write_sample(sample).is_err() {
                            log::error!("disk write failed; recording halted");
                            break;
                        }
                    }
                } else {
                    // Not recording: discard anything left in the ring.
                    while consumer.pop().is_ok() {}
                }
                drop(guard);
                std::thread::sleep(DRAIN_INTERVAL);
            }
        })
        .expect("spawn record thread")
}
