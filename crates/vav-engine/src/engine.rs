//! The engine: construction, lifecycle, rendering, source switching

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};

use vav_audio::{
    AudioConfig, AudioStream, EngineCore, MeterData, OutputRecorder, RecorderConfig,
    TriggerCounters,
};
use vav_bus::{CvBus, CvSlot, ParameterStore, TriggerQueue, WindowBuffer};
use vav_core::{NUM_INPUTS, Sample};
use vav_render::{
    AudioWindow, CameraImage, RegionMapData, RenderInputs, RenderParams, Renderer,
};
use vav_vision::FrameSource;

use crate::vision_loop::{VisionLoop, VisionShared};
use crate::{EngineError, EngineResult};

/// Render-window width in texture samples.
const AUDIO_TEX_WIDTH: u32 = 1920;

/// Rolling window read per frame (~50 ms at 48 kHz).
const WINDOW_SAMPLES: usize = 2400;

/// Events surfaced to the GUI thread over a non-blocking channel.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    CameraUnavailable(String),
    SourceSwitched(String),
    Error(String),
}

pub struct EngineConfig {
    pub audio: AudioConfig,
    pub output_device: Option<String>,
    pub input_device: Option<String>,
    /// Skip audio entirely (tests, render-only sessions).
    pub enable_audio: bool,
    /// Use the null renderer instead of probing the GPU.
    pub headless_render: bool,
    /// Where output recordings land.
    pub record_dir: std::path::PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            output_device: None,
            input_device: None,
            enable_audio: true,
            headless_render: false,
            record_dir: std::path::PathBuf::from("recordings"),
        }
    }
}

pub struct Engine {
    store: Arc<ParameterStore>,
    cv_bus: Arc<CvBus>,
    running: Arc<AtomicBool>,

    audio_stream: Option<AudioStream>,
    meters: Arc<MeterData>,
    trigger_counters: Arc<TriggerCounters>,
    windows: Arc<[WindowBuffer; NUM_INPUTS]>,
    recorder: OutputRecorder,

    renderer: Box<dyn Renderer>,
    audio_window: AudioWindow,
    window_scratch: Vec<Sample>,

    vision_shared: Arc<VisionShared>,
    vision_handle: Option<JoinHandle<()>>,
    pending_vision: Option<PendingVision>,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,

    started: bool,
}

impl Engine {
    pub fn new(config: EngineConfig, source: Option<Box<dyn FrameSource>>) -> EngineResult<Self> {
        let store = Arc::new(ParameterStore::new());
        let cv_bus = Arc::new(CvBus::new());
        let running = Arc::new(AtomicBool::new(false));
        let (trigger_tx, trigger_rx) = TriggerQueue::new();
        let (events_tx, events_rx) = unbounded();

        let mut core = EngineCore::new(
            config.audio.sample_rate.as_f32(),
            Arc::clone(&store),
            Arc::clone(&cv_bus),
            trigger_rx,
            Arc::clone(&running),
        );
        let meters = core.meters();
        let trigger_counters = core.trigger_counters();
        let windows = core.windows();

        let (recorder, record_tap) = OutputRecorder::new(RecorderConfig {
            output_dir: config.record_dir.clone(),
            sample_rate: config.audio.sample_rate.as_u32(),
            ..RecorderConfig::default()
        });
        core.set_record_tap(record_tap);

        let audio_stream = if config.enable_audio {
            let output_device = match &config.output_device {
                Some(name) => vav_audio::output_device_by_name(name)?,
                None => vav_audio::default_output_device()?,
            };
            let input_device = match &config.input_device {
                Some(name) => Some(vav_audio::input_device_by_name(name)?),
                None => vav_audio::default_input_device(),
            };
            Some(AudioStream::new(
                &output_device,
                input_device.as_ref(),
                config.audio,
                core,
                Arc::clone(&running),
            )?)
        } else {
            None
        };

        let renderer = vav_render::create_renderer(AUDIO_TEX_WIDTH, config.headless_render);

        let vision_shared = Arc::new(VisionShared::new(source));

        // The vision thread owns the trigger producer; the actual spawn
        // is deferred to start().
        let pending_vision = Some(PendingVision {
            shared: Arc::clone(&vision_shared),
            store: Arc::clone(&store),
            cv_bus: Arc::clone(&cv_bus),
            triggers: trigger_tx,
            events: events_tx.clone(),
            running: Arc::clone(&running),
        });

        Ok(Self {
            store,
            cv_bus,
            running,
            audio_stream,
            meters,
            trigger_counters,
            windows,
            recorder,
            renderer,
            audio_window: AudioWindow::new(AUDIO_TEX_WIDTH as usize),
            window_scratch: vec![0.0; WINDOW_SAMPLES],
            vision_shared,
            vision_handle: None,
            pending_vision,
            events_tx,
            events_rx,
            started: false,
        })
    }

    /// Start the vision thread and the audio streams.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.started {
            return Ok(());
        }
        self.running.store(true, Ordering::Release);

        if let Some(pending) = self.pending_vision.take() {
            let vision = VisionLoop::new(
                pending.shared,
                pending.store,
                pending.cv_bus,
                pending.triggers,
                pending.events,
                pending.running,
            );
            let handle = std::thread::Builder::new()
                .name("vav-vision".into())
                .spawn(move || vision.run())
                .map_err(EngineError::Io)?;
            self.vision_handle = Some(handle);
        }

        if let Some(stream) = &self.audio_stream {
            stream.start()?;
        }
        self.started = true;
        Ok(())
    }

    /// Stop the engine. Order: vision exits after its current frame, the
    /// audio callback observes the flag at a block boundary and zeroes
    /// its output, then resources drop. With `wait_for_thread = false`
    /// the vision thread is detached so a GUI can stay responsive.
    pub fn stop(&mut self, wait_for_thread: bool) {
        self.running.store(false, Ordering::Release);

        if let Some(stream) = &self.audio_stream {
            if let Err(e) = stream.stop() {
                log::warn!("audio stop: {e}");
            }
        }

        match self.vision_handle.take() {
            Some(handle) if wait_for_thread => {
                if handle.join().is_err() {
                    log::error!("vision thread panicked during shutdown");
                }
            }
            Some(handle) => {
                // Detach; the thread sees the flag and exits on its own.
                drop(handle);
            }
            None => {}
        }
        self.started = false;
    }

    // ── accessors ───────────────────────────────────────────────

    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.store
    }

    pub fn cv_bus(&self) -> &Arc<CvBus> {
        &self.cv_bus
    }

    pub fn meters(&self) -> &Arc<MeterData> {
        &self.meters
    }

    pub fn trigger_counters(&self) -> &Arc<TriggerCounters> {
        &self.trigger_counters
    }

    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events_rx
    }

    pub fn set_cv_muted(&self, slot: CvSlot, muted: bool) {
        self.cv_bus.set_muted(slot, muted);
    }

    /// Start capturing the stereo output to a new WAV take.
    pub fn start_recording(&mut self) -> EngineResult<std::path::PathBuf> {
        Ok(self.recorder.start()?)
    }

    /// Finish the current take, if any, and return its path.
    pub fn stop_recording(&mut self) -> Option<std::path::PathBuf> {
        self.recorder.stop()
    }

    pub fn is_recording_output(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Replace the frame source. Atomic from the vision loop's view: the
    /// next `read_frame` already pulls from the new source.
    pub fn set_source(&self, source: Box<dyn FrameSource>) {
        let description = source.describe();
        *self.vision_shared.source.lock() = Some(source);
        log::info!("frame source switched to {description}");
        let _ = self
            .events_tx
            .send(EngineEvent::SourceSwitched(description));
    }

    /// Produce the next video frame. Call from the GUI/render thread at
    /// its own pace; the audio thread never calls this.
    pub fn render_frame(&mut self) -> &[u8] {
        for ch in 0..NUM_INPUTS {
            self.windows[ch].copy_latest(&mut self.window_scratch);
            self.audio_window.fill_channel(ch, &self.window_scratch);
        }

        let snap = self.store.snapshot();
        let params = RenderParams::from_snapshot(&snap);

        let region_arc = self.vision_shared.region_map.lock().clone();
        let frame_arc = self.vision_shared.latest_frame.lock().clone();

        let region = region_arc.as_ref().map(|m| RegionMapData {
            width: m.width,
            height: m.height,
            data: &m.data,
        });
        let camera = frame_arc.as_ref().map(|f| CameraImage {
            width: f.width,
            height: f.height,
            bgr: &f.data,
        });

        let inputs = RenderInputs {
            audio: &self.audio_window,
            params,
            region,
            camera,
        };
        self.renderer.render(&inputs)
    }

    pub fn render_size(&self) -> (u32, u32) {
        self.renderer.size()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.started {
            self.stop(true);
        }
    }
}

/// Vision-loop ingredients held between `new` and `start`.
struct PendingVision {
    shared: Arc<VisionShared>,
    store: Arc<ParameterStore>,
    cv_bus: Arc<CvBus>,
    triggers: vav_bus::TriggerTx,
    events: Sender<EngineEvent>,
    running: Arc<AtomicBool>,
}
