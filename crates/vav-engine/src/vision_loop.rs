//! The vision thread
//!
//! Runs at 30 Hz: pull a frame from the current source, scan it, publish
//! CVs and triggers, and share the latest frame plus region map with the
//! render side. Source failures are counted; past `MAX_FAILURES`
//! consecutive misses the source is declared dead, CVs freeze, and the
//! orchestrator is notified. Audio is never touched from here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use vav_bus::{CvBus, CvSlot, ParameterStore, TriggerKind, TriggerTx};
use vav_vision::{ContourScanner, Frame, FrameSource, RegionMap};

use crate::engine::EngineEvent;

/// Consecutive failed reads before the source is declared dead.
pub const MAX_FAILURES: u32 = 30;

/// Retry pause after a failed read.
const FAILURE_SLEEP: Duration = Duration::from_millis(20);

/// Target frame period (30 Hz).
const FRAME_PERIOD: Duration = Duration::from_millis(33);

/// State shared between the vision thread and the engine/render side.
pub struct VisionShared {
    /// Swappable frame source; replacing it is atomic for the loop.
    pub source: Mutex<Option<Box<dyn FrameSource>>>,
    /// Latest camera frame, last-writer-wins.
    pub latest_frame: Mutex<Option<Arc<Frame>>>,
    /// Latest region map, rebuilt when the anchor or resolution moves.
    pub region_map: Mutex<Option<Arc<RegionMap>>>,
}

impl VisionShared {
    pub fn new(source: Option<Box<dyn FrameSource>>) -> Self {
        Self {
            source: Mutex::new(source),
            latest_frame: Mutex::new(None),
            region_map: Mutex::new(None),
        }
    }
}

pub struct VisionLoop {
    shared: Arc<VisionShared>,
    store: Arc<ParameterStore>,
    cv_bus: Arc<CvBus>,
    triggers: TriggerTx,
    events: Sender<EngineEvent>,
    running: Arc<AtomicBool>,

    scanner: ContourScanner,
    failures: u32,
    reported_dead: bool,
    region_state: (u32, u32, f32, f32),
}

impl VisionLoop {
    pub fn new(
        shared: Arc<VisionShared>,
        store: Arc<ParameterStore>,
        cv_bus: Arc<CvBus>,
        triggers: TriggerTx,
        events: Sender<EngineEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            shared,
            store,
            cv_bus,
            triggers,
            events,
            running,
            scanner: ContourScanner::new(),
            failures: 0,
            reported_dead: false,
            region_state: (0, 0, -1.0, -1.0),
        }
    }

    /// Thread body. Exits when the running flag drops, after finishing the
    /// frame in flight.
    pub fn run(mut self) {
        log::info!("vision thread started");
        let mut last_tick = Instant::now();

        while self.running.load(Ordering::Acquire) {
            let frame_start = Instant::now();
            let dt = frame_start.duration_since(last_tick).as_secs_f32().max(1e-3);

            let frame = {
                let mut slot = self.shared.source.lock();
                slot.as_mut().and_then(|s| s.read_frame())
            };

            match frame {
                Some(frame) => {
                    last_tick = frame_start;
                    if self.failures > 0 {
                        log::debug!("source recovered after {} failed reads", self.failures);
                    }
                    self.failures = 0;
                    self.reported_dead = false;
                    self.scan(frame, dt);
                }
                None => {
                    self.failures += 1;
                    if self.failures > MAX_FAILURES && !self.reported_dead {
                        self.reported_dead = true;
                        log::warn!("frame source dead after {} failed reads", self.failures);
                        let _ = self.events.send(EngineEvent::CameraUnavailable(format!(
                            "{} consecutive failed reads",
                            self.failures
                        )));
                    }
                    std::thread::sleep(FAILURE_SLEEP);
                    continue;
                }
            }

            // Pace to the target rate.
            let elapsed = frame_start.elapsed();
            if elapsed < FRAME_PERIOD {
                std::thread::sleep(FRAME_PERIOD - elapsed);
            }
        }
        log::info!("vision thread exiting");
    }

    fn scan(&mut self, frame: Frame, dt: f32) {
        let snap = self.store.snapshot();

        let env_muted = [
            self.cv_bus.is_muted(CvSlot::Env1),
            self.cv_bus.is_muted(CvSlot::Env2),
            self.cv_bus.is_muted(CvSlot::Env3),
            // ENV4 rides slot 4 only with the env4-dac feature; its mute
            // follows that slot there and is never swallowed otherwise.
            cfg!(feature = "env4-dac") && self.cv_bus.is_muted(CvSlot::Seq2),
        ];

        let out = self.scanner.process_frame(&frame, dt, &snap, env_muted);
        self.cv_bus.write(&out.cvs);

        let kinds = [
            TriggerKind::Env1,
            TriggerKind::Env2,
            TriggerKind::Env3,
            TriggerKind::Env4,
        ];
        for (fired, kind) in out.fired.iter().zip(kinds) {
            if *fired {
                self.triggers.send(kind);
            }
        }

        self.update_region_map(&frame, &snap);
        *self.shared.latest_frame.lock() = Some(Arc::new(frame));
    }

    fn update_region_map(&mut self, frame: &Frame, snap: &vav_bus::ParamSnapshot) {
        let ax = snap.get(vav_core::ParamId::AnchorX);
        let ay = snap.get(vav_core::ParamId::AnchorY);
        let state = (frame.width, frame.height, ax, ay);
        if state == self.region_state {
            return;
        }
        self.region_state = state;
        let mut map = RegionMap::new(frame.width, frame.height);
        map.rasterize_quadrants(ax, ay);
        *self.shared.region_map.lock() = Some(Arc::new(map));
    }
}
