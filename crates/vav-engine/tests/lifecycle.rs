//! Engine lifecycle tests
//!
//! Headless bring-up: no audio device, null renderer, synthetic frames.
//! Verifies the vision thread publishes CVs, the renderer produces
//! frames, source switching works, and shutdown joins cleanly.

use std::time::{Duration, Instant};

use vav_bus::CvSlot;
use vav_core::ParamId;
use vav_engine::{Engine, EngineConfig};
use vav_vision::TestPatternSource;

fn headless_engine() -> Engine {
    let config = EngineConfig {
        enable_audio: false,
        headless_render: true,
        ..Default::default()
    };
    let source = Box::new(TestPatternSource::new(160, 120));
    Engine::new(config, Some(source)).expect("engine construction")
}

/// Wait until the CV bus shows any nonzero slot or the timeout passes.
fn wait_for_cvs(engine: &Engine, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let frame = engine.cv_bus().read();
        if frame.volts.iter().any(|&v| v > 0.0) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn vision_thread_publishes_cvs() {
    let mut engine = headless_engine();
    // Make SEQ values respond strongly so a nonzero shows up fast.
    engine.store().set(ParamId::CvRange, 1.0);
    engine.start().unwrap();

    assert!(
        wait_for_cvs(&engine, Duration::from_secs(5)),
        "no CV activity within timeout"
    );
    let frame = engine.cv_bus().read();
    for &v in &frame.volts {
        assert!((0.0..=10.0).contains(&v), "CV out of range: {v}");
    }

    engine.stop(true);
}

#[test]
fn muted_slot_reads_zero_while_running() {
    let mut engine = headless_engine();
    engine.store().set(ParamId::CvRange, 1.0);
    engine.set_cv_muted(CvSlot::Seq1, true);
    engine.start().unwrap();

    wait_for_cvs(&engine, Duration::from_secs(5));
    for _ in 0..20 {
        assert_eq!(engine.cv_bus().read().get(CvSlot::Seq1), 0.0);
        std::thread::sleep(Duration::from_millis(5));
    }
    engine.stop(true);
}

#[test]
fn render_frame_has_expected_geometry() {
    let mut engine = headless_engine();
    engine.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));

    let (w, h) = engine.render_size();
    let frame = engine.render_frame();
    assert_eq!(frame.len(), (w * h * 3) as usize);

    engine.stop(true);
}

#[test]
fn source_switch_is_observed() {
    let mut engine = headless_engine();
    engine.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));

    engine.set_source(Box::new(TestPatternSource::new(320, 240)));
    // The vision loop must keep producing after the resolution change.
    assert!(
        wait_for_cvs(&engine, Duration::from_secs(5)),
        "no CV activity after source switch"
    );
    engine.stop(true);
}

#[test]
fn stop_without_join_detaches() {
    let mut engine = headless_engine();
    engine.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    // Must return promptly even without joining the vision thread.
    let t0 = Instant::now();
    engine.stop(false);
    assert!(t0.elapsed() < Duration::from_secs(1));
}
