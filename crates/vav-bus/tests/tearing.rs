//! Cross-thread tearing stress tests
//!
//! Drives the parameter store and CV bus from a fast writer thread while
//! readers snapshot continuously, asserting no snapshot ever contains a
//! value the writer never produced.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use vav_bus::{CvBus, ParameterStore};
use vav_core::ParamId;

#[test]
fn parameter_snapshots_never_tear() {
    let store = Arc::new(ParameterStore::new());
    let stop = Arc::new(AtomicBool::new(false));

    // Writer toggles brightness 0 <-> 4 as fast as it can.
    let writer = {
        let store = Arc::clone(&store);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut high = false;
            while !stop.load(Ordering::Relaxed) {
                store.set(ParamId::Brightness, if high { 4.0 } else { 0.0 });
                high = !high;
            }
        })
    };

    for _ in 0..200_000 {
        let snap = store.snapshot();
        let b = snap.get(ParamId::Brightness);
        assert!(
            b == 0.0 || b == 4.0,
            "snapshot observed a value the writer never wrote: {b}"
        );
    }

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

#[test]
fn cv_frames_never_tear() {
    let bus = Arc::new(CvBus::new());
    let stop = Arc::new(AtomicBool::new(false));

    // Writer publishes frames where all five slots carry the same value,
    // alternating between two levels. Any mixed frame is a torn read.
    let writer = {
        let bus = Arc::clone(&bus);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut high = false;
            while !stop.load(Ordering::Relaxed) {
                let v = if high { 9.0 } else { 1.0 };
                bus.write(&[v; 5]);
                high = !high;
            }
        })
    };

    for _ in 0..200_000 {
        let frame = bus.read();
        let first = frame.volts[0];
        // 0.0 is the pre-first-write state.
        assert!(
            first == 0.0 || first == 1.0 || first == 9.0,
            "unexpected level {first}"
        );
        for &v in &frame.volts {
            assert_eq!(v, first, "torn CV frame: {:?}", frame.volts);
        }
    }

    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}
