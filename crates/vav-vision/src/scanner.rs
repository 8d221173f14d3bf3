//! Contour scanner: frames in, CVs out
//!
//! Holds the selected contour, a variable-speed cursor, and four decay
//! envelopes. Per frame the cursor consumes a weight budget proportional
//! to `frame_time / scan_time`; high-curvature points cost more, so the
//! cursor lingers where the contour bends.
//!
//! CV layout on the bus: ENV1, ENV2, ENV3, SEQ1, SEQ2. With the
//! `env4-dac` feature the acceleration envelope replaces SEQ2 in the
//! fifth slot; without it ENV4 stays an internal gate.

use vav_bus::ParamSnapshot;
use vav_core::{CV_SLOTS, ParamId, Sample, env_decay_seconds, range_gain};

use crate::contour::{Contour, extract_contours, grayscale, mean_absdiff, sobel_magnitude};
use crate::source::Frame;

/// Retriggers are ignored while an envelope still holds more than this.
const RETRIGGER_GUARD: Sample = 0.3;

/// |Δw| beyond which a speed-change event fires.
const EVENT_THRESHOLD: Sample = 0.3;

/// Result of one scanned frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameOutput {
    /// ENV1, ENV2, ENV3, SEQ1, SEQ2 (or ENV4 in slot 4 with `env4-dac`).
    pub cvs: [Sample; CV_SLOTS],
    /// Which of ENV1..ENV4 fired this frame.
    pub fired: [bool; 4],
    /// A usable contour was available this frame.
    pub contour_found: bool,
}

/// Exponential-decay envelope with a retrigger guard.
#[derive(Debug, Clone, Copy, Default)]
struct DecayEnvelope {
    value: Sample,
}

impl DecayEnvelope {
    #[inline]
    fn decay(&mut self, dt: Sample, tau: Sample) {
        self.value *= (-dt / tau.max(1e-3)).exp();
    }

    /// Attempt a trigger; ignored while the previous hit is still hot.
    #[inline]
    fn trigger(&mut self) -> bool {
        if self.value > RETRIGGER_GUARD {
            false
        } else {
            self.value = 1.0;
            true
        }
    }

    #[inline]
    fn release(&mut self) {
        self.value = 0.0;
    }
}

pub struct ContourScanner {
    // Resolution-dependent caches
    width: u32,
    height: u32,
    gray: Vec<u8>,
    prev_gray: Vec<u8>,
    prev_valid: bool,
    edges: Vec<u8>,
    trace_scratch: Vec<bool>,
    found: Vec<Contour>,

    // Selected contour and its traversal weights
    contour: Contour,
    curvature: Vec<Sample>,
    weights: Vec<Sample>,
    total_weight: Sample,
    has_contour: bool,

    // Cursor
    cursor_idx: usize,
    budget_carry: Sample,
    acc_weight: Sample,
    w_prev: Sample,

    envelopes: [DecayEnvelope; 4],
    missing_frames: u32,
    last_out: FrameOutput,
}

impl ContourScanner {
    pub fn new() -> Self {
        Self {
            width: 0,
            height: 0,
            gray: Vec::new(),
            prev_gray: Vec::new(),
            prev_valid: false,
            edges: Vec::new(),
            trace_scratch: Vec::new(),
            found: Vec::new(),
            contour: Contour::default(),
            curvature: Vec::new(),
            weights: Vec::new(),
            total_weight: 0.0,
            has_contour: false,
            cursor_idx: 0,
            budget_carry: 0.0,
            acc_weight: 0.0,
            w_prev: 0.0,
            envelopes: [DecayEnvelope::default(); 4],
            missing_frames: 0,
            last_out: FrameOutput::default(),
        }
    }

    /// Cursor position on the contour, normalized to the frame.
    pub fn cursor(&self) -> (Sample, Sample) {
        if !self.has_contour || self.contour.points.is_empty() {
            return (0.5, 0.5);
        }
        let (px, py) = self.contour.points[self.cursor_idx % self.contour.points.len()];
        (
            px as Sample / (self.width.max(2) - 1) as Sample,
            py as Sample / (self.height.max(2) - 1) as Sample,
        )
    }

    /// Accumulated arclength phase in [0, 1).
    pub fn phase(&self) -> Sample {
        if self.total_weight > 0.0 {
            (self.acc_weight / self.total_weight).fract()
        } else {
            0.0
        }
    }

    /// Scan one frame. `dt` is the elapsed frame time in seconds;
    /// `env_muted` swallows triggers for muted envelope channels.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        dt: Sample,
        snap: &ParamSnapshot,
        env_muted: [bool; 4],
    ) -> FrameOutput {
        if frame.width != self.width || frame.height != self.height {
            self.invalidate_caches(frame.width, frame.height);
        }

        grayscale(frame, &mut self.gray);

        // Scene-change check against the previous frame.
        if self.prev_valid {
            let diff = mean_absdiff(&self.gray, &self.prev_gray);
            if diff >= snap.get(ParamId::SceneThreshold) {
                log::debug!("scene change (diff {diff:.3}), resetting cursor");
                self.reset_cursor();
                for env in &mut self.envelopes {
                    env.release();
                }
                self.has_contour = false;
            }
        }

        sobel_magnitude(&self.gray, frame.width, frame.height, &mut self.edges);
        std::mem::swap(&mut self.gray, &mut self.prev_gray);
        self.prev_valid = true;

        extract_contours(
            &self.edges,
            frame.width,
            frame.height,
            &mut self.trace_scratch,
            &mut self.found,
        );

        let anchor = (snap.get(ParamId::AnchorX), snap.get(ParamId::AnchorY));
        let selected = self.select_contour(snap.get(ParamId::MinContourLength), anchor);

        if selected {
            self.missing_frames = 0;
        } else {
            self.missing_frames += 1;
            let retry = snap.get(ParamId::RetryFrames) as u32;
            if !self.has_contour || self.missing_frames > retry {
                // Freeze at the last emitted values; never zero.
                return self.last_out;
            }
            // Otherwise keep scanning the retained contour.
        }

        let n = self.contour.points.len();
        if n == 0 || self.total_weight <= 0.0 {
            return self.last_out;
        }

        // Advance the cursor by its weight budget.
        let scan_time = snap.get(ParamId::ScanTime).max(0.1);
        let mut budget = self.budget_carry + dt / scan_time * self.total_weight;
        if budget > self.total_weight * 2.0 {
            budget %= self.total_weight;
        }
        while budget >= self.weights[self.cursor_idx] {
            budget -= self.weights[self.cursor_idx];
            self.acc_weight += self.weights[self.cursor_idx];
            self.cursor_idx = (self.cursor_idx + 1) % n;
            if self.acc_weight >= self.total_weight {
                self.acc_weight -= self.total_weight;
            }
        }
        self.budget_carry = budget;

        // Speed-change events latch for this frame.
        let w_now = self.weights[self.cursor_idx];
        let dw = w_now - self.w_prev;
        self.w_prev = w_now;

        let (cx, cy) = self.cursor();
        let dist_x = (cx - anchor.0).abs();
        let dist_y = (cy - anchor.1).abs();

        // Decay, then evaluate this frame's trigger attempts.
        let taus = [
            env_decay_seconds(snap.get(ParamId::Env1Decay)),
            env_decay_seconds(snap.get(ParamId::Env2Decay)),
            env_decay_seconds(snap.get(ParamId::Env3Decay)),
            env_decay_seconds(snap.get(ParamId::Env4Decay)),
        ];
        for (env, tau) in self.envelopes.iter_mut().zip(taus) {
            env.decay(dt, tau);
        }

        let attempts = [
            dist_x > dist_y,
            dist_y > dist_x,
            dw < -EVENT_THRESHOLD,
            dw > EVENT_THRESHOLD,
        ];
        let mut fired = [false; 4];
        for i in 0..4 {
            // Muted channels swallow triggers entirely.
            if attempts[i] && !env_muted[i] {
                fired[i] = self.envelopes[i].trigger();
            }
        }

        let gain = range_gain(snap.get(ParamId::CvRange));
        let out = FrameOutput {
            cvs: [
                self.envelopes[0].value * 10.0,
                self.envelopes[1].value * 10.0,
                self.envelopes[2].value * 10.0,
                seq_volts(dist_x, gain),
                self.slot4(dist_y, gain),
            ],
            fired,
            contour_found: true,
        };
        self.last_out = out;
        out
    }

    #[cfg(feature = "env4-dac")]
    fn slot4(&self, _dist_y: Sample, _gain: Sample) -> Sample {
        self.envelopes[3].value * 10.0
    }

    #[cfg(not(feature = "env4-dac"))]
    fn slot4(&self, dist_y: Sample, gain: Sample) -> Sample {
        seq_volts(dist_y, gain)
    }

    /// Pick the anchor-closest contour with sufficient perimeter; keep the
    /// previous one when nothing qualifies. Returns whether a fresh
    /// contour was adopted.
    fn select_contour(&mut self, min_length: Sample, anchor: (Sample, Sample)) -> bool {
        let ax = anchor.0 * self.width.max(1) as Sample;
        let ay = anchor.1 * self.height.max(1) as Sample;

        let mut best: Option<(usize, Sample)> = None;
        for (i, c) in self.found.iter().enumerate() {
            if (c.perimeter() as Sample) < min_length {
                continue;
            }
            let (cx, cy) = c.centroid();
            let d2 = (cx - ax) * (cx - ax) + (cy - ay) * (cy - ay);
            if best.map(|(_, bd)| d2 < bd).unwrap_or(true) {
                best = Some((i, d2));
            }
        }

        let Some((idx, _)) = best else {
            return false;
        };

        self.contour.points.clear();
        self.contour.points.extend_from_slice(&self.found[idx].points);
        self.contour.curvature(&mut self.curvature);

        self.weights.clear();
        self.weights.extend(
            self.curvature
                .iter()
                .map(|&k| (0.25 + (3.0 - 0.25) * k.sqrt()).clamp(0.25, 3.0)),
        );
        self.total_weight = self.weights.iter().sum();

        if self.cursor_idx >= self.contour.points.len() {
            self.cursor_idx = 0;
            self.acc_weight = 0.0;
        }
        self.has_contour = true;
        true
    }

    fn invalidate_caches(&mut self, width: u32, height: u32) {
        if self.width != 0 {
            log::info!(
                "frame size changed {}x{} -> {width}x{height}, resetting caches",
                self.width,
                self.height
            );
        }
        self.width = width;
        self.height = height;
        let n = (width * height) as usize;
        self.gray.resize(n, 0);
        self.prev_gray.resize(n, 0);
        self.edges.resize(n, 0);
        self.prev_valid = false;
        self.has_contour = false;
        self.reset_cursor();
    }

    fn reset_cursor(&mut self) {
        self.cursor_idx = 0;
        self.budget_carry = 0.0;
        self.acc_weight = 0.0;
        self.w_prev = 0.0;
    }
}

impl Default for ContourScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// SEQ output: anchor distance times range gain, clamped to 0–10 V.
#[inline]
pub fn seq_volts(dist: Sample, gain: Sample) -> Sample {
    (dist * gain).min(1.0) * 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FrameSource, TestPatternSource};
    use vav_bus::ParameterStore;

    const DT: Sample = 1.0 / 30.0;

    fn default_snapshot() -> ParamSnapshot {
        ParameterStore::new().snapshot()
    }

    #[test]
    fn seq_clamps_at_ten_volts() {
        // range 100% -> gain 2; 10 V is reached when dist * 2 >= 1.
        let gain = range_gain(100.0);
        assert!((seq_volts(0.5, gain) - 10.0).abs() < 1e-5);
        assert!((seq_volts(0.7, gain) - 10.0).abs() < 1e-5);
        assert!(seq_volts(0.3, gain) < 10.0);
        assert!((seq_volts(0.25, gain) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn envelope_retrigger_guard() {
        let mut env = DecayEnvelope::default();
        assert!(env.trigger());
        assert!((env.value - 1.0).abs() < 1e-6);

        // 0.1 s at tau = 1.0 s -> ~0.905; retrigger refused.
        env.decay(0.1, 1.0);
        assert!((env.value - 0.905).abs() < 0.01);
        assert!(!env.trigger());

        // 1.3 s total -> ~0.27 < 0.3; retrigger accepted.
        env.decay(1.2, 1.0);
        assert!((env.value - 0.27).abs() < 0.02);
        assert!(env.trigger());
        assert!((env.value - 1.0).abs() < 1e-6);
    }

    #[test]
    fn scanner_emits_cvs_for_test_pattern() {
        let mut src = TestPatternSource::new(160, 120);
        let mut scanner = ContourScanner::new();
        let snap = default_snapshot();

        let mut found_any = false;
        for _ in 0..30 {
            let frame = src.read_frame().unwrap();
            let out = scanner.process_frame(&frame, DT, &snap, [false; 4]);
            if out.contour_found {
                found_any = true;
                for &v in &out.cvs {
                    assert!((0.0..=10.0).contains(&v), "CV out of range: {v}");
                }
            }
        }
        assert!(found_any, "test pattern never produced a contour");
    }

    #[test]
    fn cursor_advances_along_contour() {
        let mut src = TestPatternSource::new(160, 120);
        let mut scanner = ContourScanner::new();
        let store = ParameterStore::new();
        // Fast traversal so movement is visible in a few frames.
        store.set(ParamId::ScanTime, 0.5);
        // Generous threshold: the orbiting pattern must not reset each frame.
        store.set(ParamId::SceneThreshold, 0.10);
        let snap = store.snapshot();

        let mut positions = Vec::new();
        for _ in 0..20 {
            let frame = src.read_frame().unwrap();
            let out = scanner.process_frame(&frame, DT, &snap, [false; 4]);
            if out.contour_found {
                positions.push(scanner.cursor());
            }
        }
        assert!(positions.len() > 5);
        let distinct = positions
            .windows(2)
            .filter(|w| w[0] != w[1])
            .count();
        assert!(distinct > 0, "cursor never moved: {positions:?}");
    }

    #[test]
    fn missing_contour_freezes_last_values() {
        let mut src = TestPatternSource::new(160, 120);
        let mut scanner = ContourScanner::new();
        let snap = default_snapshot();

        let mut last = FrameOutput::default();
        for _ in 0..10 {
            let frame = src.read_frame().unwrap();
            last = scanner.process_frame(&frame, DT, &snap, [false; 4]);
        }
        assert!(last.contour_found);

        // Black frames: diff triggers a scene reset, then no contour at
        // all. Outputs must freeze, not zero.
        let black = Frame::new(160, 120);
        let mut frozen = FrameOutput::default();
        for _ in 0..5 {
            frozen = scanner.process_frame(&black, DT, &snap, [false; 4]);
        }
        assert_eq!(frozen.cvs, last.cvs);
    }

    #[test]
    fn muted_envelope_swallows_triggers() {
        let mut src = TestPatternSource::new(160, 120);
        let mut scanner = ContourScanner::new();
        let snap = default_snapshot();

        for _ in 0..60 {
            let frame = src.read_frame().unwrap();
            let out = scanner.process_frame(&frame, DT, &snap, [true, true, true, true]);
            assert_eq!(out.fired, [false; 4]);
            // Envelope slots stay fully discharged.
            assert_eq!(out.cvs[0], 0.0);
            assert_eq!(out.cvs[1], 0.0);
            assert_eq!(out.cvs[2], 0.0);
        }
    }

    #[test]
    fn resolution_change_resets_caches() {
        let mut scanner = ContourScanner::new();
        let snap = default_snapshot();

        let mut small = TestPatternSource::new(160, 120);
        for _ in 0..5 {
            let f = small.read_frame().unwrap();
            scanner.process_frame(&f, DT, &snap, [false; 4]);
        }

        // A larger frame must not panic and must restart cleanly.
        let mut big = TestPatternSource::new(320, 240);
        for _ in 0..5 {
            let f = big.read_frame().unwrap();
            let out = scanner.process_frame(&f, DT, &snap, [false; 4]);
            for &v in &out.cvs {
                assert!((0.0..=10.0).contains(&v));
            }
        }
    }
}
