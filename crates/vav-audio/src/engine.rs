//! The realtime callback core
//!
//! `EngineCore` is everything the output callback owns: the Alien4 DSP,
//! the input mixer, the CV write path, meters, and the rolling windows the
//! renderer reads. It is constructed on the control thread and moved into
//! the callback closure; afterwards only atomics cross the boundary.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use vav_bus::{CvBus, ParameterStore, TriggerKind, TriggerRx, WindowBuffer};
use vav_core::{CV_DAC_SCALE, CV_SLOTS, NUM_INPUTS, ParamId, Sample};
use vav_dsp::alien4::MAX_BLOCK;
use vav_dsp::{Alien4, PeakMeter};

/// Rolling window length fed to the renderer: ~50 ms at 48 kHz.
pub const RENDER_WINDOW: usize = 2400;

// ═══════════════════════════════════════════════════════════════════════
// METERING DATA (lock-free, for UI)
// ═══════════════════════════════════════════════════════════════════════

/// Output peak meters. Bit-stored f32 atomics, cache-line aligned so the
/// GUI polling them never shares a line with the callback's stores.
#[derive(Debug)]
#[repr(align(64))]
pub struct MeterData {
    left_peak: AtomicU32,
    right_peak: AtomicU32,
    clipped: AtomicBool,
}

impl Default for MeterData {
    fn default() -> Self {
        Self {
            left_peak: AtomicU32::new(0),
            right_peak: AtomicU32::new(0),
            clipped: AtomicBool::new(false),
        }
    }
}

impl MeterData {
    pub fn left_peak(&self) -> Sample {
        Sample::from_bits(self.left_peak.load(Ordering::Relaxed))
    }

    pub fn right_peak(&self) -> Sample {
        Sample::from_bits(self.right_peak.load(Ordering::Relaxed))
    }

    pub fn is_clipped(&self) -> bool {
        self.clipped.load(Ordering::Relaxed)
    }

    pub fn reset_clip(&self) {
        self.clipped.store(false, Ordering::Relaxed);
    }

    fn publish(&self, left: Sample, right: Sample) {
        self.left_peak.store(left.to_bits(), Ordering::Relaxed);
        self.right_peak.store(right.to_bits(), Ordering::Relaxed);
        if left > 1.0 || right > 1.0 {
            self.clipped.store(true, Ordering::Relaxed);
        }
    }
}

/// Per-kind counts of envelope triggers drained from the vision thread,
/// for the GUI status row.
#[derive(Debug, Default)]
pub struct TriggerCounters {
    counts: [AtomicU64; 4],
}

impl TriggerCounters {
    pub fn get(&self, kind: TriggerKind) -> u64 {
        self.counts[kind as usize].load(Ordering::Relaxed)
    }

    fn bump(&self, kind: TriggerKind) {
        self.counts[kind as usize].fetch_add(1, Ordering::Relaxed);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// CALLBACK CORE
// ═══════════════════════════════════════════════════════════════════════

pub struct EngineCore {
    alien4: Alien4,
    store: Arc<ParameterStore>,
    cv_bus: Arc<CvBus>,
    triggers: TriggerRx,
    windows: Arc<[WindowBuffer; NUM_INPUTS]>,
    meters: Arc<MeterData>,
    trigger_counts: Arc<TriggerCounters>,
    running: Arc<AtomicBool>,

    // Pre-allocated scratch, sized for the largest block
    mono: Vec<Sample>,
    channels: [Vec<Sample>; NUM_INPUTS],
    out_l: Vec<Sample>,
    out_r: Vec<Sample>,
    peak_l: PeakMeter,
    peak_r: PeakMeter,
    record_tap: Option<crate::RecordTap>,
}

impl EngineCore {
    pub fn new(
        sample_rate: Sample,
        store: Arc<ParameterStore>,
        cv_bus: Arc<CvBus>,
        triggers: TriggerRx,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            alien4: Alien4::new(sample_rate),
            store,
            cv_bus,
            triggers,
            windows: Arc::new(std::array::from_fn(|_| WindowBuffer::new(RENDER_WINDOW))),
            meters: Arc::new(MeterData::default()),
            trigger_counts: Arc::new(TriggerCounters::default()),
            running,
            mono: vec![0.0; MAX_BLOCK],
            channels: std::array::from_fn(|_| vec![0.0; MAX_BLOCK]),
            out_l: vec![0.0; MAX_BLOCK],
            out_r: vec![0.0; MAX_BLOCK],
            peak_l: PeakMeter::new(sample_rate, 300.0),
            peak_r: PeakMeter::new(sample_rate, 300.0),
            record_tap: None,
        }
    }

    /// Attach the output-recording tap. Must happen before the stream
    /// takes ownership of the core.
    pub fn set_record_tap(&mut self, tap: crate::RecordTap) {
        self.record_tap = Some(tap);
    }

    /// Rolling input windows, one per mono input, shared with the renderer.
    pub fn windows(&self) -> Arc<[WindowBuffer; NUM_INPUTS]> {
        Arc::clone(&self.windows)
    }

    pub fn meters(&self) -> Arc<MeterData> {
        Arc::clone(&self.meters)
    }

    pub fn trigger_counters(&self) -> Arc<TriggerCounters> {
        Arc::clone(&self.trigger_counts)
    }

    /// One callback invocation: `input` is interleaved with `in_channels`,
    /// `output` interleaved with `out_channels`. Frame counts must agree.
    pub fn process(
        &mut self,
        input: &[Sample],
        in_channels: usize,
        output: &mut [Sample],
        out_channels: usize,
    ) {
        if !self.running.load(Ordering::Acquire) {
            output.fill(0.0);
            return;
        }

        // Drain vision triggers (wait-free; only counters cross back out).
        while let Some(trigger) = self.triggers.recv() {
            self.trigger_counts.bump(trigger.kind);
        }

        let frames = output.len() / out_channels.max(1);
        let snap = self.store.snapshot();
        let cv = self.cv_bus.read();
        self.alien4.prepare_block(&snap);

        let gains = [
            snap.get(ParamId::InGain1),
            snap.get(ParamId::InGain2),
            snap.get(ParamId::InGain3),
            snap.get(ParamId::InGain4),
        ];

        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(MAX_BLOCK);

            // Deinterleave the hardware inputs; absent channels are silent.
            for ch in 0..NUM_INPUTS {
                let buf = &mut self.channels[ch];
                for i in 0..n {
                    let frame = offset + i;
                    buf[i] = if ch < in_channels {
                        input
                            .get(frame * in_channels + ch)
                            .copied()
                            .unwrap_or(0.0)
                    } else {
                        0.0
                    };
                }
                self.windows[ch].push(&buf[..n]);
            }

            for i in 0..n {
                self.mono[i] = (0..NUM_INPUTS)
                    .map(|ch| self.channels[ch][i] * gains[ch])
                    .sum();
            }

            let (mono, out_l, out_r) = (
                &self.mono[..n],
                &mut self.out_l[..n],
                &mut self.out_r[..n],
            );
            self.alien4.process_block(mono, out_l, out_r);

            for i in 0..n {
                let frame = offset + i;
                let base = frame * out_channels;
                if out_channels > 0 {
                    output[base] = out_l[i];
                }
                if out_channels > 1 {
                    output[base + 1] = out_r[i];
                }
                // CVs hold their block value; the DAC convention scales
                // 0–10 V down to 0.0–1.0 floats here, at the I/O boundary.
                for slot in 0..CV_SLOTS {
                    let ch = 2 + slot;
                    if ch < out_channels {
                        output[base + ch] = cv.volts[slot] * CV_DAC_SCALE;
                    }
                }
            }

            self.peak_l.process_block(&self.out_l[..n]);
            self.peak_r.process_block(&self.out_r[..n]);

            if let Some(tap) = &mut self.record_tap {
                if tap.is_active() {
                    for i in 0..n {
                        tap.push(self.out_l[i], self.out_r[i]);
                    }
                }
            }

            offset += n;
        }

        self.meters
            .publish(self.peak_l.current(), self.peak_r.current());
    }
}
