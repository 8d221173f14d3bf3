//! The Alien4 engine
//!
//! Mono in, stereo out. Signal flow per sample:
//!
//! ```text
//! input ──► record path ──► loop voices ─┐
//!   │                                    ▼
//!   └────────────► mix crossfade (+ soft-clipped feedback of last block)
//!                       │
//!                       ▼
//!        EQ ──► delay (chaos time mod, late reverb tap)
//!                       │
//!                       ▼
//!        grain (chaos density/origin mod) ──► reverb (chaos fb mod)
//!                       │
//!                       ▼
//!                 master ──► out L/R (stored for next block's feedback)
//! ```
//!
//! Parameters are absorbed exactly once per buffer in `prepare_block`;
//! `process_block` allocates nothing, takes no locks, and performs no I/O.

use vav_bus::ParamSnapshot;
use vav_core::{ParamId, Sample};

use crate::chaos::LorenzChaos;
use crate::delay::StereoDelay;
use crate::eq::ThreeBandEq;
use crate::grain::GrainEngine;
use crate::reverb::Freeverb;
use crate::slicer::LoopSlicer;
use crate::smoothing::SmoothedParam;
use crate::voices::VoicePool;
use crate::{Processor, StereoProcessor};

/// Largest block `process_block` accepts.
pub const MAX_BLOCK: usize = 512;

/// Reverb output fed into the delay line one block late, scaled by
/// `reverb_decay · 0.3`.
const REVERB_TAP_SCALE: Sample = 0.3;

pub struct Alien4 {
    slicer: LoopSlicer,
    voices: VoicePool,
    eq: ThreeBandEq,
    chaos: LorenzChaos,
    delay: StereoDelay,
    grain: GrainEngine,
    reverb: Freeverb,

    mix: SmoothedParam,
    loop_feedback: SmoothedParam,
    master: SmoothedParam,

    global_speed: Sample,
    chaos_amount: Sample,
    delay_chaos: bool,
    grain_enabled: bool,
    grain_mix: Sample,
    reverb_tap_gain: Sample,
    last_chaos: Sample,

    last_scan: Sample,
    last_scan_target: i32,

    // One block of history for the loop feedback and the late reverb tap.
    prev_out_l: Vec<Sample>,
    prev_out_r: Vec<Sample>,
    prev_rev_l: Vec<Sample>,
    prev_rev_r: Vec<Sample>,
    cur_rev_l: Vec<Sample>,
    cur_rev_r: Vec<Sample>,
}

impl Alien4 {
    pub fn new(sample_rate: Sample) -> Self {
        Self::with_seed(sample_rate, 0xA11E_4A41)
    }

    /// Deterministic construction: all audio-thread randomness (voice
    /// seating, grain chaos picks) derives from this seed.
    pub fn with_seed(sample_rate: Sample, seed: u64) -> Self {
        Self {
            slicer: LoopSlicer::new(sample_rate),
            voices: VoicePool::with_seed(seed),
            eq: ThreeBandEq::new(sample_rate),
            chaos: LorenzChaos::new(sample_rate),
            delay: StereoDelay::new(sample_rate),
            grain: GrainEngine::with_seed(sample_rate, seed.wrapping_mul(0x9E37_79B9)),
            reverb: Freeverb::new(sample_rate),
            mix: SmoothedParam::new(0.5, 0.01),
            loop_feedback: SmoothedParam::new(0.0, 0.01),
            master: SmoothedParam::new(0.8, 0.01),
            global_speed: 1.0,
            chaos_amount: 0.5,
            delay_chaos: false,
            grain_enabled: false,
            grain_mix: 0.0,
            reverb_tap_gain: 0.0,
            last_chaos: 0.0,
            last_scan: -1.0,
            last_scan_target: -1,
            prev_out_l: vec![0.0; MAX_BLOCK],
            prev_out_r: vec![0.0; MAX_BLOCK],
            prev_rev_l: vec![0.0; MAX_BLOCK],
            prev_rev_r: vec![0.0; MAX_BLOCK],
            cur_rev_l: vec![0.0; MAX_BLOCK],
            cur_rev_r: vec![0.0; MAX_BLOCK],
        }
    }

    pub fn slicer(&self) -> &LoopSlicer {
        &self.slicer
    }

    pub fn voices(&self) -> &VoicePool {
        &self.voices
    }

    /// Absorb one parameter snapshot. Called at the start of every buffer,
    /// before `process_block`.
    pub fn prepare_block(&mut self, snap: &ParamSnapshot) {
        // Record toggle. A stop finalizes the loop: the slice list is
        // invalidated, voice 0 is re-seated and the rest redistributed.
        let stopped = self.slicer.set_recording(snap.get_bool(ParamId::Record));

        // MIN_SLICE_TIME drift forces a full rescan (never while recording,
        // never inside the sample loop).
        let rescanned = self.slicer.set_min_slice_time(snap.get(ParamId::MinSliceTime));

        // SCAN seats voice 0.
        let scan = snap.get(ParamId::Scan);
        let num_slices = self.slicer.num_slices();
        let mut reseat = stopped || rescanned;
        if num_slices > 0 {
            let target = (scan * (num_slices - 1) as Sample).round() as i32;
            if (scan - self.last_scan).abs() > 0.001 || target != self.last_scan_target {
                reseat = true;
            }
            if reseat {
                let target = target.clamp(0, num_slices as i32 - 1);
                self.voices.seat_scan(target as usize, self.slicer.slices());
                self.voices.redistribute(self.slicer.slices());
                self.last_scan_target = target;
            }
            self.last_scan = scan;
        } else if reseat {
            self.voices.seat_scan(0, self.slicer.slices());
            self.last_scan_target = -1;
        }

        self.voices
            .set_poly(snap.get(ParamId::Poly).round() as usize, self.slicer.slices());

        self.global_speed = snap.get(ParamId::Speed);
        self.mix.set_target(snap.get(ParamId::Mix));
        self.loop_feedback.set_target(snap.get(ParamId::LoopFeedback));
        self.master.set_target(snap.get(ParamId::MasterVolume));

        self.eq.set_gains_db(
            snap.get(ParamId::EqLowDb),
            snap.get(ParamId::EqMidDb),
            snap.get(ParamId::EqHighDb),
        );
        self.eq.update_coeffs();

        self.chaos.set_rate(snap.get(ParamId::ChaosRate));
        self.chaos.set_stepped(snap.get_bool(ParamId::ChaosStepped));
        self.chaos.set_step_period(snap.get(ParamId::ChaosStepPeriod));
        self.chaos_amount = snap.get(ParamId::ChaosAmount);
        self.delay_chaos = snap.get_bool(ParamId::DelayChaos);

        self.delay.set_times(
            snap.get(ParamId::DelayTimeL),
            snap.get(ParamId::DelayTimeR),
        );
        self.delay.set_feedback(snap.get(ParamId::DelayFeedback));
        self.delay.set_dry_wet(snap.get(ParamId::DelayMix));
        if !self.delay_chaos {
            self.delay.set_chaos_offset(0.0);
        }

        self.grain_enabled = snap.get_bool(ParamId::GrainEnabled);
        self.grain_mix = snap.get(ParamId::GrainMix);
        self.grain.set_params(
            snap.get(ParamId::GrainSize),
            snap.get(ParamId::GrainDensity),
            snap.get(ParamId::GrainPosition),
        );

        self.reverb.set_room_size(snap.get(ParamId::ReverbRoomSize));
        self.reverb.set_damping(snap.get(ParamId::ReverbDamping));
        self.reverb.set_decay(snap.get(ParamId::ReverbDecay));
        self.reverb.set_dry_wet(snap.get(ParamId::ReverbMix));
        let reverb_chaos = snap.get_bool(ParamId::ReverbChaos);
        self.reverb.set_chaos_feedback_offset(if reverb_chaos {
            self.last_chaos * self.chaos_amount * 0.5
        } else {
            0.0
        });
        self.reverb.update();

        self.reverb_tap_gain = snap.get(ParamId::ReverbDecay) * REVERB_TAP_SCALE;
    }

    /// Process one block of the mixed mono input into stereo out.
    pub fn process_block(&mut self, input: &[Sample], out_l: &mut [Sample], out_r: &mut [Sample]) {
        let n = input.len().min(out_l.len()).min(out_r.len()).min(MAX_BLOCK);
        debug_assert!(input.len() <= MAX_BLOCK, "block exceeds MAX_BLOCK");

        for i in 0..n {
            let x = input[i];

            self.slicer.record_sample(x);
            self.grain.push_input(x);

            let chaos = self.chaos.step();
            self.last_chaos = chaos;

            let (loop_l, loop_r) =
                self.voices
                    .process_sample(self.slicer.loop_buf(), self.slicer.slices(), self.global_speed);

            // Loop feedback: last block's output, soft-clipped.
            let fb_amt = self.loop_feedback.next();
            let fb_l = soft_clip(self.prev_out_l[i]) * fb_amt;
            let fb_r = soft_clip(self.prev_out_r[i]) * fb_amt;

            let mix = self.mix.next();
            let mut l = (x + fb_l) * (1.0 - mix) + loop_l * mix;
            let mut r = (x + fb_r) * (1.0 - mix) + loop_r * mix;

            (l, r) = self.eq.process_sample(l, r);

            if self.delay_chaos {
                self.delay.set_chaos_offset(chaos * self.chaos_amount * 0.05);
            }
            let (mut l, mut r) = self.delay.process_sample(
                l + self.prev_rev_l[i] * self.reverb_tap_gain,
                r + self.prev_rev_r[i] * self.reverb_tap_gain,
            );

            if self.grain_enabled {
                let g = self.grain.process(chaos);
                l = l * (1.0 - self.grain_mix) + g * self.grain_mix;
                r = r * (1.0 - self.grain_mix) + g * self.grain_mix;
            }

            let (rev_l, rev_r) = self.reverb.process_sample(l, r);
            self.cur_rev_l[i] = rev_l;
            self.cur_rev_r[i] = rev_r;

            let master = self.master.next();
            out_l[i] = rev_l * master;
            out_r[i] = rev_r * master;
            self.prev_out_l[i] = out_l[i];
            self.prev_out_r[i] = out_r[i];
        }

        // The reverb tap history must survive into the next block; output
        // history was rewritten in place above.
        self.prev_rev_l[..n].copy_from_slice(&self.cur_rev_l[..n]);
        self.prev_rev_r[..n].copy_from_slice(&self.cur_rev_r[..n]);
    }
}

impl Processor for Alien4 {
    fn reset(&mut self) {
        self.eq.reset();
        self.chaos.reset();
        self.delay.reset();
        self.grain.reset();
        self.reverb.reset();
        self.prev_out_l.fill(0.0);
        self.prev_out_r.fill(0.0);
        self.prev_rev_l.fill(0.0);
        self.prev_rev_r.fill(0.0);
        self.cur_rev_l.fill(0.0);
        self.cur_rev_r.fill(0.0);
        self.last_chaos = 0.0;
    }
}

/// Bounded feedback soft-clip: `tanh(x·0.3)/0.3`.
#[inline(always)]
fn soft_clip(x: Sample) -> Sample {
    (x * 0.3).tanh() / 0.3
}
