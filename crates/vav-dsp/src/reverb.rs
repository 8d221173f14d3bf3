//! Freeverb-style reverb
//!
//! Per channel: four lowpass-damped feedback combs followed by two series
//! allpasses. The right bank is offset by 23 samples for stereo spread.
//! Four early-reflection taps read directly from the comb buffers at
//! room-size-scaled offsets. Feedback is `0.5 + decay·0.485`, optionally
//! pushed by the chaos modulator, and never exceeds 0.995.

use vav_core::{Sample, damping_coeff};

use crate::{Processor, StereoProcessor};

/// Comb delay lengths for the left bank.
const COMB_SIZES: [usize; 4] = [1557, 1617, 1491, 1422];
/// Allpass delay lengths for the left bank.
const ALLPASS_SIZES: [usize; 2] = [556, 441];
/// Right-bank offset applied to combs and allpasses.
const STEREO_SPREAD: usize = 23;

/// Early-reflection tap offsets at room_size = 1.0.
const ER_OFFSETS_L: [usize; 4] = [400, 350, 380, 420];
const ER_OFFSETS_R: [usize; 4] = [400 + 45, 350 + 40, 380 + 45, 420 + 55];
/// Early-reflection tap gains at room_size = 1.0.
const ER_GAINS: [Sample; 4] = [0.15, 0.12, 0.13, 0.11];

/// Input attenuation into the comb bank (Freeverb fixed gain).
const FIXED_GAIN: Sample = 0.015;

/// Lowpass-damped feedback comb.
#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<Sample>,
    pos: usize,
    filter_state: Sample,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline(always)]
    fn process(&mut self, input: Sample, feedback: Sample, damping: Sample) -> Sample {
        let output = self.buffer[self.pos];
        self.filter_state += (output - self.filter_state) * damping;
        self.buffer[self.pos] = input + self.filter_state * feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    /// Read `offset` samples behind the most recent write.
    #[inline(always)]
    fn tap(&self, offset: usize) -> Sample {
        let len = self.buffer.len();
        self.buffer[(self.pos + len - 1 - offset) % len]
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
        self.filter_state = 0.0;
    }
}

/// Schroeder allpass with fixed 0.5 coefficient.
#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<Sample>,
    pos: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len],
            pos: 0,
        }
    }

    #[inline(always)]
    fn process(&mut self, input: Sample) -> Sample {
        let delayed = self.buffer[self.pos];
        let output = -input + delayed;
        self.buffer[self.pos] = input + delayed * 0.5;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

#[derive(Debug, Clone)]
pub struct Freeverb {
    combs_l: [Comb; 4],
    combs_r: [Comb; 4],
    allpasses_l: [Allpass; 2],
    allpasses_r: [Allpass; 2],

    room_size: Sample,
    damping: Sample,
    decay: Sample,
    dry_wet: Sample,
    chaos_offset: Sample,
    feedback: Sample,
}

impl Freeverb {
    pub fn new(_sample_rate: Sample) -> Self {
        let mut reverb = Self {
            combs_l: std::array::from_fn(|i| Comb::new(COMB_SIZES[i])),
            combs_r: std::array::from_fn(|i| Comb::new(COMB_SIZES[i] + STEREO_SPREAD)),
            allpasses_l: std::array::from_fn(|i| Allpass::new(ALLPASS_SIZES[i])),
            allpasses_r: std::array::from_fn(|i| Allpass::new(ALLPASS_SIZES[i] + STEREO_SPREAD)),
            room_size: 0.5,
            damping: 0.5,
            decay: 0.5,
            dry_wet: 0.0,
            chaos_offset: 0.0,
            feedback: 0.0,
        };
        reverb.update();
        reverb
    }

    pub fn set_room_size(&mut self, room_size: Sample) {
        self.room_size = room_size.clamp(0.0, 1.0);
    }

    pub fn set_damping(&mut self, damping: Sample) {
        self.damping = damping.clamp(0.0, 1.0);
    }

    pub fn set_decay(&mut self, decay: Sample) {
        self.decay = decay.clamp(0.0, 1.0);
    }

    pub fn set_dry_wet(&mut self, mix: Sample) {
        self.dry_wet = mix.clamp(0.0, 1.0);
    }

    /// Chaos feedback offset (`chaos_out · amount · 0.5`), zero when the
    /// routing toggle is off.
    pub fn set_chaos_feedback_offset(&mut self, offset: Sample) {
        self.chaos_offset = offset;
    }

    pub fn decay_param(&self) -> Sample {
        self.decay
    }

    /// Recompute the feedback coefficient. Call once per buffer.
    pub fn update(&mut self) {
        self.feedback = (0.5 + self.decay * 0.485 + self.chaos_offset).clamp(0.0, 0.995);
    }
}

impl Processor for Freeverb {
    fn reset(&mut self) {
        for c in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            c.reset();
        }
        for a in self
            .allpasses_l
            .iter_mut()
            .chain(self.allpasses_r.iter_mut())
        {
            a.reset();
        }
    }
}

impl StereoProcessor for Freeverb {
    #[inline(always)]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let damp = damping_coeff(self.damping);
        let in_l = left * FIXED_GAIN;
        let in_r = right * FIXED_GAIN;

        let mut wet_l = 0.0;
        let mut wet_r = 0.0;
        for i in 0..4 {
            wet_l += self.combs_l[i].process(in_l, self.feedback, damp);
            wet_r += self.combs_r[i].process(in_r, self.feedback, damp);

            let off_l = (self.room_size * ER_OFFSETS_L[i] as Sample) as usize;
            let off_r = (self.room_size * ER_OFFSETS_R[i] as Sample) as usize;
            let gain = self.room_size * ER_GAINS[i];
            wet_l += self.combs_l[i].tap(off_l) * gain;
            wet_r += self.combs_r[i].tap(off_r) * gain;
        }

        for i in 0..2 {
            wet_l = self.allpasses_l[i].process(wet_l);
            wet_r = self.allpasses_r[i].process(wet_r);
        }

        (
            left * (1.0 - self.dry_wet) + wet_l * self.dry_wet,
            right * (1.0 - self.dry_wet) + wet_r * self.dry_wet,
        )
    }
}
