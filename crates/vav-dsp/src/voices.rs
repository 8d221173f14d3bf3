//! Polyphonic slice playback
//!
//! A fixed pool of up to eight playback cursors into the loop buffer,
//! stored as a structure of arrays. Voice 0 is the scanned voice seated
//! by the SCAN parameter; voices 1..N−1 sit on random active slices with
//! random speed multipliers. Even voices route left, odd voices right,
//! with an RMS-preserving spread normalization.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use vav_core::Sample;

use crate::slicer::Slice;

pub const MAX_VOICES: usize = 8;

/// Hard clamp on combined playback speed.
const MAX_SPEED: Sample = 16.0;

pub struct VoicePool {
    slice_index: [i32; MAX_VOICES],
    position: [i32; MAX_VOICES],
    phase: [Sample; MAX_VOICES],
    speed_mult: [Sample; MAX_VOICES],
    num_voices: usize,
    rng: ChaCha8Rng,
}

impl VoicePool {
    pub fn new() -> Self {
        Self::with_seed(0x0A11_E4A4)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            slice_index: [-1; MAX_VOICES],
            position: [0; MAX_VOICES],
            phase: [0.0; MAX_VOICES],
            speed_mult: [1.0; MAX_VOICES],
            num_voices: 1,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn num_voices(&self) -> usize {
        self.num_voices
    }

    /// Voice 0's slice index, or -1 when unseated.
    #[inline]
    pub fn scan_slice(&self) -> i32 {
        self.slice_index[0]
    }

    #[inline]
    pub fn voice0_position(&self) -> i32 {
        self.position[0]
    }

    /// Change polyphony. New voices are seated immediately.
    pub fn set_poly(&mut self, poly: usize, slices: &[Slice]) {
        let poly = poly.clamp(1, MAX_VOICES);
        if poly != self.num_voices {
            self.num_voices = poly;
            self.redistribute(slices);
        }
    }

    /// Seat voice 0 on the SCAN-selected slice.
    pub fn seat_scan(&mut self, target: usize, slices: &[Slice]) {
        if let Some(slice) = slices.get(target) {
            self.slice_index[0] = target as i32;
            self.position[0] = slice.start;
            self.phase[0] = 0.0;
        } else {
            self.slice_index[0] = -1;
            self.position[0] = 0;
            self.phase[0] = 0.0;
        }
        self.speed_mult[0] = 1.0;
    }

    /// Reseat voices 1..N−1 on random active slices with speed
    /// multipliers drawn from U(−2, +2). Inactive slices are never chosen.
    pub fn redistribute(&mut self, slices: &[Slice]) {
        let active_count = slices.iter().filter(|s| s.active).count();
        for v in 1..self.num_voices {
            if active_count == 0 {
                self.slice_index[v] = -1;
                self.position[v] = 0;
                self.phase[v] = 0.0;
                self.speed_mult[v] = self.rng.random_range(-2.0..=2.0);
                continue;
            }
            let pick = self.rng.random_range(0..active_count);
            let mut seen = 0;
            for (idx, slice) in slices.iter().enumerate() {
                if !slice.active {
                    continue;
                }
                if seen == pick {
                    self.slice_index[v] = idx as i32;
                    self.position[v] = slice.start;
                    break;
                }
                seen += 1;
            }
            self.phase[v] = 0.0;
            self.speed_mult[v] = self.rng.random_range(-2.0..=2.0);
        }
    }

    /// Advance every voice one sample and return the stereo pair.
    #[inline(always)]
    pub fn process_sample(
        &mut self,
        loop_buf: &[Sample],
        slices: &[Slice],
        global_speed: Sample,
    ) -> (Sample, Sample) {
        let recorded_len = loop_buf.len();
        if recorded_len < 2 {
            return (0.0, 0.0);
        }

        let mut left = 0.0;
        let mut right = 0.0;
        for v in 0..self.num_voices {
            let speed = (global_speed * self.speed_mult[v]).clamp(-MAX_SPEED, MAX_SPEED);
            self.phase[v] += speed;
            let advance = self.phase[v].trunc();
            self.phase[v] -= advance;
            let mut pos = self.position[v] + advance as i32;

            // Wrap inside the voice's slice, or the whole loop without one.
            let (lo, hi) = match slices.get(self.slice_index[v].max(0) as usize) {
                Some(s) if self.slice_index[v] >= 0 && s.active && s.len() > 1 => (s.start, s.end),
                _ => (0, recorded_len as i32),
            };
            let span = hi - lo;
            while pos >= hi {
                pos -= span;
            }
            while pos < lo {
                pos += span;
            }
            self.position[v] = pos;

            let frac = self.phase[v].abs();
            let i0 = pos as usize;
            let i1 = (i0 + 1) % recorded_len;
            let sample = loop_buf[i0] * (1.0 - frac) + loop_buf[i1] * frac;

            if self.num_voices == 1 {
                left += sample;
                right += sample;
            } else if v % 2 == 0 {
                left += sample;
            } else {
                right += sample;
            }
        }

        if self.num_voices > 1 {
            let l_count = self.num_voices.div_ceil(2);
            let r_count = self.num_voices / 2;
            left /= (l_count as Sample).sqrt();
            if r_count > 0 {
                right /= (r_count as Sample).sqrt();
            }
        }
        (left, right)
    }
}

impl Default for VoicePool {
    fn default() -> Self {
        Self::new()
    }
}
