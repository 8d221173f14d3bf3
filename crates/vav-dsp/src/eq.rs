//! Three-band cut-only EQ
//!
//! Low shelf at 200 Hz, mid peak at 2 kHz, high shelf at 8 kHz, Q 0.707,
//! gain −20..0 dB per band. Coefficients are recomputed once per buffer
//! from exponentially smoothed gain state, never inside the sample loop.

use vav_core::Sample;

use crate::biquad::BiquadTDF2;
use crate::{MonoProcessor, Processor, ProcessorConfig, StereoProcessor};

const LOW_FREQ: Sample = 200.0;
const MID_FREQ: Sample = 2000.0;
const HIGH_FREQ: Sample = 8000.0;
const BAND_Q: Sample = 0.707;

/// Per-buffer gain smoothing coefficient.
const GAIN_SMOOTH: Sample = 0.05;

/// Stereo three-band cut EQ.
#[derive(Debug, Clone)]
pub struct ThreeBandEq {
    bands_l: [BiquadTDF2; 3],
    bands_r: [BiquadTDF2; 3],
    gain_state: [Sample; 3],
    gain_target: [Sample; 3],
}

impl ThreeBandEq {
    pub fn new(sample_rate: Sample) -> Self {
        let mut eq = Self {
            bands_l: std::array::from_fn(|_| BiquadTDF2::new(sample_rate)),
            bands_r: std::array::from_fn(|_| BiquadTDF2::new(sample_rate)),
            gain_state: [0.0; 3],
            gain_target: [0.0; 3],
        };
        eq.recompute();
        eq
    }

    /// Set band gain targets in dB (clamped to −20..0, cut only).
    pub fn set_gains_db(&mut self, low: Sample, mid: Sample, high: Sample) {
        self.gain_target = [
            low.clamp(-20.0, 0.0),
            mid.clamp(-20.0, 0.0),
            high.clamp(-20.0, 0.0),
        ];
    }

    /// Advance gain smoothing and recompute coefficients. Call once per
    /// buffer, not per sample.
    pub fn update_coeffs(&mut self) {
        let mut changed = false;
        for i in 0..3 {
            let delta = self.gain_target[i] - self.gain_state[i];
            if delta.abs() > 1e-4 {
                self.gain_state[i] += delta * GAIN_SMOOTH;
                changed = true;
            }
        }
        if changed {
            self.recompute();
        }
    }

    fn recompute(&mut self) {
        for bands in [&mut self.bands_l, &mut self.bands_r] {
            bands[0].set_low_shelf(LOW_FREQ, BAND_Q, self.gain_state[0]);
            bands[1].set_peaking(MID_FREQ, BAND_Q, self.gain_state[1]);
            bands[2].set_high_shelf(HIGH_FREQ, BAND_Q, self.gain_state[2]);
        }
    }
}

impl Processor for ThreeBandEq {
    fn reset(&mut self) {
        for b in self.bands_l.iter_mut().chain(self.bands_r.iter_mut()) {
            b.reset();
        }
        self.gain_state = self.gain_target;
        self.recompute();
    }
}

impl StereoProcessor for ThreeBandEq {
    #[inline(always)]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let mut l = left;
        let mut r = right;
        for i in 0..3 {
            l = self.bands_l[i].process_sample(l);
            r = self.bands_r[i].process_sample(r);
        }
        (l, r)
    }
}

impl ProcessorConfig for ThreeBandEq {
    fn set_sample_rate(&mut self, sample_rate: f32) {
        for b in self.bands_l.iter_mut().chain(self.bands_r.iter_mut()) {
            b.set_sample_rate(sample_rate);
        }
        self.recompute();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_at_zero_gain() {
        let mut eq = ThreeBandEq::new(48000.0);
        eq.update_coeffs();
        for i in 0..512 {
            let x = (i as f32 * 0.07).sin();
            let (l, r) = eq.process_sample(x, x);
            assert!((l - x).abs() < 1e-4);
            assert!((l - r).abs() < 1e-6);
        }
    }

    #[test]
    fn gains_converge_over_buffers() {
        let mut eq = ThreeBandEq::new(48000.0);
        eq.set_gains_db(-20.0, -10.0, -5.0);
        for _ in 0..400 {
            eq.update_coeffs();
        }
        assert!((eq.gain_state[0] + 20.0).abs() < 0.1);
        assert!((eq.gain_state[1] + 10.0).abs() < 0.1);
        assert!((eq.gain_state[2] + 5.0).abs() < 0.1);
    }

    #[test]
    fn boost_requests_clamp_to_cut_only() {
        let mut eq = ThreeBandEq::new(48000.0);
        eq.set_gains_db(6.0, 3.0, 12.0);
        assert_eq!(eq.gain_target, [0.0; 3]);
    }
}
