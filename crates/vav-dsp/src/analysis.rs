//! Level analysis
//!
//! Peak and RMS meters with ballistics for the GUI level displays.
//! Attack is instantaneous; release follows an exponential fall so short
//! transients stay readable.

use vav_core::Sample;

use crate::Processor;

/// Peak meter with instant attack and exponential release.
#[derive(Debug, Clone)]
pub struct PeakMeter {
    current: Sample,
    release_coeff: Sample,
}

impl PeakMeter {
    /// `release_ms` is the time to fall ~63 % of the way to silence.
    pub fn new(sample_rate: Sample, release_ms: Sample) -> Self {
        let samples = (release_ms * 0.001 * sample_rate).max(1.0);
        Self {
            current: 0.0,
            release_coeff: (-1.0 / samples).exp(),
        }
    }

    #[inline(always)]
    pub fn process(&mut self, input: Sample) -> Sample {
        let level = input.abs();
        if level > self.current {
            self.current = level;
        } else {
            self.current *= self.release_coeff;
        }
        self.current
    }

    pub fn process_block(&mut self, buffer: &[Sample]) -> Sample {
        for &x in buffer {
            self.process(x);
        }
        self.current
    }

    #[inline]
    pub fn current(&self) -> Sample {
        self.current
    }
}

impl Processor for PeakMeter {
    fn reset(&mut self) {
        self.current = 0.0;
    }
}

/// Exponential sliding RMS meter.
#[derive(Debug, Clone)]
pub struct RmsMeter {
    mean_square: Sample,
    coeff: Sample,
}

impl RmsMeter {
    /// `window_ms` is the averaging time constant.
    pub fn new(sample_rate: Sample, window_ms: Sample) -> Self {
        let samples = (window_ms * 0.001 * sample_rate).max(1.0);
        Self {
            mean_square: 0.0,
            coeff: 1.0 - (-1.0 / samples).exp(),
        }
    }

    #[inline(always)]
    pub fn process(&mut self, input: Sample) -> Sample {
        self.mean_square += (input * input - self.mean_square) * self.coeff;
        self.mean_square.sqrt()
    }

    pub fn process_block(&mut self, buffer: &[Sample]) -> Sample {
        for &x in buffer {
            self.process(x);
        }
        self.current()
    }

    #[inline]
    pub fn current(&self) -> Sample {
        self.mean_square.sqrt()
    }
}

impl Processor for RmsMeter {
    fn reset(&mut self) {
        self.mean_square = 0.0;
    }
}
