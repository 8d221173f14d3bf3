//! vav-core: Shared types, parameters, and conventions for VAV
//!
//! This crate provides the foundational types used across all VAV crates:
//! sample/voltage conventions, stream geometry, the parameter table, and
//! the core error type.

mod error;
mod params;

pub use error::*;
pub use params::*;

/// Audio sample type. All DSP and CV math runs in f32.
pub type Sample = f32;

/// Full-scale control voltage (unipolar CV range is 0.0–10.0 V).
pub const CV_MAX_VOLTS: Sample = 10.0;

/// Bipolar audio/CV headroom in volts (Eurorack ±10 V convention).
pub const VOLT_RANGE: Sample = 10.0;

/// Scale applied to CVs at the DAC write boundary: 1.0 in float = 1.0 V
/// on a calibrated DC-coupled output, so a 0–10 V CV is written as 0.0–1.0.
pub const CV_DAC_SCALE: Sample = 0.1;

/// Number of CV slots on the bus: ENV1, ENV2, ENV3, SEQ1, SEQ2.
pub const CV_SLOTS: usize = 5;

/// Mono inputs mixed into the looper feed.
pub const NUM_INPUTS: usize = 4;

/// Output channels: L, R, CV0..CV4.
pub const NUM_OUTPUTS: usize = 7;

/// Standard sample rate options
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum SampleRate {
    Hz44100 = 44100,
    Hz48000 = 48000,
    Hz96000 = 96000,
}

impl SampleRate {
    #[inline]
    pub fn as_f32(self) -> f32 {
        self as u32 as f32
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz48000
    }
}

/// Buffer size options
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum BufferSize {
    Samples128 = 128,
    Samples256 = 256,
    Samples512 = 512,
}

impl BufferSize {
    #[inline]
    pub fn as_usize(self) -> usize {
        self as u32 as usize
    }

    /// Callback wall-clock budget in milliseconds
    #[inline]
    pub fn latency_ms(self, sample_rate: SampleRate) -> f32 {
        (self.as_usize() as f32 / sample_rate.as_f32()) * 1000.0
    }
}

impl Default for BufferSize {
    fn default() -> Self {
        Self::Samples256
    }
}

/// Clamp a CV to the unipolar output range.
#[inline]
pub fn clamp_cv(v: Sample) -> Sample {
    v.clamp(0.0, CV_MAX_VOLTS)
}
