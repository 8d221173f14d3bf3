//! The VAV parameter table
//!
//! Every user-facing scalar parameter has a `ParamId` with a stable string
//! key (used by presets and MIDI mappings), a range, and a default. Boolean
//! parameters are stored as 0.0 / 1.0. Out-of-range writes clamp; they are
//! never an error.
//!
//! The nonlinear knob mappings (min-slice-time, envelope decay, CV range
//! gain, grain rate) live here too so the DSP, vision, and GUI sides agree
//! on a single definition.

use crate::Sample;

/// Identifier for every engine parameter.
///
/// Discriminants are dense and double as indices into the atomic parameter
/// table, so the order here is load-bearing: it must match `PARAM_SPECS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ParamId {
    // ── Looper ──────────────────────────────────────────────
    Record = 0,
    Scan,
    Speed,
    Poly,
    Mix,
    LoopFeedback,
    MinSliceTime,
    MasterVolume,
    InGain1,
    InGain2,
    InGain3,
    InGain4,

    // ── Three-band EQ (cut only) ────────────────────────────
    EqLowDb,
    EqMidDb,
    EqHighDb,

    // ── Chaos ───────────────────────────────────────────────
    ChaosRate,
    ChaosAmount,
    ChaosStepped,
    ChaosStepPeriod,
    DelayChaos,
    ReverbChaos,

    // ── Stereo delay ────────────────────────────────────────
    DelayTimeL,
    DelayTimeR,
    DelayFeedback,
    DelayMix,

    // ── Granular ────────────────────────────────────────────
    GrainEnabled,
    GrainSize,
    GrainDensity,
    GrainPosition,
    GrainMix,

    // ── Reverb ──────────────────────────────────────────────
    ReverbRoomSize,
    ReverbDamping,
    ReverbDecay,
    ReverbMix,

    // ── Contour scanner ─────────────────────────────────────
    ScanTime,
    SceneThreshold,
    MinContourLength,
    AnchorX,
    AnchorY,
    CvRange,
    Env1Decay,
    Env2Decay,
    Env3Decay,
    Env4Decay,
    RetryFrames,

    // ── Renderer globals ────────────────────────────────────
    BlendMode,
    ColorScheme,
    Brightness,
    BaseHue,
    CameraIntensity,
    UseRegionMap,

    // ── Renderer per-channel ────────────────────────────────
    Freq1,
    Freq2,
    Freq3,
    Freq4,
    Intensity1,
    Intensity2,
    Intensity3,
    Intensity4,
    Curve1,
    Curve2,
    Curve3,
    Curve4,
    Angle1,
    Angle2,
    Angle3,
    Angle4,
    Enabled1,
    Enabled2,
    Enabled3,
    Enabled4,
    Ratio1,
    Ratio2,
    Ratio3,
    Ratio4,
}

/// Static description of one parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub id: ParamId,
    pub key: &'static str,
    pub min: Sample,
    pub max: Sample,
    pub default: Sample,
}

impl ParamSpec {
    #[inline]
    pub fn clamp(&self, value: Sample) -> Sample {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }
}

/// Middle C in Hz, the hue reference for the renderer palette.
pub const HUE_REF_FREQ: Sample = 261.63;

macro_rules! spec {
    ($id:ident, $key:literal, $min:expr, $max:expr, $default:expr) => {
        ParamSpec {
            id: ParamId::$id,
            key: $key,
            min: $min,
            max: $max,
            default: $default,
        }
    };
}

/// The full table, in `ParamId` discriminant order.
pub static PARAM_SPECS: [ParamSpec; ParamId::COUNT] = [
    spec!(Record, "record", 0.0, 1.0, 0.0),
    spec!(Scan, "scan", 0.0, 1.0, 0.0),
    spec!(Speed, "speed", -8.0, 8.0, 1.0),
    spec!(Poly, "poly", 1.0, 8.0, 4.0),
    spec!(Mix, "mix", 0.0, 1.0, 0.5),
    spec!(LoopFeedback, "loop_feedback", 0.0, 0.95, 0.0),
    spec!(MinSliceTime, "min_slice_time", 0.0, 1.0, 0.3),
    spec!(MasterVolume, "master_volume", 0.0, 1.0, 0.8),
    spec!(InGain1, "in_gain_1", 0.0, 1.0, 1.0),
    spec!(InGain2, "in_gain_2", 0.0, 1.0, 1.0),
    spec!(InGain3, "in_gain_3", 0.0, 1.0, 1.0),
    spec!(InGain4, "in_gain_4", 0.0, 1.0, 1.0),
    spec!(EqLowDb, "eq_low_db", -20.0, 0.0, 0.0),
    spec!(EqMidDb, "eq_mid_db", -20.0, 0.0, 0.0),
    spec!(EqHighDb, "eq_high_db", -20.0, 0.0, 0.0),
    spec!(ChaosRate, "chaos_rate", 0.0, 1.0, 0.5),
    spec!(ChaosAmount, "chaos_amount", 0.0, 1.0, 0.5),
    spec!(ChaosStepped, "chaos_stepped", 0.0, 1.0, 0.0),
    spec!(ChaosStepPeriod, "chaos_step_period", 0.01, 1.0, 0.1),
    spec!(DelayChaos, "delay_chaos", 0.0, 1.0, 0.0),
    spec!(ReverbChaos, "reverb_chaos", 0.0, 1.0, 0.0),
    spec!(DelayTimeL, "delay_time_l", 0.001, 2.0, 0.25),
    spec!(DelayTimeR, "delay_time_r", 0.001, 2.0, 0.5),
    spec!(DelayFeedback, "delay_feedback", 0.0, 0.95, 0.3),
    spec!(DelayMix, "delay_mix", 0.0, 1.0, 0.0),
    spec!(GrainEnabled, "grain_enabled", 0.0, 1.0, 0.0),
    spec!(GrainSize, "grain_size", 0.0, 1.0, 0.5),
    spec!(GrainDensity, "grain_density", 0.0, 1.0, 0.5),
    spec!(GrainPosition, "grain_position", 0.0, 1.0, 0.5),
    spec!(GrainMix, "grain_mix", 0.0, 1.0, 0.0),
    spec!(ReverbRoomSize, "reverb_room_size", 0.0, 1.0, 0.5),
    spec!(ReverbDamping, "reverb_damping", 0.0, 1.0, 0.5),
    spec!(ReverbDecay, "reverb_decay", 0.0, 1.0, 0.5),
    spec!(ReverbMix, "reverb_mix", 0.0, 1.0, 0.0),
    spec!(ScanTime, "scan_time", 0.1, 300.0, 10.0),
    spec!(SceneThreshold, "scene_threshold", 0.01, 0.10, 0.03),
    spec!(MinContourLength, "min_contour_length", 0.0, 2000.0, 100.0),
    spec!(AnchorX, "anchor_x", 0.0, 1.0, 0.5),
    spec!(AnchorY, "anchor_y", 0.0, 1.0, 0.5),
    spec!(CvRange, "cv_range", 1.0, 120.0, 100.0),
    spec!(Env1Decay, "env1_decay", 0.0, 1.0, 0.5),
    spec!(Env2Decay, "env2_decay", 0.0, 1.0, 0.5),
    spec!(Env3Decay, "env3_decay", 0.0, 1.0, 0.5),
    spec!(Env4Decay, "env4_decay", 0.0, 1.0, 0.5),
    spec!(RetryFrames, "retry_frames", 1.0, 120.0, 30.0),
    spec!(BlendMode, "blend_mode", 0.0, 1.0, 0.0),
    spec!(ColorScheme, "color_scheme", 0.0, 1.0, 0.0),
    spec!(Brightness, "brightness", 0.0, 4.0, 1.0),
    spec!(BaseHue, "base_hue", 0.0, 1.0, 0.0),
    spec!(CameraIntensity, "camera_intensity", 0.0, 1.0, 0.5),
    spec!(UseRegionMap, "use_region_map", 0.0, 1.0, 0.0),
    spec!(Freq1, "freq_1", 27.5, 4186.0, HUE_REF_FREQ),
    spec!(Freq2, "freq_2", 27.5, 4186.0, HUE_REF_FREQ * 1.5),
    spec!(Freq3, "freq_3", 27.5, 4186.0, HUE_REF_FREQ * 2.0),
    spec!(Freq4, "freq_4", 27.5, 4186.0, HUE_REF_FREQ * 3.0),
    spec!(Intensity1, "intensity_1", 0.0, 4.0, 1.0),
    spec!(Intensity2, "intensity_2", 0.0, 4.0, 1.0),
    spec!(Intensity3, "intensity_3", 0.0, 4.0, 1.0),
    spec!(Intensity4, "intensity_4", 0.0, 4.0, 1.0),
    spec!(Curve1, "curve_1", 0.0, 1.0, 0.0),
    spec!(Curve2, "curve_2", 0.0, 1.0, 0.0),
    spec!(Curve3, "curve_3", 0.0, 1.0, 0.0),
    spec!(Curve4, "curve_4", 0.0, 1.0, 0.0),
    spec!(Angle1, "angle_1", 0.0, 360.0, 0.0),
    spec!(Angle2, "angle_2", 0.0, 360.0, 0.0),
    spec!(Angle3, "angle_3", 0.0, 360.0, 0.0),
    spec!(Angle4, "angle_4", 0.0, 360.0, 0.0),
    spec!(Enabled1, "enabled_1", 0.0, 1.0, 1.0),
    spec!(Enabled2, "enabled_2", 0.0, 1.0, 1.0),
    spec!(Enabled3, "enabled_3", 0.0, 1.0, 1.0),
    spec!(Enabled4, "enabled_4", 0.0, 1.0, 1.0),
    spec!(Ratio1, "ratio_1", 0.25, 4.0, 1.0),
    spec!(Ratio2, "ratio_2", 0.25, 4.0, 1.0),
    spec!(Ratio3, "ratio_3", 0.25, 4.0, 1.0),
    spec!(Ratio4, "ratio_4", 0.25, 4.0, 1.0),
];

impl ParamId {
    /// Number of parameters (table length).
    pub const COUNT: usize = ParamId::Ratio4 as usize + 1;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub fn spec(self) -> &'static ParamSpec {
        &PARAM_SPECS[self as usize]
    }

    #[inline]
    pub fn key(self) -> &'static str {
        self.spec().key
    }

    /// Look up a parameter by its preset/MIDI key.
    pub fn from_key(key: &str) -> Option<ParamId> {
        PARAM_SPECS.iter().find(|s| s.key == key).map(|s| s.id)
    }

    /// Iterate all parameters in table order.
    pub fn all() -> impl Iterator<Item = ParamId> {
        PARAM_SPECS.iter().map(|s| s.id)
    }

    /// Renderer per-channel parameter for channel 0..3.
    pub fn per_channel(base: ParamId, channel: usize) -> ParamId {
        debug_assert!(channel < 4);
        PARAM_SPECS[base as usize + channel].id
    }
}

// ════════════════════════════════════════════════════════════════════
// Knob mappings
// ════════════════════════════════════════════════════════════════════

/// MIN_SLICE_TIME knob → seconds.
///
/// k ≤ 0.5: 0.001·1000^(2k)  (1 ms – 1 s, exponential)
/// k > 0.5: 1.0 + 4.0·(2k−1) (1 s – 5 s, linear)
#[inline]
pub fn min_slice_seconds(k: Sample) -> Sample {
    let k = k.clamp(0.0, 1.0);
    if k <= 0.5 {
        0.001 * 1000.0f32.powf(2.0 * k)
    } else {
        1.0 + 4.0 * (2.0 * k - 1.0)
    }
}

/// Envelope decay knob → τ seconds.
///
/// u ≤ 0.5: 0.01·100^(2u)    (10 ms – 1 s, exponential)
/// u > 0.5: 1.0 + (u−0.5)·8.0 (1 s – 5 s, linear)
#[inline]
pub fn env_decay_seconds(u: Sample) -> Sample {
    let u = u.clamp(0.0, 1.0);
    if u <= 0.5 {
        0.01 * 100.0f32.powf(2.0 * u)
    } else {
        1.0 + (u - 0.5) * 8.0
    }
}

/// CV range knob (1–120 %) → SEQ gain.
///
/// Exponential from 8 at 1 % down to 2 at 100 %; clamped to 2 beyond.
#[inline]
pub fn range_gain(range_pct: Sample) -> Sample {
    let t = ((range_pct - 1.0) / 99.0).clamp(0.0, 1.0);
    8.0 * 4.0f32.powf(-t)
}

/// Grain density knob → trigger rate in Hz (1–51 Hz).
#[inline]
pub fn grain_rate_hz(density: Sample) -> Sample {
    1.0 + 50.0 * density.clamp(0.0, 1.0)
}

/// Grain size knob → seconds (1–100 ms).
#[inline]
pub fn grain_size_seconds(size: Sample) -> Sample {
    0.001 + 0.099 * size.clamp(0.0, 1.0)
}

/// Reverb damping knob → one-pole damping coefficient (0.05–0.95).
#[inline]
pub fn damping_coeff(damping: Sample) -> Sample {
    0.05 + 0.90 * damping.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_matches_ids() {
        for (i, s) in PARAM_SPECS.iter().enumerate() {
            assert_eq!(s.id.index(), i, "table misordered at {}", s.key);
        }
    }

    #[test]
    fn keys_are_unique() {
        for a in 0..PARAM_SPECS.len() {
            for b in (a + 1)..PARAM_SPECS.len() {
                assert_ne!(PARAM_SPECS[a].key, PARAM_SPECS[b].key);
            }
        }
    }

    #[test]
    fn defaults_in_range() {
        for s in &PARAM_SPECS {
            assert!(s.min <= s.default && s.default <= s.max, "{}", s.key);
        }
    }

    #[test]
    fn min_slice_endpoints() {
        assert!((min_slice_seconds(0.0) - 0.001).abs() < 1e-6);
        assert!((min_slice_seconds(0.5) - 1.0).abs() < 1e-4);
        assert!((min_slice_seconds(1.0) - 5.0).abs() < 1e-4);
    }

    #[test]
    fn env_decay_endpoints() {
        assert!((env_decay_seconds(0.0) - 0.01).abs() < 1e-6);
        assert!((env_decay_seconds(0.5) - 1.0).abs() < 1e-4);
        assert!((env_decay_seconds(1.0) - 5.0).abs() < 1e-4);
    }

    #[test]
    fn range_gain_endpoints() {
        assert!((range_gain(1.0) - 8.0).abs() < 1e-5);
        assert!((range_gain(100.0) - 2.0).abs() < 1e-5);
        // Past 100 % the gain stays pinned at 2.
        assert!((range_gain(120.0) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn clamp_handles_nan() {
        let s = ParamId::Mix.spec();
        assert_eq!(s.clamp(f32::NAN), s.default);
        assert_eq!(s.clamp(2.0), 1.0);
    }
}
