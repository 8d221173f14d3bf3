//! CPU mirror of the shader math
//!
//! Every formula the WGSL passes rely on, duplicated here so correctness
//! is testable without a GPU. The WGSL in `shaders/` must stay in sync
//! with these definitions.

use vav_core::{HUE_REF_FREQ, Sample};

/// Fixed divisor of the visual ratio warp.
pub const RATIO_COMPRESS: Sample = 3.0;

/// Minimum output brightness after blending.
pub const BRIGHTNESS_FLOOR: Sample = 0.25;

/// Voltage → brightness: `clamp((w + 10)·0.05·intensity, 0, 1)`.
///
/// This exact form is load-bearing: ±10 V maps to 0..1 with 0 V at 0.5.
/// Absolute-value variants fold the waveform and are wrong.
#[inline]
pub fn voltage_normalize(w: Sample, intensity: Sample) -> Sample {
    ((w + 10.0) * 0.05 * intensity).clamp(0.0, 1.0)
}

/// Frequency → hue: octave-folded distance from middle C.
#[inline]
pub fn hue_from_freq(freq: Sample) -> Sample {
    (freq / HUE_REF_FREQ).log2().fract().rem_euclid(1.0)
}

/// Color-scheme morph: returns (hue offset, saturation) for the scheme
/// knob in [0, 1], interpolating across three triadic palettes.
pub fn scheme_offset_sat(t: Sample) -> (Sample, Sample) {
    let p0 = (0.0, 1.0);
    let p1 = (1.0 / 3.0, 0.8);
    let p2 = (2.0 / 3.0, 0.6);
    let lerp = |a: (Sample, Sample), b: (Sample, Sample), t: Sample| {
        (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t)
    };
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        lerp(p0, p1, t * 2.0)
    } else {
        lerp(p1, p2, (t - 0.5) * 2.0)
    }
}

/// HSV → RGB, h/s/v all in [0, 1].
pub fn hsv_to_rgb(h: Sample, s: Sample, v: Sample) -> [Sample; 3] {
    let h = h.rem_euclid(1.0) * 6.0;
    let i = h.floor();
    let f = h - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match i as u32 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// Curve warp applied in the original coordinate space.
#[inline]
pub fn curve_warp(x: Sample, y_from_center: Sample, curve: Sample) -> Sample {
    if curve > 0.001 {
        (x + y_from_center * (x * std::f32::consts::PI).sin() * curve * 2.0).rem_euclid(1.0)
    } else {
        x
    }
}

/// Visual ratio warp: a coordinate transform, never pitch shifting.
#[inline]
pub fn ratio_warp(x: Sample, ratio: Sample) -> Sample {
    (x * (ratio / RATIO_COMPRESS)).rem_euclid(1.0)
}

/// Rotation scale compensation so no black borders appear.
#[inline]
pub fn rotation_prescale(angle_rad: Sample) -> Sample {
    angle_rad.cos().abs() + angle_rad.sin().abs()
}

/// One step of the continuous blend morph: fold `c` into `acc`.
pub fn blend_pair(mode: Sample, acc: [Sample; 3], c: [Sample; 3]) -> [Sample; 3] {
    let mut out = [0.0; 3];
    for i in 0..3 {
        let a = acc[i];
        let b = c[i];
        let add = (a + b).min(1.0);
        let screen = 1.0 - (1.0 - a) * (1.0 - b);
        let diff = (a - b).abs();
        let dodge = (a / (1.0 - b).max(1e-4)).clamp(0.0, 1.0);
        let m = mode.clamp(0.0, 1.0);
        out[i] = if m < 1.0 / 3.0 {
            add + (screen - add) * (m * 3.0)
        } else if m < 2.0 / 3.0 {
            screen + (diff - screen) * ((m - 1.0 / 3.0) * 3.0)
        } else {
            diff + (dodge - diff) * ((m - 2.0 / 3.0) * 3.0)
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn voltage_mapping_endpoints() {
        // Property: -10, 0, +10 V at intensity 1 -> 0, 0.5, 1 exactly.
        assert_abs_diff_eq!(voltage_normalize(-10.0, 1.0), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(voltage_normalize(0.0, 1.0), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(voltage_normalize(10.0, 1.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn voltage_mapping_rejects_abs_variant() {
        // +5 V at intensity 1: mandated formula gives 0.75; the folded
        // |w|*0.14 variant gives 0.7. They must be distinguishable.
        let correct = voltage_normalize(5.0, 1.0);
        let wrong = (5.0f32).abs() * 0.14;
        assert!((correct - 0.75).abs() < 1e-6);
        assert!((correct - wrong).abs() > 0.01);
    }

    #[test]
    fn hue_is_octave_periodic() {
        let h1 = hue_from_freq(220.0);
        let h2 = hue_from_freq(440.0);
        let h3 = hue_from_freq(880.0);
        assert!((h1 - h2).abs() < 1e-5);
        assert!((h2 - h3).abs() < 1e-5);
        assert!((hue_from_freq(HUE_REF_FREQ) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn blend_endpoints_match_discrete_formulas() {
        let a = [0.5, 0.2, 0.8];
        let b = [0.3, 0.9, 0.4];

        let add = blend_pair(0.0, a, b);
        for i in 0..3 {
            assert!((add[i] - (a[i] + b[i]).min(1.0)).abs() < 1e-6);
        }

        let diff = blend_pair(2.0 / 3.0, a, b);
        for i in 0..3 {
            assert!((diff[i] - (a[i] - b[i]).abs()).abs() < 1e-5);
        }

        let dodge = blend_pair(1.0, a, b);
        for i in 0..3 {
            let expected = (a[i] / (1.0 - b[i]).max(1e-4)).clamp(0.0, 1.0);
            assert!((dodge[i] - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn blend_morph_is_continuous() {
        let a = [0.4, 0.6, 0.1];
        let b = [0.7, 0.2, 0.9];
        let mut prev = blend_pair(0.0, a, b);
        for step in 1..=100 {
            let m = step as f32 / 100.0;
            let cur = blend_pair(m, a, b);
            for i in 0..3 {
                assert!(
                    (cur[i] - prev[i]).abs() < 0.05,
                    "discontinuity at m={m}: {:?} -> {:?}",
                    prev,
                    cur
                );
            }
            prev = cur;
        }
    }

    #[test]
    fn rotation_prescale_prevents_borders() {
        assert!((rotation_prescale(0.0) - 1.0).abs() < 1e-6);
        // 45 degrees needs the full sqrt(2) zoom.
        let s = rotation_prescale(std::f32::consts::FRAC_PI_4);
        assert!((s - std::f32::consts::SQRT_2).abs() < 1e-5);
        for i in 0..64 {
            let angle = i as f32 * 0.1;
            assert!(rotation_prescale(angle) >= 1.0 - 1e-6);
        }
    }

    #[test]
    fn curve_warp_identity_below_threshold() {
        assert_eq!(curve_warp(0.37, 0.5, 0.0), 0.37);
        assert_ne!(curve_warp(0.37, 0.5, 0.8), 0.37);
        for i in 0..50 {
            let x = i as f32 / 50.0;
            let w = curve_warp(x, -0.7, 0.9);
            assert!((0.0..1.0).contains(&w));
        }
    }

    #[test]
    fn ratio_warp_is_visual_only() {
        // ratio = compress is identity on [0,1).
        assert!((ratio_warp(0.25, RATIO_COMPRESS) - 0.25).abs() < 1e-6);
        // Other ratios rescale the coordinate, wrapped into [0,1).
        let w = ratio_warp(0.9, 6.0);
        assert!((w - 0.8).abs() < 1e-5);
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [1.0, 0.0, 0.0]);
        let g = hsv_to_rgb(1.0 / 3.0, 1.0, 1.0);
        assert!(g[1] > 0.99 && g[0] < 0.01 && g[2] < 0.01);
        let b = hsv_to_rgb(2.0 / 3.0, 1.0, 1.0);
        assert!(b[2] > 0.99 && b[0] < 0.01 && b[1] < 0.01);
    }
}
