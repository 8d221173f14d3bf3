//! CPU reference of the channel pass
//!
//! A pixel-exact mirror of `shaders/channel.wgsl` built on `math`, used to
//! validate the pipeline without a GPU: the voltage-normalization pixel
//! values and the audio-texture layout contract are both checked against
//! this implementation.

use vav_core::Sample;

use crate::math::{curve_warp, hsv_to_rgb, hue_from_freq, ratio_warp, scheme_offset_sat, voltage_normalize};
use crate::multiverse::AudioWindow;

/// Per-channel inputs of the reference pass.
#[derive(Debug, Clone, Copy)]
pub struct ChannelRef {
    pub intensity: Sample,
    pub curve: Sample,
    pub ratio: Sample,
    pub frequency: Sample,
    pub color_scheme: Sample,
    pub base_hue: Sample,
}

impl Default for ChannelRef {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            curve: 0.0,
            ratio: 3.0,
            frequency: vav_core::HUE_REF_FREQ,
            color_scheme: 0.0,
            base_hue: 0.0,
        }
    }
}

/// Render one channel's waveform field to RGB floats, row-major.
pub fn render_channel(
    audio: &AudioWindow,
    ch: usize,
    params: &ChannelRef,
    width: usize,
    height: usize,
) -> Vec<[Sample; 3]> {
    let row = audio.row(ch);
    let mut out = Vec::with_capacity(width * height);
    for py in 0..height {
        for px in 0..width {
            let uv_x = (px as Sample + 0.5) / width as Sample;
            let uv_y = (py as Sample + 0.5) / height as Sample;
            let y_from_center = (uv_y - 0.5) * 2.0;

            let x_sample = curve_warp(uv_x, y_from_center, params.curve);
            let x_sample = ratio_warp(x_sample, params.ratio);

            let xi = ((x_sample.clamp(0.0, 0.999_999) * row.len() as Sample) as usize)
                .min(row.len() - 1);
            let w = row[xi];

            let n = voltage_normalize(w, params.intensity);
            let hue = hue_from_freq(params.frequency);
            let (offset, sat) = scheme_offset_sat(params.color_scheme);
            out.push(hsv_to_rgb(hue + params.base_hue + offset, sat, n));
        }
    }
    out
}

/// Luminance variance along rows vs along columns of an RGB field.
///
/// A correctly uploaded channel-major audio texture renders each scanline
/// from one channel, so brightness varies slowly along x. A transposed
/// upload interleaves all four channels along x and shows up as high
/// along-row variance. Returns `(along_row, along_column)`.
pub fn stripe_variance(pixels: &[[Sample; 3]], width: usize, height: usize) -> (Sample, Sample) {
    let luma = |p: &[Sample; 3]| 0.2126 * p[0] + 0.7152 * p[1] + 0.0722 * p[2];

    let mut along_row = 0.0;
    for y in 0..height {
        let row = &pixels[y * width..(y + 1) * width];
        along_row += variance(row.iter().map(luma));
    }

    let mut along_col = 0.0;
    for x in 0..width {
        along_col += variance((0..height).map(|y| luma(&pixels[y * width + x])));
    }

    (along_row / height as Sample, along_col / width as Sample)
}

fn variance(values: impl Iterator<Item = Sample> + Clone) -> Sample {
    let n = values.clone().count().max(1) as Sample;
    let mean = values.clone().sum::<Sample>() / n;
    values.map(|v| (v - mean) * (v - mean)).sum::<Sample>() / n
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Four channels with distinct DC voltages.
    fn dc_window(width: usize) -> AudioWindow {
        let mut win = AudioWindow::new(width);
        for ch in 0..4 {
            let volts = [5.0, -5.0, 2.5, -2.5][ch];
            win.fill_channel(ch, &vec![volts; width]);
        }
        win
    }

    #[test]
    fn five_volts_renders_exact_normalization() {
        // +5 V at intensity 1 and hue 0 (red palette, full saturation)
        // must produce a red value of exactly (5+10)*0.05 = 0.75. The
        // folded |w|*0.14 variant would give 0.7; the two are far apart.
        let win = dc_window(64);
        let params = ChannelRef::default();
        let pixels = render_channel(&win, 0, &params, 16, 16);
        for p in &pixels {
            assert!((p[0] - 0.75).abs() < 1e-6, "red = {}", p[0]);
            assert!((p[0] - 0.7).abs() > 0.01, "indistinguishable from the folded variant");
        }
    }

    #[test]
    fn negative_voltage_darkens_not_folds() {
        // -5 V maps to 0.25; a folded (absolute-value) mapping would
        // brighten it to the same level as +5 V.
        let win = dc_window(64);
        let params = ChannelRef::default();
        let pixels = render_channel(&win, 1, &params, 8, 8);
        for p in &pixels {
            assert!((p[0] - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn transposed_upload_is_detectable() {
        let width = 64;
        let correct = dc_window(width);

        // Simulate the forbidden upload: the same per-channel values laid
        // out sample-major, then reinterpreted as channel rows.
        let mut transposed = AudioWindow::new(width);
        for ch in 0..4 {
            let row: Vec<f32> = (0..width)
                .map(|x| {
                    let flat = ch * width + x;
                    [5.0, -5.0, 2.5, -2.5][flat % 4]
                })
                .collect();
            transposed.fill_channel(ch, &row);
        }

        let params = ChannelRef::default();
        let good = render_channel(&correct, 0, &params, 32, 32);
        let bad = render_channel(&transposed, 0, &params, 32, 32);

        let (good_row_var, _) = stripe_variance(&good, 32, 32);
        let (bad_row_var, _) = stripe_variance(&bad, 32, 32);

        // The correct layout renders a flat field; the transposed one
        // shows interleave stripes along every scanline.
        assert!(good_row_var < 1e-9, "flat field has variance {good_row_var}");
        assert!(bad_row_var > 1e-3, "stripes undetected: {bad_row_var}");
    }

    #[test]
    fn curve_bends_the_field() {
        let mut win = AudioWindow::new(64);
        // A ramp so warped coordinates change the sampled value.
        let ramp: Vec<f32> = (0..64).map(|i| i as f32 / 63.0 * 10.0 - 5.0).collect();
        win.fill_channel(0, &ramp);

        let flat = ChannelRef::default();
        let bent = ChannelRef {
            curve: 0.8,
            ..ChannelRef::default()
        };
        let a = render_channel(&win, 0, &flat, 16, 16);
        let b = render_channel(&win, 0, &bent, 16, 16);
        assert_ne!(a, b);
    }
}
