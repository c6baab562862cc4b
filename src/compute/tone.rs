//! Tone adjustment and luminance analysis.
//!
//! Each channel goes through exposure, brightness, gamma and contrast in that
//! fixed order. The transform is baked into a 256-entry table once per frame,
//! and luminance plus its histogram come out of a single pass over the sample.

use super::RgbaSample;
use crate::schema::ToneConfig;

/// ITU-R BT.709 luma weights.
pub const LUMA_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Apply the tone transform to one 8-bit channel value. Output is in [0, 255].
#[inline]
pub fn adjust_channel(value: u8, config: &ToneConfig) -> f32 {
    let mut v = value as f32 / 255.0;
    v *= config.exposure;
    v += config.brightness / 100.0;
    v = v.max(0.0).powf(1.0 / config.gamma);
    v = (v - 0.5) * (1.0 + config.contrast / 100.0) + 0.5;
    v.clamp(0.0, 1.0) * 255.0
}

/// Precomputed per-channel tone table.
#[derive(Debug, Clone)]
pub struct ToneCurve {
    lut: [f32; 256],
    inverted: bool,
}

impl ToneCurve {
    /// Build the table for `config`.
    pub fn new(config: &ToneConfig) -> Self {
        let mut lut = [0.0f32; 256];
        for (i, slot) in lut.iter_mut().enumerate() {
            *slot = adjust_channel(i as u8, config);
        }
        Self {
            lut,
            inverted: config.inverted,
        }
    }

    /// Adjusted channel value.
    #[inline]
    pub fn channel(&self, value: u8) -> f32 {
        self.lut[value as usize]
    }

    /// Adjusted channel value rounded back to 8 bits.
    #[inline]
    pub fn channel_u8(&self, value: u8) -> u8 {
        self.lut[value as usize].round() as u8
    }

    /// BT.709 luminance of the adjusted channels, inverted if configured.
    #[inline]
    pub fn luminance(&self, r: u8, g: u8, b: u8) -> f32 {
        let l = LUMA_WEIGHTS[0] * self.channel(r)
            + LUMA_WEIGHTS[1] * self.channel(g)
            + LUMA_WEIGHTS[2] * self.channel(b);
        if self.inverted { 255.0 - l } else { l }
    }
}

/// Histogram bin for a luminance value.
#[inline]
pub fn luminance_bin(lum: f32) -> usize {
    if lum.is_nan() {
        return 0;
    }
    (lum.floor() as i32).clamp(0, 255) as usize
}

/// Per-pixel luminance of a sample with its 256-bin histogram.
#[derive(Debug, Clone)]
pub struct LuminanceMap {
    /// Sample width in pixels.
    pub width: usize,
    /// Sample height in pixels.
    pub height: usize,
    /// Row-major luminance in [0, 255].
    pub values: Vec<f32>,
    /// Count of pixels per `floor(luminance)` bin.
    pub histogram: [u32; 256],
}

impl LuminanceMap {
    /// Compute luminance and histogram in one pass.
    pub fn analyze(sample: &RgbaSample<'_>, curve: &ToneCurve) -> Self {
        let mut histogram = [0u32; 256];
        let values = sample
            .pixels()
            .map(|[r, g, b, _]| {
                let lum = curve.luminance(r, g, b);
                histogram[luminance_bin(lum)] += 1;
                lum
            })
            .collect();

        Self {
            width: sample.width(),
            height: sample.height(),
            values,
            histogram,
        }
    }

    /// Luminance at `(x, y)`.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.values[y * self.width + x]
    }

    /// Replace every value by its histogram-equalized level.
    pub fn equalize(&mut self) {
        let map = equalization_map(&self.histogram);
        let mut histogram = [0u32; 256];
        for v in self.values.iter_mut() {
            let level = map[luminance_bin(*v)];
            histogram[level as usize] += 1;
            *v = level as f32;
        }
        self.histogram = histogram;
    }
}

/// Histogram-equalization lookup: `round((cdf - cdf_min) / (total - cdf_min) * 255)`.
///
/// Falls back to the identity map when the image has a single level.
pub fn equalization_map(histogram: &[u32; 256]) -> [u8; 256] {
    let mut map = [0u8; 256];
    let mut cdf = [0u64; 256];
    let mut running = 0u64;
    for (c, &h) in cdf.iter_mut().zip(histogram.iter()) {
        running += h as u64;
        *c = running;
    }
    let total = running;
    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let range = total.saturating_sub(cdf_min);

    if range == 0 {
        for (i, m) in map.iter_mut().enumerate() {
            *m = i as u8;
        }
        return map;
    }

    for (m, &c) in map.iter_mut().zip(cdf.iter()) {
        let scaled = c.saturating_sub(cdf_min) as f64 / range as f64 * 255.0;
        *m = scaled.round().clamp(0.0, 255.0) as u8;
    }
    map
}
