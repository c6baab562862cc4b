//! Luminance to palette-index quantization.
//!
//! Standard geometry maps one sample pixel to one cell; block geometry folds
//! two vertically adjacent pixels into one half-block glyph. The row kernel is
//! chosen once per frame from the [`RenderMode`].

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

use super::LuminanceMap;
use crate::schema::RenderMode;

/// 4x4 ordered-dither threshold matrix, indexed `[y % 4][x % 4]`.
pub const BAYER_4X4: [[u8; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

/// Half-block palette: both off, top on, bottom on, both on.
pub const BLOCK_PALETTE: [char; 4] = [' ', '\u{2580}', '\u{2584}', '\u{2588}'];

/// A block half is lit when its luminance exceeds this value.
pub const BLOCK_THRESHOLD: f32 = 127.5;

/// Default binary threshold.
pub const DEFAULT_THRESHOLD: f32 = 128.0;

/// Bayer matrix entry for a cell position.
#[inline]
pub fn bayer(x: usize, y: usize) -> u8 {
    BAYER_4X4[y % 4][x % 4]
}

#[inline]
fn clamp_luminance(lum: f32) -> f32 {
    if lum.is_nan() { 0.0 } else { lum.clamp(0.0, 255.0) }
}

#[inline]
fn clamp_index(v: f32, palette_size: usize) -> u32 {
    (v.floor() as i64).clamp(0, palette_size as i64 - 1) as u32
}

/// Grayscale: `floor(lum / 256 * n)`.
#[inline]
pub fn grayscale_index(lum: f32, palette_size: usize) -> u32 {
    if palette_size <= 1 {
        return 0;
    }
    clamp_index(clamp_luminance(lum) / 256.0 * palette_size as f32, palette_size)
}

/// Ordered dither: grayscale shifted by a Bayer bias of `(b + 0.5) / 16` palette steps.
#[inline]
pub fn dither_index(lum: f32, x: usize, y: usize, palette_size: usize) -> u32 {
    if palette_size <= 1 {
        return 0;
    }
    let n = palette_size as f32;
    let bias = (bayer(x, y) as f32 + 0.5) / 16.0 / n;
    clamp_index((clamp_luminance(lum) / 256.0 + bias) * n, palette_size)
}

/// One-bit: luminance jittered by `±16` from the Bayer matrix, compared to `threshold`.
#[inline]
pub fn binary_index(lum: f32, x: usize, y: usize, threshold: f32) -> u32 {
    let jitter = (bayer(x, y) as f32 / 16.0 - 0.5) * 32.0;
    (clamp_luminance(lum) + jitter >= threshold) as u32
}

/// Half-block symbol for a pixel pair; a missing bottom pixel counts as off.
#[inline]
pub fn block_index(top: f32, bottom: Option<f32>) -> u32 {
    let top_on = clamp_luminance(top) > BLOCK_THRESHOLD;
    let bottom_on = bottom.is_some_and(|b| clamp_luminance(b) > BLOCK_THRESHOLD);
    top_on as u32 | (bottom_on as u32) << 1
}

type RowKernel = fn(&Quantizer, &LuminanceMap, usize, &mut [u32]);

/// Per-frame quantizer for one mode and palette.
#[derive(Debug, Clone, Copy)]
pub struct Quantizer {
    mode: RenderMode,
    palette_size: usize,
    threshold: f32,
}

impl Quantizer {
    pub fn new(mode: RenderMode, palette_size: usize, threshold: f32) -> Self {
        let palette_size = match mode {
            RenderMode::Grayscale | RenderMode::Dither => palette_size.max(1),
            RenderMode::Binary => 2,
            RenderMode::Block => BLOCK_PALETTE.len(),
        };
        Self {
            mode,
            palette_size,
            threshold,
        }
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn palette_size(&self) -> usize {
        self.palette_size
    }

    /// Grid `(columns, rows)` produced from a luminance map.
    pub fn grid_size(&self, lum: &LuminanceMap) -> (usize, usize) {
        (lum.width, self.mode.grid_rows(lum.height))
    }

    /// Quantize a whole map into row-major palette indices.
    pub fn quantize(&self, lum: &LuminanceMap) -> Vec<u32> {
        let (cols, rows) = self.grid_size(lum);
        let mut out = vec![0u32; cols * rows];
        if cols == 0 {
            return out;
        }
        let kernel = self.row_kernel();

        #[cfg(not(target_arch = "wasm32"))]
        out.par_chunks_mut(cols)
            .enumerate()
            .for_each(|(y, row)| kernel(self, lum, y, row));

        #[cfg(target_arch = "wasm32")]
        out.chunks_mut(cols)
            .enumerate()
            .for_each(|(y, row)| kernel(self, lum, y, row));

        out
    }

    fn row_kernel(&self) -> RowKernel {
        match self.mode {
            RenderMode::Grayscale => grayscale_row,
            RenderMode::Dither => dither_row,
            RenderMode::Binary => binary_row,
            RenderMode::Block => block_row,
        }
    }
}

fn grayscale_row(q: &Quantizer, lum: &LuminanceMap, y: usize, out: &mut [u32]) {
    for (x, o) in out.iter_mut().enumerate() {
        *o = grayscale_index(lum.get(x, y), q.palette_size);
    }
}

fn dither_row(q: &Quantizer, lum: &LuminanceMap, y: usize, out: &mut [u32]) {
    for (x, o) in out.iter_mut().enumerate() {
        *o = dither_index(lum.get(x, y), x, y, q.palette_size);
    }
}

fn binary_row(q: &Quantizer, lum: &LuminanceMap, y: usize, out: &mut [u32]) {
    for (x, o) in out.iter_mut().enumerate() {
        *o = binary_index(lum.get(x, y), x, y, q.threshold);
    }
}

fn block_row(_q: &Quantizer, lum: &LuminanceMap, y: usize, out: &mut [u32]) {
    let top_y = y * 2;
    let bottom_y = top_y + 1;
    for (x, o) in out.iter_mut().enumerate() {
        let bottom = (bottom_y < lum.height).then(|| lum.get(x, bottom_y));
        *o = block_index(lum.get(x, top_y), bottom);
    }
}
