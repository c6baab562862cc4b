//! Packed color codes at 4, 8, 12 and 24 bits.
//!
//! | depth | R | G | B |
//! |-------|---|---|---|
//! | 4     | 1 | 2 | 1 |
//! | 8     | 3 | 3 | 2 |
//! | 12    | 4 | 4 | 4 |
//! | 24    | 8 | 8 | 8 |
//!
//! Fields are packed red-high: `(r << (g_bits + b_bits)) | (g << b_bits) | b`.

use crate::schema::{ColorDepth, NO_COLOR};

#[inline]
fn field_mask(bits: u32) -> i32 {
    (1i32 << bits) - 1
}

/// Width of one quantization bin for a field of `bits` bits.
#[inline]
pub fn quantization_step(bits: u32) -> u32 {
    1 << (8 - bits)
}

/// Pack an RGB triple at `depth`.
#[inline]
pub fn pack_rgb(r: u8, g: u8, b: u8, depth: ColorDepth) -> i32 {
    let [rb, gb, bb] = depth.channel_bits();
    let rq = (r >> (8 - rb)) as i32;
    let gq = (g >> (8 - gb)) as i32;
    let bq = (b >> (8 - bb)) as i32;
    (rq << (gb + bb)) | (gq << bb) | bq
}

/// Rescale a quantized field back to 8 bits with the step `255 / (2^bits - 1)`.
#[inline]
fn expand_field(q: i32, bits: u32) -> u8 {
    if bits >= 8 {
        return q as u8;
    }
    let max = field_mask(bits);
    ((q * 255 + max / 2) / max) as u8
}

/// Unpack a code produced by [`pack_rgb`]. Returns `None` for [`NO_COLOR`] or other negatives.
///
/// The result always lies inside the bin the original channel was quantized to.
#[inline]
pub fn unpack_rgb(code: i32, depth: ColorDepth) -> Option<[u8; 3]> {
    if code < 0 {
        return None;
    }
    let [rb, gb, bb] = depth.channel_bits();
    let bq = code & field_mask(bb);
    let gq = (code >> bb) & field_mask(gb);
    let rq = (code >> (gb + bb)) & field_mask(rb);
    Some([
        expand_field(rq, rb),
        expand_field(gq, gb),
        expand_field(bq, bb),
    ])
}

/// Pack an RGBA pixel, mapping fully transparent pixels to [`NO_COLOR`].
#[inline]
pub fn pack_rgba(pixel: [u8; 4], depth: ColorDepth) -> i32 {
    if pixel[3] == 0 {
        NO_COLOR
    } else {
        pack_rgb(pixel[0], pixel[1], pixel[2], depth)
    }
}

/// Position-derived color for rainbow mode, which stores no colors.
///
/// Hue sweeps diagonally across the grid and rotates with `phase` (in turns).
pub fn rainbow_rgb(x: usize, y: usize, width: usize, height: usize, phase: f32) -> [u8; 3] {
    let u = x as f32 / width.max(1) as f32;
    let v = y as f32 / height.max(1) as f32;
    let hue = ((u + v) * 0.5 + phase).rem_euclid(1.0);
    hsv_to_rgb(hue * 360.0, 1.0, 1.0)
}

/// HSV (hue in degrees) to 8-bit RGB.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let c = v * s;
    let hp = h.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r, g, b) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    [
        ((r + m) * 255.0).round() as u8,
        ((g + m) * 255.0).round() as u8,
        ((b + m) * 255.0).round() as u8,
    ]
}
