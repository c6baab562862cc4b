//! Borrowed RGBA sample handed over by the sampler.

use super::AssembleError;

/// Read-only view over a tightly packed RGBA8 buffer.
///
/// The sampler owns the storage and may reuse it on the next tick; nothing
/// derived from a sample keeps a reference to it.
#[derive(Debug, Clone, Copy)]
pub struct RgbaSample<'a> {
    width: usize,
    height: usize,
    data: &'a [u8],
}

impl<'a> RgbaSample<'a> {
    /// Wrap `data`, which must hold exactly `width * height * 4` bytes.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Result<Self, AssembleError> {
        if width == 0 || height == 0 {
            return Err(AssembleError::EmptySample { width, height });
        }
        let expected = width * height * 4;
        if data.len() != expected {
            return Err(AssembleError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// RGBA at `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
        let i = (y * self.width + x) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Iterate pixels row-major.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.data.chunks_exact(4).map(|p| [p[0], p[1], p[2], p[3]])
    }

    /// Nearest-neighbour resample into a new `width * height` buffer.
    pub fn resize_nearest(&self, width: usize, height: usize) -> Vec<u8> {
        rgba_from_fn(width, height, |x, y| {
            let sx = (x * self.width / width.max(1)).min(self.width - 1);
            let sy = (y * self.height / height.max(1)).min(self.height - 1);
            self.pixel(sx, sy)
        })
    }
}

/// Fill an RGBA8 buffer from a per-pixel function.
pub fn rgba_from_fn(
    width: usize,
    height: usize,
    mut f: impl FnMut(usize, usize) -> [u8; 4],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&f(x, y));
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_size_checked() {
        let data = vec![0u8; 2 * 3 * 4];
        assert!(RgbaSample::new(2, 3, &data).is_ok());
        assert!(matches!(
            RgbaSample::new(3, 3, &data),
            Err(AssembleError::BufferSize {
                expected: 36,
                actual: 24
            })
        ));
        assert!(matches!(
            RgbaSample::new(0, 3, &data),
            Err(AssembleError::EmptySample { .. })
        ));
    }

    #[test]
    fn test_pixel_addressing() {
        let data = rgba_from_fn(3, 2, |x, y| [x as u8, y as u8, 7, 255]);
        let sample = RgbaSample::new(3, 2, &data).unwrap();
        assert_eq!(sample.pixel(2, 1), [2, 1, 7, 255]);
        assert_eq!(sample.pixels().count(), 6);
    }

    #[test]
    fn test_resize_nearest() {
        let data = rgba_from_fn(4, 4, |x, y| [x as u8, y as u8, 0, 255]);
        let sample = RgbaSample::new(4, 4, &data).unwrap();
        let small = sample.resize_nearest(2, 1);
        assert_eq!(small, vec![0, 0, 0, 255, 2, 0, 0, 255]);
        assert_eq!(sample.resize_nearest(4, 4), data);
    }
}
