//! Frame assembly: RGBA sample in, immutable [`Frame`] out.

use super::{LuminanceMap, Quantizer, RgbaSample, ToneCurve, pack_rgba};
use crate::schema::{
    ColorDepth, ColorMode, ConfigError, ConversionConfig, Frame, FrameError, FrameStyle, NO_COLOR,
    RenderMode,
};

/// Errors raised while turning a sample into a frame.
#[derive(Debug, thiserror::Error)]
pub enum AssembleError {
    #[error("Sample must be non-empty (got {width}x{height})")]
    EmptySample { width: usize, height: usize },
    #[error("Sample buffer has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Converts samples to frames for one fixed configuration.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    config: ConversionConfig,
    palette: Vec<char>,
    quantizer: Quantizer,
}

impl FrameAssembler {
    /// Create an assembler, validating `config`.
    pub fn new(config: ConversionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let palette = config.palette();
        let quantizer = Quantizer::new(config.mode, palette.len(), config.threshold);
        Ok(Self {
            config,
            palette,
            quantizer,
        })
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn palette(&self) -> &[char] {
        &self.palette
    }

    /// Quantize one sample.
    ///
    /// The tone table is rebuilt per call so live config edits between frames
    /// are picked up by constructing a new assembler.
    pub fn assemble(&self, sample: &RgbaSample<'_>) -> Result<Frame, AssembleError> {
        let curve = ToneCurve::new(&self.config.tone);
        let mut lum = LuminanceMap::analyze(sample, &curve);
        if self.config.tone.auto_level {
            lum.equalize();
        }

        let (cols, rows) = self.quantizer.grid_size(&lum);
        let indices = self.quantizer.quantize(&lum);
        let colors = match self.config.color_mode {
            ColorMode::Color => Some(color_grid(
                sample,
                &curve,
                self.config.mode,
                self.config.color_depth,
                cols,
                rows,
            )),
            ColorMode::Mono | ColorMode::Rainbow => None,
        };

        let style = FrameStyle {
            mode: self.config.mode,
            color_mode: self.config.color_mode,
            color_depth: self.config.color_depth,
            char_size: self.config.char_size,
            resolution: self.config.resolution,
        };
        Ok(Frame::new(
            cols,
            rows,
            self.palette.clone(),
            indices,
            colors,
            style,
        )?)
    }

    /// Quantize a raw RGBA8 buffer.
    pub fn assemble_rgba(
        &self,
        width: usize,
        height: usize,
        data: &[u8],
    ) -> Result<Frame, AssembleError> {
        let sample = RgbaSample::new(width, height, data)?;
        self.assemble(&sample)
    }

    /// Resample a full-size source to the configured grid, then quantize.
    pub fn convert_source(
        &self,
        width: usize,
        height: usize,
        data: &[u8],
    ) -> Result<Frame, AssembleError> {
        let source = RgbaSample::new(width, height, data)?;
        let (sample_w, sample_h) = self.config.sample_size(width as u32, height as u32);
        let resized = source.resize_nearest(sample_w, sample_h);
        self.assemble_rgba(sample_w, sample_h, &resized)
    }
}

#[inline]
fn adjusted(curve: &ToneCurve, [r, g, b, a]: [u8; 4]) -> [u8; 4] {
    [curve.channel_u8(r), curve.channel_u8(g), curve.channel_u8(b), a]
}

/// Packed colors of the tone-adjusted pixels, one per cell.
fn color_grid(
    sample: &RgbaSample<'_>,
    curve: &ToneCurve,
    mode: RenderMode,
    depth: ColorDepth,
    cols: usize,
    rows: usize,
) -> Vec<i32> {
    let mut colors = Vec::with_capacity(cols * rows);
    for y in 0..rows {
        for x in 0..cols {
            let code = match mode {
                RenderMode::Block => {
                    let top = adjusted(curve, sample.pixel(x, y * 2));
                    let bottom = (y * 2 + 1 < sample.height())
                        .then(|| adjusted(curve, sample.pixel(x, y * 2 + 1)));
                    block_color(top, bottom, depth)
                }
                _ => pack_rgba(adjusted(curve, sample.pixel(x, y)), depth),
            };
            colors.push(code);
        }
    }
    colors
}

/// Mean of the opaque pixels in a block pair.
fn block_color(top: [u8; 4], bottom: Option<[u8; 4]>, depth: ColorDepth) -> i32 {
    let opaque: Vec<[u8; 4]> = std::iter::once(top)
        .chain(bottom)
        .filter(|p| p[3] != 0)
        .collect();
    if opaque.is_empty() {
        return NO_COLOR;
    }
    let n = opaque.len() as u32;
    let mean = |c: usize| (opaque.iter().map(|p| p[c] as u32).sum::<u32>() / n) as u8;
    pack_rgba([mean(0), mean(1), mean(2), 255], depth)
}
