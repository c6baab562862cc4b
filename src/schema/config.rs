//! Configuration types for image-to-grid conversion and temporal encoding.

use serde::{Deserialize, Serialize};

use super::{ColorDepth, ColorMode, DEFAULT_CHAR_SIZE, RenderMode};
use crate::compute::BLOCK_PALETTE;

/// Default density ramp, darkest to brightest.
pub const DEFAULT_CHARSET: &str = " .:-=+*#%@";

/// Default off/on symbols for binary mode.
pub const DEFAULT_BINARY_CHARS: &str = " #";

/// Default keyframe interval for the temporal encoder.
pub const DEFAULT_KEYFRAME_INTERVAL: u32 = 30;

/// Tone curve applied to every channel before quantization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    /// Linear gain applied to the normalized channel.
    pub exposure: f32,
    /// Offset in percent of full scale (-100..100).
    pub brightness: f32,
    /// Gamma; the channel is raised to `1/gamma`.
    pub gamma: f32,
    /// Contrast in percent around mid-gray.
    pub contrast: f32,
    /// Invert luminance after weighting.
    pub inverted: bool,
    /// Histogram-equalize luminance before quantization.
    pub auto_level: bool,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            brightness: 0.0,
            gamma: 1.0,
            contrast: 0.0,
            inverted: false,
            auto_level: false,
        }
    }
}

/// Top-level conversion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Quantization mode.
    pub mode: RenderMode,
    /// Color storage mode.
    pub color_mode: ColorMode,
    /// Packed color depth (used when `color_mode` is `color`).
    pub color_depth: ColorDepth,
    /// Palette for grayscale and dither modes, darkest first.
    pub charset: String,
    /// Exactly two symbols (off, on) for binary mode.
    pub binary_chars: String,
    /// Luminance threshold for binary mode.
    pub threshold: f32,
    /// Grid width in columns.
    pub resolution: u32,
    /// Cell size hint stored in frames.
    pub char_size: f32,
    /// Cell width divided by cell height, used to derive the row count.
    pub char_aspect: f32,
    /// Tone curve.
    pub tone: ToneConfig,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::Grayscale,
            color_mode: ColorMode::Mono,
            color_depth: ColorDepth::TwentyFour,
            charset: DEFAULT_CHARSET.to_string(),
            binary_chars: DEFAULT_BINARY_CHARS.to_string(),
            threshold: 128.0,
            resolution: 80,
            char_size: DEFAULT_CHAR_SIZE,
            char_aspect: 0.5,
            tone: ToneConfig::default(),
        }
    }
}

impl ConversionConfig {
    /// Symbols the active mode indexes into.
    pub fn palette(&self) -> Vec<char> {
        match self.mode {
            RenderMode::Grayscale | RenderMode::Dither => self.charset.chars().collect(),
            RenderMode::Binary => self.binary_chars.chars().collect(),
            RenderMode::Block => BLOCK_PALETTE.to_vec(),
        }
    }

    /// Grid `(columns, rows)` for a source of the given pixel size.
    ///
    /// Rows are scaled by `char_aspect` so cells keep the source proportions.
    pub fn grid_size(&self, source_width: u32, source_height: u32) -> (usize, usize) {
        let cols = self.resolution.max(1) as usize;
        if source_width == 0 || source_height == 0 {
            return (cols, 1);
        }
        let rows = (cols as f32 * source_height as f32 / source_width as f32 * self.char_aspect)
            .round()
            .max(1.0) as usize;
        (cols, rows)
    }

    /// Sample `(width, height)` in pixels the sampler must deliver for a source.
    pub fn sample_size(&self, source_width: u32, source_height: u32) -> (usize, usize) {
        let (cols, rows) = self.grid_size(source_width, source_height);
        (cols, self.mode.sample_rows(rows))
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.charset.chars().next().is_none() {
            return Err(ConfigError::EmptyCharset);
        }
        let binary = self.binary_chars.chars().count();
        if binary != 2 {
            return Err(ConfigError::InvalidBinaryChars(binary));
        }
        if self.resolution == 0 {
            return Err(ConfigError::InvalidResolution);
        }
        if !(self.char_aspect > 0.0) {
            return Err(ConfigError::InvalidCharAspect(self.char_aspect));
        }
        if !self.threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        self.tone.validate()
    }
}

impl ToneConfig {
    /// Validate tone parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.gamma > 0.0) || !self.gamma.is_finite() {
            return Err(ConfigError::InvalidGamma(self.gamma));
        }
        if !(self.exposure >= 0.0) || !self.exposure.is_finite() {
            return Err(ConfigError::InvalidExposure(self.exposure));
        }
        if !self.brightness.is_finite() || !self.contrast.is_finite() {
            return Err(ConfigError::NonFiniteTone);
        }
        Ok(())
    }
}

/// Temporal encoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Emit a keyframe after this many consecutive deltas. 0 makes every frame a keyframe.
    pub keyframe_interval: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            keyframe_interval: DEFAULT_KEYFRAME_INTERVAL,
        }
    }
}

/// Conversion and encoder settings read together from one JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub conversion: ConversionConfig,
    pub encoder: EncoderConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.conversion.validate()
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Charset must contain at least one symbol")]
    EmptyCharset,
    #[error("Binary mode needs exactly 2 symbols, got {0}")]
    InvalidBinaryChars(usize),
    #[error("Resolution must be non-zero")]
    InvalidResolution,
    #[error("Character aspect must be positive, got {0}")]
    InvalidCharAspect(f32),
    #[error("Binary threshold must be finite, got {0}")]
    InvalidThreshold(f32),
    #[error("Gamma must be positive, got {0}")]
    InvalidGamma(f32),
    #[error("Exposure must be non-negative, got {0}")]
    InvalidExposure(f32),
    #[error("Brightness and contrast must be finite")]
    NonFiniteTone,
}
