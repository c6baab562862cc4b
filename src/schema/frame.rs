//! Frame types: the character grid produced for one sampled moment.
//!
//! A [`Frame`] pairs a grid of palette indices with an optional grid of packed
//! color codes. Frames are immutable once assembled; only the decoder patches
//! its own reconstructed copy in place.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sentinel stored in `colors` for cells that carry no color.
pub const NO_COLOR: i32 = -1;

/// Default cell size hint written into frames.
pub const DEFAULT_CHAR_SIZE: f32 = 10.0;

/// Quantization mode used to pick a palette index per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Luminance mapped linearly onto the charset.
    #[default]
    Grayscale,
    /// Grayscale with 4x4 ordered (Bayer) dithering.
    Dither,
    /// One-bit output over two configured symbols.
    Binary,
    /// Two vertical pixels per cell, rendered with half-block glyphs.
    Block,
}

impl RenderMode {
    /// Number of sample rows needed to produce `rows` grid rows.
    #[inline]
    pub fn sample_rows(self, rows: usize) -> usize {
        match self {
            RenderMode::Block => rows * 2,
            _ => rows,
        }
    }

    /// Number of grid rows produced from `sample_rows` sample rows.
    #[inline]
    pub fn grid_rows(self, sample_rows: usize) -> usize {
        match self {
            RenderMode::Block => sample_rows.div_ceil(2),
            _ => sample_rows,
        }
    }
}

/// How cell colors are carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Each cell stores a packed color code.
    Color,
    /// No stored color; renderer uses its foreground color.
    #[default]
    Mono,
    /// No stored color; renderer derives a hue from the cell position.
    Rainbow,
}

/// Bit depth of packed color codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ColorDepth {
    /// 1-2-1 bits.
    Four,
    /// 3-3-2 bits.
    Eight,
    /// 4-4-4 bits.
    Twelve,
    /// 8-8-8 bits.
    #[default]
    TwentyFour,
}

impl ColorDepth {
    /// Total bits per packed code.
    pub const fn bits(self) -> u8 {
        match self {
            ColorDepth::Four => 4,
            ColorDepth::Eight => 8,
            ColorDepth::Twelve => 12,
            ColorDepth::TwentyFour => 24,
        }
    }

    /// Bits for the red, green and blue fields.
    pub const fn channel_bits(self) -> [u32; 3] {
        match self {
            ColorDepth::Four => [1, 2, 1],
            ColorDepth::Eight => [3, 3, 2],
            ColorDepth::Twelve => [4, 4, 4],
            ColorDepth::TwentyFour => [8, 8, 8],
        }
    }
}

/// Error for a color depth outside {4, 8, 12, 24}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported color depth {0} (expected 4, 8, 12 or 24)")]
pub struct InvalidColorDepth(pub u8);

impl TryFrom<u8> for ColorDepth {
    type Error = InvalidColorDepth;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            4 => Ok(ColorDepth::Four),
            8 => Ok(ColorDepth::Eight),
            12 => Ok(ColorDepth::Twelve),
            24 => Ok(ColorDepth::TwentyFour),
            other => Err(InvalidColorDepth(other)),
        }
    }
}

impl From<ColorDepth> for u8 {
    fn from(depth: ColorDepth) -> u8 {
        depth.bits()
    }
}

/// Rendering attributes shared by every cell of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStyle {
    pub mode: RenderMode,
    pub color_mode: ColorMode,
    pub color_depth: ColorDepth,
    /// Cell size hint for renderers; unused by the codec.
    pub char_size: f32,
    /// Column count the frame was sampled at.
    pub resolution: u32,
}

impl Default for FrameStyle {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            color_mode: ColorMode::default(),
            color_depth: ColorDepth::default(),
            char_size: DEFAULT_CHAR_SIZE,
            resolution: 0,
        }
    }
}

/// Frame construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Frame dimensions must be non-zero (got {width}x{height})")]
    ZeroDimensions { width: usize, height: usize },
    #[error("Frame of {width}x{height} cells is too large")]
    TooLarge { width: usize, height: usize },
    #[error("Frame charset must contain at least one symbol")]
    EmptyCharset,
    #[error("Frame {field} has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Cell {cell} uses palette index {index} but charset has {charset_len} symbols")]
    IndexOutOfRange {
        cell: usize,
        index: u32,
        charset_len: usize,
    },
}

/// One character-grid frame.
///
/// Cells are stored row-major: cell `(x, y)` lives at `y * width + x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    char_indices: Vec<u32>,
    colors: Option<Vec<i32>>,
    charset: Vec<char>,
    style: FrameStyle,
}

impl Frame {
    /// Build a frame, checking grid lengths and palette bounds.
    pub fn new(
        width: usize,
        height: usize,
        charset: Vec<char>,
        char_indices: Vec<u32>,
        colors: Option<Vec<i32>>,
        style: FrameStyle,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimensions { width, height });
        }
        if charset.is_empty() {
            return Err(FrameError::EmptyCharset);
        }
        // Text form adds a separator per row; both sizes must fit in usize.
        let cells = width
            .checked_mul(height)
            .filter(|_| width.checked_add(1).and_then(|w| w.checked_mul(height)).is_some())
            .ok_or(FrameError::TooLarge { width, height })?;
        if char_indices.len() != cells {
            return Err(FrameError::LengthMismatch {
                field: "charIndices",
                expected: cells,
                actual: char_indices.len(),
            });
        }
        if let Some(colors) = &colors
            && colors.len() != cells
        {
            return Err(FrameError::LengthMismatch {
                field: "colors",
                expected: cells,
                actual: colors.len(),
            });
        }
        if let Some((cell, &index)) = char_indices
            .iter()
            .enumerate()
            .find(|(_, i)| **i as usize >= charset.len())
        {
            return Err(FrameError::IndexOutOfRange {
                cell,
                index,
                charset_len: charset.len(),
            });
        }

        Ok(Self {
            width,
            height,
            char_indices,
            colors,
            charset,
            style,
        })
    }

    /// Grid width in cells.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// `(width, height)` in cells.
    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Total number of cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    pub fn char_indices(&self) -> &[u32] {
        &self.char_indices
    }

    pub fn colors(&self) -> Option<&[i32]> {
        self.colors.as_deref()
    }

    pub fn charset(&self) -> &[char] {
        &self.charset
    }

    pub fn style(&self) -> FrameStyle {
        self.style
    }

    pub fn mode(&self) -> RenderMode {
        self.style.mode
    }

    pub fn color_mode(&self) -> ColorMode {
        self.style.color_mode
    }

    pub fn color_depth(&self) -> ColorDepth {
        self.style.color_depth
    }

    pub fn char_size(&self) -> f32 {
        self.style.char_size
    }

    pub fn resolution(&self) -> u32 {
        self.style.resolution
    }

    /// Symbol at `(x, y)`.
    #[inline]
    pub fn char_at(&self, x: usize, y: usize) -> char {
        self.charset[self.char_indices[y * self.width + x] as usize]
    }

    /// Packed color at `(x, y)`, `None` when the frame carries no colors.
    #[inline]
    pub fn color_at(&self, x: usize, y: usize) -> Option<i32> {
        self.colors.as_ref().map(|c| c[y * self.width + x])
    }

    /// True when `other` can be expressed as a delta against `self`.
    ///
    /// Palette indices and color codes only mean the same thing across two
    /// frames when grid size, charset, mode and color layout all agree.
    pub fn same_layout(&self, other: &Frame) -> bool {
        self.dimensions() == other.dimensions()
            && self.charset == other.charset
            && self.style.mode == other.style.mode
            && self.style.color_depth == other.style.color_depth
            && self.colors.is_some() == other.colors.is_some()
    }

    /// Row-major text with a newline after every row.
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.cell_count() + self.height);
        for row in self.char_indices.chunks(self.width) {
            text.extend(row.iter().map(|&i| self.charset[i as usize]));
            text.push('\n');
        }
        text
    }

    /// Overwrite one palette index. Returns false if the cell or index is out of range.
    pub(crate) fn set_char_index(&mut self, cell: usize, index: u32) -> bool {
        if index as usize >= self.charset.len() {
            return false;
        }
        match self.char_indices.get_mut(cell) {
            Some(slot) => {
                *slot = index;
                true
            }
            None => false,
        }
    }

    /// Overwrite one color code. Returns false if the frame has no colors or the cell is out of range.
    pub(crate) fn set_color(&mut self, cell: usize, color: i32) -> bool {
        match self.colors.as_mut().and_then(|c| c.get_mut(cell)) {
            Some(slot) => {
                *slot = color;
                true
            }
            None => false,
        }
    }
}

/// Borrowed wire view used for serialization.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameRef<'a> {
    text: String,
    char_indices: &'a [u32],
    colors: Option<&'a [i32]>,
    width: usize,
    height: usize,
    char_size: f32,
    mode: RenderMode,
    color_depth: ColorDepth,
    color_mode: ColorMode,
    charset: String,
    resolution: u32,
}

/// Owned wire form; `text` is derived data and is ignored on load.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameWire {
    char_indices: Vec<u32>,
    #[serde(default)]
    colors: Option<Vec<i32>>,
    width: usize,
    height: usize,
    #[serde(default = "default_char_size")]
    char_size: f32,
    #[serde(default)]
    mode: RenderMode,
    #[serde(default)]
    color_depth: ColorDepth,
    #[serde(default)]
    color_mode: ColorMode,
    charset: String,
    #[serde(default)]
    resolution: u32,
}

fn default_char_size() -> f32 {
    DEFAULT_CHAR_SIZE
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FrameRef {
            text: self.text(),
            char_indices: &self.char_indices,
            colors: self.colors.as_deref(),
            width: self.width,
            height: self.height,
            char_size: self.style.char_size,
            mode: self.style.mode,
            color_depth: self.style.color_depth,
            color_mode: self.style.color_mode,
            charset: self.charset.iter().collect(),
            resolution: self.style.resolution,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Frame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = FrameWire::deserialize(deserializer)?;
        Frame::new(
            wire.width,
            wire.height,
            wire.charset.chars().collect(),
            wire.char_indices,
            wire.colors,
            FrameStyle {
                mode: wire.mode,
                color_mode: wire.color_mode,
                color_depth: wire.color_depth,
                char_size: wire.char_size,
                resolution: wire.resolution,
            },
        )
        .map_err(D::Error::custom)
    }
}
