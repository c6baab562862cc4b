//! Wire format for ASCV containers.
//!
//! A container is a JSON document, optionally gzip (or LZ4) wrapped:
//!
//! ```text
//! {
//!   "meta":   { "version": 2, "frameCount": N, "duration"?: ms, "date"?: "..." },
//!   "frames": [
//!     { "t": ms, "type": "f", "d": <Frame> },
//!     { "t": ms, "type": "d", "cd"?: [cell, color, ...], "id"?: [cell, index, ...] }
//!   ]
//! }
//! ```
//!
//! Delta lists are flattened `(cell, value)` pairs relative to the previous
//! reconstructed frame. Version 1 documents carry `td` text deltas instead of
//! `id`: positions index the frame's `text` (rows separated by `\n`) and
//! values are literal symbols.

use std::borrow::Cow;
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::schema::Frame;

/// Current format version (palette-index deltas).
pub const FORMAT_VERSION: u32 = 2;

/// Earlier version whose deltas replace literal symbols in the text grid.
pub const TEXT_DELTA_VERSION: u32 = 1;

/// Prefix of the pre-JSON container revision, which is not supported.
pub const LEGACY_MAGIC: &str = "ASCV";

/// Tail added after the last timestamp when no explicit duration is stored.
pub const DURATION_MARGIN_MS: f64 = 100.0;

/// First two bytes of any gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Byte-stream wrapping for stored containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Plain JSON.
    #[default]
    None,
    /// gzip (`.ascv.gz`).
    Gzip,
    /// LZ4 with a prepended size (`.ascv.lz4`).
    Lz4,
}

impl Compression {
    /// Guess from a file name: `.gz` and `.lz4` are wrapped, anything else is plain.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") => Compression::Gzip,
            Some("lz4") => Compression::Lz4,
            _ => Compression::None,
        }
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Compression::None => "ascv",
            Compression::Gzip => "ascv.gz",
            Compression::Lz4 => "ascv.lz4",
        }
    }

    pub fn compress(self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Compression::Lz4 => compress_lz4(data),
        }
    }

    pub fn decompress(self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut out = Vec::new();
                GzDecoder::new(data).read_to_end(&mut out)?;
                Ok(out)
            }
            Compression::Lz4 => decompress_lz4(data),
        }
    }
}

/// Compress data using LZ4.
#[cfg(feature = "lz4")]
pub fn compress_lz4(data: &[u8]) -> io::Result<Vec<u8>> {
    Ok(lz4_flex::compress_prepend_size(data))
}

/// Decompress LZ4 data.
#[cfg(feature = "lz4")]
pub fn decompress_lz4(data: &[u8]) -> io::Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Fallback when LZ4 is not available.
#[cfg(not(feature = "lz4"))]
pub fn compress_lz4(_data: &[u8]) -> io::Result<Vec<u8>> {
    Err(lz4_unavailable())
}

#[cfg(not(feature = "lz4"))]
pub fn decompress_lz4(_data: &[u8]) -> io::Result<Vec<u8>> {
    Err(lz4_unavailable())
}

#[cfg(not(feature = "lz4"))]
fn lz4_unavailable() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "built without the `lz4` feature",
    )
}

/// True when `bytes` start like a JSON object, after optional whitespace or BOM.
fn looks_like_json(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix("\u{feff}".as_bytes()).unwrap_or(bytes);
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'{')
}

/// Container loading and storage errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("Container is not valid JSON: {0}")]
    Format(#[from] serde_json::Error),
    #[error("Container is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(String),
    #[error("Invalid container structure: {0}")]
    Schema(String),
    #[error("Failed to decompress container: {0}")]
    Decompress(#[source] io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Container metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub version: u32,
    #[serde(default)]
    pub frame_count: usize,
    /// Loop length in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            frame_count: 0,
            duration: None,
            date: None,
        }
    }
}

/// A self-contained frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeRecord {
    #[serde(rename = "t")]
    pub timestamp: f64,
    #[serde(rename = "d")]
    pub frame: Frame,
}

/// Sparse changes against the previous reconstructed frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    #[serde(rename = "t")]
    pub timestamp: f64,
    #[serde(
        rename = "cd",
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "flat_pairs"
    )]
    pub color_diffs: Vec<(usize, i32)>,
    #[serde(
        rename = "id",
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "flat_pairs"
    )]
    pub index_diffs: Vec<(usize, u32)>,
    /// Version 1 only: `(text position, symbol)`.
    #[serde(
        rename = "td",
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "text_pairs"
    )]
    pub text_diffs: Vec<(usize, char)>,
}

impl DeltaRecord {
    /// True when the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.color_diffs.is_empty() && self.index_diffs.is_empty() && self.text_diffs.is_empty()
    }

    /// Number of patch entries carried.
    pub fn patch_count(&self) -> usize {
        self.color_diffs.len() + self.index_diffs.len() + self.text_diffs.len()
    }

    /// Check that every patch targets a valid cell and value of `frame`.
    fn check_against(&self, frame: &Frame, version: u32) -> Result<(), String> {
        let cells = frame.cell_count();
        let charset = frame.charset();

        if !self.color_diffs.is_empty() && frame.colors().is_none() {
            return Err("color delta against a frame without colors".into());
        }
        if let Some((cell, _)) = self.color_diffs.iter().find(|(c, _)| *c >= cells) {
            return Err(format!("color delta cell {cell} outside {cells} cells"));
        }

        if !self.index_diffs.is_empty() && version == TEXT_DELTA_VERSION {
            return Err("`id` deltas require version 2".into());
        }
        for &(cell, index) in &self.index_diffs {
            if cell >= cells {
                return Err(format!("index delta cell {cell} outside {cells} cells"));
            }
            if index as usize >= charset.len() {
                return Err(format!(
                    "index delta value {index} outside charset of {}",
                    charset.len()
                ));
            }
        }

        if !self.text_diffs.is_empty() && version != TEXT_DELTA_VERSION {
            return Err("`td` deltas require version 1".into());
        }
        let text_len = frame.cell_count() + frame.height();
        for &(pos, symbol) in &self.text_diffs {
            if pos >= text_len {
                return Err(format!("text delta position {pos} outside {text_len}"));
            }
            if text_position_to_cell(pos, frame.width(), frame.height()).is_some()
                && !charset.contains(&symbol)
            {
                return Err(format!("text delta symbol {symbol:?} not in charset"));
            }
        }
        Ok(())
    }
}

/// Map a position in a frame's `text` to its cell, skipping row separators.
#[inline]
pub fn text_position_to_cell(pos: usize, width: usize, height: usize) -> Option<usize> {
    let stride = width + 1;
    let (row, col) = (pos / stride, pos % stride);
    (col < width && row < height).then_some(row * width + col)
}

/// One entry of the frame sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FrameRecord {
    #[serde(rename = "f")]
    Keyframe(KeyframeRecord),
    #[serde(rename = "d")]
    Delta(DeltaRecord),
}

impl FrameRecord {
    /// Milliseconds from the start of the sequence.
    pub fn timestamp(&self) -> f64 {
        match self {
            FrameRecord::Keyframe(k) => k.timestamp,
            FrameRecord::Delta(d) => d.timestamp,
        }
    }

    pub fn is_keyframe(&self) -> bool {
        matches!(self, FrameRecord::Keyframe(_))
    }
}

/// Encoded container bytes and the wrapping actually applied.
#[derive(Debug, Clone)]
pub struct EncodedContainer {
    pub bytes: Vec<u8>,
    pub compression: Compression,
}

/// Ordered frame records plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub meta: Meta,
    pub frames: Vec<FrameRecord>,
}

impl Container {
    /// Wrap records with current-version metadata.
    pub fn new(frames: Vec<FrameRecord>) -> Self {
        Self {
            meta: Meta {
                frame_count: frames.len(),
                ..Default::default()
            },
            frames,
        }
    }

    /// Single-keyframe container for a still image.
    pub fn still(frame: Frame) -> Self {
        Self::new(vec![FrameRecord::Keyframe(KeyframeRecord {
            timestamp: 0.0,
            frame,
        })])
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.meta.duration = Some(duration_ms);
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.meta.date = Some(date.into());
        self
    }

    pub fn version(&self) -> u32 {
        self.meta.version
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// True for a single-record (image) container.
    pub fn is_still(&self) -> bool {
        self.frames.len() == 1
    }

    pub fn keyframe_count(&self) -> usize {
        self.frames.iter().filter(|r| r.is_keyframe()).count()
    }

    pub fn delta_count(&self) -> usize {
        self.frames.len() - self.keyframe_count()
    }

    /// Loop length: the stored duration, or the last timestamp plus a small margin.
    pub fn duration(&self) -> f64 {
        match self.meta.duration {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => self.frames.last().map_or(0.0, FrameRecord::timestamp) + DURATION_MARGIN_MS,
        }
    }

    /// Check ordering and that every delta fits the frame it patches.
    pub fn validate(&self) -> Result<(), ContainerError> {
        let version = self.meta.version;
        if version == 0 || version > FORMAT_VERSION {
            return Err(ContainerError::UnsupportedVersion(format!(
                "version {version} (this build reads 1..={FORMAT_VERSION})"
            )));
        }
        if self.frames.is_empty() {
            return Err(ContainerError::Schema("container has no frames".into()));
        }
        if self.meta.frame_count != self.frames.len() {
            warn!(
                "meta.frameCount is {} but container holds {} records",
                self.meta.frame_count,
                self.frames.len()
            );
        }

        let mut current: Option<&Frame> = None;
        let mut last_t = 0.0f64;
        for (i, record) in self.frames.iter().enumerate() {
            let t = record.timestamp();
            if !t.is_finite() || t < last_t {
                return Err(ContainerError::Schema(format!(
                    "record {i} has timestamp {t}, expected a finite value >= {last_t}"
                )));
            }
            last_t = t;

            match record {
                FrameRecord::Keyframe(k) => current = Some(&k.frame),
                FrameRecord::Delta(d) => {
                    let Some(frame) = current else {
                        return Err(ContainerError::Schema(format!(
                            "record {i} is a delta before any keyframe"
                        )));
                    };
                    d.check_against(frame, version)
                        .map_err(|msg| ContainerError::Schema(format!("record {i}: {msg}")))?;
                }
            }
        }
        Ok(())
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String, ContainerError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize and wrap. A failing compressor falls back to plain JSON.
    pub fn to_bytes(&self, compression: Compression) -> Result<EncodedContainer, ContainerError> {
        let json = serde_json::to_vec(self)?;
        if compression == Compression::None {
            return Ok(EncodedContainer {
                bytes: json,
                compression,
            });
        }
        match compression.compress(&json) {
            Ok(bytes) => Ok(EncodedContainer { bytes, compression }),
            Err(e) => {
                warn!("{compression:?} compression failed ({e}); storing uncompressed");
                Ok(EncodedContainer {
                    bytes: json,
                    compression: Compression::None,
                })
            }
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ContainerError> {
        let text = text.trim_start_matches('\u{feff}').trim_start();
        if text.starts_with(LEGACY_MAGIC) {
            return Err(ContainerError::UnsupportedVersion(format!(
                "legacy `{LEGACY_MAGIC}` container; re-encode it with a current build"
            )));
        }

        let value: serde_json::Value = serde_json::from_str(text)?;
        if !value.get("frames").is_some_and(serde_json::Value::is_array) {
            return Err(ContainerError::Schema("missing `frames` sequence".into()));
        }
        if let Some(version) = value.pointer("/meta/version") {
            match version.as_u64() {
                Some(v) if (1..=FORMAT_VERSION as u64).contains(&v) => {}
                Some(v) => {
                    return Err(ContainerError::UnsupportedVersion(format!(
                        "version {v} (this build reads 1..={FORMAT_VERSION})"
                    )));
                }
                None => {
                    return Err(ContainerError::Schema(
                        "meta.version must be a non-negative integer".into(),
                    ));
                }
            }
        }

        let container: Container = serde_json::from_value(value)
            .map_err(|e| ContainerError::Schema(e.to_string()))?;
        container.validate()?;
        Ok(container)
    }

    /// Unwrap and parse stored bytes.
    ///
    /// gzip is recognized by its magic bytes; `hint` selects LZ4, which has no magic.
    pub fn from_bytes(bytes: &[u8], hint: Compression) -> Result<Self, ContainerError> {
        let raw: Cow<'_, [u8]> = if hint == Compression::Lz4 {
            match decompress_lz4(bytes) {
                Ok(raw) => Cow::Owned(raw),
                // Written by the uncompressed fallback under an `.lz4` name.
                Err(e) if looks_like_json(bytes) => {
                    debug!("LZ4 hint ignored ({e}); reading plain JSON");
                    Cow::Borrowed(bytes)
                }
                Err(e) => return Err(ContainerError::Decompress(e)),
            }
        } else if bytes.starts_with(&GZIP_MAGIC) {
            Cow::Owned(
                Compression::Gzip
                    .decompress(bytes)
                    .map_err(ContainerError::Decompress)?,
            )
        } else {
            Cow::Borrowed(bytes)
        };
        Self::from_json(std::str::from_utf8(&raw)?)
    }

    /// Write to `path`. Returns the compression actually applied.
    pub fn save<P: AsRef<Path>>(
        &self,
        path: P,
        compression: Compression,
    ) -> Result<Compression, ContainerError> {
        let encoded = self.to_bytes(compression)?;
        fs::write(path, &encoded.bytes)?;
        Ok(encoded.compression)
    }

    /// Read and validate a container file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ContainerError> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes, Compression::from_path(path))
    }
}

/// `[(cell, value), ...]` <-> `[cell, value, cell, value, ...]`.
mod flat_pairs {
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, V>(pairs: &[(usize, V)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        let mut seq = serializer.serialize_seq(Some(pairs.len() * 2))?;
        for (cell, value) in pairs {
            seq.serialize_element(cell)?;
            seq.serialize_element(value)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<Vec<(usize, V)>, D::Error>
    where
        D: Deserializer<'de>,
        V: TryFrom<i64>,
    {
        let flat = Vec::<i64>::deserialize(deserializer)?;
        if flat.len() % 2 != 0 {
            return Err(D::Error::custom("delta list must hold cell/value pairs"));
        }
        flat.chunks_exact(2)
            .map(|pair| {
                let cell = usize::try_from(pair[0])
                    .map_err(|_| D::Error::custom(format!("negative cell {}", pair[0])))?;
                let value = V::try_from(pair[1])
                    .map_err(|_| D::Error::custom(format!("delta value {} out of range", pair[1])))?;
                Ok((cell, value))
            })
            .collect()
    }
}

/// `[(pos, symbol), ...]` <-> `[pos, "s", pos, "s", ...]`; symbols may also be code points.
mod text_pairs {
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(pairs: &[(usize, char)], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(pairs.len() * 2))?;
        let mut buf = [0u8; 4];
        for (pos, symbol) in pairs {
            seq.serialize_element(pos)?;
            seq.serialize_element(symbol.encode_utf8(&mut buf) as &str)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(usize, char)>, D::Error> {
        let flat = Vec::<Value>::deserialize(deserializer)?;
        if flat.len() % 2 != 0 {
            return Err(D::Error::custom("text delta list must hold position/symbol pairs"));
        }
        flat.chunks_exact(2)
            .map(|pair| {
                let pos = pair[0]
                    .as_u64()
                    .ok_or_else(|| D::Error::custom("text delta position must be an integer"))?
                    as usize;
                let symbol = match &pair[1] {
                    Value::String(s) => {
                        let mut chars = s.chars();
                        match (chars.next(), chars.next()) {
                            (Some(c), None) => c,
                            _ => {
                                return Err(D::Error::custom(format!(
                                    "text delta symbol {s:?} is not a single character"
                                )));
                            }
                        }
                    }
                    Value::Number(n) => n
                        .as_u64()
                        .and_then(|v| u32::try_from(v).ok())
                        .and_then(char::from_u32)
                        .ok_or_else(|| D::Error::custom(format!("invalid code point {n}")))?,
                    other => {
                        return Err(D::Error::custom(format!(
                            "text delta symbol must be a string, got {other}"
                        )));
                    }
                };
                Ok((pos, symbol))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColorMode, FrameStyle};
    use tempfile::tempdir;

    fn frame(indices: Vec<u32>, colors: Option<Vec<i32>>) -> Frame {
        let style = FrameStyle {
            color_mode: if colors.is_some() {
                ColorMode::Color
            } else {
                ColorMode::Mono
            },
            ..Default::default()
        };
        Frame::new(2, 2, vec![' ', '.', '#'], indices, colors, style).unwrap()
    }

    fn two_record_container() -> Container {
        Container::new(vec![
            FrameRecord::Keyframe(KeyframeRecord {
                timestamp: 0.0,
                frame: frame(vec![0, 1, 2, 0], Some(vec![1, 2, 3, 4])),
            }),
            FrameRecord::Delta(DeltaRecord {
                timestamp: 40.0,
                color_diffs: vec![(3, 9)],
                index_diffs: vec![(0, 2), (3, 1)],
                ..Default::default()
            }),
        ])
    }

    #[test]
    fn test_record_wire_shape() {
        let value = serde_json::to_value(two_record_container()).unwrap();
        assert_eq!(value["meta"]["version"], 2);
        assert_eq!(value["meta"]["frameCount"], 2);
        assert!(value["meta"].get("duration").is_none());

        let key = &value["frames"][0];
        assert_eq!(key["type"], "f");
        assert_eq!(key["d"]["text"], " .\n# \n");

        let delta = &value["frames"][1];
        assert_eq!(delta["type"], "d");
        assert_eq!(delta["t"], 40.0);
        assert_eq!(delta["cd"], serde_json::json!([3, 9]));
        assert_eq!(delta["id"], serde_json::json!([0, 2, 3, 1]));
        assert!(delta.get("td").is_none());
    }

    #[test]
    fn test_empty_diffs_are_omitted() {
        let delta = DeltaRecord {
            timestamp: 5.0,
            ..Default::default()
        };
        let json = serde_json::to_string(&FrameRecord::Delta(delta)).unwrap();
        assert_eq!(json, r#"{"type":"d","t":5.0}"#);
    }

    #[test]
    fn test_json_roundtrip() {
        let container = two_record_container().with_duration(120.0).with_date("2026-01-01");
        let json = container.to_json().unwrap();
        let back = Container::from_json(&json).unwrap();
        assert_eq!(back, container);
    }

    #[test]
    fn test_rejects_invalid_json() {
        assert!(matches!(
            Container::from_json("{\"frames\": [").unwrap_err(),
            ContainerError::Format(_)
        ));
    }

    #[test]
    fn test_rejects_legacy_marker() {
        let err = Container::from_json("ASCV1\n80x24\n...").unwrap_err();
        assert!(matches!(err, ContainerError::UnsupportedVersion(_)));
        assert!(err.to_string().contains("legacy"));
    }

    #[test]
    fn test_rejects_missing_frames() {
        for doc in [r#"{"meta":{"version":2}}"#, r#"{"frames":{}}"#, "[]"] {
            assert!(matches!(
                Container::from_json(doc).unwrap_err(),
                ContainerError::Schema(_)
            ));
        }
        assert!(matches!(
            Container::from_json(r#"{"frames":[]}"#).unwrap_err(),
            ContainerError::Schema(_)
        ));
    }

    #[test]
    fn test_rejects_future_version() {
        let doc = r#"{"meta":{"version":3,"frameCount":0},"frames":[]}"#;
        assert!(matches!(
            Container::from_json(doc).unwrap_err(),
            ContainerError::UnsupportedVersion(_)
        ));
    }

    #[test]
    fn test_rejects_leading_delta() {
        let doc = r#"{"meta":{"version":2,"frameCount":1},"frames":[{"t":0,"type":"d","id":[0,1]}]}"#;
        let err = Container::from_json(doc).unwrap_err();
        assert!(err.to_string().contains("before any keyframe"));
    }

    #[test]
    fn test_rejects_out_of_range_delta() {
        let mut container = two_record_container();
        if let FrameRecord::Delta(d) = &mut container.frames[1] {
            d.index_diffs.push((4, 0));
        }
        assert!(matches!(
            container.validate().unwrap_err(),
            ContainerError::Schema(_)
        ));

        let mut container = two_record_container();
        if let FrameRecord::Delta(d) = &mut container.frames[1] {
            d.index_diffs = vec![(0, 3)];
        }
        assert!(container.validate().is_err());
    }

    #[test]
    fn test_rejects_color_delta_on_mono_frame() {
        let container = Container::new(vec![
            FrameRecord::Keyframe(KeyframeRecord {
                timestamp: 0.0,
                frame: frame(vec![0; 4], None),
            }),
            FrameRecord::Delta(DeltaRecord {
                timestamp: 1.0,
                color_diffs: vec![(0, 5)],
                ..Default::default()
            }),
        ]);
        assert!(container.validate().is_err());
    }

    #[test]
    fn test_rejects_decreasing_timestamps() {
        let mut container = two_record_container();
        if let FrameRecord::Delta(d) = &mut container.frames[1] {
            d.timestamp = -1.0;
        }
        assert!(container.validate().is_err());
    }

    #[test]
    fn test_rejects_odd_pair_list() {
        let doc = r#"{"meta":{"version":2,"frameCount":2},"frames":[
            {"t":0,"type":"f","d":{"charIndices":[0],"width":1,"height":1,"charset":"a"}},
            {"t":1,"type":"d","id":[0]}]}"#;
        assert!(matches!(
            Container::from_json(doc).unwrap_err(),
            ContainerError::Schema(_)
        ));
    }

    #[test]
    fn test_rejects_overflowing_frame_dimensions() {
        let doc = format!(
            r#"{{"meta":{{"version":2,"frameCount":1}},"frames":[
            {{"t":0,"type":"f","d":{{"charIndices":[0],"width":{},"height":2,"charset":"a"}}}}]}}"#,
            usize::MAX / 2 + 1
        );
        assert!(matches!(
            Container::from_json(&doc).unwrap_err(),
            ContainerError::Schema(_)
        ));
    }

    #[test]
    fn test_text_deltas_are_version_gated() {
        let v1 = r##"{"meta":{"version":1,"frameCount":2},"frames":[
            {"t":0,"type":"f","d":{"charIndices":[0,0,0,0],"width":2,"height":2,"charset":" #"}},
            {"t":50,"type":"d","td":[1,"#",2,"#",3,35]}]}"##;
        let container = Container::from_json(v1).unwrap();
        let FrameRecord::Delta(d) = &container.frames[1] else {
            panic!("expected delta");
        };
        assert_eq!(d.text_diffs, vec![(1, '#'), (2, '#'), (3, '#')]);

        let v2 = v1.replace("\"version\":1", "\"version\":2");
        assert!(Container::from_json(&v2).is_err());

        let v1_with_id = v1.replace("\"td\"", "\"id\"").replace("\"#\"", "1");
        assert!(Container::from_json(&v1_with_id).is_err());
    }

    #[test]
    fn test_text_position_mapping() {
        // width 3: positions 0..=2 row 0, 3 is '\n', 4..=6 row 1
        assert_eq!(text_position_to_cell(0, 3, 2), Some(0));
        assert_eq!(text_position_to_cell(2, 3, 2), Some(2));
        assert_eq!(text_position_to_cell(3, 3, 2), None);
        assert_eq!(text_position_to_cell(4, 3, 2), Some(3));
        assert_eq!(text_position_to_cell(8, 3, 2), None);
    }

    #[test]
    fn test_duration() {
        let container = two_record_container();
        assert_eq!(container.duration(), 40.0 + DURATION_MARGIN_MS);
        assert_eq!(container.with_duration(300.0).duration(), 300.0);
    }

    #[test]
    fn test_gzip_roundtrip_and_sniffing() {
        let container = two_record_container();
        let encoded = container.to_bytes(Compression::Gzip).unwrap();
        assert_eq!(encoded.compression, Compression::Gzip);
        assert!(encoded.bytes.starts_with(&GZIP_MAGIC));

        // Hint is ignored for gzip, the magic bytes decide.
        let back = Container::from_bytes(&encoded.bytes, Compression::None).unwrap();
        assert_eq!(back, container);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_lz4_roundtrip() {
        let container = two_record_container();
        let encoded = container.to_bytes(Compression::Lz4).unwrap();
        let back = Container::from_bytes(&encoded.bytes, Compression::Lz4).unwrap();
        assert_eq!(back, container);
    }

    #[cfg(not(feature = "lz4"))]
    #[test]
    fn test_lz4_unavailable_falls_back_to_plain() {
        let container = two_record_container();
        let encoded = container.to_bytes(Compression::Lz4).unwrap();
        assert_eq!(encoded.compression, Compression::None);
        assert_eq!(encoded.bytes, container.to_json().unwrap().into_bytes());

        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.ascv.lz4");
        assert_eq!(container.save(&path, Compression::Lz4).unwrap(), Compression::None);
        assert_eq!(Container::open(&path).unwrap(), container);
    }

    #[test]
    fn test_lz4_hint_rejects_garbage() {
        assert!(matches!(
            Container::from_bytes(&[0xff, 0x00, 0x13, 0x37], Compression::Lz4).unwrap_err(),
            ContainerError::Decompress(_)
        ));
    }

    #[test]
    fn test_save_and_open() {
        let dir = tempdir().unwrap();
        let container = two_record_container();

        for compression in [Compression::None, Compression::Gzip] {
            let path = dir.path().join(format!("clip.{}", compression.extension()));
            assert_eq!(Compression::from_path(&path), compression);
            assert_eq!(container.save(&path, compression).unwrap(), compression);
            assert_eq!(Container::open(&path).unwrap(), container);
        }
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Container::open(dir.path().join("nope.ascv")).unwrap_err(),
            ContainerError::Io(_)
        ));
    }
}
