//! Temporal codec for character-grid animations.
//!
//! Frames are stored as a sequence of records: keyframes carry a whole
//! [`Frame`](crate::schema::Frame), deltas carry only the cells that changed
//! since the previous record. The [`TemporalEncoder`] decides which is which,
//! the [`TemporalDecoder`] replays them into a single reconstructed frame.
//!
//! # File Format
//!
//! The `.ascv` container is a JSON document, optionally gzip wrapped
//! (`.ascv.gz`). See [`Container`] for the record layout.

mod clock;
mod decoder;
mod encoder;
mod format;

pub use clock::{Clock, ManualClock};
#[cfg(not(target_arch = "wasm32"))]
pub use clock::SystemClock;
pub use decoder::{
    FrameSink, PlaybackState, PlaybackToken, TemporalDecoder, TickOutcome, apply_delta,
};
pub use encoder::{
    EncoderError, EncoderStats, KeyframeReason, TemporalEncoder, diff_frames, keyframe_reason,
};
pub use format::{
    Compression, Container, ContainerError, DURATION_MARGIN_MS, DeltaRecord, EncodedContainer,
    FORMAT_VERSION, FrameRecord, GZIP_MAGIC, KeyframeRecord, LEGACY_MAGIC, Meta,
    TEXT_DELTA_VERSION, compress_lz4, decompress_lz4, text_position_to_cell,
};
