//! ascv - Character-grid quantization and temporal delta codec.
//!
//! This crate turns RGBA raster samples into palette-indexed character grids
//! with optional quantized colors, and stores sequences of those grids as
//! keyframe/delta compressed `.ascv` containers.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `schema`: Frame type and configuration
//! - `compute`: Tone adjustment, quantization, color packing, frame assembly
//! - `animation`: Temporal encoder, container format and decoder
//!
//! # Example
//!
//! ```rust,no_run
//! use ascv::{
//!     animation::{Compression, TemporalDecoder, TemporalEncoder},
//!     compute::{FrameAssembler, rgba_from_fn},
//!     schema::{ConversionConfig, EncoderConfig},
//! };
//!
//! let assembler = FrameAssembler::new(ConversionConfig::default()).unwrap();
//! let mut encoder = TemporalEncoder::new(EncoderConfig::default());
//!
//! encoder.start();
//! for i in 0..10u8 {
//!     let data = rgba_from_fn(80, 40, |x, y| {
//!         let v = (x as u8).wrapping_add(y as u8).wrapping_mul(i);
//!         [v, v, v, 255]
//!     });
//!     let frame = assembler.assemble_rgba(80, 40, &data).unwrap();
//!     encoder.push_at(&frame, i as f64 * 40.0).unwrap();
//! }
//! let container = encoder.stop(None).unwrap();
//! container.save("clip.ascv.gz", Compression::Gzip).unwrap();
//!
//! let mut decoder = TemporalDecoder::new();
//! decoder.load(container).unwrap();
//! println!("{}", decoder.seek(200.0).unwrap().text());
//! ```

pub mod animation;
pub mod compute;
pub mod schema;

// WebAssembly bindings (only for wasm32 target)
#[cfg(target_arch = "wasm32")]
pub mod wasm;

// Re-export commonly used types
pub use animation::{Container, TemporalDecoder, TemporalEncoder};
pub use compute::{FrameAssembler, RgbaSample};
pub use schema::{ConversionConfig, EncoderConfig, Frame};
