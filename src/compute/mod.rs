//! Compute module - Sample to character-grid conversion.

mod assemble;
mod color;
mod quantize;
mod sample;
mod tone;

pub use assemble::*;
pub use color::*;
pub use quantize::*;
pub use sample::*;
pub use tone::*;
