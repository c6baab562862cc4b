//! Schema module - Frame model and configuration types.

mod config;
mod frame;

pub use config::*;
pub use frame::*;
