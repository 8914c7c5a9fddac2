//! Speech synthesis engines.
//!
//! # Available Engines
//!
//! Enable engines via Cargo features:
//! - `piper` - Piper VITS voices (ONNX format, espeak-ng required for espeak voices)

#[cfg(feature = "piper")]
pub mod piper;
