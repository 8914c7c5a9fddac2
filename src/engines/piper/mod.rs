//! Piper text-to-speech engine implementation.
//!
//! Runs Piper VITS voices exported to ONNX. Each voice is a pair of files:
//!
//! ```text
//! models/
//! ├── en_US-lessac-medium.onnx        # acoustic model
//! └── en_US-lessac-medium.onnx.json   # voice config (phoneme ids, sample rate, speakers)
//! ```
//!
//! Voices are available from <https://huggingface.co/rhasspy/piper-voices>.
//!
//! # System Requirements
//!
//! Voices with `"phoneme_type": "espeak"` need **espeak-ng**:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>
//!
//! # Examples
//!
//! ```rust,no_run
//! use piper_rs::effects::{Ambience, AudioEffectsBuilder};
//! use piper_rs::engines::piper::{PiperEngine, PiperInferenceParams};
//! use piper_rs::SynthesisEngine;
//! use std::path::PathBuf;
//!
//! let mut engine = PiperEngine::new();
//! engine.load_model(&PathBuf::from("models/en_US-lessac-medium.onnx"))?;
//!
//! let params = PiperInferenceParams {
//!     effects: AudioEffectsBuilder::default()
//!         .speed(1.2)
//!         .ambience(Ambience::Telephone)
//!         .build()?,
//!     ..Default::default()
//! };
//!
//! engine.synthesize_to_file("Hello over the phone.", &PathBuf::from("out.wav"), Some(params))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod engine;
pub mod model;

pub use engine::{PiperEngine, PiperInferenceParams, PiperModelParams};
pub use model::PiperModel;
