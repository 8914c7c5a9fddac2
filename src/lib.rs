//! # piper-rs
//!
//! Text-to-speech orchestration for Piper voices: phonemization, per-phrase
//! neural inference, silence stitching and waveform post-processing.
//!
//! ## Features
//!
//! - **Sentence/phrase pipeline**: phoneme-to-id mapping with a missing-phoneme
//!   tally, phrase splitting at configured silence phonemes, real-time factor
//!   metrics
//! - **Effects chain**: speed, volume, pitch, ambience presets and stereo
//! - **Buffered or streaming** synthesis, straight to WAV if needed
//! - **Piper ONNX engine** behind the `piper` feature
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! piper-rs = { version = "2026.2", features = ["piper"] }
//! ```
//!
//! ```ignore
//! use std::path::PathBuf;
//! use piper_rs::{engines::piper::PiperEngine, SynthesisEngine};
//!
//! let mut engine = PiperEngine::new();
//! engine.load_model(&PathBuf::from("models/en_US-lessac-medium.onnx"))?;
//!
//! let output = engine.synthesize("Hello, world!", None)?;
//! output.write_wav(&PathBuf::from("output.wav"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Any [`inference::AcousticModel`] and [`phonemize::Phonemizer`] can drive a
//! [`voice::Voice`] directly, without the ONNX engine.

pub mod config;
pub mod effects;
pub mod engines;
pub mod error;
pub mod inference;
pub mod phoneme;
pub mod phonemize;
pub mod phrase;
pub mod pipeline;
pub mod voice;
pub mod wav;

use std::io::{Cursor, Seek, Write};
use std::path::Path;

pub use config::{SynthesisParams, VoiceConfig};
pub use effects::{AudioEffects, AudioEffectsBuilder};
pub use error::{PiperError, Result};
pub use inference::SynthesisResult;
pub use phoneme::MissingPhonemes;
pub use voice::Voice;

/// Audio produced by a buffered synthesis request.
///
/// Samples are interleaved 16-bit PCM; `channels` already reflects the stereo
/// effect.
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes per sample.
    pub sample_width: u16,
    pub result: SynthesisResult,
    pub missing: MissingPhonemes,
}

impl SynthesisOutput {
    /// Write the audio to a WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        self.write_wav_to(file)
    }

    /// Write the audio as a WAV container to `writer`.
    pub fn write_wav_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let spec = wav::pcm_spec(self.sample_rate, self.channels, self.sample_width);
        wav::write_wav(writer, spec, &self.samples)
    }

    /// The audio as an in-memory WAV file.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_wav_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        frames as f64 / self.sample_rate as f64
    }
}

/// Common interface for text-to-speech synthesis engines.
///
/// Each engine may have different parameter types for model loading and
/// inference configuration.
pub trait SynthesisEngine {
    /// Parameters for a single synthesis request (speaker, scales, effects).
    type SynthesisParams;
    /// Parameters for configuring model loading (threads, config path, etc.)
    type ModelParams: Default;

    /// Load a model from the specified path using default parameters.
    fn load_model(&mut self, model_path: &Path) -> Result<()> {
        self.load_model_with_params(model_path, Self::ModelParams::default())
    }

    /// Load a model from the specified path with custom parameters.
    fn load_model_with_params(&mut self, model_path: &Path, params: Self::ModelParams)
        -> Result<()>;

    /// Unload the currently loaded model and free associated resources.
    fn unload_model(&mut self);

    /// Synthesize speech from the given text.
    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<SynthesisOutput>;

    /// Synthesize speech from the given text and write to a WAV file.
    ///
    /// Default implementation calls `synthesize()` then `SynthesisOutput::write_wav()`.
    fn synthesize_to_file(
        &mut self,
        text: &str,
        wav_path: &Path,
        params: Option<Self::SynthesisParams>,
    ) -> Result<()> {
        self.synthesize(text, params)?.write_wav(wav_path)
    }
}
