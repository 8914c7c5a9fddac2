use std::path::{Path, PathBuf};

use crate::config::{PhonemeType, SynthesisParams, VoiceConfig};
use crate::effects::AudioEffects;
use crate::error::{PiperError, Result};
use crate::phonemize::{CodepointPhonemizer, EspeakConfig, EspeakPhonemizer};
use crate::voice::Voice;
use crate::{SynthesisEngine, SynthesisOutput};

use super::model::{find_onnx_file, voice_config_path, PiperModel};

/// Parameters for configuring Piper model loading.
#[derive(Debug, Clone, Default)]
pub struct PiperModelParams {
    /// Number of CPU threads to use for inference.
    /// `None` uses the ORT default (typically all available cores).
    pub num_threads: Option<usize>,
    /// Voice config to use instead of `<model>.onnx.json`.
    pub config_path: Option<PathBuf>,
    /// Path for caching the Level3-optimized ONNX graph.
    ///
    /// Must be writable; the first load creates it.
    pub optimized_model_cache_path: Option<PathBuf>,
}

/// Parameters for a single Piper synthesis request.
#[derive(Debug, Clone, Default)]
pub struct PiperInferenceParams {
    /// Speaker and model scalar overrides.
    pub synthesis: SynthesisParams,
    pub effects: AudioEffects,
}

/// Piper text-to-speech engine.
///
/// # Quick Start
///
/// ```rust,no_run
/// use piper_rs::{SynthesisEngine, engines::piper::PiperEngine};
/// use std::path::PathBuf;
///
/// // Uses system espeak-ng from PATH
/// let mut engine = PiperEngine::new();
/// engine.load_model(&PathBuf::from("models/en_US-lessac-medium.onnx"))?;
/// let output = engine.synthesize("Hello, world!", None)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Bundled espeak-ng
///
/// ```rust,no_run
/// use piper_rs::engines::piper::PiperEngine;
/// use std::path::PathBuf;
///
/// let engine = PiperEngine::with_espeak(
///     Some(PathBuf::from("/app/resources/espeak-ng/espeak-ng")),
///     Some(PathBuf::from("/app/resources/espeak-ng-data")),
/// );
/// ```
pub struct PiperEngine {
    voice: Option<Voice>,
    model_path: Option<PathBuf>,
    espeak: EspeakConfig,
}

impl Default for PiperEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PiperEngine {
    /// Create a new engine that uses `espeak-ng` from PATH.
    pub fn new() -> Self {
        Self {
            voice: None,
            model_path: None,
            espeak: EspeakConfig::default(),
        }
    }

    /// Create a new engine with explicit espeak-ng binary and data paths.
    ///
    /// Either path can be `None` to fall back to the system default.
    pub fn with_espeak(bin_path: Option<PathBuf>, data_path: Option<PathBuf>) -> Self {
        Self {
            voice: None,
            model_path: None,
            espeak: EspeakConfig {
                bin_path,
                data_path,
            },
        }
    }

    /// The loaded voice, for streaming or WAV output.
    pub fn voice(&self) -> Option<&Voice> {
        self.voice.as_ref()
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    /// Speaker names of the loaded voice, sorted by id.
    pub fn list_speakers(&self) -> Vec<&str> {
        let Some(voice) = &self.voice else {
            return Vec::new();
        };
        let mut speakers: Vec<_> = voice.config().model.speaker_id_map.iter().collect();
        speakers.sort_by_key(|(_, id)| **id);
        speakers.into_iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl Drop for PiperEngine {
    fn drop(&mut self) {
        self.unload_model();
    }
}

impl SynthesisEngine for PiperEngine {
    type SynthesisParams = PiperInferenceParams;
    type ModelParams = PiperModelParams;

    fn load_model_with_params(
        &mut self,
        model_path: &Path,
        params: Self::ModelParams,
    ) -> Result<()> {
        let onnx_path = find_onnx_file(model_path)?;
        let config_path = params
            .config_path
            .unwrap_or_else(|| voice_config_path(&onnx_path));
        let config = VoiceConfig::from_file(&config_path)?;

        let model = PiperModel::load(
            &onnx_path,
            params.num_threads,
            params.optimized_model_cache_path.as_deref(),
        )?;

        let voice = match config.phonemize.phoneme_type {
            PhonemeType::Espeak => {
                let phonemizer = EspeakPhonemizer::new(
                    config.phonemize.espeak_voice.clone(),
                    self.espeak.clone(),
                );
                Voice::new(config, phonemizer, model)
            }
            PhonemeType::Text => Voice::new(config, CodepointPhonemizer::default(), model),
        };
        log::info!(
            "Loaded voice from {} ({} Hz, {} speaker(s))",
            config_path.display(),
            voice.config().synthesis.sample_rate,
            voice.config().model.num_speakers
        );

        self.voice = Some(voice);
        self.model_path = Some(onnx_path);
        Ok(())
    }

    fn unload_model(&mut self) {
        self.voice = None;
        self.model_path = None;
    }

    fn synthesize(
        &mut self,
        text: &str,
        params: Option<Self::SynthesisParams>,
    ) -> Result<SynthesisOutput> {
        let voice = self.voice.as_ref().ok_or(PiperError::ModelNotLoaded)?;

        let p = params.unwrap_or_default();
        voice.text_to_audio(text, &p.synthesis, &p.effects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesize_requires_loaded_model() {
        let mut engine = PiperEngine::new();
        assert!(matches!(
            engine.synthesize("hello", None),
            Err(PiperError::ModelNotLoaded)
        ));
        assert!(engine.list_speakers().is_empty());
    }

    #[test]
    fn missing_voice_config_fails_load() {
        let mut engine = PiperEngine::new();
        let result = engine.load_model(Path::new("does/not/exist.onnx"));
        assert!(matches!(result, Err(PiperError::Io(_))));
        assert!(engine.model_path().is_none());
    }
}
