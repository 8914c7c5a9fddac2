//! A loaded voice and the synthesis entry points.

use std::io::{Seek, Write};
use std::sync::Mutex;

use crate::config::{SynthesisConfig, SynthesisParams, VoiceConfig};
use crate::effects::{apply_effects, AudioEffects, PitchShifter, VocoderPitchShifter};
use crate::error::{PiperError, Result};
use crate::inference::{AcousticModel, ModelInput, ModelOutput, SynthesisResult};
use crate::phoneme::Phoneme;
use crate::phonemize::Phonemizer;
use crate::pipeline::{SentenceSynthesizer, SynthesisReport};
use crate::SynthesisOutput;

type SharedModel = Mutex<Box<dyn AcousticModel + Send>>;

/// A voice ready for synthesis.
///
/// `Voice` is `Send + Sync`. The configuration is read-only; concurrent
/// requests only serialize around individual model invocations.
pub struct Voice {
    config: VoiceConfig,
    phonemizer: Box<dyn Phonemizer + Send + Sync>,
    model: SharedModel,
    pitch_shifter: Box<dyn PitchShifter + Send + Sync>,
}

impl Voice {
    pub fn new<P, M>(config: VoiceConfig, phonemizer: P, model: M) -> Self
    where
        P: Phonemizer + Send + Sync + 'static,
        M: AcousticModel + Send + 'static,
    {
        Self {
            config,
            phonemizer: Box::new(phonemizer),
            model: Mutex::new(Box::new(model)),
            pitch_shifter: Box::new(VocoderPitchShifter::default()),
        }
    }

    /// Replace the default [`VocoderPitchShifter`].
    pub fn with_pitch_shifter<S>(mut self, pitch_shifter: S) -> Self
    where
        S: PitchShifter + Send + Sync + 'static,
    {
        self.pitch_shifter = Box::new(pitch_shifter);
        self
    }

    pub fn config(&self) -> &VoiceConfig {
        &self.config
    }

    /// Synthesize `text` into a single buffer and run the effects chain on it.
    pub fn text_to_audio(
        &self,
        text: &str,
        params: &SynthesisParams,
        effects: &AudioEffects,
    ) -> Result<SynthesisOutput> {
        let config = self.request_config(params)?;
        let sentences = self.phonemes(text)?;

        let mut model = LockedModel(&self.model);
        let mut synthesis =
            SentenceSynthesizer::new(&mut model, &self.config.phonemize, &config)
                .synthesize(&sentences)?;

        apply_effects(&mut synthesis.samples, effects, &*self.pitch_shifter)?;

        Ok(SynthesisOutput {
            samples: synthesis.samples,
            sample_rate: config.sample_rate,
            channels: effects.output_channels(config.channels),
            sample_width: config.sample_width,
            result: synthesis.result,
            missing: synthesis.missing,
        })
    }

    /// Synthesize `text` sentence by sentence.
    ///
    /// The effects chain runs on each sentence's audio before it is handed to
    /// `on_chunk`. Sentences that produced no samples are not emitted.
    pub fn text_to_audio_streaming<F>(
        &self,
        text: &str,
        params: &SynthesisParams,
        effects: &AudioEffects,
        mut on_chunk: F,
    ) -> Result<SynthesisReport>
    where
        F: FnMut(&[i16]) -> Result<()>,
    {
        let config = self.request_config(params)?;
        let sentences = self.phonemes(text)?;

        let mut model = LockedModel(&self.model);
        let mut chunk = Vec::new();
        SentenceSynthesizer::new(&mut model, &self.config.phonemize, &config).synthesize_streaming(
            &sentences,
            |samples| {
                if samples.is_empty() {
                    return Ok(());
                }
                chunk.clear();
                chunk.extend_from_slice(samples);
                apply_effects(&mut chunk, effects, &*self.pitch_shifter)?;
                on_chunk(&chunk)
            },
        )
    }

    /// Synthesize `text` like [`Voice::text_to_audio`] and write it as a WAV
    /// container to `writer`.
    pub fn text_to_wav<W: Write + Seek>(
        &self,
        text: &str,
        params: &SynthesisParams,
        effects: &AudioEffects,
        writer: W,
    ) -> Result<SynthesisResult> {
        let output = self.text_to_audio(text, params, effects)?;
        output.write_wav_to(writer)?;
        Ok(output.result)
    }

    fn request_config(&self, params: &SynthesisParams) -> Result<SynthesisConfig> {
        params.apply(&self.config.synthesis, &self.config.model)
    }

    fn phonemes(&self, text: &str) -> Result<Vec<Vec<Phoneme>>> {
        let sentences = self.phonemizer.phonemize(text)?;
        log::debug!("Phonemized text into {} sentence(s)", sentences.len());
        Ok(sentences
            .into_iter()
            .map(|sentence| self.config.phonemize.map_phonemes(sentence))
            .collect())
    }
}

/// Locks the shared model for the duration of one invocation.
struct LockedModel<'a>(&'a SharedModel);

impl AcousticModel for LockedModel<'_> {
    fn run(&mut self, input: &ModelInput<'_>) -> Result<Vec<ModelOutput>> {
        let mut model = self
            .0
            .lock()
            .map_err(|_| PiperError::Model("acoustic model lock poisoned".to_string()))?;
        model.run(input)
    }
}
