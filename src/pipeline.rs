//! Sentence and phrase assembly: phonemes in, stitched audio out.

use crate::config::{PhonemizeConfig, SynthesisConfig};
use crate::error::Result;
use crate::inference::{synthesize_ids, AcousticModel, SynthesisResult};
use crate::phoneme::{phonemes_to_ids, MissingPhonemes, Phoneme};
use crate::phrase::{silence_samples, split_phrases};

/// Buffered synthesis of a whole input.
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    pub samples: Vec<i16>,
    pub result: SynthesisResult,
    pub missing: MissingPhonemes,
}

/// Metrics and diagnostics of a streamed synthesis.
#[derive(Debug, Clone, Default)]
pub struct SynthesisReport {
    pub result: SynthesisResult,
    pub missing: MissingPhonemes,
}

/// Drives phrase splitting, id mapping and inference for a list of sentences.
pub struct SentenceSynthesizer<'a, M: AcousticModel + ?Sized> {
    model: &'a mut M,
    phonemize: &'a PhonemizeConfig,
    config: &'a SynthesisConfig,
}

impl<'a, M: AcousticModel + ?Sized> SentenceSynthesizer<'a, M> {
    pub fn new(
        model: &'a mut M,
        phonemize: &'a PhonemizeConfig,
        config: &'a SynthesisConfig,
    ) -> Self {
        Self {
            model,
            phonemize,
            config,
        }
    }

    /// Synthesize every sentence into one buffer.
    pub fn synthesize(&mut self, sentences: &[Vec<Phoneme>]) -> Result<Synthesis> {
        let mut samples = Vec::new();
        let report = self.run(sentences, &mut samples, |_| Ok(()))?;
        Ok(Synthesis {
            samples,
            result: report.result,
            missing: report.missing,
        })
    }

    /// Synthesize sentence by sentence, handing each sentence's audio
    /// (including its trailing silence) to `on_sentence`.
    ///
    /// The buffer is cleared after the callback returns, so the callback must
    /// copy what it wants to keep.
    pub fn synthesize_streaming<F>(
        &mut self,
        sentences: &[Vec<Phoneme>],
        mut on_sentence: F,
    ) -> Result<SynthesisReport>
    where
        F: FnMut(&[i16]) -> Result<()>,
    {
        let mut samples = Vec::new();
        self.run(sentences, &mut samples, |buffer| {
            on_sentence(buffer.as_slice())?;
            buffer.clear();
            Ok(())
        })
    }

    fn run<F>(
        &mut self,
        sentences: &[Vec<Phoneme>],
        samples: &mut Vec<i16>,
        mut sentence_done: F,
    ) -> Result<SynthesisReport>
    where
        F: FnMut(&mut Vec<i16>) -> Result<()>,
    {
        let config = self.config;
        let sentence_silence = silence_samples(
            config.sentence_silence_seconds,
            config.sample_rate,
            config.channels,
        );

        let mut report = SynthesisReport::default();
        for sentence in sentences {
            if log::log_enabled!(log::Level::Debug) {
                let text: String = sentence.iter().collect();
                log::debug!("Converting {} phoneme(s) to ids: {text}", sentence.len());
            }

            let phrases = split_phrases(
                sentence,
                config.phoneme_silence_seconds.as_ref(),
                config.sample_rate,
                config.channels,
            );
            for phrase in &phrases {
                if !phrase.phonemes.is_empty() {
                    let ids = phonemes_to_ids(
                        &phrase.phonemes,
                        &self.phonemize.phoneme_id_map,
                        &self.phonemize.id_config,
                        &mut report.missing,
                    );
                    log::debug!(
                        "Converted {} phoneme(s) to {} phoneme id(s): {ids:?}",
                        phrase.phonemes.len(),
                        ids.len()
                    );

                    let (audio, result) = synthesize_ids(&mut *self.model, &ids, config)?;
                    samples.extend_from_slice(&audio);
                    report.result.accumulate(&result);
                }
                samples.resize(samples.len() + phrase.silence_samples, 0);
            }

            samples.resize(samples.len() + sentence_silence, 0);
            sentence_done(&mut *samples)?;
        }

        report.missing.log_warnings();
        report.result.update_real_time_factor();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhonemeType;
    use crate::inference::{ModelInput, ModelOutput};
    use crate::phoneme::{PhonemeIdConfig, PhonemeIdMap};
    use crate::PiperError;

    /// Emits 10 samples per id, recording every call.
    #[derive(Default)]
    struct CountingModel {
        calls: Vec<Vec<i64>>,
    }

    impl AcousticModel for CountingModel {
        fn run(&mut self, input: &ModelInput<'_>) -> Result<Vec<ModelOutput>> {
            self.calls.push(input.ids.to_vec());
            let data = vec![0.5; input.ids.len() * 10];
            Ok(vec![ModelOutput::Tensor {
                shape: vec![1, data.len()],
                data,
            }])
        }
    }

    fn phonemize_config() -> PhonemizeConfig {
        let id_map: PhonemeIdMap = [
            ('a', vec![1]),
            ('b', vec![2]),
            ('.', vec![3]),
            (',', vec![4]),
        ]
        .into_iter()
        .collect();
        PhonemizeConfig {
            phoneme_type: PhonemeType::Text,
            espeak_voice: String::new(),
            phoneme_id_map: id_map,
            phoneme_map: None,
            id_config: PhonemeIdConfig::default(),
        }
    }

    fn config(silence: &[(Phoneme, f32)], sentence_silence: f32) -> SynthesisConfig {
        SynthesisConfig {
            sample_rate: 100,
            sentence_silence_seconds: sentence_silence,
            phoneme_silence_seconds: if silence.is_empty() {
                None
            } else {
                Some(silence.iter().copied().collect())
            },
            ..Default::default()
        }
    }

    fn sentences(texts: &[&str]) -> Vec<Vec<Phoneme>> {
        texts.iter().map(|t| t.chars().collect()).collect()
    }

    #[test]
    fn one_call_per_sentence_without_silence_map() {
        let mut model = CountingModel::default();
        let phonemize = phonemize_config();
        let config = config(&[], 0.0);
        let out = SentenceSynthesizer::new(&mut model, &phonemize, &config)
            .synthesize(&sentences(&["ab.", "ba."]))
            .unwrap();

        assert_eq!(model.calls, vec![vec![1, 2, 3], vec![2, 1, 3]]);
        assert_eq!(out.samples.len(), 60);
        assert!((out.result.audio_seconds - 0.6).abs() < 1e-9);
    }

    #[test]
    fn phrase_and_sentence_silence_are_appended() {
        let mut model = CountingModel::default();
        let phonemize = phonemize_config();
        // ',' → 0.5 s = 50 samples, '.' → 0.2 s = 20 samples, sentence 0.1 s = 10 samples
        let config = config(&[(',', 0.5), ('.', 0.2)], 0.1);
        let out = SentenceSynthesizer::new(&mut model, &phonemize, &config)
            .synthesize(&sentences(&["a,b."]))
            .unwrap();

        assert_eq!(model.calls, vec![vec![1, 4], vec![2, 3]]);
        assert_eq!(out.samples.len(), 20 + 50 + 20 + 20 + 10);
        assert!(out.samples[20..70].iter().all(|&s| s == 0));
        assert!(out.samples[70..90].iter().all(|&s| s != 0));
        assert!(out.samples[90..].iter().all(|&s| s == 0));
        // silence does not count as synthesized audio
        assert!((out.result.audio_seconds - 0.4).abs() < 1e-9);
    }

    #[test]
    fn empty_phrases_are_not_sent_to_the_model() {
        let mut model = CountingModel::default();
        let phonemize = phonemize_config();
        let config = config(&[('.', 0.1)], 0.0);
        let out = SentenceSynthesizer::new(&mut model, &phonemize, &config)
            .synthesize(&sentences(&["", "a."]))
            .unwrap();

        assert_eq!(model.calls, vec![vec![1, 3]]);
        assert_eq!(out.samples.len(), 20 + 10);
    }

    #[test]
    fn phrases_with_only_missing_phonemes_still_run_inference() {
        let mut model = CountingModel::default();
        let phonemize = phonemize_config();
        let config = config(&[], 0.0);
        let out = SentenceSynthesizer::new(&mut model, &phonemize, &config)
            .synthesize(&sentences(&["xa", "yx"]))
            .unwrap();

        assert_eq!(model.calls, vec![vec![1], vec![]]);
        assert_eq!(out.missing.count('x'), 2);
        assert_eq!(out.missing.count('y'), 1);
    }

    #[test]
    fn streaming_emits_one_buffer_per_sentence() {
        let mut model = CountingModel::default();
        let phonemize = phonemize_config();
        let config = config(&[], 0.1);
        let mut chunks = Vec::new();
        let report = SentenceSynthesizer::new(&mut model, &phonemize, &config)
            .synthesize_streaming(&sentences(&["a", "ab", "abb"]), |chunk| {
                chunks.push(chunk.to_vec());
                Ok(())
            })
            .unwrap();

        let lengths: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![20, 30, 40]);
        assert!((report.result.audio_seconds - 0.6).abs() < 1e-9);
    }

    #[test]
    fn streaming_callback_error_stops_synthesis() {
        let mut model = CountingModel::default();
        let phonemize = phonemize_config();
        let config = config(&[], 0.0);
        let err = SentenceSynthesizer::new(&mut model, &phonemize, &config)
            .synthesize_streaming(&sentences(&["a", "b"]), |_| {
                Err(PiperError::InvalidArgument("sink closed".to_string()))
            })
            .unwrap_err();

        assert!(matches!(err, PiperError::InvalidArgument(_)));
        assert_eq!(model.calls.len(), 1);
    }

    #[test]
    fn real_time_factor_is_zero_for_empty_input() {
        let mut model = CountingModel::default();
        let phonemize = phonemize_config();
        let config = config(&[], 0.0);
        let out = SentenceSynthesizer::new(&mut model, &phonemize, &config)
            .synthesize(&[])
            .unwrap();
        assert!(out.samples.is_empty());
        assert_eq!(out.result.real_time_factor, 0.0);
    }
}
