//! Voice configuration: the Piper `<model>.onnx.json` file and per-request overrides.
//!
//! ```json
//! {
//!   "audio": { "sample_rate": 22050 },
//!   "espeak": { "voice": "en-us" },
//!   "phoneme_type": "espeak",
//!   "phoneme_map": { "<from>": ["<to>", ...] },
//!   "phoneme_id_map": { "<phoneme>": [<id>, ...] },
//!   "inference": {
//!     "noise_scale": 0.667, "length_scale": 1, "noise_w": 0.8,
//!     "phoneme_silence": { "<phoneme>": <seconds> }
//!   },
//!   "num_speakers": 1,
//!   "speaker_id_map": { "<name>": <id> }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PiperError, Result};
use crate::phoneme::{
    parse_phoneme, Phoneme, PhonemeIdConfig, PhonemeIdMap, PhonemeMap, PhonemeSilenceMap,
};

pub type SpeakerId = i64;

pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Longest silence a voice or request may ask for after a phoneme or sentence.
pub const MAX_SILENCE_SECONDS: f32 = 60.0;

fn silence_in_range(seconds: f32) -> bool {
    seconds.is_finite() && (0.0..=MAX_SILENCE_SECONDS).contains(&seconds)
}

/// How text is turned into phonemes for a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhonemeType {
    /// espeak-ng IPA phonemes for the configured voice code.
    #[default]
    Espeak,
    /// Text codepoints are used directly as phonemes.
    Text,
}

/// Everything needed to go from text to model ids.
#[derive(Debug, Clone)]
pub struct PhonemizeConfig {
    pub phoneme_type: PhonemeType,
    /// espeak-ng voice code, e.g. `en-us`.
    pub espeak_voice: String,
    pub phoneme_id_map: PhonemeIdMap,
    pub phoneme_map: Option<PhonemeMap>,
    pub id_config: PhonemeIdConfig,
}

impl PhonemizeConfig {
    /// Rewrite `phonemes` through the phoneme map, if one is configured.
    pub fn map_phonemes(&self, phonemes: Vec<Phoneme>) -> Vec<Phoneme> {
        let Some(map) = &self.phoneme_map else {
            return phonemes;
        };
        let mut mapped = Vec::with_capacity(phonemes.len());
        for phoneme in phonemes {
            match map.get(&phoneme) {
                Some(replacement) => mapped.extend_from_slice(replacement),
                None => mapped.push(phoneme),
            }
        }
        mapped
    }
}

/// Audio format and model scalars used for every synthesis call on a voice.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bytes per sample.
    pub sample_width: u16,
    pub noise_scale: f32,
    pub length_scale: f32,
    pub noise_w: f32,
    pub speaker_id: Option<SpeakerId>,
    /// Silence appended after every sentence.
    pub sentence_silence_seconds: f32,
    /// Silence appended after specific phonemes; enables phrase splitting.
    pub phoneme_silence_seconds: Option<PhonemeSilenceMap>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            sample_width: 2,
            noise_scale: 0.667,
            length_scale: 1.0,
            noise_w: 0.8,
            speaker_id: None,
            sentence_silence_seconds: 0.2,
            phoneme_silence_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelConfig {
    pub num_speakers: u32,
    pub speaker_id_map: HashMap<String, SpeakerId>,
}

/// A speaker requested by id or by name from `speaker_id_map`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Speaker {
    Id(SpeakerId),
    Name(String),
}

impl ModelConfig {
    /// Pick the speaker id for a request.
    ///
    /// Multi-speaker voices fall back to speaker 0 when nothing is requested;
    /// single-speaker voices never send a speaker id.
    pub fn resolve_speaker(&self, requested: Option<&Speaker>) -> Result<Option<SpeakerId>> {
        if self.num_speakers <= 1 {
            if requested.is_some() {
                log::debug!("Ignoring speaker for single-speaker voice");
            }
            return Ok(None);
        }
        match requested {
            None => Ok(Some(0)),
            Some(Speaker::Id(id)) => Ok(Some(*id)),
            Some(Speaker::Name(name)) => self
                .speaker_id_map
                .get(name)
                .copied()
                .map(Some)
                .ok_or_else(|| PiperError::UnknownSpeaker(name.clone())),
        }
    }
}

/// Fully validated voice configuration.
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub phonemize: PhonemizeConfig,
    pub synthesis: SynthesisConfig,
    pub model: ModelConfig,
}

impl VoiceConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        log::debug!("Parsing voice config at {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawVoiceConfig = serde_json::from_str(json)?;
        raw.validate()
    }
}

/// Per-request overrides applied on top of a voice's [`SynthesisConfig`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SynthesisParams {
    pub speaker: Option<Speaker>,
    pub noise_scale: Option<f32>,
    pub length_scale: Option<f32>,
    pub noise_w: Option<f32>,
    pub sentence_silence_seconds: Option<f32>,
}

impl SynthesisParams {
    /// Copy of `base` with these overrides applied.
    pub fn apply(&self, base: &SynthesisConfig, model: &ModelConfig) -> Result<SynthesisConfig> {
        let mut config = base.clone();
        if let Some(speaker) = &self.speaker {
            config.speaker_id = model.resolve_speaker(Some(speaker))?;
        }
        if let Some(v) = self.noise_scale {
            config.noise_scale = v;
        }
        if let Some(v) = self.length_scale {
            config.length_scale = v;
        }
        if let Some(v) = self.noise_w {
            config.noise_w = v;
        }
        if let Some(v) = self.sentence_silence_seconds {
            if !silence_in_range(v) {
                return Err(PiperError::InvalidArgument(format!(
                    "sentence silence must be between 0 and {MAX_SILENCE_SECONDS} seconds, got {v}"
                )));
            }
            config.sentence_silence_seconds = v;
        }
        Ok(config)
    }
}

#[derive(Deserialize)]
struct RawVoiceConfig {
    #[serde(default)]
    audio: RawAudio,
    #[serde(default)]
    espeak: RawEspeak,
    #[serde(default)]
    phoneme_type: PhonemeType,
    #[serde(default)]
    phoneme_map: Option<HashMap<String, Vec<String>>>,
    phoneme_id_map: HashMap<String, Vec<i64>>,
    #[serde(default)]
    inference: RawInference,
    #[serde(default = "default_num_speakers")]
    num_speakers: u32,
    #[serde(default)]
    speaker_id_map: HashMap<String, SpeakerId>,
}

#[derive(Deserialize, Default)]
struct RawAudio {
    sample_rate: Option<u32>,
}

#[derive(Deserialize)]
struct RawEspeak {
    #[serde(default = "default_espeak_voice")]
    voice: String,
}

impl Default for RawEspeak {
    fn default() -> Self {
        Self {
            voice: default_espeak_voice(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawInference {
    noise_scale: Option<f32>,
    length_scale: Option<f32>,
    noise_w: Option<f32>,
    phoneme_silence: Option<HashMap<String, f32>>,
}

fn default_num_speakers() -> u32 {
    1
}

fn default_espeak_voice() -> String {
    "en-us".to_string()
}

impl RawVoiceConfig {
    fn validate(self) -> Result<VoiceConfig> {
        let mut phoneme_id_map = PhonemeIdMap::with_capacity(self.phoneme_id_map.len());
        for (key, ids) in self.phoneme_id_map {
            let phoneme = parse_phoneme(&key, "phoneme id map")?;
            phoneme_id_map.entry(phoneme).or_default().extend(ids);
        }
        if phoneme_id_map.is_empty() {
            return Err(PiperError::Config("phoneme_id_map is empty".to_string()));
        }

        let phoneme_map = self
            .phoneme_map
            .map(|map| {
                map.into_iter()
                    .map(|(from, to)| {
                        let from = parse_phoneme(&from, "phoneme map")?;
                        let to = to
                            .iter()
                            .map(|p| parse_phoneme(p, "phoneme map"))
                            .collect::<Result<Vec<_>>>()?;
                        Ok((from, to))
                    })
                    .collect::<Result<PhonemeMap>>()
            })
            .transpose()?;

        let phoneme_silence_seconds = self
            .inference
            .phoneme_silence
            .map(|map| {
                map.into_iter()
                    .map(|(key, seconds)| {
                        let phoneme = parse_phoneme(&key, "phoneme silence")?;
                        if !silence_in_range(seconds) {
                            return Err(PiperError::Config(format!(
                                "phoneme silence for {key:?} must be between 0 and \
                                 {MAX_SILENCE_SECONDS} seconds, got {seconds}"
                            )));
                        }
                        Ok((phoneme, seconds))
                    })
                    .collect::<Result<PhonemeSilenceMap>>()
            })
            .transpose()?;

        let sample_rate = self.audio.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        if sample_rate == 0 {
            return Err(PiperError::Config("audio.sample_rate must be positive".to_string()));
        }

        let defaults = SynthesisConfig::default();
        let model = ModelConfig {
            num_speakers: self.num_speakers,
            speaker_id_map: self.speaker_id_map,
        };
        let synthesis = SynthesisConfig {
            sample_rate,
            noise_scale: self.inference.noise_scale.unwrap_or(defaults.noise_scale),
            length_scale: self.inference.length_scale.unwrap_or(defaults.length_scale),
            noise_w: self.inference.noise_w.unwrap_or(defaults.noise_w),
            speaker_id: model.resolve_speaker(None)?,
            phoneme_silence_seconds,
            ..defaults
        };
        log::debug!("Voice contains {} speaker(s)", model.num_speakers);

        let id_config = PhonemeIdConfig::for_id_map(&phoneme_id_map);
        Ok(VoiceConfig {
            phonemize: PhonemizeConfig {
                phoneme_type: self.phoneme_type,
                espeak_voice: self.espeak.voice,
                phoneme_id_map,
                phoneme_map,
                id_config,
            },
            synthesis,
            model,
        })
    }
}
