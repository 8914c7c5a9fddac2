//! Running the acoustic model on one phrase and normalizing its output.

use std::time::Instant;

use crate::config::{SpeakerId, SynthesisConfig};
use crate::error::{PiperError, Result};
use crate::phoneme::PhonemeId;

/// Maximum value for a 16-bit signed sample.
pub const MAX_WAV_VALUE: f32 = 32767.0;

/// Lower bound on the peak used for normalization, so near-silent output is
/// not blown up.
const MIN_PEAK: f32 = 0.01;

/// Inputs for one acoustic model call.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput<'a> {
    pub ids: &'a [PhonemeId],
    /// `[noise_scale, length_scale, noise_w]`
    pub scales: [f32; 3],
    pub speaker_id: Option<SpeakerId>,
}

/// One value returned by the acoustic model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    Tensor { shape: Vec<usize>, data: Vec<f32> },
    /// Anything that is not a float tensor (sequence, map, ...), by name.
    Other(String),
}

/// A neural model turning phoneme ids into raw audio at the voice's sample rate.
pub trait AcousticModel {
    fn run(&mut self, input: &ModelInput<'_>) -> Result<Vec<ModelOutput>>;
}

/// Timing of one or more synthesis calls.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SynthesisResult {
    pub infer_seconds: f64,
    pub audio_seconds: f64,
    pub real_time_factor: f64,
}

impl SynthesisResult {
    pub fn new(infer_seconds: f64, audio_seconds: f64) -> Self {
        let mut result = Self {
            infer_seconds,
            audio_seconds,
            real_time_factor: 0.0,
        };
        result.update_real_time_factor();
        result
    }

    /// Add another call's timings. The real-time factor is left for
    /// [`update_real_time_factor`](Self::update_real_time_factor).
    pub fn accumulate(&mut self, other: &SynthesisResult) {
        self.infer_seconds += other.infer_seconds;
        self.audio_seconds += other.audio_seconds;
    }

    /// Recompute `infer / audio`, or 0 when there is no audio.
    pub fn update_real_time_factor(&mut self) {
        self.real_time_factor = if self.audio_seconds > 0.0 {
            self.infer_seconds / self.audio_seconds
        } else {
            0.0
        };
    }
}

/// Synthesize one phrase worth of ids into 16-bit samples.
pub fn synthesize_ids<M: AcousticModel + ?Sized>(
    model: &mut M,
    ids: &[PhonemeId],
    config: &SynthesisConfig,
) -> Result<(Vec<i16>, SynthesisResult)> {
    log::debug!("Synthesizing audio for {} phoneme id(s)", ids.len());

    let input = ModelInput {
        ids,
        scales: [config.noise_scale, config.length_scale, config.noise_w],
        speaker_id: config.speaker_id,
    };

    let start = Instant::now();
    let outputs = model.run(&input)?;
    let infer_seconds = start.elapsed().as_secs_f64();

    let audio = single_audio_tensor(outputs)?;
    let audio_seconds = audio.len() as f64 / config.sample_rate as f64;
    let result = SynthesisResult::new(infer_seconds, audio_seconds);
    log::debug!(
        "Synthesized {audio_seconds} second(s) of audio in {infer_seconds} second(s)"
    );

    Ok((float_to_i16(&audio), result))
}

/// Extract the audio samples from the model's outputs.
///
/// Exactly one float tensor is accepted; its last dimension is the sample count.
fn single_audio_tensor(outputs: Vec<ModelOutput>) -> Result<Vec<f32>> {
    let count = outputs.len();
    let mut outputs = outputs.into_iter();
    match (outputs.next(), count) {
        (Some(ModelOutput::Tensor { shape, mut data }), 1) => {
            let samples = shape.last().copied().unwrap_or(0).min(data.len());
            data.truncate(samples);
            Ok(data)
        }
        (Some(ModelOutput::Other(name)), 1) => Err(PiperError::InvalidModelOutput(format!(
            "output '{name}' is not a tensor"
        ))),
        _ => Err(PiperError::InvalidModelOutput(format!(
            "expected 1 output tensor, got {count}"
        ))),
    }
}

/// Scale raw model audio to fill the 16-bit range.
///
/// Normalization is per call, so phrases come out at similar loudness but
/// separate calls are not comparable.
pub fn float_to_i16(audio: &[f32]) -> Vec<i16> {
    let peak = audio.iter().fold(MIN_PEAK, |max, &s| max.max(s.abs()));
    let scale = MAX_WAV_VALUE / peak.max(MIN_PEAK);
    audio
        .iter()
        .map(|&s| (s * scale).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}
