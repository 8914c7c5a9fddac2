//! Post-processing applied to an assembled waveform.
//!
//! Effects run in a fixed order: speed, volume, pitch, ambience preset, stereo.
//! An effect left at its neutral value is skipped. The first failing effect
//! aborts the rest of the chain.
//!
//! ```
//! use piper_rs::effects::{Ambience, AudioEffectsBuilder};
//!
//! let effects = AudioEffectsBuilder::default()
//!     .volume(-6.0)
//!     .ambience(Ambience::Cave)
//!     .stereo(true)
//!     .build()?;
//! assert_eq!(effects.speed, 1.0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod filter;
pub mod pitch;

use derive_builder::Builder;
use rand::Rng;
use serde::Deserialize;

use crate::error::{PiperError, Result};

pub use filter::telephone_effect;
pub use pitch::{PitchShifter, VocoderPitchShifter};

/// Sample rate the pitch and telephone effects assume, whatever the voice's
/// actual rate is.
pub const EFFECTS_SAMPLE_RATE: u32 = 22050;

/// Channel count the pitch effect assumes.
pub const EFFECTS_CHANNELS: u16 = 1;

pub const VOLUME_RANGE_DB: std::ops::RangeInclusive<f32> = -32.0..=32.0;
pub const PITCH_RANGE_SEMITONES: std::ops::RangeInclusive<f32> = -12.0..=12.0;

/// Longest buffer the speed effect will produce.
pub const MAX_EFFECT_SAMPLES: usize = 1 << 30;

/// Mutually exclusive colouring presets.
///
/// Everything except [`Ambience::Telephone`] is a fixed amplitude scale or
/// added noise, not an acoustic simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ambience {
    Telephone,
    Cave,
    SmallCave,
    GasMask,
    BadReception,
    NextRoom,
    Alien,
    Alien2,
}

impl Ambience {
    pub fn apply(self, samples: &mut Vec<i16>) -> Result<()> {
        match self {
            Ambience::Telephone => telephone_effect(samples)?,
            Ambience::Cave => scale_samples(samples, 0.7),
            Ambience::SmallCave => scale_samples(samples, 0.8),
            Ambience::GasMask => scale_samples(samples, 0.6),
            Ambience::BadReception => bad_reception_effect(samples, &mut rand::thread_rng()),
            Ambience::NextRoom => scale_samples(samples, 0.9),
            Ambience::Alien => scale_samples(samples, 1.5),
            Ambience::Alien2 => scale_samples(samples, 1.2),
        }
        Ok(())
    }
}

/// Effect parameters for one request.
#[derive(Debug, Clone, PartialEq, Builder, Deserialize)]
#[builder(default, build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct AudioEffects {
    /// Playback speed multiplier, > 0.
    pub speed: f32,
    /// Gain in dB, within [-32, 32].
    pub volume: f32,
    /// Pitch shift in semitones, within [-12, 12].
    pub semitones: f32,
    #[builder(setter(strip_option))]
    pub ambience: Option<Ambience>,
    pub stereo: bool,
}

impl Default for AudioEffects {
    fn default() -> Self {
        Self {
            speed: 1.0,
            volume: 0.0,
            semitones: 0.0,
            ambience: None,
            stereo: false,
        }
    }
}

impl AudioEffectsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(speed) = self.speed {
            check_speed(speed).map_err(|e| e.to_string())?;
        }
        if let Some(volume) = self.volume {
            check_volume(volume).map_err(|e| e.to_string())?;
        }
        if let Some(semitones) = self.semitones {
            check_semitones(semitones).map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

impl AudioEffects {
    /// Channel count after the chain runs on `channels`-channel input.
    pub fn output_channels(&self, channels: u16) -> u16 {
        if self.stereo {
            channels * 2
        } else {
            channels
        }
    }
}

/// Run the effects chain over `samples` in place.
pub fn apply_effects<P: PitchShifter + ?Sized>(
    samples: &mut Vec<i16>,
    effects: &AudioEffects,
    pitch_shifter: &P,
) -> Result<()> {
    if effects.speed != 1.0 {
        log::debug!("Applying speed effect: {}", effects.speed);
        speed_effect(samples, effects.speed)?;
    }
    if effects.volume != 0.0 {
        log::debug!("Applying volume effect: {}", effects.volume);
        volume_effect(samples, effects.volume)?;
    }
    if effects.semitones != 0.0 {
        log::debug!("Applying pitch effect: {}", effects.semitones);
        pitch_effect(samples, effects.semitones, pitch_shifter)?;
    }
    if let Some(ambience) = effects.ambience {
        log::debug!("Applying {ambience:?} effect");
        ambience.apply(samples)?;
    }
    if effects.stereo {
        log::debug!("Applying stereo effect");
        stereo_effect(samples);
    }
    Ok(())
}

fn check_speed(speed: f32) -> Result<()> {
    if speed > 0.0 {
        Ok(())
    } else {
        Err(PiperError::InvalidArgument(format!(
            "speed must be greater than 0, got {speed}"
        )))
    }
}

fn check_volume(volume: f32) -> Result<()> {
    if VOLUME_RANGE_DB.contains(&volume) {
        Ok(())
    } else {
        Err(PiperError::InvalidArgument(format!(
            "volume must be between -32 and 32 dB, got {volume}"
        )))
    }
}

fn check_semitones(semitones: f32) -> Result<()> {
    if PITCH_RANGE_SEMITONES.contains(&semitones) {
        Ok(())
    } else {
        Err(PiperError::InvalidArgument(format!(
            "semitones must be between -12 and 12, got {semitones}"
        )))
    }
}

/// Resample by linear interpolation, then rescale the peak to full range.
///
/// The output holds `floor(len / speed)` samples.
pub fn speed_effect(samples: &mut Vec<i16>, speed: f32) -> Result<()> {
    check_speed(speed)?;

    let len = samples.len();
    let target = len as f64 / speed as f64;
    if !target.is_finite() || target > MAX_EFFECT_SAMPLES as f64 {
        return Err(PiperError::InvalidArgument(format!(
            "speed {speed} would stretch {len} samples past {MAX_EFFECT_SAMPLES}"
        )));
    }
    let new_len = target as usize;

    let mut resampled = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let pos = i as f64 * speed as f64;
        let index = (pos as usize).min(len - 1);
        let frac = pos - index as f64;
        let value = if index + 1 < len {
            samples[index] as f64 * (1.0 - frac) + samples[index + 1] as f64 * frac
        } else {
            samples[index] as f64
        };
        resampled.push(value as i16);
    }

    let peak = resampled.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
    if peak > 0 {
        for sample in resampled.iter_mut() {
            *sample = (*sample as f64 * i16::MAX as f64 / peak as f64) as i16;
        }
    }

    *samples = resampled;
    Ok(())
}

/// Scale by `10^(dB / 20)`, clamped to the 16-bit range.
pub fn volume_effect(samples: &mut [i16], volume: f32) -> Result<()> {
    check_volume(volume)?;

    let factor = 10f32.powf(volume / 20.0);
    for sample in samples.iter_mut() {
        *sample = (*sample as f32 * factor)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    }
    Ok(())
}

/// Shift pitch through `shifter`, assuming [`EFFECTS_SAMPLE_RATE`] mono audio.
///
/// The output length is whatever the shifter returns.
pub fn pitch_effect<P: PitchShifter + ?Sized>(
    samples: &mut Vec<i16>,
    semitones: f32,
    shifter: &P,
) -> Result<()> {
    check_semitones(semitones)?;

    let input: Vec<f32> = samples.iter().map(|&s| s as f32 / 32768.0).collect();
    let shifted = shifter.shift(&input, EFFECTS_SAMPLE_RATE, EFFECTS_CHANNELS, semitones)?;
    *samples = shifted
        .iter()
        .map(|&s| (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect();
    Ok(())
}

fn scale_samples(samples: &mut [i16], factor: f32) {
    for sample in samples.iter_mut() {
        *sample = (*sample as f32 * factor) as i16;
    }
}

/// Add uniform integer noise in [-50, 50) to every sample.
pub fn bad_reception_effect<R: Rng + ?Sized>(samples: &mut [i16], rng: &mut R) {
    for sample in samples.iter_mut() {
        *sample = sample.saturating_add(rng.gen_range(-50..50));
    }
}

/// Duplicate every sample into an interleaved left/right pair.
pub fn stereo_effect(samples: &mut Vec<i16>) {
    *samples = samples.iter().flat_map(|&s| [s, s]).collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Returns its input unchanged.
    struct Passthrough;

    impl PitchShifter for Passthrough {
        fn shift(&self, samples: &[f32], _: u32, _: u16, _: f32) -> Result<Vec<f32>> {
            Ok(samples.to_vec())
        }
    }

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| (i as i16 % 200) * 10 - 1000).collect()
    }

    #[test]
    fn speed_output_length_is_floor_of_ratio() {
        let cases = [
            (1000, 2.0, 500),
            (1000, 0.5, 2000),
            (999, 1.5, 666),
            (7, 3.0, 2),
        ];
        for (len, speed, expected) in cases {
            let mut samples = ramp(len);
            speed_effect(&mut samples, speed).unwrap();
            assert_eq!(samples.len(), expected, "len {len} speed {speed}");
        }
    }

    #[test]
    fn speed_rejects_outputs_past_the_cap() {
        let mut samples = vec![1i16; 100];
        assert!(matches!(
            speed_effect(&mut samples, 1e-30),
            Err(PiperError::InvalidArgument(_))
        ));
        assert_eq!(samples.len(), 100);
    }

    #[test]
    fn speed_round_trip_preserves_duration() {
        let mut samples = ramp(1001);
        speed_effect(&mut samples, 2.0).unwrap();
        speed_effect(&mut samples, 0.5).unwrap();
        assert!((samples.len() as i64 - 1001).abs() <= 1);
    }

    #[test]
    fn speed_normalizes_peak_to_full_scale() {
        let mut samples = vec![100, -200, 50, 0];
        speed_effect(&mut samples, 1.0).unwrap();
        assert_eq!(samples.iter().map(|s| s.unsigned_abs()).max(), Some(32767));
        assert!(samples[1] < 0);
    }

    #[test]
    fn speed_handles_empty_and_silent_buffers() {
        let mut empty = Vec::new();
        speed_effect(&mut empty, 1.5).unwrap();
        assert!(empty.is_empty());

        let mut silent = vec![0i16; 10];
        speed_effect(&mut silent, 2.0).unwrap();
        assert_eq!(silent, vec![0; 5]);
    }

    #[test]
    fn speed_rejects_non_positive_factor() {
        for speed in [0.0, -1.0] {
            assert!(matches!(
                speed_effect(&mut ramp(10), speed),
                Err(PiperError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn volume_up_then_down_restores_samples() {
        let original = ramp(400);
        let mut samples = original.clone();
        volume_effect(&mut samples, 6.0).unwrap();
        volume_effect(&mut samples, -6.0).unwrap();
        for (a, b) in original.iter().zip(&samples) {
            assert!((*a as i32 - *b as i32).abs() <= 1, "{a} vs {b}");
        }
    }

    #[test]
    fn volume_clamps_to_16_bit_range() {
        let mut samples = vec![i16::MAX, i16::MIN, 20000];
        volume_effect(&mut samples, 32.0).unwrap();
        assert_eq!(samples, vec![i16::MAX, i16::MIN, i16::MAX]);
    }

    #[test]
    fn volume_rejects_out_of_range() {
        assert!(volume_effect(&mut [1, 2], 32.5).is_err());
        assert!(volume_effect(&mut [1, 2], -33.0).is_err());
        assert!(volume_effect(&mut [1, 2], -32.0).is_ok());
    }

    #[test]
    fn pitch_rejects_out_of_range() {
        assert!(matches!(
            pitch_effect(&mut ramp(10), 12.5, &Passthrough),
            Err(PiperError::InvalidArgument(_))
        ));
        assert!(pitch_effect(&mut ramp(10), -12.0, &Passthrough).is_ok());
    }

    #[test]
    fn pitch_converts_through_float_losslessly() {
        let original = ramp(50);
        let mut samples = original.clone();
        pitch_effect(&mut samples, 3.0, &Passthrough).unwrap();
        assert_eq!(samples, original);
    }

    #[test]
    fn placeholder_presets_use_fixed_scales() {
        let cases = [
            (Ambience::Cave, 700),
            (Ambience::SmallCave, 800),
            (Ambience::GasMask, 600),
            (Ambience::NextRoom, 900),
            (Ambience::Alien, 1500),
            (Ambience::Alien2, 1200),
        ];
        for (ambience, expected) in cases {
            let mut samples = vec![1000i16, 0];
            ambience.apply(&mut samples).unwrap();
            assert_eq!(samples, vec![expected, 0], "{ambience:?}");
        }
    }

    #[test]
    fn alien_saturates_instead_of_wrapping() {
        let mut samples = vec![30000i16, -30000];
        Ambience::Alien.apply(&mut samples).unwrap();
        assert_eq!(samples, vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn bad_reception_noise_is_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut samples = vec![0i16; 1000];
        bad_reception_effect(&mut samples, &mut rng);
        assert!(samples.iter().all(|&s| (-50..50).contains(&s)));
        assert!(samples.iter().any(|&s| s != 0));
    }

    #[test]
    fn stereo_duplicates_each_sample() {
        let mut samples = vec![1, -2, 3];
        stereo_effect(&mut samples);
        assert_eq!(samples, vec![1, 1, -2, -2, 3, 3]);
    }

    #[test]
    fn chain_applies_in_fixed_order() {
        // Volume before stereo: the duplicated samples carry the gain.
        let effects = AudioEffectsBuilder::default()
            .volume(20.0)
            .ambience(Ambience::Cave)
            .stereo(true)
            .build()
            .unwrap();
        let mut samples = vec![100i16, -100];
        apply_effects(&mut samples, &effects, &Passthrough).unwrap();
        assert_eq!(samples, vec![700, 700, -700, -700]);
    }

    #[test]
    fn default_effects_leave_audio_untouched() {
        let original = ramp(100);
        let mut samples = original.clone();
        apply_effects(&mut samples, &AudioEffects::default(), &Passthrough).unwrap();
        assert_eq!(samples, original);
    }

    #[test]
    fn failing_effect_aborts_chain() {
        let effects = AudioEffects {
            volume: 40.0,
            stereo: true,
            ..Default::default()
        };
        let mut samples = vec![1i16, 2];
        assert!(apply_effects(&mut samples, &effects, &Passthrough).is_err());
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn builder_validates_ranges() {
        assert!(AudioEffectsBuilder::default().speed(0.0).build().is_err());
        assert!(AudioEffectsBuilder::default().semitones(13.0).build().is_err());
        assert!(AudioEffectsBuilder::default().volume(-40.0).build().is_err());
        assert_eq!(
            AudioEffectsBuilder::default().build().unwrap(),
            AudioEffects::default()
        );
    }

    #[test]
    fn deserializes_from_json() {
        let effects: AudioEffects =
            serde_json::from_str(r#"{ "speed": 1.25, "ambience": "small_cave" }"#).unwrap();
        assert_eq!(effects.speed, 1.25);
        assert_eq!(effects.ambience, Some(Ambience::SmallCave));
        assert!(!effects.stereo);
    }
}
