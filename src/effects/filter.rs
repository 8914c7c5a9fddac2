//! Telephone band-pass filter and peak normalization.

use std::f64::consts::PI;

use super::EFFECTS_SAMPLE_RATE;
use crate::error::{PiperError, Result};

const TELEPHONE_LOW_HZ: f64 = 300.0;
const TELEPHONE_HIGH_HZ: f64 = 3000.0;
const TELEPHONE_ORDER: usize = 6;
const TELEPHONE_HEADROOM_DB: f64 = 0.1;

/// Full-scale amplitude used as the normalization reference.
const MAX_POSSIBLE_AMP: f64 = 32768.0;

/// Second-order IIR section, coefficients normalized by `a0`.
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn low_pass(cutoff: f64, fs: f64, q: f64) -> Self {
        let (cos, alpha) = Self::warp(cutoff, fs, q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos) / 2.0 / a0,
            b1: (1.0 - cos) / a0,
            b2: (1.0 - cos) / 2.0 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn high_pass(cutoff: f64, fs: f64, q: f64) -> Self {
        let (cos, alpha) = Self::warp(cutoff, fs, q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos) / 2.0 / a0,
            b1: -(1.0 + cos) / a0,
            b2: (1.0 + cos) / 2.0 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn warp(cutoff: f64, fs: f64, q: f64) -> (f64, f64) {
        let w0 = 2.0 * PI * cutoff / fs;
        (w0.cos(), w0.sin() / (2.0 * q))
    }

    fn process(&self, signal: &mut [f64]) {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        for sample in signal.iter_mut() {
            let x0 = *sample;
            let y0 = self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
            *sample = y0;
        }
    }
}

/// Q of each second-order section of an even-order Butterworth filter.
fn butterworth_qs(order: usize) -> impl Iterator<Item = f64> {
    (0..order / 2).map(move |k| 1.0 / (2.0 * (PI * (2 * k + 1) as f64 / (2 * order) as f64).sin()))
}

/// Butterworth band-pass: a high-pass at `low_hz` cascaded with a low-pass at
/// `high_hz`, each of `order` (rounded down to even).
pub fn bandpass_filter(
    data: &[i16],
    low_hz: f64,
    high_hz: f64,
    fs: f64,
    order: usize,
) -> Result<Vec<i16>> {
    if low_hz <= 0.0 || high_hz >= fs / 2.0 || low_hz >= high_hz {
        return Err(PiperError::InvalidArgument(format!(
            "invalid frequency range for bandpass filter: {low_hz}-{high_hz} Hz at {fs} Hz"
        )));
    }

    let mut signal: Vec<f64> = data.iter().map(|&s| s as f64).collect();
    for q in butterworth_qs(order) {
        Biquad::high_pass(low_hz, fs, q).process(&mut signal);
        Biquad::low_pass(high_hz, fs, q).process(&mut signal);
    }

    Ok(signal
        .into_iter()
        .map(|s| s.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16)
        .collect())
}

/// Rescale so the peak sits `headroom_db` below `max_possible_amp`.
///
/// Silent input is returned unchanged.
pub fn normalize_audio(sound: &[i16], headroom_db: f64, max_possible_amp: f64) -> Result<Vec<i16>> {
    if sound.is_empty() {
        return Err(PiperError::InvalidArgument(
            "sound data is empty and cannot be normalized".to_string(),
        ));
    }

    let peak = sound.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0) as f64;
    if peak == 0.0 {
        return Ok(sound.to_vec());
    }

    let target = max_possible_amp * 10f64.powf(-headroom_db / 20.0);
    Ok(sound
        .iter()
        .map(|&s| (s as f64 * target / peak).clamp(i16::MIN as f64, i16::MAX as f64) as i16)
        .collect())
}

/// Narrow the signal to the 300–3000 Hz telephone band and renormalize.
pub fn telephone_effect(samples: &mut Vec<i16>) -> Result<()> {
    if samples.is_empty() {
        return Err(PiperError::InvalidArgument(
            "input audio buffer is empty".to_string(),
        ));
    }

    let filtered = bandpass_filter(
        samples,
        TELEPHONE_LOW_HZ,
        TELEPHONE_HIGH_HZ,
        EFFECTS_SAMPLE_RATE as f64,
        TELEPHONE_ORDER,
    )?;
    *samples = normalize_audio(&filtered, TELEPHONE_HEADROOM_DB, MAX_POSSIBLE_AMP)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, len: usize, amplitude: f64) -> Vec<i16> {
        let fs = EFFECTS_SAMPLE_RATE as f64;
        (0..len)
            .map(|i| (amplitude * (2.0 * PI * freq * i as f64 / fs).sin()) as i16)
            .collect()
    }

    fn rms(samples: &[i16]) -> f64 {
        let sum: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    fn filtered_rms(freq: f64) -> f64 {
        let out = bandpass_filter(&sine(freq, 22050, 10000.0), 300.0, 3000.0, 22050.0, 6).unwrap();
        // skip the filter's settling time
        rms(&out[2000..])
    }

    #[test]
    fn passes_voice_band_and_attenuates_outside() {
        let pass = filtered_rms(1000.0);
        assert!(pass > 6000.0, "1 kHz rms {pass}");
        assert!(filtered_rms(60.0) < pass / 20.0);
        assert!(filtered_rms(8000.0) < pass / 20.0);
    }

    #[test]
    fn rejects_invalid_band() {
        for (low, high) in [(0.0, 3000.0), (3000.0, 300.0), (300.0, 11025.0)] {
            assert!(matches!(
                bandpass_filter(&[1, 2, 3], low, high, 22050.0, 6),
                Err(PiperError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn normalizes_peak_below_full_scale() {
        let out = normalize_audio(&[1000, -500, 0], 0.1, 32768.0).unwrap();
        // 32768 * 10^(-0.1 / 20) ≈ 32392.5
        assert_eq!(out, vec![32392, -16196, 0]);
        assert_eq!(normalize_audio(&[0, 0], 0.1, 32768.0).unwrap(), vec![0, 0]);
        assert!(normalize_audio(&[], 0.1, 32768.0).is_err());
    }

    #[test]
    fn telephone_rejects_empty_buffer() {
        assert!(matches!(
            telephone_effect(&mut Vec::new()),
            Err(PiperError::InvalidArgument(_))
        ));
    }

    #[test]
    fn telephone_output_is_normalized() {
        let mut samples = sine(1000.0, 4410, 3000.0);
        telephone_effect(&mut samples).unwrap();
        assert_eq!(samples.len(), 4410);
        let peak = samples.iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!((32390..=32393).contains(&peak), "peak {peak}");
    }
}
