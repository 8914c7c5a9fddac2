//! Pitch shifting.

use std::f32::consts::PI;
use std::fmt::Display;

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::{PiperError, Result};

/// Engine that resynthesizes mono float audio at a different pitch.
///
/// The returned stream may differ in length from the input.
pub trait PitchShifter {
    fn shift(
        &self,
        samples: &[f32],
        sample_rate: u32,
        channels: u16,
        semitones: f32,
    ) -> Result<Vec<f32>>;
}

/// Phase vocoder time stretch by the pitch ratio, followed by a band-limited
/// sinc resample back to the input length.
///
/// The output always has as many samples as the input.
#[derive(Debug, Clone)]
pub struct VocoderPitchShifter {
    /// Analysis window length in seconds, rounded up to a power of two in samples.
    pub frame_seconds: f32,
}

impl Default for VocoderPitchShifter {
    fn default() -> Self {
        Self {
            frame_seconds: 0.04,
        }
    }
}

impl PitchShifter for VocoderPitchShifter {
    fn shift(
        &self,
        samples: &[f32],
        sample_rate: u32,
        channels: u16,
        semitones: f32,
    ) -> Result<Vec<f32>> {
        if channels != 1 {
            return Err(PiperError::InvalidArgument(format!(
                "pitch shifting supports mono audio only, got {channels} channels"
            )));
        }

        let frame = ((sample_rate as f32 * self.frame_seconds) as usize)
            .max(16)
            .next_power_of_two();
        if semitones == 0.0 || samples.len() < frame {
            return Ok(samples.to_vec());
        }

        let hop_in = frame / 4;
        let ratio = 2f32.powf(semitones / 12.0);
        let hop_out = ((hop_in as f32 * ratio).round() as usize).max(1);
        let stretch = hop_out as f64 / hop_in as f64;

        let stretched = time_stretch(samples, frame, hop_out)?;
        log::trace!(
            "Pitch shift by {semitones} semitone(s): {} -> {} samples, frame {frame}",
            samples.len(),
            stretched.len()
        );

        let mut shifted = resample(&stretched, 1.0 / stretch)?;
        shifted.resize(samples.len(), 0.0);
        Ok(shifted)
    }
}

fn dsp_error(e: impl Display) -> PiperError {
    PiperError::Dsp(e.to_string())
}

fn wrap_phase(phase: f32) -> f32 {
    phase - 2.0 * PI * (phase / (2.0 * PI)).round()
}

/// Change the duration by `hop_out / (frame / 4)` while keeping the pitch.
fn time_stretch(samples: &[f32], frame: usize, hop_out: usize) -> Result<Vec<f32>> {
    let hop_in = frame / 4;
    let stretch = hop_out as f32 / hop_in as f32;
    let window: Vec<f32> = (0..frame)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / frame as f32).cos()))
        .collect();

    let mut padded = vec![0.0f32; frame];
    padded.extend_from_slice(samples);
    padded.resize(padded.len() + frame, 0.0);

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(frame);
    let ifft = planner.plan_fft_inverse(frame);
    let mut time = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let mut resynth = ifft.make_output_vec();

    let bins = spectrum.len();
    let mut analysis_phase = vec![0.0f32; bins];
    let mut synthesis_phase = vec![0.0f32; bins];

    let frames = (padded.len() - frame) / hop_in + 1;
    let out_len = (frames - 1) * hop_out + frame;
    let mut output = vec![0.0f32; out_len];
    let mut envelope = vec![0.0f32; out_len];

    for t in 0..frames {
        let start = t * hop_in;
        for (i, slot) in time.iter_mut().enumerate() {
            *slot = padded[start + i] * window[i];
        }
        fft.process(&mut time, &mut spectrum).map_err(dsp_error)?;

        for (k, bin) in spectrum.iter_mut().enumerate() {
            let (magnitude, phase) = bin.to_polar();
            if t == 0 {
                synthesis_phase[k] = phase;
            } else {
                let expected = 2.0 * PI * k as f32 * hop_in as f32 / frame as f32;
                let deviation = wrap_phase(phase - analysis_phase[k] - expected);
                synthesis_phase[k] =
                    wrap_phase(synthesis_phase[k] + (expected + deviation) * stretch);
            }
            analysis_phase[k] = phase;
            *bin = Complex::from_polar(magnitude, synthesis_phase[k]);
        }
        spectrum[0].im = 0.0;
        spectrum[bins - 1].im = 0.0;
        ifft.process(&mut spectrum, &mut resynth).map_err(dsp_error)?;

        let out_start = t * hop_out;
        for (i, &w) in window.iter().enumerate() {
            output[out_start + i] += resynth[i] * w / frame as f32;
            envelope[out_start + i] += w * w;
        }
    }

    for (sample, &weight) in output.iter_mut().zip(&envelope) {
        if weight > 1e-3 {
            *sample /= weight;
        }
    }

    // The leading pad of four input hops lands four output hops in.
    output.drain(..4 * hop_out);
    output.resize((samples.len() as f64 * stretch as f64).round() as usize, 0.0);
    Ok(output)
}

/// Resample by `ratio` (output rate over input rate) with a windowed sinc.
fn resample(samples: &[f32], ratio: f64) -> Result<Vec<f32>> {
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1).map_err(dsp_error)?;
    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let mut output = resampler
        .process(&[samples], None)
        .map_err(dsp_error)?
        .into_iter()
        .next()
        .unwrap_or_default();
    // Flush the filter tail so the delayed end of the signal comes out.
    let tail = resampler
        .process_partial(None::<&[&[f32]]>, None)
        .map_err(dsp_error)?;
    output.extend(tail.into_iter().flatten());

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}
