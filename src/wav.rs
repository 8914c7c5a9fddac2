//! 16-bit PCM WAV output through `hound`.

use std::io::{Seek, Write};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::Result;

/// Integer PCM spec for `sample_width` bytes per sample.
pub fn pcm_spec(sample_rate: u32, channels: u16, sample_width: u16) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: sample_width * 8,
        sample_format: SampleFormat::Int,
    }
}

/// Streams interleaved samples into a WAV container.
///
/// The RIFF and data chunk sizes are patched in by [`PcmWavWriter::finalize`].
pub struct PcmWavWriter<W: Write + Seek> {
    inner: WavWriter<W>,
}

impl<W: Write + Seek> PcmWavWriter<W> {
    pub fn new(writer: W, spec: WavSpec) -> Result<Self> {
        Ok(Self {
            inner: WavWriter::new(writer, spec)?,
        })
    }

    pub fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        for &sample in samples {
            self.inner.write_sample(sample)?;
        }
        Ok(())
    }

    pub fn finalize(self) -> Result<()> {
        self.inner.finalize()?;
        Ok(())
    }
}

/// Write a complete WAV file holding `samples`.
pub fn write_wav<W: Write + Seek>(writer: W, spec: WavSpec, samples: &[i16]) -> Result<()> {
    let mut wav = PcmWavWriter::new(writer, spec)?;
    wav.write_samples(samples)?;
    wav.finalize()
}
