//! Splitting a sentence into silence-delimited phrases.

use crate::phoneme::{Phoneme, PhonemeSilenceMap};

/// A run of phonemes synthesized in one model call, followed by silence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Phrase {
    pub phonemes: Vec<Phoneme>,
    /// Zero samples appended after this phrase's audio.
    pub silence_samples: usize,
}

/// Number of interleaved samples covering `seconds` of audio.
pub fn silence_samples(seconds: f32, sample_rate: u32, channels: u16) -> usize {
    if seconds <= 0.0 {
        return 0;
    }
    (seconds as f64 * sample_rate as f64 * channels as f64) as usize
}

/// Split `sentence` after every phoneme that has an entry in `silence`.
///
/// The phoneme that triggers a split stays at the end of the phrase it closes.
/// Empty phrases are kept so their silence is still honoured; callers skip
/// them for inference. Without a silence map the whole sentence is one phrase.
pub fn split_phrases(
    sentence: &[Phoneme],
    silence: Option<&PhonemeSilenceMap>,
    sample_rate: u32,
    channels: u16,
) -> Vec<Phrase> {
    let Some(silence) = silence else {
        return vec![Phrase {
            phonemes: sentence.to_vec(),
            silence_samples: 0,
        }];
    };

    let mut phrases = Vec::new();
    let mut current = Phrase::default();
    for &phoneme in sentence {
        current.phonemes.push(phoneme);
        if let Some(&seconds) = silence.get(&phoneme) {
            current.silence_samples = silence_samples(seconds, sample_rate, channels);
            phrases.push(std::mem::take(&mut current));
        }
    }
    phrases.push(current);

    phrases
}
