//! Phonemes, phoneme id tables and the phoneme → id mapping.

use std::collections::{BTreeMap, HashMap};

use crate::error::{PiperError, Result};

/// A single Unicode codepoint naming one unit of speech.
pub type Phoneme = char;

/// Model input id for a phoneme.
pub type PhonemeId = i64;

/// Phoneme → one or more model ids.
pub type PhonemeIdMap = HashMap<Phoneme, Vec<PhonemeId>>;

/// Phoneme → replacement phonemes, applied to phonemizer output.
pub type PhonemeMap = HashMap<Phoneme, Vec<Phoneme>>;

/// Phoneme → seconds of silence inserted after it.
pub type PhonemeSilenceMap = HashMap<Phoneme, f32>;

pub const BOS: Phoneme = '^';
pub const EOS: Phoneme = '$';
pub const PAD: Phoneme = '_';

/// Parse a configuration key that must be exactly one codepoint.
///
/// `table` names the config table the key came from and ends up in the error.
pub fn parse_phoneme(s: &str, table: &'static str) -> Result<Phoneme> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch),
        _ => {
            log::error!("\"{s}\" is not a single codepoint ({table})");
            Err(PiperError::NotSingleCodepoint {
                table,
                phoneme: s.to_string(),
            })
        }
    }
}

/// Optional framing around the mapped ids.
///
/// The default performs a plain lookup. Voices exported by Piper expect
/// beginning/end markers and a pad id after every phoneme; see
/// [`PhonemeIdConfig::for_id_map`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonemeIdConfig {
    pub bos: Phoneme,
    pub eos: Phoneme,
    pub pad: Phoneme,
    pub add_bos: bool,
    pub add_eos: bool,
    pub intersperse_pad: bool,
}

impl Default for PhonemeIdConfig {
    fn default() -> Self {
        Self {
            bos: BOS,
            eos: EOS,
            pad: PAD,
            add_bos: false,
            add_eos: false,
            intersperse_pad: false,
        }
    }
}

impl PhonemeIdConfig {
    /// Enable each kind of framing whose marker symbol exists in `id_map`.
    pub fn for_id_map(id_map: &PhonemeIdMap) -> Self {
        let base = Self::default();
        Self {
            add_bos: id_map.contains_key(&base.bos),
            add_eos: id_map.contains_key(&base.eos),
            intersperse_pad: id_map.contains_key(&base.pad),
            ..base
        }
    }
}

/// Occurrence counts of phonemes that had no entry in the id map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingPhonemes {
    counts: BTreeMap<Phoneme, usize>,
}

impl MissingPhonemes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, phoneme: Phoneme) {
        *self.counts.entry(phoneme).or_insert(0) += 1;
    }

    /// Occurrences of `phoneme`, 0 if it was never missing.
    pub fn count(&self, phoneme: Phoneme) -> usize {
        self.counts.get(&phoneme).copied().unwrap_or(0)
    }

    /// Number of distinct missing phonemes.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total missing occurrences across all phonemes.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phoneme, usize)> + '_ {
        self.counts.iter().map(|(&p, &n)| (p, n))
    }

    /// Emit the tally at warn level. Does nothing when empty.
    pub fn log_warnings(&self) {
        if self.is_empty() {
            return;
        }
        log::warn!("Missing {} phoneme(s) from phoneme/id map!", self.len());
        for (phoneme, n) in self.iter() {
            log::warn!(
                "Missing \"{phoneme}\" (\\u{:04X}): {n} time(s)",
                phoneme as u32
            );
        }
    }
}

/// Map phonemes to model ids, in order.
///
/// Phonemes absent from `id_map` contribute nothing and are counted in
/// `missing`. Framing markers requested by `config` are looked up in the same
/// map but never counted as missing.
pub fn phonemes_to_ids(
    phonemes: &[Phoneme],
    id_map: &PhonemeIdMap,
    config: &PhonemeIdConfig,
    missing: &mut MissingPhonemes,
) -> Vec<PhonemeId> {
    let pad: &[PhonemeId] = if config.intersperse_pad {
        marker_ids(id_map, config.pad)
    } else {
        &[]
    };

    let mut ids = Vec::with_capacity(phonemes.len() * (1 + pad.len()) + 2);
    if config.add_bos {
        ids.extend_from_slice(marker_ids(id_map, config.bos));
        ids.extend_from_slice(pad);
    }

    for &phoneme in phonemes {
        match id_map.get(&phoneme) {
            Some(mapped) => {
                ids.extend_from_slice(mapped);
                ids.extend_from_slice(pad);
            }
            None => missing.record(phoneme),
        }
    }

    if config.add_eos {
        ids.extend_from_slice(marker_ids(id_map, config.eos));
    }

    ids
}

fn marker_ids(id_map: &PhonemeIdMap, marker: Phoneme) -> &[PhonemeId] {
    id_map.get(&marker).map(Vec::as_slice).unwrap_or(&[])
}
