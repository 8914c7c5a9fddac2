//! Text → per-sentence phonemes.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::{PiperError, Result};
use crate::phoneme::Phoneme;

/// Turns text into phonemes, one list per sentence.
pub trait Phonemizer {
    fn phonemize(&self, text: &str) -> Result<Vec<Vec<Phoneme>>>;
}

/// Uses the text's own codepoints as phonemes, one sentence per non-empty line.
#[derive(Debug, Clone)]
pub struct CodepointPhonemizer {
    pub lowercase: bool,
}

impl Default for CodepointPhonemizer {
    fn default() -> Self {
        Self { lowercase: true }
    }
}

impl Phonemizer for CodepointPhonemizer {
    fn phonemize(&self, text: &str) -> Result<Vec<Vec<Phoneme>>> {
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                if self.lowercase {
                    line.chars().flat_map(char::to_lowercase).collect()
                } else {
                    line.chars().collect()
                }
            })
            .collect())
    }
}

/// Location of the espeak-ng binary and its data directory.
///
/// `None` falls back to `espeak-ng` on PATH and its compiled-in data path.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

/// IPA phonemes from the espeak-ng command line tool.
///
/// Sentences are split on `.`, `!`, `?` and line breaks before phonemization;
/// punctuation is kept as phonemes so voices can pause on it.
#[derive(Debug, Clone)]
pub struct EspeakPhonemizer {
    /// espeak-ng voice code, e.g. `"en-us"`.
    pub voice: String,
    pub espeak: EspeakConfig,
}

impl EspeakPhonemizer {
    pub fn new(voice: impl Into<String>, espeak: EspeakConfig) -> Self {
        Self {
            voice: voice.into(),
            espeak,
        }
    }
}

impl Phonemizer for EspeakPhonemizer {
    fn phonemize(&self, text: &str) -> Result<Vec<Vec<Phoneme>>> {
        let sentences = split_sentences(text);

        let text_segments: Vec<&str> = sentences
            .iter()
            .flatten()
            .filter_map(|part| match part {
                TextPart::Text(segment) => Some(segment.as_str()),
                TextPart::Punct(_) => None,
            })
            .collect();

        let segment_phonemes = if text_segments.is_empty() {
            Vec::new()
        } else {
            self.phonemize_segments_batch(&text_segments)?
        };

        let mut segments = segment_phonemes.into_iter();
        let mut result = Vec::with_capacity(sentences.len());
        for parts in sentences {
            let mut phonemes: Vec<Phoneme> = Vec::new();
            for part in parts {
                match part {
                    TextPart::Text(_) => {
                        let Some(ipa) = segments.next() else { continue };
                        if !phonemes.is_empty() {
                            phonemes.push(' ');
                        }
                        phonemes.extend(ipa);
                    }
                    TextPart::Punct(ch) => phonemes.push(ch),
                }
            }
            result.push(phonemes);
        }

        Ok(result)
    }
}

impl EspeakPhonemizer {
    fn phonemize_segments_batch(&self, segments: &[&str]) -> Result<Vec<Vec<Phoneme>>> {
        let batched_input = segments.join("\n");
        let output = self.run_espeak(&batched_input)?;
        let lines: Vec<&str> = output.lines().collect();

        // espeak-ng should emit one line per input line for stdin mode.
        // If this assumption breaks, fall back to per-segment invocation.
        if lines.len() != segments.len() {
            log::debug!(
                "espeak-ng returned {} line(s) for {} segment(s), phonemizing individually",
                lines.len(),
                segments.len()
            );
            return segments
                .iter()
                .map(|segment| Ok(ipa_to_phonemes(&self.run_espeak(segment)?)))
                .collect();
        }

        Ok(lines.iter().map(|line| ipa_to_phonemes(line)).collect())
    }

    fn run_espeak(&self, input: &str) -> Result<String> {
        let bin = self
            .espeak
            .bin_path
            .as_deref()
            .map(|p| p.as_os_str())
            .unwrap_or_else(|| OsStr::new("espeak-ng"));
        let mut command = Command::new(bin);
        command.args(["--ipa", "--stdin", "-q", "-v", &self.voice]);
        if let Some(data_path) = &self.espeak.data_path {
            let mut arg = OsString::from("--path=");
            arg.push(data_path);
            command.arg(arg);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PiperError::EspeakNotFound
                } else {
                    PiperError::Io(e)
                }
            })?;

        // espeak-ng reads stdin line by line; an unterminated last line can
        // lose its final token.
        let stdin_payload = canonicalize_espeak_stdin_payload(input);
        let stdin = child.stdin.take();

        // stdin is fed from its own thread while stdout drains, so neither
        // pipe can fill up and stall the other.
        let output = std::thread::scope(|scope| -> Result<std::process::Output> {
            let writer = stdin.map(|mut stdin| {
                let bytes = stdin_payload.as_bytes();
                scope.spawn(move || stdin.write_all(bytes))
            });
            let output = child.wait_with_output()?;
            if let Some(writer) = writer {
                let written = writer.join().map_err(|_| {
                    PiperError::PhonemizerFailed("espeak-ng stdin writer panicked".to_string())
                })?;
                // A process that exits early closes the pipe; its status says why.
                match written {
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    written => written?,
                }
            }
            Ok(output)
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PiperError::PhonemizerFailed(format!(
                "espeak-ng exited with code {:?}: {stderr}",
                output.status.code()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TextPart {
    Text(String),
    Punct(char),
}

/// Split text into sentences of text runs and punctuation.
///
/// A sentence ends after a run of punctuation containing `.`, `!` or `?`,
/// or at a line break that follows text.
fn split_sentences(text: &str) -> Vec<Vec<TextPart>> {
    let mut sentences = Vec::new();
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut ended = false;

    for (idx, ch) in text.char_indices() {
        let ch_len = ch.len_utf8();
        let punct = match ch {
            '\n' | '\r' if current.trim().is_empty() => None,
            _ => map_boundary_punctuation(ch),
        };
        if let Some(punct) = punct {
            if !is_numeric_connector_between_digits(text, idx, ch_len, ch) {
                flush_text_part(&mut parts, &mut current);
                parts.push(TextPart::Punct(punct));
                ended |= matches!(punct, '.' | '!' | '?');
                continue;
            }
        }

        if ch.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
            continue;
        }

        if ended {
            sentences.push(std::mem::take(&mut parts));
            ended = false;
        }
        current.push(ch);
    }

    flush_text_part(&mut parts, &mut current);
    if !parts.is_empty() {
        sentences.push(parts);
    }
    sentences
}

fn flush_text_part(parts: &mut Vec<TextPart>, current: &mut String) {
    let trimmed = current.trim();
    if trimmed.is_empty() {
        current.clear();
        return;
    }
    parts.push(TextPart::Text(trimmed.to_string()));
    current.clear();
}

fn map_boundary_punctuation(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}'
        | '\u{201d}' => Some(ch),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

fn is_numeric_connector_between_digits(text: &str, idx: usize, ch_len: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }

    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch_len..].chars().next();

    matches!(
        (prev, next),
        (Some(left), Some(right)) if left.is_ascii_digit() && right.is_ascii_digit()
    )
}

fn canonicalize_espeak_stdin_payload(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

/// espeak-ng IPA output → phonemes. Multiple clause lines are joined by a space.
fn ipa_to_phonemes(ipa: &str) -> Vec<Phoneme> {
    let mut phonemes = Vec::new();
    for line in ipa.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !phonemes.is_empty() {
            phonemes.push(' ');
        }
        phonemes.extend(line.chars().filter(|&ch| ch != '_'));
    }
    phonemes
}
