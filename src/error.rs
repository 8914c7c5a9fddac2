/// Errors produced while loading voices, synthesizing audio or applying effects.
///
/// Phonemes missing from a voice's id map are not errors; see
/// [`MissingPhonemes`](crate::phoneme::MissingPhonemes).
#[derive(thiserror::Error, Debug)]
pub enum PiperError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid voice config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid voice config: {0}")]
    Config(String),
    #[error("Phonemes must be one codepoint ({table}): {phoneme:?}")]
    NotSingleCodepoint {
        table: &'static str,
        phoneme: String,
    },
    #[error("Invalid output tensors: {0}")]
    InvalidModelOutput(String),
    #[error("Acoustic model failed: {0}")]
    Model(String),
    #[cfg(feature = "piper")]
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[cfg(feature = "piper")]
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Signal processing failed: {0}")]
    Dsp(String),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Speaker '{0}' not found in speaker_id_map")]
    UnknownSpeaker(String),
    #[error("Model not loaded. Call load_model() first.")]
    ModelNotLoaded,
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

pub type Result<T> = std::result::Result<T, PiperError>;
