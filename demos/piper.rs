use std::path::PathBuf;
use std::time::Instant;

use piper_rs::{
    effects::AudioEffectsBuilder,
    engines::piper::{PiperEngine, PiperInferenceParams, PiperModelParams},
    SynthesisEngine, SynthesisParams,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut engine = PiperEngine::new();
    let model_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("models/en_US-lessac-medium.onnx"));

    let load_start = Instant::now();
    engine.load_model_with_params(&model_path, PiperModelParams::default())?;
    println!("Model loaded in {:.2?}", load_start.elapsed());

    let speakers = engine.list_speakers();
    if !speakers.is_empty() {
        println!("Available speakers: {speakers:?}");
    }

    let text = "Hello! This is Piper, a fast local neural text to speech system. \
                Each sentence is synthesized separately, then stitched together with silence.";

    let params = PiperInferenceParams {
        synthesis: SynthesisParams {
            length_scale: Some(1.0),
            ..Default::default()
        },
        effects: AudioEffectsBuilder::default().volume(-3.0).build()?,
    };

    let synth_start = Instant::now();
    let output = engine.synthesize(text, Some(params))?;
    let synth_dur = synth_start.elapsed();

    println!(
        "Synthesized {:.2}s audio in {:.2?} (real-time factor {:.3})",
        output.duration_secs(),
        synth_dur,
        output.result.real_time_factor
    );
    if !output.missing.is_empty() {
        println!("{} phoneme(s) missing from the voice", output.missing.len());
    }

    engine.synthesize_to_file(text, &PathBuf::from("output.wav"), None)?;
    println!("Saved to output.wav");

    if let Some(voice) = engine.voice() {
        let mut chunks = 0;
        let report = voice.text_to_audio_streaming(
            text,
            &SynthesisParams::default(),
            &Default::default(),
            |chunk| {
                chunks += 1;
                println!("Sentence {chunks}: {} samples", chunk.len());
                Ok(())
            },
        )?;
        println!("Streamed {chunks} sentence(s), {:.2}s of audio", report.result.audio_seconds);
    }

    engine.unload_model();
    Ok(())
}
