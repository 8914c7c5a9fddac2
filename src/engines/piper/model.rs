use std::ffi::OsString;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::error::{PiperError, Result};
use crate::inference::{AcousticModel, ModelInput, ModelOutput};

/// Name of the optional speaker input on multi-speaker exports.
const SPEAKER_INPUT: &str = "sid";

/// A Piper VITS export running on ONNX Runtime.
///
/// Inputs: `input` `[1, n]` i64 ids, `input_lengths` `[1]` i64, `scales` `[3]`
/// f32 and, for multi-speaker voices, `sid` `[1]` i64.
pub struct PiperModel {
    session: Session,
    has_speaker_input: bool,
}

impl PiperModel {
    /// Load the ONNX graph at `onnx_path`.
    pub fn load(
        onnx_path: &Path,
        num_threads: Option<usize>,
        optimized_cache_path: Option<&Path>,
    ) -> Result<Self> {
        log::info!("Loading Piper model from {}", onnx_path.display());
        let session = init_session(onnx_path, num_threads, optimized_cache_path)?;
        let has_speaker_input = session
            .inputs()
            .iter()
            .any(|input| input.name() == SPEAKER_INPUT);
        log::info!("Detected: speaker_input={has_speaker_input}");

        Ok(Self {
            session,
            has_speaker_input,
        })
    }
}

impl AcousticModel for PiperModel {
    fn run(&mut self, input: &ModelInput<'_>) -> Result<Vec<ModelOutput>> {
        let len = input.ids.len();
        let ids_arr = Array2::from_shape_vec((1, len), input.ids.to_vec())?;
        let lengths_arr = ndarray::arr1(&[len as i64]);
        let scales_arr = ndarray::arr1(&input.scales);

        let speaker_id = input.speaker_id.filter(|_| self.has_speaker_input);
        if input.speaker_id.is_some() && speaker_id.is_none() {
            log::debug!("Model has no speaker input, ignoring speaker id");
        }

        let outputs = if let Some(sid) = speaker_id {
            let sid_arr = ndarray::arr1(&[sid]);
            let inputs = inputs![
                "input" => TensorRef::from_array_view(ids_arr.view())?,
                "input_lengths" => TensorRef::from_array_view(lengths_arr.view())?,
                "scales" => TensorRef::from_array_view(scales_arr.view())?,
                SPEAKER_INPUT => TensorRef::from_array_view(sid_arr.view())?,
            ];
            self.session.run(inputs)?
        } else {
            let inputs = inputs![
                "input" => TensorRef::from_array_view(ids_arr.view())?,
                "input_lengths" => TensorRef::from_array_view(lengths_arr.view())?,
                "scales" => TensorRef::from_array_view(scales_arr.view())?,
            ];
            self.session.run(inputs)?
        };

        let mut result = Vec::new();
        for (name, value) in outputs.iter() {
            match value.try_extract_array::<f32>() {
                Ok(audio) => result.push(ModelOutput::Tensor {
                    shape: audio.shape().to_vec(),
                    data: audio.iter().copied().collect(),
                }),
                Err(_) => result.push(ModelOutput::Other(name.to_string())),
            }
        }
        Ok(result)
    }
}

/// Resolve the ONNX file for `model_path`.
///
/// A file is used as is; a directory is scanned for the first `.onnx` file.
pub fn find_onnx_file(model_path: &Path) -> Result<PathBuf> {
    if !model_path.is_dir() {
        return Ok(model_path.to_path_buf());
    }

    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(model_path)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("onnx") {
            candidates.push(path);
        }
    }
    candidates.sort();

    match candidates.into_iter().next() {
        Some(path) => {
            log::info!("Using ONNX file: {}", path.display());
            Ok(path)
        }
        None => Err(PiperError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("No .onnx file found in {}", model_path.display()),
        ))),
    }
}

/// `<model>.onnx` → `<model>.onnx.json`.
pub fn voice_config_path(onnx_path: &Path) -> PathBuf {
    let mut path = OsString::from(onnx_path.as_os_str());
    path.push(".json");
    PathBuf::from(path)
}

/// Initialize an ONNX session with optional on-disk graph caching.
///
/// With a cache path, the first load runs Level3 optimization and serialises
/// the graph there; later loads read it back with optimization disabled.
fn init_session(
    onnx_path: &Path,
    num_threads: Option<usize>,
    optimized_cache_path: Option<&Path>,
) -> Result<Session> {
    let providers = vec![CPUExecutionProvider::default().build()];

    let (load_path, opt_level, cache_to_write) = match optimized_cache_path {
        Some(cache) if cache.exists() => {
            log::info!("Loading pre-optimized graph from {}", cache.display());
            (cache, GraphOptimizationLevel::Disable, None)
        }
        Some(cache) => {
            log::info!(
                "First load: running Level3 optimization; saving graph to {}",
                cache.display()
            );
            (onnx_path, GraphOptimizationLevel::Level3, Some(cache))
        }
        None => (onnx_path, GraphOptimizationLevel::Level3, None),
    };

    let mut builder = Session::builder()?
        .with_optimization_level(opt_level)?
        .with_execution_providers(providers)?;

    if let Some(cache) = cache_to_write {
        builder = builder.with_optimized_model_path(cache)?;
    }

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(load_path)?)
}
