// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Inference engine abstraction.
//!
//! The pipeline only needs three things from an engine: the name of its input
//! placeholder, a synchronous forward pass over a `[batch, height, width, 3]`
//! tensor, and a way to fetch outputs by name. [`OrtEngine`] provides them on
//! top of ONNX Runtime; tests substitute scripted engines.

use std::path::Path;

use ndarray::{ArrayD, ArrayView4, IxDyn};
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::value::TensorRef;
use tracing::debug;

use crate::device::Device;
use crate::error::{InferenceError, Result};
use crate::inference::PredictConfig;

/// A dense float output fetched from the engine.
pub type OutputTensor = ArrayD<f32>;

/// Input placeholder name used by exported DeepLabCut graphs.
pub const DEFAULT_INPUT_NAME: &str = "Placeholder";

/// A synchronous forward pass over a bound input tensor.
///
/// Implementations must not retain `input` beyond the call.
pub trait InferenceEngine {
    /// Name of the input placeholder.
    fn input_name(&self) -> &str;

    /// Run the model and return the requested outputs in `fetch` order.
    ///
    /// # Errors
    ///
    /// Returns `InferenceError` if execution fails or an output is missing.
    fn run(&mut self, input: ArrayView4<'_, f32>, fetch: &[String]) -> Result<Vec<OutputTensor>>;

    /// Run the model into caller-owned output buffers.
    ///
    /// On success `outputs` holds one tensor per `fetch` entry. Engines that
    /// can copy into existing buffers override this to keep allocations flat
    /// across frames of the same shape.
    ///
    /// # Errors
    ///
    /// See [`Self::run`]. The contents of `outputs` are unspecified on error.
    fn run_into(
        &mut self,
        input: ArrayView4<'_, f32>,
        fetch: &[String],
        outputs: &mut Vec<OutputTensor>,
    ) -> Result<()> {
        *outputs = self.run(input, fetch)?;
        Ok(())
    }
}

/// Copy a fetched tensor into `slot`, reallocating only when its shape changes.
///
/// # Errors
///
/// Returns `ShapeMismatchError` if `data` does not fill `dims`.
pub fn store_output(slot: &mut OutputTensor, dims: &[usize], data: &[f32]) -> Result<()> {
    if slot.shape() == dims
        && let Some(buffer) = slot.as_slice_mut()
        && buffer.len() == data.len()
    {
        buffer.copy_from_slice(data);
        return Ok(());
    }
    debug!(shape = ?dims, "allocating output buffer");
    *slot = ArrayD::from_shape_vec(IxDyn(dims), data.to_vec())
        .map_err(|e| InferenceError::ShapeMismatchError(e.to_string()))?;
    Ok(())
}

/// ONNX Runtime backed engine.
pub struct OrtEngine {
    session: Session,
    input_name: String,
    output_names: Vec<String>,
}

impl OrtEngine {
    /// Load a model graph from an ONNX file.
    ///
    /// # Errors
    ///
    /// Returns `ModelLoadError` if the file does not exist, cannot be parsed,
    /// or the requested device is not available in this build.
    pub fn from_file<P: AsRef<Path>>(path: P, config: &PredictConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(InferenceError::ModelLoadError(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let session = session_builder(config)?
            .commit_from_file(path)
            .map_err(|e| InferenceError::ModelLoadError(format!("Failed to load model: {e}")))?;
        Ok(Self::from_session(session, config))
    }

    /// Load a model graph from serialized bytes.
    ///
    /// # Errors
    ///
    /// Returns `ModelLoadError` if the bytes are not a valid model or the
    /// session cannot be created.
    pub fn from_memory(bytes: &[u8], config: &PredictConfig) -> Result<Self> {
        let session = session_builder(config)?
            .commit_from_memory(bytes)
            .map_err(|e| InferenceError::ModelLoadError(format!("Failed to load model: {e}")))?;
        Ok(Self::from_session(session, config))
    }

    fn from_session(session: Session, config: &PredictConfig) -> Self {
        let input_name = config
            .output_names
            .input
            .clone()
            .or_else(|| session.inputs.first().map(|i| i.name.clone()))
            .unwrap_or_else(|| DEFAULT_INPUT_NAME.to_string());
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        debug!(input = %input_name, outputs = ?output_names, device = %config.device, "ONNX model loaded");

        Self {
            session,
            input_name,
            output_names,
        }
    }

    /// Output names declared by the graph.
    #[must_use]
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }
}

impl InferenceEngine for OrtEngine {
    fn input_name(&self) -> &str {
        &self.input_name
    }

    fn run(&mut self, input: ArrayView4<'_, f32>, fetch: &[String]) -> Result<Vec<OutputTensor>> {
        let mut outputs = Vec::new();
        self.run_into(input, fetch, &mut outputs)?;
        Ok(outputs)
    }

    fn run_into(
        &mut self,
        input: ArrayView4<'_, f32>,
        fetch: &[String],
        outputs: &mut Vec<OutputTensor>,
    ) -> Result<()> {
        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous).map_err(|e| {
            InferenceError::InferenceError(format!("Failed to create input tensor: {e}"))
        })?;

        let results = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| InferenceError::InferenceError(format!("Inference failed: {e}")))?;

        outputs.resize_with(fetch.len(), || ArrayD::zeros(IxDyn(&[0])));
        for (name, slot) in fetch.iter().zip(outputs.iter_mut()) {
            let output = results.get(name.as_str()).ok_or_else(|| {
                InferenceError::InferenceError(format!("Output '{name}' not found"))
            })?;
            let (shape, data) = output.try_extract_tensor::<f32>().map_err(|e| {
                InferenceError::InferenceError(format!("Failed to extract output '{name}': {e}"))
            })?;
            let mut dims = [0usize; 4];
            let rank = shape.len();
            if rank > dims.len() {
                return Err(InferenceError::ShapeMismatchError(format!(
                    "Output '{name}' has unsupported rank {rank}"
                )));
            }
            for (dim, &extent) in dims.iter_mut().zip(shape.iter()) {
                *dim = usize::try_from(extent).map_err(|_| {
                    InferenceError::ShapeMismatchError(format!(
                        "Output '{name}' has a dynamic dimension"
                    ))
                })?;
            }
            store_output(slot, &dims[..rank], data).map_err(|e| {
                InferenceError::ShapeMismatchError(format!("Output '{name}': {e}"))
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for OrtEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtEngine")
            .field("input_name", &self.input_name)
            .field("output_names", &self.output_names)
            .finish_non_exhaustive()
    }
}

/// Create a session builder with optimizations and execution providers.
fn session_builder(config: &PredictConfig) -> Result<SessionBuilder> {
    if config.device.is_unavailable() {
        return Err(InferenceError::ModelLoadError(format!(
            "Device '{}' is not available in this build",
            config.device
        )));
    }

    #[allow(unused_mut)]
    let mut builder = Session::builder().map_err(|e| {
        InferenceError::ModelLoadError(format!("Failed to create session builder: {e}"))
    })?;

    match config.device {
        Device::Cpu => {}
        #[cfg(feature = "cuda")]
        Device::Cuda(index) => {
            use ort::execution_providers::CUDAExecutionProvider;
            let device_id = i32::try_from(index).map_err(|_| {
                InferenceError::ModelLoadError(format!("Invalid CUDA device index {index}"))
            })?;
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build()])
                .map_err(|e| {
                    InferenceError::ModelLoadError(format!("Failed to register CUDA EP: {e}"))
                })?;
        }
        #[cfg(feature = "coreml")]
        Device::CoreMl => {
            use ort::execution_providers::CoreMLExecutionProvider;
            builder = builder
                .with_execution_providers([CoreMLExecutionProvider::default()
                    .with_subgraphs(true)
                    .build()])
                .map_err(|e| {
                    InferenceError::ModelLoadError(format!("Failed to register CoreML EP: {e}"))
                })?;
        }
        #[allow(unreachable_patterns)]
        _ => {}
    }

    builder
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| {
            InferenceError::ModelLoadError(format!("Failed to set optimization level: {e}"))
        })?
        .with_intra_threads(config.num_threads)
        .map_err(|e| {
            InferenceError::ModelLoadError(format!("Failed to set intra-thread count: {e}"))
        })
}
