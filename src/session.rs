// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Shape-bound inference session.
//!
//! The session owns the input tensor, the output fetch list and the fetched
//! output buffers for one `(height, width, batch, mode)` binding. Consecutive
//! frames of the same shape reuse all of them; a shape change rebinds lazily on
//! the next call.

use tracing::{debug, trace};

use crate::buffer::TensorBuffer;
use crate::engine::{InferenceEngine, OutputTensor};
use crate::error::{InferenceError, Result};
use crate::inference::{OutputMode, OutputNames};
use crate::preprocessing::TENSOR_CHANNELS;

/// The shape and outputs a session is currently bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Tensor height.
    pub height: usize,
    /// Tensor width.
    pub width: usize,
    /// Number of frames per call.
    pub batch: usize,
    /// Requested output kind.
    pub mode: OutputMode,
    /// Output names fetched on every run.
    pub fetch: Vec<String>,
}

impl Binding {
    fn matches(&self, height: usize, width: usize, batch: usize, mode: OutputMode) -> bool {
        self.height == height && self.width == width && self.batch == batch && self.mode == mode
    }
}

/// An inference engine together with its bound input tensor.
///
/// Not reentrant: the input tensor must not be mutated while [`Self::run`]
/// is executing, which `&mut self` enforces.
pub struct InferenceSession<E: InferenceEngine> {
    engine: E,
    names: OutputNames,
    location_refinement: bool,
    input: TensorBuffer,
    outputs: Vec<OutputTensor>,
    binding: Option<Binding>,
    rebinds: usize,
}

impl<E: InferenceEngine> InferenceSession<E> {
    /// Wrap an engine.
    ///
    /// `location_refinement` selects which auxiliary output is fetched next to
    /// the score maps.
    pub fn new(engine: E, names: OutputNames, location_refinement: bool) -> Self {
        Self {
            engine,
            names,
            location_refinement,
            input: TensorBuffer::default(),
            outputs: Vec::new(),
            binding: None,
            rebinds: 0,
        }
    }

    /// Bind the session to a tensor shape and output mode.
    ///
    /// Does nothing when the binding already matches. Otherwise the input
    /// tensor is reshaped and the fetch list recomputed.
    ///
    /// Returns `true` when a new binding was created.
    pub fn ensure_bound(
        &mut self,
        height: usize,
        width: usize,
        batch: usize,
        mode: OutputMode,
    ) -> bool {
        if self
            .binding
            .as_ref()
            .is_some_and(|binding| binding.matches(height, width, batch, mode))
        {
            return false;
        }

        let fetch = self.names.fetch_list(mode, self.location_refinement);
        debug!(height, width, batch, ?mode, ?fetch, "binding inference session");
        self.input.ensure_shape([batch, height, width, TENSOR_CHANNELS]);
        self.binding = Some(Binding {
            height,
            width,
            batch,
            mode,
            fetch,
        });
        self.rebinds += 1;
        true
    }

    /// Run the engine on the bound input tensor.
    ///
    /// Outputs land in buffers owned by the session and stay valid until the
    /// next run.
    ///
    /// # Errors
    ///
    /// Returns `InferenceError` if the session is unbound or the engine fails.
    /// The binding survives a failed run.
    pub fn run(&mut self) -> Result<&[OutputTensor]> {
        let binding = self.binding.as_ref().ok_or_else(|| {
            InferenceError::InferenceError("Inference session is not bound".to_string())
        })?;
        trace!(batch = binding.batch, "running inference");
        self.engine
            .run_into(self.input.view(), &binding.fetch, &mut self.outputs)?;
        if self.outputs.len() != binding.fetch.len() {
            return Err(InferenceError::InferenceError(format!(
                "Engine returned {} outputs, expected {}",
                self.outputs.len(),
                binding.fetch.len()
            )));
        }
        Ok(&self.outputs)
    }

    /// Outputs of the most recent successful run, in fetch order.
    #[must_use]
    pub fn outputs(&self) -> &[OutputTensor] {
        &self.outputs
    }

    /// The current binding, if any.
    #[must_use]
    pub const fn binding(&self) -> Option<&Binding> {
        self.binding.as_ref()
    }

    /// Number of bindings created so far.
    #[must_use]
    pub const fn rebind_count(&self) -> usize {
        self.rebinds
    }

    /// The bound input tensor.
    #[must_use]
    pub const fn input(&self) -> &TensorBuffer {
        &self.input
    }

    /// Mutable access to the bound input tensor, for packing frames.
    pub fn input_mut(&mut self) -> &mut TensorBuffer {
        &mut self.input
    }

    /// The wrapped engine.
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: InferenceEngine> Drop for InferenceSession<E> {
    fn drop(&mut self) {
        let output_bytes: usize = self
            .outputs
            .iter()
            .map(|output| output.len() * std::mem::size_of::<f32>())
            .sum();
        debug!(
            bytes = self.input.byte_len() + output_bytes,
            rebinds = self.rebinds,
            "releasing inference session"
        );
    }
}

impl<E: InferenceEngine> std::fmt::Debug for InferenceSession<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSession")
            .field("binding", &self.binding)
            .field("input_shape", &self.input.shape())
            .field("rebinds", &self.rebinds)
            .finish_non_exhaustive()
    }
}
