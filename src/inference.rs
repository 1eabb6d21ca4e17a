// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Prediction configuration and common types.
//!
//! This module defines the [`PredictConfig`] struct, which controls how frames
//! are adapted for the model, which graph outputs are fetched, and how decoded
//! positions are gated by confidence.

use crate::device::Device;
use crate::preprocessing::ColorConversion;

/// Which outputs the pipeline requests from the model graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputMode {
    /// The graph's own argmax output: one `[x, y, confidence]`-style row per
    /// joint (`concat_1` in exported DeepLabCut graphs).
    #[default]
    Regression,
    /// Raw score maps, plus location refinement maps when the joint
    /// configuration enables them.
    Maps,
}

/// Graph tensor names used for binding and fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputNames {
    /// Input placeholder. `None` uses the first input declared by the graph.
    pub input: Option<String>,
    /// Per-joint regression output.
    pub regression: String,
    /// Score map branch.
    pub score_map: String,
    /// Part prediction branch, fetched alongside the score map when location
    /// refinement is disabled.
    pub part_prediction: String,
    /// Location refinement branch.
    pub location_refinement: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            input: None,
            regression: "concat_1".to_string(),
            score_map: "Sigmoid".to_string(),
            part_prediction: "pose/part_pred/block4/BiasAdd".to_string(),
            location_refinement: "pose/locref_pred/block4/BiasAdd".to_string(),
        }
    }
}

impl OutputNames {
    /// Output names to fetch for a binding.
    ///
    /// The score map always comes first; the second entry is the location
    /// refinement branch when `location_refinement` is set.
    #[must_use]
    pub fn fetch_list(&self, mode: OutputMode, location_refinement: bool) -> Vec<String> {
        match mode {
            OutputMode::Regression => vec![self.regression.clone()],
            OutputMode::Maps if location_refinement => {
                vec![self.score_map.clone(), self.location_refinement.clone()]
            }
            OutputMode::Maps => vec![self.score_map.clone(), self.part_prediction.clone()],
        }
    }
}

/// Configuration for pose prediction.
///
/// It uses a builder pattern for convenient construction.
///
/// # Example
///
/// ```rust
/// use dlc_inference::{ColorConversion, OutputMode, PredictConfig};
///
/// let config = PredictConfig::new()
///     .with_min_confidence(Some(0.6))
///     .with_scale_factor(Some(0.5))
///     .with_color_conversion(Some(ColorConversion::Bgr2Rgb))
///     .with_output_mode(OutputMode::Maps);
/// ```
#[derive(Debug, Clone)]
pub struct PredictConfig {
    /// Confidence below which decoded positions are replaced by the undefined
    /// sentinel. `None` keeps every position.
    pub min_confidence: Option<f32>,
    /// Factor applied to the frame (or region) size before inference.
    /// Decoded positions are scaled back by its inverse.
    pub scale_factor: Option<f32>,
    /// Channel conversion applied to frames before packing.
    pub color_conversion: Option<ColorConversion>,
    /// Which graph outputs to fetch.
    pub output_mode: OutputMode,
    /// Reject batches whose frames differ in size instead of resizing them.
    pub strict_batch: bool,
    /// Number of intra-op threads for ONNX Runtime.
    /// Setting this to `0` allows ONNX Runtime to choose the optimal number.
    pub num_threads: usize,
    /// Execution device.
    pub device: Device,
    /// Graph tensor names.
    pub output_names: OutputNames,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            min_confidence: None,
            scale_factor: None,
            color_conversion: Some(ColorConversion::Bgr2Rgb),
            output_mode: OutputMode::default(),
            strict_batch: true,
            num_threads: 0,
            device: Device::Cpu,
            output_names: OutputNames::default(),
        }
    }
}

impl PredictConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the confidence threshold used to discard position values.
    ///
    /// # Arguments
    ///
    /// * `threshold` - Minimum confidence (0.0 to 1.0), or `None` to keep all positions.
    #[must_use]
    pub const fn with_min_confidence(mut self, threshold: Option<f32>) -> Self {
        self.min_confidence = threshold;
        self
    }

    /// Set the scale factor used to resize frames for inference.
    #[must_use]
    pub const fn with_scale_factor(mut self, scale: Option<f32>) -> Self {
        self.scale_factor = scale;
        self
    }

    /// Set the color conversion used to prepare frames.
    #[must_use]
    pub const fn with_color_conversion(mut self, conversion: Option<ColorConversion>) -> Self {
        self.color_conversion = conversion;
        self
    }

    /// Select regression or map outputs.
    #[must_use]
    pub const fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Enable or disable strict batch shape checking.
    #[must_use]
    pub const fn with_strict_batch(mut self, strict: bool) -> Self {
        self.strict_batch = strict;
        self
    }

    /// Set the number of threads for inference.
    ///
    /// # Arguments
    ///
    /// * `threads` - The number of intra-op threads. Set to `0` for auto-configuration.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    /// Set the execution device.
    #[must_use]
    pub const fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Override graph tensor names.
    #[must_use]
    pub fn with_output_names(mut self, names: OutputNames) -> Self {
        self.output_names = names;
        self
    }
}
