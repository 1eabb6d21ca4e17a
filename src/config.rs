// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Joint configuration parsing.
//!
//! DeepLabCut exports a `pose_cfg.yaml` next to the frozen graph. Only the keys
//! that affect inference are read; everything else in the file is ignored.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{InferenceError, Result};

/// Default heat map stride of DeepLabCut ResNet backbones.
pub const DEFAULT_STRIDE: u32 = 8;

/// A link between two joints, by joint index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JointLink {
    /// Index of the source joint.
    pub source: usize,
    /// Index of the target joint.
    pub target: usize,
}

/// Joint layout and output geometry of a pose model.
///
/// Joint order is the model's output channel order and the order of body
/// parts in every decoded pose. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JointConfiguration {
    joint_names: Vec<String>,
    location_refinement: bool,
    stride: u32,
    part_affinity_graph: Vec<JointLink>,
    predict_part_affinity_field: bool,
}

/// Raw `pose_cfg.yaml` fields.
#[derive(Debug, Deserialize)]
struct RawPoseConfig {
    #[serde(default)]
    all_joints_names: Option<Vec<String>>,
    #[serde(default)]
    stride: Option<f64>,
    #[serde(default)]
    location_refinement: Option<bool>,
    #[serde(default)]
    partaffinityfield_graph: Option<Vec<Vec<usize>>>,
    #[serde(default)]
    partaffinityfield_predict: Option<bool>,
}

impl JointConfiguration {
    /// Build a configuration from joint names.
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoadError` if the joint list is empty, contains
    /// duplicates, or the stride is zero.
    pub fn new(joint_names: Vec<String>, stride: u32, location_refinement: bool) -> Result<Self> {
        if joint_names.is_empty() {
            return Err(InferenceError::ConfigLoadError(
                "Joint configuration must name at least one joint".to_string(),
            ));
        }
        let mut seen = HashSet::with_capacity(joint_names.len());
        if let Some(duplicate) = joint_names.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(InferenceError::ConfigLoadError(format!(
                "Duplicate joint name: {duplicate}"
            )));
        }
        if stride == 0 {
            return Err(InferenceError::ConfigLoadError(
                "Stride must be positive".to_string(),
            ));
        }

        Ok(Self {
            joint_names,
            location_refinement,
            stride,
            part_affinity_graph: Vec::new(),
            predict_part_affinity_field: false,
        })
    }

    /// Load a `pose_cfg.yaml` file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoadError` if the file cannot be read or is malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            InferenceError::ConfigLoadError(format!(
                "Failed to read pose config {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse a `pose_cfg.yaml` document.
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoadError` if the YAML is malformed, `all_joints_names`
    /// is missing, or a field has an invalid value.
    pub fn from_yaml_str(yaml_str: &str) -> Result<Self> {
        let raw: RawPoseConfig = serde_yaml::from_str(yaml_str)
            .map_err(|e| InferenceError::ConfigLoadError(format!("Invalid pose config: {e}")))?;

        let joint_names = raw.all_joints_names.ok_or_else(|| {
            InferenceError::ConfigLoadError("Missing 'all_joints_names' in pose config".to_string())
        })?;

        let stride = match raw.stride {
            None => DEFAULT_STRIDE,
            Some(value) if value > 0.0 && value.fract() == 0.0 && value <= f64::from(u32::MAX) => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    value as u32
                }
            }
            Some(value) => {
                return Err(InferenceError::ConfigLoadError(format!(
                    "Invalid stride value: {value}"
                )));
            }
        };

        let mut config = Self::new(joint_names, stride, raw.location_refinement.unwrap_or(true))?;

        if let Some(graph) = raw.partaffinityfield_graph {
            let num_joints = config.num_joints();
            config.part_affinity_graph = graph
                .into_iter()
                .map(|pair| match pair.as_slice() {
                    [source, target] if *source < num_joints && *target < num_joints => {
                        Ok(JointLink {
                            source: *source,
                            target: *target,
                        })
                    }
                    _ => Err(InferenceError::ConfigLoadError(format!(
                        "Invalid part affinity link: {pair:?}"
                    ))),
                })
                .collect::<Result<_>>()?;
        }
        config.predict_part_affinity_field = raw.partaffinityfield_predict.unwrap_or(false);

        Ok(config)
    }

    /// Joint names in output channel order.
    #[must_use]
    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    /// Number of joints.
    #[must_use]
    pub fn num_joints(&self) -> usize {
        self.joint_names.len()
    }

    /// Index of the joint with the given name.
    #[must_use]
    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joint_names.iter().position(|joint| joint == name)
    }

    /// Whether the model emits sub-pixel location refinement maps.
    #[must_use]
    pub const fn location_refinement(&self) -> bool {
        self.location_refinement
    }

    /// Heat map downsampling factor relative to the input tensor.
    #[must_use]
    pub const fn stride(&self) -> u32 {
        self.stride
    }

    /// Joint links of the part affinity graph.
    #[must_use]
    pub fn part_affinity_graph(&self) -> &[JointLink] {
        &self.part_affinity_graph
    }

    /// Whether the model predicts part affinity fields.
    #[must_use]
    pub const fn predict_part_affinity_field(&self) -> bool {
        self.predict_part_affinity_field
    }
}
