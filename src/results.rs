// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose estimation results.
//!
//! A [`Pose`] is the per-frame output of the pipeline: body parts in joint
//! configuration order, addressable by name, together with the frame they were
//! computed from. A [`PoseEstimation`] carries the raw score and location
//! refinement maps for consumers that want more than the argmax.

use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use ndarray::{Array3, ArrayD, ArrayView2, ArrayView4, Axis, Ix4};

use crate::config::JointConfiguration;
use crate::error::{InferenceError, Result};
use crate::frame::Frame;
use crate::geometry::{Point, Point2f, Size};

/// Timing information for inference operations (in milliseconds).
#[derive(Debug, Clone, Copy, Default)]
pub struct Speed {
    /// Time spent adapting frames into the input tensor.
    pub preprocess: Option<f64>,
    /// Time spent in the inference engine.
    pub inference: Option<f64>,
    /// Time spent decoding outputs.
    pub postprocess: Option<f64>,
}

impl Speed {
    /// Create a new Speed instance with all timings.
    ///
    /// # Arguments
    ///
    /// * `preprocess` - Time in milliseconds.
    /// * `inference` - Time in milliseconds.
    /// * `postprocess` - Time in milliseconds.
    #[must_use]
    pub const fn new(preprocess: f64, inference: f64, postprocess: f64) -> Self {
        Self {
            preprocess: Some(preprocess),
            inference: Some(inference),
            postprocess: Some(postprocess),
        }
    }

    /// Sum of preprocess, inference, and postprocess times in milliseconds.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.preprocess.unwrap_or(0.0)
            + self.inference.unwrap_or(0.0)
            + self.postprocess.unwrap_or(0.0)
    }
}

impl std::ops::AddAssign for Speed {
    fn add_assign(&mut self, rhs: Self) {
        fn add(a: Option<f64>, b: Option<f64>) -> Option<f64> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a + b),
                (a, b) => a.or(b),
            }
        }
        self.preprocess = add(self.preprocess, rhs.preprocess);
        self.inference = add(self.inference, rhs.inference);
        self.postprocess = add(self.postprocess, rhs.postprocess);
    }
}

/// A named keypoint with its position and confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyPart {
    /// Joint name from the joint configuration.
    pub name: String,
    /// Position in source frame pixels, or [`Point2f::UNDEFINED`].
    pub position: Point2f,
    /// Model confidence for this joint.
    pub confidence: f32,
}

impl BodyPart {
    /// Create a new body part.
    #[must_use]
    pub fn new(name: impl Into<String>, position: Point2f, confidence: f32) -> Self {
        Self {
            name: name.into(),
            position,
            confidence,
        }
    }

    /// Returns `true` if the position is not the undefined sentinel.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.position.is_defined()
    }
}

/// An ordered, name-keyed collection of body parts for one frame.
///
/// Part order is insertion order, which the decoders keep equal to joint
/// configuration order. Names are unique.
#[derive(Debug, Clone)]
pub struct Pose {
    parts: Vec<BodyPart>,
    index: HashMap<String, usize>,
    image: Arc<Frame>,
}

impl Pose {
    /// Create an empty pose for the given source frame.
    #[must_use]
    pub fn new(image: Arc<Frame>) -> Self {
        Self::with_capacity(image, 0)
    }

    /// Create an empty pose with room for `capacity` parts.
    #[must_use]
    pub fn with_capacity(image: Arc<Frame>, capacity: usize) -> Self {
        Self {
            parts: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            image,
        }
    }

    /// Append a body part.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateBodyPart` if a part with the same name is present.
    pub fn push(&mut self, part: BodyPart) -> Result<()> {
        if self.index.contains_key(&part.name) {
            return Err(InferenceError::DuplicateBodyPart(part.name));
        }
        self.index.insert(part.name.clone(), self.parts.len());
        self.parts.push(part);
        Ok(())
    }

    /// Look up a body part by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BodyPart> {
        self.index.get(name).map(|&i| &self.parts[i])
    }

    /// Select the body part with the given name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownBodyPart` if the pose has no part with that name.
    pub fn body_part(&self, name: &str) -> Result<&BodyPart> {
        self.get(name)
            .ok_or_else(|| InferenceError::UnknownBodyPart(name.to_string()))
    }

    /// Position of a part by name in joint configuration order.
    #[must_use]
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Body parts in order.
    #[must_use]
    pub fn parts(&self) -> &[BodyPart] {
        &self.parts
    }

    /// Iterate over body parts in order.
    pub fn iter(&self) -> std::slice::Iter<'_, BodyPart> {
        self.parts.iter()
    }

    /// Number of body parts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns `true` if the pose has no body parts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// The frame this pose was computed from.
    #[must_use]
    pub fn image(&self) -> &Arc<Frame> {
        &self.image
    }

    /// Mutable access that cannot break name uniqueness.
    pub(crate) fn parts_mut(&mut self) -> impl Iterator<Item = &mut BodyPart> {
        self.parts.iter_mut()
    }
}

impl Index<usize> for Pose {
    type Output = BodyPart;

    fn index(&self, index: usize) -> &Self::Output {
        &self.parts[index]
    }
}

impl<'a> IntoIterator for &'a Pose {
    type Item = &'a BodyPart;
    type IntoIter = std::slice::Iter<'a, BodyPart>;

    fn into_iter(self) -> Self::IntoIter {
        self.parts.iter()
    }
}

/// Maps tensor-space positions back into source frame coordinates.
///
/// `frame = tensor * scale + offset` per axis, where `offset` is the region
/// of interest origin and the scales undo the resize applied before
/// inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Region of interest origin in the source frame.
    pub offset: Point,
    /// Horizontal scale correction.
    pub scale_x: f32,
    /// Vertical scale correction.
    pub scale_y: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// No offset and no scaling.
    pub const IDENTITY: Self = Self {
        offset: Point { x: 0, y: 0 },
        scale_x: 1.0,
        scale_y: 1.0,
    };

    /// Build the transform for an optional scale factor and applied offset.
    #[must_use]
    pub fn new(offset: Point, scale_factor: Option<f32>) -> Self {
        let scale = scale_factor.map_or(1.0, |scale| 1.0 / scale);
        Self {
            offset,
            scale_x: scale,
            scale_y: scale,
        }
    }

    /// Build the transform for a `source` region that was resized to `tensor`.
    ///
    /// Axes with a non-positive tensor extent keep a unit scale.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn resized(offset: Point, source: Size, tensor: Size) -> Self {
        let ratio = |from: i32, to: i32| if to > 0 { from as f32 / to as f32 } else { 1.0 };
        Self {
            offset,
            scale_x: ratio(source.width, tensor.width),
            scale_y: ratio(source.height, tensor.height),
        }
    }

    /// Apply to a tensor-space coordinate.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn apply(&self, x: f32, y: f32) -> Point2f {
        Point2f::new(
            x.mul_add(self.scale_x, self.offset.x as f32),
            y.mul_add(self.scale_y, self.offset.y as f32),
        )
    }
}

/// Raw heat map output for one frame.
#[derive(Debug, Clone)]
pub struct PoseEstimation {
    image: Arc<Frame>,
    config: Arc<JointConfiguration>,
    score_maps: Array3<f32>,
    location_refinement: Option<Array3<f32>>,
    transform: Transform,
}

impl PoseEstimation {
    /// Create an estimation from `[height, width, joints]` score maps and
    /// optional `[height, width, 2 * joints]` location refinement maps.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatchError` if the channel counts do not match the
    /// joint configuration or the refinement maps differ in size.
    pub fn new(
        image: Arc<Frame>,
        config: Arc<JointConfiguration>,
        score_maps: Array3<f32>,
        location_refinement: Option<Array3<f32>>,
        transform: Transform,
    ) -> Result<Self> {
        check_map_shapes(
            score_maps.dim(),
            location_refinement.as_ref().map(|maps| maps.dim()),
            config.num_joints(),
        )?;
        Ok(Self {
            image,
            config,
            score_maps,
            location_refinement,
            transform,
        })
    }

    /// Split batched engine outputs into one estimation per frame.
    ///
    /// `outputs[0]` holds `[batch, height, width, joints]` score maps and, when
    /// the configuration enables location refinement, `outputs[1]` holds
    /// `[batch, height, width, 2 * joints]` offsets. `transforms` holds one
    /// transform per frame. Batch order is preserved.
    ///
    /// # Errors
    ///
    /// Returns `InferenceError` if an expected output is missing and
    /// `ShapeMismatchError` if the outputs disagree with the batch or config.
    pub fn from_batch_outputs(
        frames: &[Arc<Frame>],
        config: &Arc<JointConfiguration>,
        outputs: &[ArrayD<f32>],
        transforms: &[Transform],
    ) -> Result<Vec<Self>> {
        let (score_maps, refinement) =
            batch_map_views(outputs, config.location_refinement(), frames.len())?;
        check_transforms(transforms, frames.len())?;

        frames
            .iter()
            .zip(transforms)
            .enumerate()
            .map(|(i, (frame, &transform))| {
                Self::new(
                    Arc::clone(frame),
                    Arc::clone(config),
                    score_maps.index_axis(Axis(0), i).to_owned(),
                    refinement
                        .as_ref()
                        .map(|maps| maps.index_axis(Axis(0), i).to_owned()),
                    transform,
                )
            })
            .collect()
    }

    /// The frame the maps were computed from.
    #[must_use]
    pub fn image(&self) -> &Arc<Frame> {
        &self.image
    }

    /// Joint configuration of the model.
    #[must_use]
    pub fn config(&self) -> &JointConfiguration {
        &self.config
    }

    /// All score maps, `[height, width, joints]`.
    #[must_use]
    pub fn score_maps(&self) -> &Array3<f32> {
        &self.score_maps
    }

    /// Score map of joint `joint`.
    ///
    /// # Panics
    ///
    /// Panics if `joint` is out of range.
    #[must_use]
    pub fn score_map(&self, joint: usize) -> ArrayView2<'_, f32> {
        self.score_maps.index_axis(Axis(2), joint)
    }

    /// Location refinement maps, `[height, width, 2 * joints]`, if present.
    #[must_use]
    pub fn location_refinement(&self) -> Option<&Array3<f32>> {
        self.location_refinement.as_ref()
    }

    /// The `(x, y)` offset maps of joint `joint`, if present.
    #[must_use]
    pub fn refinement(&self, joint: usize) -> Option<(ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        self.location_refinement.as_ref().map(|maps| {
            (
                maps.index_axis(Axis(2), 2 * joint),
                maps.index_axis(Axis(2), 2 * joint + 1),
            )
        })
    }

    /// Tensor to frame coordinate transform.
    #[must_use]
    pub const fn transform(&self) -> Transform {
        self.transform
    }
}

/// Borrow batched score maps, and refinement maps when `location_refinement`
/// is set, from engine outputs.
///
/// # Errors
///
/// Returns `InferenceError` if an expected output is missing and
/// `ShapeMismatchError` if an output is not rank 4 or its batch differs from
/// `batch`.
pub fn batch_map_views(
    outputs: &[ArrayD<f32>],
    location_refinement: bool,
    batch: usize,
) -> Result<(ArrayView4<'_, f32>, Option<ArrayView4<'_, f32>>)> {
    let score_maps = batch_maps(outputs.first(), "score map", batch)?;
    let refinement = if location_refinement {
        Some(batch_maps(outputs.get(1), "location refinement", batch)?)
    } else {
        None
    };
    Ok((score_maps, refinement))
}

fn batch_maps<'a>(
    output: Option<&'a ArrayD<f32>>,
    what: &str,
    batch: usize,
) -> Result<ArrayView4<'a, f32>> {
    let output = output
        .ok_or_else(|| InferenceError::InferenceError(format!("Missing {what} output")))?;
    let maps = output.view().into_dimensionality::<Ix4>().map_err(|_| {
        InferenceError::ShapeMismatchError(format!(
            "Expected a rank-4 {what} output, got shape {:?}",
            output.shape()
        ))
    })?;
    if maps.len_of(Axis(0)) != batch {
        return Err(InferenceError::ShapeMismatchError(format!(
            "{what} batch is {}, expected {batch}",
            maps.len_of(Axis(0))
        )));
    }
    Ok(maps)
}

/// Check `[height, width, joints]` score maps and `[height, width, 2 * joints]`
/// refinement maps against the joint count.
pub(crate) fn check_map_shapes(
    score_maps: (usize, usize, usize),
    refinement: Option<(usize, usize, usize)>,
    num_joints: usize,
) -> Result<()> {
    let (height, width, joints) = score_maps;
    if joints != num_joints {
        return Err(InferenceError::ShapeMismatchError(format!(
            "Score maps have {joints} channels, expected {num_joints} joints"
        )));
    }
    if let Some(refinement) = refinement
        && refinement != (height, width, 2 * joints)
    {
        return Err(InferenceError::ShapeMismatchError(format!(
            "Location refinement maps have shape {refinement:?}, expected {:?}",
            (height, width, 2 * joints)
        )));
    }
    Ok(())
}

/// Check that a batch carries one transform per frame.
pub(crate) fn check_transforms(transforms: &[Transform], batch: usize) -> Result<()> {
    if transforms.len() == batch {
        Ok(())
    } else {
        Err(InferenceError::ShapeMismatchError(format!(
            "Got {} transforms for a batch of {batch}",
            transforms.len()
        )))
    }
}
