// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Decoding of raw model outputs into poses, and pose post-processing.
//!
//! Two decode paths exist. Direct regression reads one `[y, x, confidence]`
//! row per joint from the graph's argmax output. Heat-map decoding searches
//! each joint's score map for its peak and converts the cell back to tensor
//! pixels through the stride, optionally adding the sub-cell refinement.
//! Both produce parts in joint configuration order.
//!
//! Post-processing covers confidence masking and bounding box extraction.

#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]

use std::sync::Arc;

use ndarray::{ArrayD, ArrayView2, ArrayView3, Axis, Ix2, Ix3};

use crate::config::JointConfiguration;
use crate::error::{InferenceError, Result};
use crate::frame::Frame;
use crate::geometry::{Point2f, Rect, Size};
use crate::results::{
    BodyPart, Pose, PoseEstimation, Transform, batch_map_views, check_map_shapes, check_transforms,
};

/// Number of values per joint in the regression output.
const REGRESSION_COLUMNS: usize = 3;

/// How [`bounding_box`] turns a pose extent into a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoundingBoxMethod {
    /// The pose extent expanded by the margin on each side, clipped to the image.
    #[default]
    Margin,
    /// A window of exactly the margin size centered on the pose extent,
    /// shifted to lie inside the image.
    FixedSize,
}

impl std::str::FromStr for BoundingBoxMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "margin" => Ok(Self::Margin),
            "fixed" | "fixedsize" | "fixed-size" => Ok(Self::FixedSize),
            _ => Err(format!("invalid bounding box method '{s}', expected margin or fixed-size")),
        }
    }
}

/// Returns `true` when `confidence` falls below an optional threshold.
fn below(confidence: f32, threshold: Option<f32>) -> bool {
    threshold.is_some_and(|t| confidence < t)
}

/// Locate the global maximum of a score map.
///
/// Cells are scanned in row-major order and the first maximum wins; later
/// cells must be strictly greater to replace it. `NaN` cells are skipped.
///
/// # Returns
///
/// `(row, column, value)` of the peak, or `None` if the map has no finite
/// comparable value.
#[must_use]
pub fn find_peak(map: ArrayView2<'_, f32>) -> Option<(usize, usize, f32)> {
    let mut best: Option<(usize, usize, f32)> = None;
    for ((row, col), &value) in map.indexed_iter() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, _, max)) if value <= max => {}
            _ => best = Some((row, col, value)),
        }
    }
    best
}

/// Decode a `[joints, 3]` regression output into a pose.
///
/// Row `i` holds `[y, x, confidence]` in tensor pixels for joint `i`. Positions
/// are mapped to frame coordinates with `transform`; parts whose confidence is
/// below `threshold` get the undefined position and keep their confidence.
///
/// # Errors
///
/// Returns `ShapeMismatchError` if the row count differs from the joint count
/// or rows have fewer than three values.
pub fn decode_regression(
    rows: ArrayView2<'_, f32>,
    joints: &JointConfiguration,
    image: Arc<Frame>,
    threshold: Option<f32>,
    transform: Transform,
) -> Result<Pose> {
    let (num_rows, num_cols) = rows.dim();
    if num_rows != joints.num_joints() || num_cols < REGRESSION_COLUMNS {
        return Err(InferenceError::ShapeMismatchError(format!(
            "Regression output is {num_rows}x{num_cols}, expected {}x{REGRESSION_COLUMNS}",
            joints.num_joints()
        )));
    }

    let mut pose = Pose::with_capacity(image, num_rows);
    for (name, row) in joints.joint_names().iter().zip(rows.rows()) {
        let confidence = row[2];
        let position = if below(confidence, threshold) {
            Point2f::UNDEFINED
        } else {
            transform.apply(row[1], row[0])
        };
        pose.push(BodyPart::new(name.as_str(), position, confidence))?;
    }
    Ok(pose)
}

/// Decode score maps, and refinement maps when present, into a pose.
///
/// For each joint the score map peak `(mx, my)` gives the confidence. The
/// tensor-space position is `m * stride + stride / 2`, plus the refinement
/// offset read at the peak cell, and is then mapped through the estimation's
/// transform. A score map without any comparable value yields an undefined
/// part with zero confidence.
///
/// # Errors
///
/// Returns `DuplicateBodyPart` only if the joint configuration is corrupt.
pub fn decode_maps(estimation: &PoseEstimation, threshold: Option<f32>) -> Result<Pose> {
    decode_map_views(
        estimation.score_maps().view(),
        estimation.location_refinement().map(|maps| maps.view()),
        estimation.config(),
        Arc::clone(estimation.image()),
        threshold,
        estimation.transform(),
    )
}

/// Decode borrowed `[height, width, joints]` score maps and optional
/// `[height, width, 2 * joints]` refinement maps into a pose.
///
/// Same arithmetic as [`decode_maps`], without taking ownership of the maps.
///
/// # Errors
///
/// Returns `ShapeMismatchError` if the map channels disagree with `joints`.
pub fn decode_map_views(
    score_maps: ArrayView3<'_, f32>,
    refinement: Option<ArrayView3<'_, f32>>,
    joints: &JointConfiguration,
    image: Arc<Frame>,
    threshold: Option<f32>,
    transform: Transform,
) -> Result<Pose> {
    check_map_shapes(
        score_maps.dim(),
        refinement.as_ref().map(|maps| maps.dim()),
        joints.num_joints(),
    )?;
    let stride = joints.stride() as f32;
    let half_stride = 0.5 * stride;

    let mut pose = Pose::with_capacity(image, joints.num_joints());
    for (joint, name) in joints.joint_names().iter().enumerate() {
        let part = match find_peak(score_maps.index_axis(Axis(2), joint)) {
            None => BodyPart::new(name.as_str(), Point2f::UNDEFINED, 0.0),
            Some((_, _, confidence)) if below(confidence, threshold) => {
                BodyPart::new(name.as_str(), Point2f::UNDEFINED, confidence)
            }
            Some((my, mx, confidence)) => {
                let (offset_x, offset_y) = refinement.as_ref().map_or((0.0, 0.0), |maps| {
                    (maps[[my, mx, 2 * joint]], maps[[my, mx, 2 * joint + 1]])
                });
                let x = (mx as f32).mul_add(stride, half_stride) + offset_x;
                let y = (my as f32).mul_add(stride, half_stride) + offset_y;
                BodyPart::new(name.as_str(), transform.apply(x, y), confidence)
            }
        };
        pose.push(part)?;
    }
    Ok(pose)
}

/// Decode engine outputs for a batch of frames, preserving batch order.
///
/// The rank of the first output selects the mode: `[joints, 3]` is a single
/// regression result, `[batch, joints, 3]` a batched one, and
/// `[batch, height, width, joints]` score maps are decoded in place through
/// [`decode_map_views`]. `transforms` holds one transform per frame.
///
/// # Errors
///
/// Returns `ShapeMismatchError` for outputs that fit neither mode or disagree
/// with the batch size, and `InferenceError` if no output was produced.
pub fn decode(
    outputs: &[ArrayD<f32>],
    frames: &[Arc<Frame>],
    joints: &JointConfiguration,
    threshold: Option<f32>,
    transforms: &[Transform],
) -> Result<Vec<Pose>> {
    let first = outputs
        .first()
        .ok_or_else(|| InferenceError::InferenceError("Model produced no outputs".to_string()))?;
    check_transforms(transforms, frames.len())?;

    match first.ndim() {
        2 => {
            let ([frame], [transform]) = (frames, transforms) else {
                return Err(InferenceError::ShapeMismatchError(format!(
                    "Rank-2 regression output holds one frame, got a batch of {}",
                    frames.len()
                )));
            };
            let rows = first
                .view()
                .into_dimensionality::<Ix2>()
                .map_err(|e| InferenceError::ShapeMismatchError(e.to_string()))?;
            Ok(vec![decode_regression(
                rows,
                joints,
                Arc::clone(frame),
                threshold,
                *transform,
            )?])
        }
        3 => {
            let batch = first
                .view()
                .into_dimensionality::<Ix3>()
                .map_err(|e| InferenceError::ShapeMismatchError(e.to_string()))?;
            if batch.len_of(Axis(0)) != frames.len() {
                return Err(InferenceError::ShapeMismatchError(format!(
                    "Regression output batch is {}, expected {}",
                    batch.len_of(Axis(0)),
                    frames.len()
                )));
            }
            batch
                .outer_iter()
                .zip(frames.iter().zip(transforms))
                .map(|(rows, (frame, &transform))| {
                    decode_regression(rows, joints, Arc::clone(frame), threshold, transform)
                })
                .collect()
        }
        4 => {
            let (score_maps, refinement) =
                batch_map_views(outputs, joints.location_refinement(), frames.len())?;
            frames
                .iter()
                .zip(transforms)
                .enumerate()
                .map(|(i, (frame, &transform))| {
                    decode_map_views(
                        score_maps.index_axis(Axis(0), i),
                        refinement.as_ref().map(|maps| maps.index_axis(Axis(0), i)),
                        joints,
                        Arc::clone(frame),
                        threshold,
                        transform,
                    )
                })
                .collect()
        }
        rank => Err(InferenceError::ShapeMismatchError(format!(
            "Unsupported output rank {rank} with shape {:?}",
            first.shape()
        ))),
    }
}

/// Mask low-confidence positions.
///
/// Every part with confidence below `min_confidence` gets the undefined
/// position; its name and confidence are kept. Length and order never change.
#[must_use]
pub fn apply_threshold(pose: &Pose, min_confidence: f32) -> Pose {
    let mut result = pose.clone();
    for part in result.parts_mut() {
        if part.confidence < min_confidence {
            part.position = Point2f::UNDEFINED;
        }
    }
    result
}

/// Compute the bounding box of the defined parts of a pose.
///
/// Image bounds come from the pose's source frame. Only finite positions
/// contribute; a pose without any yields `Rect::default()`. The box always
/// lies inside the image.
#[must_use]
pub fn bounding_box(pose: &Pose, margin: Size, method: BoundingBoxMethod) -> Rect {
    let Some((min, max)) = pose_extent(pose) else {
        return Rect::default();
    };
    let image = pose.image().size();
    let clamp_x = |v: f32| clamp_to_extent(v, image.width);
    let clamp_y = |v: f32| clamp_to_extent(v, image.height);

    match method {
        BoundingBoxMethod::FixedSize => {
            let center_x = clamp_x((min.x + max.x) / 2.0);
            let center_y = clamp_y((min.y + max.y) / 2.0);
            Rect::new(
                shift_into(center_x - margin.width / 2, margin.width, image.width),
                shift_into(center_y - margin.height / 2, margin.height, image.height),
                margin.width,
                margin.height,
            )
        }
        BoundingBoxMethod::Margin => {
            let left = clamp_x(min.x.trunc() - margin.width as f32);
            let top = clamp_y(min.y.trunc() - margin.height as f32);
            let right = clamp_x(max.x.trunc() + margin.width as f32);
            let bottom = clamp_y(max.y.trunc() + margin.height as f32);
            Rect::new(left, top, right - left + 1, bottom - top + 1)
        }
    }
}

/// Truncate `value` to a pixel index in `[0, extent)`.
fn clamp_to_extent(value: f32, extent: i32) -> i32 {
    value.trunc().clamp(0.0, (extent - 1).max(0) as f32) as i32
}

/// Component-wise min and max over finite positions.
fn pose_extent(pose: &Pose) -> Option<(Point2f, Point2f)> {
    pose.iter()
        .map(|part| part.position)
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .fold(None, |extent, p| {
            Some(extent.map_or((p, p), |(min, max): (Point2f, Point2f)| {
                (
                    Point2f::new(min.x.min(p.x), min.y.min(p.y)),
                    Point2f::new(max.x.max(p.x), max.y.max(p.y)),
                )
            }))
        })
}

/// Shift a window start so `[start, start + len)` fits in `[0, extent)`,
/// moving the low edge first.
const fn shift_into(start: i32, len: i32, extent: i32) -> i32 {
    if start < 0 {
        0
    } else {
        let overflow = start.saturating_add(len) - extent;
        if overflow > 0 { start - overflow } else { start }
    }
}
