// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Pose model loading and per-frame prediction.
//!
//! This module provides the main [`PoseModel`] struct, which ties the frame
//! adapter, the inference session and the decoders into one synchronous
//! per-frame transform.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::trace;

use crate::config::JointConfiguration;
use crate::engine::{InferenceEngine, OrtEngine};
use crate::error::{InferenceError, Result};
use crate::frame::Frame;
use crate::geometry::{Point, Rect, Size};
use crate::inference::{OutputMode, PredictConfig};
use crate::postprocessing::decode;
use crate::preprocessing::{region_of_interest, tensor_size_for, FrameAdapter};
use crate::results::{Pose, PoseEstimation, Speed, Transform};
use crate::session::InferenceSession;

/// DeepLabCut pose model.
///
/// Owns the joint configuration, the frame adapter scratch buffers and the
/// shape-bound inference session. Calls are processed one at a time; results
/// are returned in input order. Dropping the model releases the session and
/// every buffer.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use dlc_inference::{Frame, PoseModel, PredictConfig};
///
/// let config = PredictConfig::new().with_min_confidence(Some(0.5));
/// let mut model = PoseModel::load("dlc_model.onnx", "pose_cfg.yaml", config)?;
///
/// let frame = Arc::new(Frame::from_image(&image::open("frame.png")?)?);
/// let pose = model.predict(&frame)?;
/// for part in &pose {
///     println!("{}: {:?} ({:.2})", part.name, part.position, part.confidence);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PoseModel<E: InferenceEngine = OrtEngine> {
    joints: Arc<JointConfiguration>,
    config: PredictConfig,
    adapter: FrameAdapter,
    session: InferenceSession<E>,
    speed: Speed,
}

impl PoseModel<OrtEngine> {
    /// Load an ONNX model and its `pose_cfg.yaml`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoadError` or `ModelLoadError`; no partially built model
    /// is ever returned.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        model_path: P,
        config_path: Q,
        config: PredictConfig,
    ) -> Result<Self> {
        let joints = JointConfiguration::load(config_path)?;
        let engine = OrtEngine::from_file(model_path, &config)?;
        Ok(Self::from_parts(engine, joints, config))
    }
}

impl<E: InferenceEngine> PoseModel<E> {
    /// Assemble a model from an engine and a joint configuration.
    pub fn from_parts(engine: E, joints: JointConfiguration, config: PredictConfig) -> Self {
        let session = InferenceSession::new(
            engine,
            config.output_names.clone(),
            joints.location_refinement(),
        );
        Self {
            joints: Arc::new(joints),
            config,
            adapter: FrameAdapter::new(),
            session,
            speed: Speed::default(),
        }
    }

    /// Estimate the pose in a whole frame.
    ///
    /// # Errors
    ///
    /// Returns `ImageError` for unusable frames, `InferenceError` if the
    /// engine fails, and `ShapeMismatchError` for unexpected outputs. The
    /// model stays usable after any of them.
    pub fn predict(&mut self, frame: &Arc<Frame>) -> Result<Pose> {
        self.predict_region(frame, None)
    }

    /// Estimate the pose inside a region of interest.
    ///
    /// Positions are reported in full-frame coordinates. A region without
    /// positive size selects the whole frame.
    ///
    /// # Errors
    ///
    /// See [`Self::predict`]; additionally `ImageError` if the region lies
    /// outside the frame.
    pub fn predict_region(&mut self, frame: &Arc<Frame>, roi: Option<Rect>) -> Result<Pose> {
        let mode = self.config.output_mode;
        let transform = self.run_single(frame, roi, mode)?;

        let start = Instant::now();
        let mut poses = decode(
            self.session.outputs(),
            std::slice::from_ref(frame),
            &self.joints,
            self.config.min_confidence,
            &[transform],
        )?;
        self.speed.postprocess = Some(elapsed_ms(start));

        poses.pop().ok_or_else(|| {
            InferenceError::InferenceError("Decoder produced no pose".to_string())
        })
    }

    /// Compute raw score and refinement maps for a frame or region.
    ///
    /// Maps are always requested, whatever the configured output mode, and
    /// copied out of the session so they outlive the next call.
    ///
    /// # Errors
    ///
    /// See [`Self::predict_region`].
    pub fn predict_maps(&mut self, frame: &Arc<Frame>, roi: Option<Rect>) -> Result<PoseEstimation> {
        let transform = self.run_single(frame, roi, OutputMode::Maps)?;
        let start = Instant::now();
        let mut estimations = PoseEstimation::from_batch_outputs(
            std::slice::from_ref(frame),
            &self.joints,
            self.session.outputs(),
            &[transform],
        )?;
        self.speed.postprocess = Some(elapsed_ms(start));
        estimations.pop().ok_or_else(|| {
            InferenceError::InferenceError("Decoder produced no estimation".to_string())
        })
    }

    /// Compute raw maps for a batch of frames in one engine call.
    ///
    /// Estimations are returned in input order.
    ///
    /// # Errors
    ///
    /// Returns `EmptyBatchError` for an empty batch and `ShapeMismatchError`
    /// for frames of different sizes in strict batch mode, besides the
    /// per-frame errors of [`Self::predict`].
    pub fn predict_maps_batch(&mut self, frames: &[Arc<Frame>]) -> Result<Vec<PoseEstimation>> {
        let transforms = self.run_batch(frames, OutputMode::Maps)?;
        let start = Instant::now();
        let estimations = PoseEstimation::from_batch_outputs(
            frames,
            &self.joints,
            self.session.outputs(),
            &transforms,
        )?;
        self.speed.postprocess = Some(elapsed_ms(start));
        Ok(estimations)
    }

    /// Estimate poses for a batch of frames in one engine call.
    ///
    /// Uses the configured output mode; poses are returned in input order.
    /// With lenient batching, frames resized to the first frame's tensor size
    /// are still reported in their own pixel coordinates.
    ///
    /// # Errors
    ///
    /// See [`Self::predict_maps_batch`].
    pub fn predict_batch(&mut self, frames: &[Arc<Frame>]) -> Result<Vec<Pose>> {
        let transforms = self.run_batch(frames, self.config.output_mode)?;
        let start = Instant::now();
        let poses = decode(
            self.session.outputs(),
            frames,
            &self.joints,
            self.config.min_confidence,
            &transforms,
        )?;
        self.speed.postprocess = Some(elapsed_ms(start));
        Ok(poses)
    }

    /// Adapt one frame, bind and run.
    fn run_single(
        &mut self,
        frame: &Arc<Frame>,
        roi: Option<Rect>,
        mode: OutputMode,
    ) -> Result<Transform> {
        self.speed = Speed::default();
        let start = Instant::now();

        let (region, _) = region_of_interest(frame.size(), roi)?;
        let target = self.target_size(region.size())?;
        self.bind(target, 1, mode);
        let offset = self.adapter.prepare(
            frame,
            roi,
            target,
            self.config.color_conversion,
            self.session.input_mut().slot_mut(0),
        )?;
        self.speed.preprocess = Some(elapsed_ms(start));
        trace!(%region, width = target.width, height = target.height, "frame prepared");

        self.infer()?;
        Ok(Transform::new(offset, self.config.scale_factor))
    }

    /// Pack a batch of whole frames, bind and run.
    ///
    /// Returns one transform per frame. Frames sized like the first one share
    /// the scale factor transform; others were resized to the first frame's
    /// tensor size and map back through their own per-axis ratio.
    fn run_batch(&mut self, frames: &[Arc<Frame>], mode: OutputMode) -> Result<Vec<Transform>> {
        self.speed = Speed::default();
        let start = Instant::now();

        let first = frames.first().ok_or(InferenceError::EmptyBatchError)?;
        let target = self.target_size(first.size())?;
        self.bind(target, frames.len(), mode);
        self.adapter.pack_batch(
            frames,
            target,
            self.config.color_conversion,
            self.config.strict_batch,
            self.session.input_mut(),
        )?;
        let transforms = frames
            .iter()
            .map(|frame| {
                if frame.size() == first.size() {
                    Transform::new(Point::default(), self.config.scale_factor)
                } else {
                    Transform::resized(Point::default(), frame.size(), target)
                }
            })
            .collect();
        self.speed.preprocess = Some(elapsed_ms(start));
        trace!(batch = frames.len(), "batch prepared");

        self.infer()?;
        Ok(transforms)
    }

    fn target_size(&self, region: Size) -> Result<Size> {
        let target = tensor_size_for(region, self.config.scale_factor);
        if target.is_positive() {
            Ok(target)
        } else {
            Err(InferenceError::ImageError(format!(
                "Scale factor {:?} leaves an empty {}x{} tensor",
                self.config.scale_factor, target.width, target.height
            )))
        }
    }

    #[allow(clippy::cast_sign_loss)]
    fn bind(&mut self, target: Size, batch: usize, mode: OutputMode) {
        self.session
            .ensure_bound(target.height as usize, target.width as usize, batch, mode);
    }

    fn infer(&mut self) -> Result<()> {
        let start = Instant::now();
        self.session.run()?;
        self.speed.inference = Some(elapsed_ms(start));
        Ok(())
    }

    /// Joint configuration of the model.
    #[must_use]
    pub fn joints(&self) -> &JointConfiguration {
        &self.joints
    }

    /// Prediction configuration.
    #[must_use]
    pub const fn config(&self) -> &PredictConfig {
        &self.config
    }

    /// Timing of the most recent call.
    #[must_use]
    pub const fn speed(&self) -> Speed {
        self.speed
    }

    /// The inference session, for inspecting the current binding.
    #[must_use]
    pub const fn session(&self) -> &InferenceSession<E> {
        &self.session
    }
}

impl<E: InferenceEngine> std::fmt::Debug for PoseModel<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseModel")
            .field("joints", &self.joints.joint_names())
            .field("stride", &self.joints.stride())
            .field("output_mode", &self.config.output_mode)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
