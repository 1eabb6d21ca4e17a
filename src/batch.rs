// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Batch processing module.
//!
//! This module provides the [`BatchProcessor`] struct, which buffers frames
//! until a batch is full and runs them through one engine call.

use std::sync::Arc;

use tracing::warn;

use crate::engine::InferenceEngine;
use crate::error::Result;
use crate::frame::Frame;
use crate::model::PoseModel;
use crate::results::{Pose, Speed};

/// A processor for handling batch inference.
///
/// Frames are collected until `batch_size` is reached, then predicted together
/// and handed to the callback with their paths and the index of the first frame
/// in the stream. A failed batch is reported to the callback as an error and
/// is not retried.
///
/// # Example
///
/// ```no_run
/// use dlc_inference::{PoseModel, PredictConfig, batch::BatchProcessor};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut model = PoseModel::load("dlc_model.onnx", "pose_cfg.yaml", PredictConfig::default())?;
///     let batch_size = 4;
///
///     let mut processor = BatchProcessor::new(&mut model, batch_size, |poses, frames, paths, offset| {
///         println!("Processed batch of {} frames starting at {offset}", frames.len());
///     });
///
///     // Add frames...
///     // processor.add(frame, path);
///
///     processor.flush();
///     Ok(())
/// }
/// ```
pub struct BatchProcessor<'a, E, F>
where
    E: InferenceEngine,
    F: FnMut(Result<Vec<Pose>>, &[Arc<Frame>], &[String], usize),
{
    model: &'a mut PoseModel<E>,
    batch_size: usize,
    frames: Vec<Arc<Frame>>,
    paths: Vec<String>,
    callback: F,
    frame_count: usize,
    speed: Speed,
}

impl<'a, E, F> BatchProcessor<'a, E, F>
where
    E: InferenceEngine,
    F: FnMut(Result<Vec<Pose>>, &[Arc<Frame>], &[String], usize),
{
    /// Create a new `BatchProcessor`.
    ///
    /// # Arguments
    ///
    /// * `model` - Mutable reference to the `PoseModel`.
    /// * `batch_size` - The size of the batch. Zero is treated as one.
    /// * `callback` - A closure to handle the results of each batch.
    pub fn new(model: &'a mut PoseModel<E>, batch_size: usize, callback: F) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            model,
            batch_size,
            frames: Vec::with_capacity(batch_size),
            paths: Vec::with_capacity(batch_size),
            callback,
            frame_count: 0,
            speed: Speed::default(),
        }
    }

    /// Add a frame to the batch.
    ///
    /// If the batch becomes full, it is automatically processed.
    pub fn add(&mut self, frame: Arc<Frame>, path: String) {
        self.frames.push(frame);
        self.paths.push(path);

        if self.frames.len() >= self.batch_size {
            self.process();
        }
    }

    /// Process any remaining frames in the batch.
    ///
    /// Call this after the last frame so a partial batch is not lost.
    pub fn flush(&mut self) {
        self.process();
    }

    /// Number of frames handed to the callback so far.
    #[must_use]
    pub const fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Timings accumulated over every processed batch.
    #[must_use]
    pub const fn total_speed(&self) -> Speed {
        self.speed
    }

    fn process(&mut self) {
        if self.frames.is_empty() {
            return;
        }

        let result = self.model.predict_batch(&self.frames);
        match &result {
            Ok(_) => self.speed += self.model.speed(),
            Err(e) => warn!(frames = self.frames.len(), error = %e, "batch dropped"),
        }
        (self.callback)(result, &self.frames, &self.paths, self.frame_count);

        self.frame_count += self.frames.len();
        self.frames.clear();
        self.paths.clear();
    }
}
