// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # DeepLabCut Pose Inference Library
//!
//! Real-time markerless pose estimation for [DeepLabCut](https://www.mousemotorlab.org/deeplabcut)
//! models exported to ONNX. Each frame is adapted into the model's input
//! tensor, run through ONNX Runtime and decoded into a [`Pose`]: one named
//! [`BodyPart`] per joint, with an image-space position and a confidence.
//!
//! ## Features
//!
//! - **Two decoders** - The graph's regression output (`concat_1`) or the raw
//!   score maps with optional location refinement
//! - **Regions of interest** - Analyze a sub-rectangle; positions are reported
//!   in full-frame coordinates
//! - **Scale factor** - Shrink frames before inference and map positions back
//! - **Batching** - Several frames per engine call, results in input order
//! - **Shape-bound sessions** - Input tensors are reused until the frame shape
//!   changes
//! - **Post-processing** - Confidence masking and pose bounding boxes
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use std::sync::Arc;
//! use dlc_inference::{Frame, PoseModel, PredictConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // The joint names and stride come from the exported pose_cfg.yaml
//!     let config = PredictConfig::new().with_color_conversion(None);
//!     let mut model = PoseModel::load("dlc_model.onnx", "pose_cfg.yaml", config)?;
//!
//!     let frame = Arc::new(Frame::from_image(&image::open("frame.png")?)?);
//!     let pose = model.predict(&frame)?;
//!
//!     for part in &pose {
//!         if part.is_defined() {
//!             println!("{}: ({:.1}, {:.1}) {:.2}", part.name, part.position.x, part.position.y, part.confidence);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Single image
//! dlc-inference predict --model dlc_model.onnx --config pose_cfg.yaml --source frame.png
//!
//! # A directory in batches of 8, decoding score maps
//! dlc-inference predict -m dlc_model.onnx -c pose_cfg.yaml -s frames/ --batch 8 --maps
//!
//! # Region of interest at half resolution, masking uncertain parts
//! dlc-inference predict -m dlc_model.onnx -c pose_cfg.yaml -s frame.png \
//!     --roi 100,50,320,240 --scale 0.5 --conf 0.6
//! ```
//!
//! Diagnostics are emitted through `tracing`; set `RUST_LOG=dlc_inference=debug`
//! to see session binding and model loading details.
//!
//! ## Custom Configuration
//!
//! ```rust
//! use dlc_inference::{ColorConversion, Device, OutputMode, PredictConfig};
//!
//! let config = PredictConfig::new()
//!     .with_min_confidence(Some(0.5))                          // Mask parts below 0.5
//!     .with_scale_factor(Some(0.5))                            // Half-size input tensor
//!     .with_color_conversion(Some(ColorConversion::Bgr2Rgb))   // Frames arrive as BGR
//!     .with_output_mode(OutputMode::Maps)                      // Decode score maps
//!     .with_device(Device::Cpu);
//! assert_eq!(config.min_confidence, Some(0.5));
//! ```
//!
//! ## Hardware Acceleration
//!
//! ```bash
//! # NVIDIA CUDA
//! cargo build --release --features cuda
//!
//! # Apple CoreML
//! cargo build --release --features coreml
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`model`] | [`PoseModel`], the per-frame pipeline |
//! | [`results`] | [`Pose`], [`BodyPart`], [`PoseEstimation`] and [`Transform`] |
//! | [`postprocessing`] | Decoders, confidence masking and bounding boxes |
//! | [`preprocessing`] | Region selection, resizing and color conversion into tensors |
//! | [`session`] | Shape-bound inference session |
//! | [`engine`] | [`InferenceEngine`] trait and the ONNX Runtime [`OrtEngine`] |
//! | [`config`] | [`JointConfiguration`] loaded from `pose_cfg.yaml` |
//! | [`inference`] | [`PredictConfig`] and graph tensor names |
//! | [`source`] | Still-image sources ([`Source`], [`SourceIterator`]) |
//! | [`error`] | Error types ([`InferenceError`], [`Result`]) |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `cuda` | NVIDIA CUDA acceleration |
//! | `coreml` | Apple `CoreML` (macOS/iOS) |

// Modules
pub mod batch;
pub mod buffer;
pub mod cli;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod inference;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;
pub mod results;
pub mod session;
pub mod source;

// Re-export main types for convenience
pub use config::JointConfiguration;
pub use device::Device;
pub use engine::{InferenceEngine, OrtEngine};
pub use error::{InferenceError, Result};
pub use frame::{Frame, PixelFormat};
pub use geometry::{Point, Point2f, Rect, Size};
pub use inference::{OutputMode, OutputNames, PredictConfig};
pub use model::PoseModel;
pub use postprocessing::{BoundingBoxMethod, apply_threshold, bounding_box};
pub use preprocessing::ColorConversion;
pub use results::{BodyPart, Pose, PoseEstimation, Speed, Transform};
pub use source::{Source, SourceIterator, SourceMeta};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
