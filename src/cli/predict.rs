// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::process;
use std::sync::Arc;

use crate::batch::BatchProcessor;
use crate::cli::args::PredictArgs;
use crate::config::JointConfiguration;
use crate::device::Device;
use crate::error::Result;
use crate::frame::Frame;
use crate::geometry::Rect;
use crate::inference::{OutputMode, PredictConfig};
use crate::model::PoseModel;
use crate::postprocessing::{BoundingBoxMethod, bounding_box};
use crate::preprocessing::ColorConversion;
use crate::results::{BodyPart, Pose, Speed};
use crate::source::{Source, SourceIterator, SourceMeta};
use crate::{VERSION, error, info, section, verbose, warn};

/// Run pose estimation over a still-image source.
#[allow(clippy::too_many_lines, clippy::cast_precision_loss)]
pub fn run_prediction(args: &PredictArgs) {
    let config = match build_config(args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            process::exit(2);
        }
    };
    let device = config.device;

    let mut model = match PoseModel::load(&args.model, &args.config, config) {
        Ok(m) => m,
        Err(e) => {
            error!("Error loading model: {e}");
            process::exit(1);
        }
    };

    let iter = match SourceIterator::new(Source::from(args.source.as_str())) {
        Ok(iter) => iter,
        Err(e) => {
            error!("Error reading source: {e}");
            process::exit(1);
        }
    };
    if iter.is_empty() {
        warn!("No images found in '{}'", args.source);
        return;
    }
    let total = iter.len();

    println!("dlc-inference {VERSION} 🚀 ONNX Runtime {device}");
    verbose!("{} summary: {}", args.model, format_model_summary(model.joints()));

    let method = if args.fixed_size {
        BoundingBoxMethod::FixedSize
    } else {
        BoundingBoxMethod::Margin
    };
    let report = |pose: &Pose, meta_idx: usize, path: &str| {
        let rect = bounding_box(pose, args.margin, method);
        info!(
            "image {}/{} {}: {}x{} {}, box {}",
            meta_idx + 1,
            total,
            path,
            pose.image().width(),
            pose.image().height(),
            format_pose_summary(pose),
            format_rect(rect)
        );
        for part in pose {
            verbose!("    {}", format_body_part(part));
        }
    };

    // Decode images on a producer thread while the main thread runs inference
    let batch_size = args.batch.max(1);
    let (sender, receiver) = std::sync::mpsc::sync_channel(batch_size * 2);
    std::thread::spawn(move || {
        for item in iter {
            if sender.send(item).is_err() {
                break;
            }
        }
    });

    let mut processed = 0usize;
    let mut failed = 0usize;
    let speed = if args.roi.is_some() {
        if batch_size > 1 {
            warn!("--roi is applied per frame; ignoring --batch {batch_size}");
        }
        let mut speed = Speed::default();
        for item in receiver {
            let Some((frame, meta)) = next_frame(item, &mut failed) else {
                continue;
            };
            match model.predict_region(&frame, args.roi) {
                Ok(pose) => {
                    report(&pose, meta.frame_idx, &meta.path);
                    speed += model.speed();
                    processed += 1;
                }
                Err(e) => {
                    error!("{}: {e}", meta.path);
                    failed += 1;
                }
            }
        }
        speed
    } else {
        let mut processor = BatchProcessor::new(
            &mut model,
            batch_size,
            |poses: Result<Vec<Pose>>, _frames: &[Arc<Frame>], paths: &[String], offset: usize| {
                match poses {
                    Ok(poses) => {
                        for (i, (pose, path)) in poses.iter().zip(paths).enumerate() {
                            report(pose, offset + i, path);
                        }
                        processed += poses.len();
                    }
                    Err(e) => {
                        error!("Batch starting at {}: {e}", paths.first().map_or("?", String::as_str));
                        failed += paths.len();
                    }
                }
            },
        );
        let mut unreadable = 0;
        for item in receiver {
            if let Some((frame, meta)) = next_frame(item, &mut unreadable) {
                processor.add(frame, meta.path);
            }
        }
        processor.flush();
        let speed = processor.total_speed();
        drop(processor);
        failed += unreadable;
        speed
    };

    let per_image = processed.max(1) as f64;
    section!("Results");
    verbose!(
        "{processed} image(s) processed, {failed} failed. Speed: {:.1}ms preprocess, {:.1}ms inference, {:.1}ms postprocess per image",
        speed.preprocess.unwrap_or(0.0) / per_image,
        speed.inference.unwrap_or(0.0) / per_image,
        speed.postprocess.unwrap_or(0.0) / per_image
    );

    if processed == 0 {
        process::exit(1);
    }
}

/// Unwrap a decoded source item, counting unreadable images.
fn next_frame(
    item: Result<(Arc<Frame>, SourceMeta)>,
    failed: &mut usize,
) -> Option<(Arc<Frame>, SourceMeta)> {
    match item {
        Ok(item) => Some(item),
        Err(e) => {
            error!("{e}");
            *failed += 1;
            None
        }
    }
}

/// Translate command-line arguments into a prediction configuration.
fn build_config(args: &PredictArgs) -> std::result::Result<PredictConfig, String> {
    let color = match args.color.to_lowercase().as_str() {
        "none" | "" => None,
        other => Some(other.parse::<ColorConversion>()?),
    };
    let device = args
        .device
        .as_deref()
        .map(str::parse::<Device>)
        .transpose()?
        .unwrap_or_default();
    if let Some(scale) = args.scale
        && !(scale.is_finite() && scale > 0.0)
    {
        return Err(format!("--scale must be a positive number, got {scale}"));
    }

    Ok(PredictConfig::new()
        .with_min_confidence(args.conf)
        .with_scale_factor(args.scale)
        .with_color_conversion(color)
        .with_output_mode(if args.maps {
            OutputMode::Maps
        } else {
            OutputMode::Regression
        })
        .with_threads(args.threads)
        .with_device(device))
}

/// Summary like "4 body parts, stride 8, location refinement on, part affinity field off".
///
/// The affinity link count is appended when the graph declares links.
fn format_model_summary(joints: &JointConfiguration) -> String {
    let on_off = |flag: bool| if flag { "on" } else { "off" };
    let mut summary = format!(
        "{} body parts, stride {}, location refinement {}, part affinity field {}",
        joints.num_joints(),
        joints.stride(),
        on_off(joints.location_refinement()),
        on_off(joints.predict_part_affinity_field())
    );
    let links = joints.part_affinity_graph().len();
    if links > 0 {
        summary.push_str(&format!(" ({links} links)"));
    }
    summary
}

/// Summary like "12/14 body parts".
fn format_pose_summary(pose: &Pose) -> String {
    let defined = pose.iter().filter(|part| part.is_defined()).count();
    let noun = if pose.len() == 1 { "body part" } else { "body parts" };
    format!("{defined}/{} {noun}", pose.len())
}

fn format_body_part(part: &BodyPart) -> String {
    if part.is_defined() {
        format!(
            "{} ({:.1}, {:.1}) {:.2}",
            part.name, part.position.x, part.position.y, part.confidence
        )
    } else {
        format!("{} - {:.2}", part.name, part.confidence)
    }
}

fn format_rect(rect: Rect) -> String {
    if rect.is_empty() {
        "none".to_string()
    } else {
        format!("{}x{} at ({}, {})", rect.width, rect.height, rect.x, rect.y)
    }
}
