// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Integration tests for the pose pipeline, driven by a scripted engine.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use dlc_inference::engine::OutputTensor;
use dlc_inference::postprocessing::decode_maps;
use dlc_inference::{
    BoundingBoxMethod, Frame, InferenceEngine, InferenceError, JointConfiguration, OutputMode,
    PixelFormat, Point2f, PoseModel, PredictConfig, Rect, Result, Size, bounding_box,
};
use ndarray::{ArrayD, ArrayView4, IxDyn};

/// Fake DeepLabCut graph.
///
/// Regression rows are `[h - 1 + r, w - 1 + g + j, 0.9 - 0.3 j]`, read from
/// the top-left tensor pixel. Score maps peak at cell `(1, 2)` for joint 0
/// and are all `NaN` for every other joint.
#[derive(Clone, Default)]
struct ScriptedGraph {
    fail_next: Rc<Cell<bool>>,
    shapes: Rc<RefCell<Vec<Vec<usize>>>>,
}

impl InferenceEngine for ScriptedGraph {
    fn input_name(&self) -> &str {
        "Placeholder"
    }

    fn run(&mut self, input: ArrayView4<'_, f32>, fetch: &[String]) -> Result<Vec<OutputTensor>> {
        if self.fail_next.replace(false) {
            return Err(InferenceError::InferenceError("device lost".to_string()));
        }
        let (batch, height, width, _) = input.dim();
        self.shapes.borrow_mut().push(input.shape().to_vec());

        let outputs = fetch
            .iter()
            .map(|name| match name.as_str() {
                "concat_1" => {
                    let mut out = ArrayD::zeros(IxDyn(&[batch, JOINTS, 3]));
                    for b in 0..batch {
                        for j in 0..JOINTS {
                            out[[b, j, 0]] = (height - 1) as f32 + input[[b, 0, 0, 0]];
                            out[[b, j, 1]] = (width - 1 + j) as f32 + input[[b, 0, 0, 1]];
                            out[[b, j, 2]] = 0.9 - 0.3 * j as f32;
                        }
                    }
                    out
                }
                "Sigmoid" => {
                    let mut out =
                        ArrayD::from_elem(IxDyn(&[batch, height / 8, width / 8, JOINTS]), f32::NAN);
                    for b in 0..batch {
                        for y in 0..height / 8 {
                            for x in 0..width / 8 {
                                out[[b, y, x, 0]] = 0.1;
                            }
                        }
                        out[[b, 1, 2, 0]] = 0.8;
                    }
                    out
                }
                _ => {
                    let mut out = ArrayD::zeros(IxDyn(&[batch, height / 8, width / 8, 2 * JOINTS]));
                    for b in 0..batch {
                        out[[b, 1, 2, 0]] = 0.5;
                        out[[b, 1, 2, 1]] = -0.5;
                    }
                    out
                }
            })
            .collect();
        Ok(outputs)
    }
}

const JOINTS: usize = 2;

fn joints() -> JointConfiguration {
    JointConfiguration::new(vec!["snout".into(), "tailbase".into()], 8, true).unwrap()
}

fn model(config: PredictConfig) -> (PoseModel<ScriptedGraph>, ScriptedGraph) {
    let graph = ScriptedGraph::default();
    let config = config.with_color_conversion(None);
    (PoseModel::from_parts(graph.clone(), joints(), config), graph)
}

fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Arc<Frame> {
    let data = rgb.repeat((width * height) as usize);
    Arc::new(Frame::from_raw(width, height, PixelFormat::Rgb8, data).unwrap())
}

fn assert_close(actual: Point2f, x: f32, y: f32) {
    assert!(
        (actual.x - x).abs() < 1e-4 && (actual.y - y).abs() < 1e-4,
        "expected ({x}, {y}), got {actual:?}"
    );
}

#[test]
fn test_regression_pose_in_frame_coordinates() {
    let (mut model, _) = model(PredictConfig::new());
    let frame = solid(32, 24, [10, 20, 30]);

    let pose = model.predict(&frame).unwrap();
    assert_eq!(pose.len(), JOINTS);
    assert_eq!(pose[0].name, "snout");
    assert_close(pose[0].position, 51.0, 33.0);
    assert_close(pose.body_part("tailbase").unwrap().position, 52.0, 33.0);
    assert!((pose[1].confidence - 0.6).abs() < 1e-6);
    assert!(Arc::ptr_eq(pose.image(), &frame));

    let speed = model.speed();
    assert!(speed.preprocess.is_some());
    assert!(speed.inference.is_some());
    assert!(speed.postprocess.is_some());
}

#[test]
fn test_min_confidence_masks_positions() {
    let (mut model, _) = model(PredictConfig::new().with_min_confidence(Some(0.7)));
    let pose = model.predict(&solid(16, 16, [0, 0, 0])).unwrap();

    assert!(pose[0].is_defined());
    assert!(!pose[1].is_defined());
    assert!((pose[1].confidence - 0.6).abs() < 1e-6);
}

#[test]
fn test_region_and_scale_map_back_to_frame() {
    let (mut model, graph) = model(PredictConfig::new().with_scale_factor(Some(0.5)));
    let frame = solid(32, 24, [0, 0, 0]);

    let pose = model
        .predict_region(&frame, Some(Rect::new(8, 4, 16, 12)))
        .unwrap();

    // 16x12 region at half scale is an 8x6 tensor; (7, 5) maps to (7 * 2 + 8, 5 * 2 + 4)
    assert_eq!(graph.shapes.borrow()[0], [1, 6, 8, 3]);
    assert_close(pose[0].position, 22.0, 14.0);
}

#[test]
fn test_empty_region_selects_whole_frame() {
    let (mut model, graph) = model(PredictConfig::new());
    let frame = solid(20, 10, [0, 0, 0]);

    model
        .predict_region(&frame, Some(Rect::new(3, 3, 0, 5)))
        .unwrap();
    assert_eq!(graph.shapes.borrow()[0], [1, 10, 20, 3]);
}

#[test]
fn test_region_outside_frame_is_an_image_error() {
    let (mut model, _) = model(PredictConfig::new());
    let result = model.predict_region(&solid(20, 10, [0, 0, 0]), Some(Rect::new(50, 50, 5, 5)));
    assert!(matches!(result, Err(InferenceError::ImageError(_))));
}

#[test]
fn test_session_rebinds_only_on_shape_change() {
    let (mut model, _) = model(PredictConfig::new());
    let small = solid(16, 16, [1, 2, 3]);
    let large = solid(32, 16, [1, 2, 3]);

    for _ in 0..3 {
        model.predict(&small).unwrap();
    }
    assert_eq!(model.session().rebind_count(), 1);

    model.predict(&large).unwrap();
    model.predict(&large).unwrap();
    assert_eq!(model.session().rebind_count(), 2);

    model.predict_maps(&large, None).unwrap();
    assert_eq!(model.session().rebind_count(), 3);
    assert_eq!(model.session().binding().unwrap().mode, OutputMode::Maps);
}

#[test]
fn test_batch_matches_single_frame_predictions() {
    let frames = vec![
        solid(24, 16, [1, 2, 3]),
        solid(24, 16, [40, 50, 60]),
        solid(24, 16, [200, 100, 0]),
    ];

    let (mut batched, graph) = model(PredictConfig::new());
    let poses = batched.predict_batch(&frames).unwrap();
    assert_eq!(*graph.shapes.borrow(), vec![vec![3, 16, 24, 3]]);

    let (mut single, _) = model(PredictConfig::new());
    assert_eq!(poses.len(), frames.len());
    for (pose, frame) in poses.iter().zip(&frames) {
        let expected = single.predict(frame).unwrap();
        assert!(Arc::ptr_eq(pose.image(), frame));
        for (a, b) in pose.iter().zip(&expected) {
            assert_eq!(a.name, b.name);
            assert_close(a.position, b.position.x, b.position.y);
            assert!((a.confidence - b.confidence).abs() < 1e-6);
        }
    }
}

#[test]
fn test_empty_batch() {
    let (mut model, graph) = model(PredictConfig::new());
    assert!(matches!(
        model.predict_batch(&[]),
        Err(InferenceError::EmptyBatchError)
    ));
    assert!(graph.shapes.borrow().is_empty());
}

#[test]
fn test_strict_batch_rejects_mixed_sizes() {
    let (mut model, _) = model(PredictConfig::new());
    let frames = [solid(16, 16, [0, 0, 0]), solid(24, 16, [0, 0, 0])];
    assert!(matches!(
        model.predict_batch(&frames),
        Err(InferenceError::ShapeMismatchError(_))
    ));
}

#[test]
fn test_lenient_batch_reports_each_frame_in_its_own_pixels() {
    let frames = [solid(24, 16, [0, 0, 0]), solid(48, 48, [0, 0, 0])];

    let (mut regression, graph) = model(PredictConfig::new().with_strict_batch(false));
    let poses = regression.predict_batch(&frames).unwrap();
    assert_eq!(*graph.shapes.borrow(), vec![vec![2, 16, 24, 3]]);
    // Tensor (23, 15) stays put in the first frame and scales by (2, 3) in the second
    assert_close(poses[0][0].position, 23.0, 15.0);
    assert_close(poses[1][0].position, 46.0, 45.0);

    let (mut maps, _) = model(
        PredictConfig::new()
            .with_strict_batch(false)
            .with_output_mode(OutputMode::Maps),
    );
    let poses = maps.predict_batch(&frames).unwrap();
    assert_close(poses[0][0].position, 20.5, 11.5);
    assert_close(poses[1][0].position, 41.0, 34.5);

    let estimations = maps.predict_maps_batch(&frames).unwrap();
    let decoded = decode_maps(&estimations[1], None).unwrap();
    assert_close(decoded[0].position, 41.0, 34.5);
}

#[test]
fn test_engine_failure_leaves_model_usable() {
    let (mut model, graph) = model(PredictConfig::new());
    let frame = solid(16, 16, [0, 0, 0]);
    model.predict(&frame).unwrap();

    graph.fail_next.set(true);
    assert!(matches!(
        model.predict(&frame),
        Err(InferenceError::InferenceError(_))
    ));

    let pose = model.predict(&frame).unwrap();
    assert_close(pose[0].position, 15.0, 15.0);
    assert_eq!(model.session().rebind_count(), 1);
}

#[test]
fn test_maps_decode_with_refinement() {
    let (mut model, _) = model(PredictConfig::new().with_output_mode(OutputMode::Maps));
    let frame = solid(32, 24, [0, 0, 0]);

    let pose = model.predict(&frame).unwrap();
    // Peak at row 1, column 2 with stride 8, plus refinement (0.5, -0.5)
    assert_close(pose[0].position, 20.5, 11.5);
    assert!((pose[0].confidence - 0.8).abs() < 1e-6);
    assert!(!pose[1].is_defined());
    assert!(pose[1].confidence.abs() < f32::EPSILON);

    let estimation = model.predict_maps(&frame, None).unwrap();
    assert_eq!(estimation.score_maps().dim(), (3, 4, JOINTS));
    let decoded = decode_maps(&estimation, None).unwrap();
    assert_eq!(decoded[0], pose[0]);
    assert!(!decoded[1].is_defined());
}

#[test]
fn test_maps_batch_keeps_order() {
    let (mut model, _) = model(PredictConfig::new());
    let frames = [solid(32, 24, [0, 0, 0]), solid(32, 24, [9, 9, 9])];

    let estimations = model.predict_maps_batch(&frames).unwrap();
    assert_eq!(estimations.len(), 2);
    for (estimation, frame) in estimations.iter().zip(&frames) {
        assert!(Arc::ptr_eq(estimation.image(), frame));
    }
}

#[test]
fn test_bounding_box_of_predicted_pose() {
    let (mut model, _) = model(PredictConfig::new());
    let pose = model.predict(&solid(64, 48, [0, 0, 0])).unwrap();

    // Parts at (63, 47) and (64, 47), clipped to the frame
    let rect = bounding_box(&pose, Size::new(5, 5), BoundingBoxMethod::Margin);
    assert_eq!(rect, Rect::new(58, 42, 6, 6));
}

/// Runs a real exported model, e.g.
/// `DLC_MODEL=dlc.onnx DLC_CONFIG=pose_cfg.yaml DLC_IMAGE=frame.png cargo test -- --ignored`.
#[test]
#[ignore = "requires an exported DeepLabCut model"]
fn test_exported_model() {
    let (Ok(model_path), Ok(config_path), Ok(image_path)) = (
        std::env::var("DLC_MODEL"),
        std::env::var("DLC_CONFIG"),
        std::env::var("DLC_IMAGE"),
    ) else {
        return;
    };

    let mut model = PoseModel::load(model_path, config_path, PredictConfig::new()).unwrap();
    let frame = Arc::new(dlc_inference::source::load_frame(image_path.as_ref()).unwrap());
    let pose = model.predict(&frame).unwrap();
    assert_eq!(pose.len(), model.joints().num_joints());
}
