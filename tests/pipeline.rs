// 该文件是 Qianliyan （千里眼） 项目的一部分。
// tests/pipeline.rs - 检测流水线集成测试
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::convert::Infallible;

use image::{Rgb, RgbImage};
use thiserror::Error;

use qianliyan::{
  config::DetectorConfig,
  frame::{NchwTensor, OutputTensor},
  model::{
    BoundingBox, ClassTable, InferenceEngine, Model, SerializedEngine, Yolov8, Yolov8Builder,
    Yolov8Error,
  },
  output::SaveImageFileOutput,
  task::{OneShotTask, Task},
};

/// 固定返回预设候选框的推理引擎，候选框坐标位于模型输入空间
struct ScriptedEngine {
  features: usize,
  rows: Vec<Vec<f32>>,
  report_shape: bool,
}

impl ScriptedEngine {
  fn new(num_classes: usize) -> Self {
    Self {
      features: 4 + num_classes,
      rows: Vec::new(),
      report_shape: true,
    }
  }

  fn coco() -> Self {
    Self::new(80)
  }

  fn with_features(mut self, features: usize) -> Self {
    self.features = features;
    self
  }

  fn without_static_shape(mut self) -> Self {
    self.report_shape = false;
    self
  }

  fn candidate(mut self, cx: f32, cy: f32, w: f32, h: f32, scores: &[(usize, f32)]) -> Self {
    let mut row = vec![0.0; self.features];
    row[..4].copy_from_slice(&[cx, cy, w, h]);
    for &(class_id, score) in scores {
      row[4 + class_id] = score;
    }
    self.rows.push(row);
    self
  }
}

impl InferenceEngine for ScriptedEngine {
  type Error = Infallible;

  fn run(&self, _input: &NchwTensor) -> Result<Vec<OutputTensor>, Self::Error> {
    let n = self.rows.len();
    let mut data = vec![0.0; self.features * n];
    for (i, row) in self.rows.iter().enumerate() {
      for (f, value) in row.iter().enumerate() {
        data[f * n + i] = *value;
      }
    }
    Ok(vec![OutputTensor::new(vec![1, self.features, n], data)])
  }

  fn output_shape(&self) -> Option<Vec<usize>> {
    self
      .report_shape
      .then(|| vec![1, self.features, self.rows.len()])
  }
}

#[derive(Error, Debug)]
#[error("设备忙")]
struct DeviceBusy;

struct FailingEngine;

impl InferenceEngine for FailingEngine {
  type Error = DeviceBusy;

  fn run(&self, _input: &NchwTensor) -> Result<Vec<OutputTensor>, Self::Error> {
    Err(DeviceBusy)
  }
}

fn detector<E: InferenceEngine>(engine: E) -> Yolov8<E> {
  Yolov8Builder::new(DetectorConfig::default())
    .annotate(false)
    .build_with_engine(engine)
    .unwrap()
}

fn frame(width: u32, height: u32) -> RgbImage {
  RgbImage::new(width, height)
}

#[test]
fn single_person_end_to_end() {
  let model = detector(ScriptedEngine::coco().candidate(320.0, 320.0, 100.0, 100.0, &[(0, 0.9)]));

  let (_, detections) = model.detect(&frame(640, 640)).unwrap();
  assert_eq!(detections.len(), 1);
  let person = &detections[0];
  assert_eq!(person.class_id, 0);
  assert_eq!(person.label, "person");
  assert!((person.confidence - 0.9).abs() < 1e-6);
  assert_eq!(person.bbox, BoundingBox::from_corners(270, 270, 370, 370));
}

#[test]
fn overlapping_pair_keeps_the_stronger_box() {
  let model = detector(
    ScriptedEngine::coco()
      .candidate(337.0, 320.0, 100.0, 100.0, &[(0, 0.6)])
      .candidate(320.0, 320.0, 100.0, 100.0, &[(0, 0.9)]),
  );

  let detections = model.detections(&frame(640, 640)).unwrap();
  assert_eq!(detections.len(), 1);
  assert!((detections[0].confidence - 0.9).abs() < 1e-6);
  assert_eq!(detections[0].bbox.x, 270);
}

#[test]
fn confidence_above_one_yields_nothing() {
  let model = Yolov8Builder::new(DetectorConfig::default())
    .conf_threshold(1.01)
    .annotate(false)
    .build_with_engine(ScriptedEngine::coco().candidate(320.0, 320.0, 100.0, 100.0, &[(0, 1.0)]))
    .unwrap();

  assert_eq!(model.params().conf_threshold, 1.01);
  assert!(model.detections(&frame(640, 640)).unwrap().is_empty());
}

#[test]
fn nms_threshold_one_suppresses_nothing() {
  let model = Yolov8Builder::new(DetectorConfig::default())
    .nms_iou_threshold(1.0)
    .annotate(false)
    .build_with_engine(
      ScriptedEngine::coco()
        .candidate(320.0, 320.0, 100.0, 100.0, &[(0, 0.9)])
        .candidate(322.0, 320.0, 100.0, 100.0, &[(0, 0.8)])
        .candidate(320.0, 320.0, 100.0, 100.0, &[(2, 0.7)]),
    )
    .unwrap();

  assert_eq!(model.detections(&frame(640, 640)).unwrap().len(), 3);
}

#[test]
fn nms_threshold_zero_keeps_one_per_cluster() {
  let model = Yolov8Builder::new(DetectorConfig::default())
    .nms_iou_threshold(0.0)
    .annotate(false)
    .build_with_engine(
      ScriptedEngine::coco()
        .candidate(100.0, 100.0, 50.0, 50.0, &[(0, 0.7)])
        .candidate(110.0, 100.0, 50.0, 50.0, &[(1, 0.8)])
        .candidate(500.0, 500.0, 50.0, 50.0, &[(0, 0.6)]),
    )
    .unwrap();

  let detections = model.detections(&frame(640, 640)).unwrap();
  let confidences: Vec<f32> = detections.iter().map(|d| d.confidence).collect();
  assert_eq!(confidences, vec![0.8, 0.6]);
}

#[test]
fn detection_is_idempotent() {
  let model = detector(
    ScriptedEngine::coco()
      .candidate(320.0, 320.0, 100.0, 100.0, &[(0, 0.9)])
      .candidate(100.0, 80.0, 40.0, 60.0, &[(16, 0.75)]),
  );
  let image = frame(800, 600);

  let first = model.detections(&image).unwrap();
  let second = model.detections(&image).unwrap();
  assert_eq!(first, second);
}

#[test]
fn boxes_rescale_to_non_square_frames() {
  let model = detector(ScriptedEngine::coco().candidate(320.0, 320.0, 64.0, 64.0, &[(3, 0.9)]));

  let detections = model.detections(&frame(1280, 480)).unwrap();
  assert_eq!(detections.len(), 1);
  assert_eq!(
    detections[0].bbox,
    BoundingBox {
      x: 576,
      y: 216,
      width: 128,
      height: 48,
    }
  );
  assert_eq!(detections[0].label, "motorcycle");
}

#[test]
fn tied_scores_pick_the_lowest_class() {
  let model = detector(ScriptedEngine::coco().candidate(
    320.0,
    320.0,
    100.0,
    100.0,
    &[(5, 0.8), (2, 0.8)],
  ));

  let detections = model.detections(&frame(640, 640)).unwrap();
  assert_eq!(detections[0].class_id, 2);
  assert_eq!(detections[0].label, "car");
}

#[test]
fn shape_mismatch_is_rejected_at_construction() {
  let engine = ScriptedEngine::coco().with_features(85);
  let error = Yolov8Builder::new(DetectorConfig::default())
    .build_with_engine(engine)
    .err()
    .unwrap();

  assert!(matches!(error, Yolov8Error::OutputShape { .. }));
  assert!(error.is_configuration());
}

#[test]
fn shape_mismatch_is_reported_on_first_use() {
  let engine = ScriptedEngine::coco()
    .with_features(85)
    .without_static_shape()
    .candidate(320.0, 320.0, 100.0, 100.0, &[(0, 0.9)]);
  let model = detector(engine);

  let error = model.detect(&frame(640, 640)).unwrap_err();
  assert!(matches!(error, Yolov8Error::OutputShape { .. }));
  assert!(error.is_configuration());
}

#[test]
fn inference_failure_is_not_a_configuration_error() {
  let model = detector(FailingEngine);

  let error = model.detect(&frame(640, 640)).unwrap_err();
  assert!(matches!(error, Yolov8Error::Inference(_)));
  assert!(!error.is_configuration());
}

#[test]
fn huge_boxes_are_decoded_and_drawn() {
  let model = Yolov8Builder::new(DetectorConfig::default())
    .build_with_engine(
      ScriptedEngine::coco()
        .candidate(0.0, 0.0, 1e12, 1e12, &[(0, 0.9)])
        .candidate(600.0, 600.0, f32::INFINITY, f32::INFINITY, &[(1, 0.8)]),
    )
    .unwrap();

  let (annotated, detections) = model.detect(&frame(64, 64)).unwrap();
  assert_eq!(annotated.dimensions(), (64, 64));
  assert!(!detections.is_empty());
  assert_eq!(detections[0].bbox.width, i32::MAX);
}

#[test]
fn empty_frame_is_rejected() {
  let model = detector(ScriptedEngine::coco());

  let error = model.detect(&frame(0, 0)).unwrap_err();
  assert!(matches!(error, Yolov8Error::EmptyFrame { .. }));
}

#[test]
fn annotation_draws_on_a_copy() {
  let engine = || ScriptedEngine::coco().candidate(320.0, 320.0, 100.0, 100.0, &[(0, 0.9)]);
  let image = frame(640, 640);

  let annotating = Yolov8Builder::new(DetectorConfig::default())
    .build_with_engine(engine())
    .unwrap();
  let (annotated, detections) = annotating.detect(&image).unwrap();
  assert_eq!(detections.len(), 1);
  assert_eq!(*annotated.get_pixel(270, 300), Rgb([0, 255, 0]));
  assert_eq!(*annotated.get_pixel(320, 320), Rgb([0, 0, 0]));
  assert_eq!(*image.get_pixel(270, 300), Rgb([0, 0, 0]));

  let plain = detector(engine());
  let (copy, _) = plain.detect(&image).unwrap();
  assert_eq!(copy, image);
}

#[test]
fn model_trait_wraps_detections() {
  let model = detector(ScriptedEngine::coco().candidate(320.0, 320.0, 100.0, 100.0, &[(0, 0.9)]));

  let result = model.infer(&frame(640, 640)).unwrap();
  assert!(!result.is_empty());
  assert_eq!(result.items.len(), 1);
  assert_eq!(result.annotated.dimensions(), (640, 640));
}

#[test]
fn shared_detector_across_threads() {
  let engine = ScriptedEngine::coco()
    .candidate(320.0, 320.0, 100.0, 100.0, &[(0, 0.9)])
    .candidate(100.0, 100.0, 50.0, 50.0, &[(2, 0.7)]);
  let model = detector(SerializedEngine::new(engine));
  let expected = model.detections(&frame(640, 480)).unwrap();

  std::thread::scope(|scope| {
    let handles: Vec<_> = (0..4)
      .map(|_| scope.spawn(|| model.detections(&frame(640, 480)).unwrap()))
      .collect();
    for handle in handles {
      assert_eq!(handle.join().unwrap(), expected);
    }
  });
}

#[test]
fn custom_class_table_from_toml() {
  let classes = ClassTable::from_toml_str(r#"labels = ["cat", "dog"]"#).unwrap();
  let model = Yolov8Builder::new(DetectorConfig::default())
    .classes(classes)
    .annotate(false)
    .build_with_engine(ScriptedEngine::new(2).candidate(200.0, 200.0, 40.0, 40.0, &[(1, 0.95)]))
    .unwrap();

  let detections = model.detections(&frame(640, 640)).unwrap();
  assert_eq!(detections.len(), 1);
  assert_eq!(detections[0].label, "dog");
  assert_eq!(model.classes().len(), 2);
}

#[test]
fn class_table_file_from_config() {
  let dir = tempfile::tempdir().unwrap();
  let labels = dir.path().join("labels.toml");
  std::fs::write(&labels, "labels = [\"helmet\", \"head\", \"person\"]\n").unwrap();

  let config = DetectorConfig {
    labels: Some(labels),
    annotate: false,
    ..DetectorConfig::default()
  };
  let model = Yolov8Builder::new(config)
    .build_with_engine(ScriptedEngine::new(3).candidate(64.0, 64.0, 32.0, 32.0, &[(2, 0.8)]))
    .unwrap();

  let detections = model.detections(&frame(640, 640)).unwrap();
  assert_eq!(detections[0].label, "person");
}

#[test]
fn one_shot_task_saves_annotated_frame() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("out").join("result.png");
  let model = Yolov8Builder::new(DetectorConfig::default())
    .build_with_engine(ScriptedEngine::coco().candidate(320.0, 320.0, 100.0, 100.0, &[(0, 0.9)]))
    .unwrap();

  OneShotTask
    .run_task(
      vec![frame(640, 640)].into_iter(),
      model,
      SaveImageFileOutput::new(&path),
    )
    .unwrap();

  let saved = image::open(&path).unwrap().to_rgb8();
  assert_eq!(*saved.get_pixel(270, 300), Rgb([0, 255, 0]));
}
