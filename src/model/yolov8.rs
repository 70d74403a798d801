// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 目标检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::{ConfigError, DetectorConfig},
  frame::ChannelOrder,
  model::{
    ClassTable, ClassTableError, DetectResult, Detection, InferenceEngine, Model,
    postprocess::{self, BOX_CHANNELS, PostprocessParams},
    preprocess::preprocess,
  },
  output::draw::{Draw, DrawError},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Yolov8Error {
  #[error("模型加载错误 {path}: {source}")]
  ModelLoad {
    path: PathBuf,
    #[source]
    source: BoxError,
  },
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("输入帧尺寸无效: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("模型输出形状不匹配: 期望 {expected}, 实际 {actual}")]
  OutputShape { expected: String, actual: String },
  #[error("类别表错误: {0}")]
  ClassTable(#[from] ClassTableError),
  #[error("标注配置错误: {0}")]
  Draw(#[from] DrawError),
  #[error("配置无效: {0}")]
  InvalidConfig(String),
  #[error("推理错误: {0}")]
  Inference(#[source] BoxError),
}

impl Yolov8Error {
  /// 配置类错误在构造或首次使用时出现，重试无意义；推理错误只影响当前帧
  pub fn is_configuration(&self) -> bool {
    !matches!(self, Yolov8Error::Inference(_))
  }
}

/// YOLOv8 检测器
///
/// 构造后配置、类别表与模型句柄均不可变，`detect` 不保留任何跨帧状态，
/// 引擎满足 `Sync` 时可在多个线程间共享同一实例。
pub struct Yolov8<E> {
  engine: E,
  classes: ClassTable,
  params: PostprocessParams,
  frame_order: ChannelOrder,
  model_order: ChannelOrder,
  draw: Option<Draw>,
}

impl<E: InferenceEngine> Yolov8<E> {
  /// 完整流水线：预处理 → 推理 → 解码，返回标注后的帧副本和检测列表
  ///
  /// 关闭标注时返回的帧副本与输入一致。
  pub fn detect(&self, frame: &RgbImage) -> Result<(RgbImage, Vec<Detection>), Yolov8Error> {
    let detections = self.detections(frame)?;
    let annotated = match &self.draw {
      Some(draw) => draw.annotate(frame, &detections),
      None => frame.clone(),
    };
    Ok((annotated, detections))
  }

  /// 只返回检测列表，不复制也不绘制帧
  pub fn detections(&self, frame: &RgbImage) -> Result<Vec<Detection>, Yolov8Error> {
    let tensor = preprocess(
      frame,
      self.params.input_size,
      self.frame_order,
      self.model_order,
    )?;

    debug!("执行模型推理");
    let outputs = self
      .engine
      .run(&tensor)
      .map_err(|e| Yolov8Error::Inference(Box::new(e)))?;

    let output = outputs.first().ok_or_else(|| Yolov8Error::OutputShape {
      expected: format!("(1, {}, N)", BOX_CHANNELS + self.classes.len()),
      actual: "无输出".to_string(),
    })?;

    let detections = postprocess::decode(
      output,
      frame.width(),
      frame.height(),
      &self.params,
      &self.classes,
    )?;
    debug!("检测到 {} 个物体", detections.len());
    Ok(detections)
  }

  pub fn classes(&self) -> &ClassTable {
    &self.classes
  }

  pub fn params(&self) -> &PostprocessParams {
    &self.params
  }
}

impl<E: InferenceEngine> Model for Yolov8<E> {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = Yolov8Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (annotated, detections) = self.detect(input)?;
    Ok(DetectResult {
      annotated,
      items: detections.into_boxed_slice(),
    })
  }
}

pub struct Yolov8Builder {
  config: DetectorConfig,
  classes: Option<ClassTable>,
}

impl FromUrlWithScheme for Yolov8Builder {
  const SCHEME: &'static str = DetectorConfig::SCHEME;
}

impl FromUrl for Yolov8Builder {
  type Error = Yolov8Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Ok(Yolov8Builder::new(DetectorConfig::from_url(url)?))
  }
}

impl Yolov8Builder {
  pub fn new(config: DetectorConfig) -> Self {
    Self {
      config,
      classes: None,
    }
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn conf_threshold(mut self, threshold: f32) -> Self {
    self.config.conf_threshold = threshold;
    self
  }

  pub fn nms_iou_threshold(mut self, threshold: f32) -> Self {
    self.config.nms_iou_threshold = threshold;
    self
  }

  pub fn annotate(mut self, annotate: bool) -> Self {
    self.config.annotate = annotate;
    self
  }

  /// 直接指定类别表，优先于配置中的标签文件
  pub fn classes(mut self, classes: ClassTable) -> Self {
    self.classes = Some(classes);
    self
  }

  /// 从磁盘加载 ONNX 模型并构造检测器
  #[cfg(feature = "backend-tract")]
  pub fn build(self) -> Result<Yolov8<super::TractEngine>, Yolov8Error> {
    self.config.validate()?;
    info!("加载模型文件: {}", self.config.model_path.display());
    let engine = super::TractEngine::load(&self.config.model_path, self.config.input_size)
      .map_err(|e| Yolov8Error::ModelLoad {
        path: self.config.model_path.clone(),
        source: Box::new(e),
      })?;
    info!("模型加载完成");
    self.build_with_engine(engine)
  }

  /// 使用给定的推理引擎构造检测器
  pub fn build_with_engine<E: InferenceEngine>(self, engine: E) -> Result<Yolov8<E>, Yolov8Error> {
    let config = self.config;
    config.validate()?;

    let classes = match (self.classes, &config.labels) {
      (Some(classes), _) => classes,
      (None, Some(path)) => {
        info!("加载类别表: {}", path.display());
        ClassTable::from_toml_file(path)?
      }
      (None, None) => ClassTable::coco(),
    };
    debug!("类别数量: {}", classes.len());

    let features = BOX_CHANNELS + classes.len();
    if let Some(shape) = engine.output_shape() {
      debug!("模型输出形状: {:?}", shape);
      let matches = shape.len() == 3 && shape[0] == 1 && shape[1] == features;
      if !matches {
        error!(
          "模型输出形状 {:?} 与类别表不匹配，期望 (1, {}, N)",
          shape, features
        );
        return Err(Yolov8Error::OutputShape {
          expected: format!("(1, {}, N)", features),
          actual: format!("{:?}", shape),
        });
      }
    }

    let draw = if config.annotate {
      let draw = Draw::default()
        .with_color(config.box_color)
        .with_thickness(config.box_thickness);
      Some(match &config.font {
        Some(path) => draw.with_font_file(path)?,
        None => draw,
      })
    } else {
      None
    };

    Ok(Yolov8 {
      engine,
      classes,
      params: config.postprocess_params(),
      frame_order: config.frame_order,
      model_order: config.model_order,
      draw,
    })
  }
}
