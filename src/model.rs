// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use serde::Serialize;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 原图像素坐标下的边界框，(x, y) 为左上角
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl BoundingBox {
  /// 角点来自饱和转换，宽高同样饱和计算
  pub fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
    Self {
      x: x1,
      y: y1,
      width: x2.saturating_sub(x1),
      height: y2.saturating_sub(y1),
    }
  }

  pub fn right(&self) -> i32 {
    self.x.saturating_add(self.width)
  }

  pub fn bottom(&self) -> i32 {
    self.y.saturating_add(self.height)
  }

  pub fn area(&self) -> i64 {
    self.width.max(0) as i64 * self.height.max(0) as i64
  }

  /// i64 下的角点，负宽高按 0 处理
  fn corners(&self) -> (i64, i64, i64, i64) {
    let (x, y) = (self.x as i64, self.y as i64);
    (
      x,
      y,
      x + self.width.max(0) as i64,
      y + self.height.max(0) as i64,
    )
  }

  /// 交并比
  ///
  /// 两个框面积均为 0 时视为完全重叠，与 OpenCV `NMSBoxes` 一致。
  pub fn iou(&self, other: &BoundingBox) -> f32 {
    let (a_area, b_area) = (self.area(), other.area());
    if a_area == 0 && b_area == 0 {
      return 1.0;
    }

    let (ax1, ay1, ax2, ay2) = self.corners();
    let (bx1, by1, bx2, by2) = other.corners();
    let iw = (ax2.min(bx2) - ax1.max(bx1)).max(0);
    let ih = (ay2.min(by2) - ay1.max(by1)).max(0);
    let intersection = (iw as i128 * ih as i128) as f64;
    let union = a_area as f64 + b_area as f64 - intersection;
    if union <= 0.0 {
      0.0
    } else {
      (intersection / union) as f32
    }
  }
}

/// 检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  /// 类别索引
  pub class_id: usize,
  /// 类别名称
  pub label: String,
  /// 置信度
  pub confidence: f32,
  /// 边界框
  pub bbox: BoundingBox,
}

/// 单帧推理结果：标注后的帧副本与检测列表
#[derive(Debug, Clone)]
pub struct DetectResult {
  pub annotated: RgbImage,
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

mod engine;
mod labels;
pub mod postprocess;
pub mod preprocess;
#[cfg(feature = "backend-tract")]
mod tract_engine;
mod yolov8;

pub use self::engine::{InferenceEngine, SerializedEngine, SerializedEngineError};
pub use self::labels::{COCO_CLASSES, ClassTable, ClassTableError};
#[cfg(feature = "backend-tract")]
pub use self::tract_engine::{TractEngine, TractEngineError};
pub use self::yolov8::{Yolov8, Yolov8Builder, Yolov8Error};
