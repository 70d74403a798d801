// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::model::Detection;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_OFFSET: i32 = 10;
const BOX_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const BOX_THICKNESS: u32 = 2;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("无法读取字体文件 {path}: {source}")]
  IoError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("字体文件无效: {0}")]
  InvalidFont(PathBuf),
}

/// 标签文本，例如 `person 0.90`
pub fn label_text(detection: &Detection) -> String {
  format!("{} {:.2}", detection.label, detection.confidence)
}

/// 检测结果绘制器，不持有任何逐帧状态
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_scale: PxScale,
  color: Rgb<u8>,
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      color: Rgb(BOX_COLOR),
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_file(self, path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path).map_err(|source| DrawError::IoError {
      path: path.to_path_buf(),
      source,
    })?;
    let font = FontArc::try_from_vec(data).map_err(|_| DrawError::InvalidFont(path.to_path_buf()))?;
    debug!("加载标签字体: {}", path.display());
    Ok(self.with_font(font))
  }

  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = Rgb(color);
    self
  }

  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  /// 在帧副本上绘制检测结果，原帧不变
  pub fn annotate(&self, frame: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut image = frame.clone();
    self.draw_detections(&mut image, detections);
    image
  }

  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      self.draw_detection(image, detection);
    }
  }

  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let bbox = &detection.bbox;

    // 坐标限制在画布外扩一个边框宽度的范围内
    let margin = self.thickness as i64;
    let (width, height) = image.dimensions();
    let clip = |v: i64, limit: u32| v.clamp(-margin, limit as i64 + margin);
    let x1 = clip(bbox.x as i64, width);
    let y1 = clip(bbox.y as i64, height);
    let x2 = clip(bbox.x as i64 + bbox.width as i64, width);
    let y2 = clip(bbox.y as i64 + bbox.height as i64, height);

    // 由外向内逐层绘制边框，越界部分由 imageproc 裁剪
    for layer in 0..margin {
      let w = x2 - x1 - 2 * layer;
      let h = y2 - y1 - 2 * layer;
      if w <= 0 || h <= 0 {
        break;
      }
      let rect = Rect::at((x1 + layer) as i32, (y1 + layer) as i32).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, rect, self.color);
    }

    if let Some(font) = &self.font {
      let text_y = (y1 - LABEL_OFFSET as i64 - self.font_scale.y as i64).max(0);
      let text_x = x1.max(0);
      draw_text_mut(
        image,
        self.color,
        text_x as i32,
        text_y as i32,
        self.font_scale,
        font,
        &label_text(detection),
      );
    }
  }
}
