// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/model/postprocess.rs - 输出解码与非极大值抑制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::{debug, error};

use crate::frame::OutputTensor;

use super::{BoundingBox, ClassTable, Detection, Yolov8Error};

/// 边界框坐标之外的通道数 (cx, cy, w, h)
pub const BOX_CHANNELS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostprocessParams {
  /// 置信度阈值，严格大于才保留
  pub conf_threshold: f32,
  /// NMS IoU 阈值，严格大于才抑制
  pub nms_iou_threshold: f32,
  /// 模型输入边长 S
  pub input_size: u32,
  /// NMS 后最多保留的数量，0 表示不限制
  pub top_k: usize,
}

impl Default for PostprocessParams {
  fn default() -> Self {
    Self {
      conf_threshold: 0.5,
      nms_iou_threshold: 0.4,
      input_size: 640,
      top_k: 0,
    }
  }
}

/// 通过置信度过滤的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub class_id: usize,
  pub confidence: f32,
  pub bbox: BoundingBox,
}

/// 将模型输出解码为原图坐标下、经过 NMS 的检测列表
pub fn decode(
  output: &OutputTensor,
  frame_width: u32,
  frame_height: u32,
  params: &PostprocessParams,
  classes: &ClassTable,
) -> Result<Vec<Detection>, Yolov8Error> {
  let features = BOX_CHANNELS + classes.len();
  let rows = transpose_rows(output, classes.len())?;

  let candidates: Vec<Candidate> = rows
    .chunks_exact(features)
    .filter_map(|row| decode_row(row, frame_width, frame_height, params))
    .collect();
  debug!("置信度过滤后剩余 {} 个候选框", candidates.len());

  let mut keep = non_max_suppression(&candidates, params.nms_iou_threshold);
  if params.top_k > 0 {
    keep.truncate(params.top_k);
  }

  keep
    .into_iter()
    .map(|idx| -> Result<Detection, Yolov8Error> {
      let Candidate {
        class_id,
        confidence,
        bbox,
      } = candidates[idx];
      let label = classes
        .get(class_id)
        .ok_or_else(|| Yolov8Error::InvalidConfig(format!("类别索引越界: {}", class_id)))?;
      Ok(Detection {
        class_id,
        label: label.to_string(),
        confidence,
        bbox,
      })
    })
    .collect()
}

/// 将 (1, 4+C, N) 的输出转置为 N 行、每行 4+C 个值
pub fn transpose_rows(output: &OutputTensor, num_classes: usize) -> Result<Vec<f32>, Yolov8Error> {
  let features = BOX_CHANNELS + num_classes;
  let shape = output.shape();

  let candidates = match shape {
    [1, rows, n] if *rows == features => *n,
    _ => {
      error!("模型输出形状不匹配: 期望 (1, {}, N), 实际 {:?}", features, shape);
      return Err(Yolov8Error::OutputShape {
        expected: format!("(1, {}, N)", features),
        actual: format!("{:?}", shape),
      });
    }
  };

  let data = output.as_slice();
  if data.len() != features * candidates {
    error!(
      "模型输出数据长度不匹配: 期望 {}, 实际 {}",
      features * candidates,
      data.len()
    );
    return Err(Yolov8Error::OutputShape {
      expected: format!("{} 个元素", features * candidates),
      actual: format!("{} 个元素", data.len()),
    });
  }

  let mut rows = vec![0f32; data.len()];
  for f in 0..features {
    for i in 0..candidates {
      rows[i * features + f] = data[f * candidates + i];
    }
  }
  Ok(rows)
}

/// 取最大分数的类别，并列时取索引最小者
///
/// NaN 视为最大值并返回第一个 NaN，随后的阈值比较会丢弃该行。
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
  let (first, rest) = scores.split_first()?;
  let mut best = (0, *first);
  if best.1.is_nan() {
    return Some(best);
  }
  for (idx, &score) in rest.iter().enumerate() {
    if score.is_nan() {
      return Some((idx + 1, score));
    }
    if score > best.1 {
      best = (idx + 1, score);
    }
  }
  Some(best)
}

/// 解码一行 [cx, cy, w, h, score_1 .. score_C]，未通过阈值时返回 None
pub fn decode_row(
  row: &[f32],
  frame_width: u32,
  frame_height: u32,
  params: &PostprocessParams,
) -> Option<Candidate> {
  let (class_id, confidence) = argmax(row.get(BOX_CHANNELS..)?)?;
  if !(confidence > params.conf_threshold) {
    return None;
  }

  let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
  let size = params.input_size as f32;
  let (fw, fh) = (frame_width as f32, frame_height as f32);

  // 先乘原图尺寸再除以输入尺寸，按轴独立缩放后向零截断
  let x1 = ((cx - w / 2.0) * fw / size) as i32;
  let y1 = ((cy - h / 2.0) * fh / size) as i32;
  let x2 = ((cx + w / 2.0) * fw / size) as i32;
  let y2 = ((cy + h / 2.0) * fh / size) as i32;

  Some(Candidate {
    class_id,
    confidence,
    bbox: BoundingBox::from_corners(x1, y1, x2, y2),
  })
}

/// 贪心 NMS，不区分类别，返回按选中顺序排列的候选索引
///
/// 置信度相同的候选保持原有先后顺序。
pub fn non_max_suppression(candidates: &[Candidate], iou_threshold: f32) -> Vec<usize> {
  let mut order: Vec<usize> = (0..candidates.len()).collect();
  order.sort_by(|&a, &b| {
    candidates[b]
      .confidence
      .total_cmp(&candidates[a].confidence)
  });

  let mut keep: Vec<usize> = Vec::new();
  for idx in order {
    let bbox = &candidates[idx].bbox;
    if keep
      .iter()
      .all(|&kept| candidates[kept].bbox.iou(bbox) <= iou_threshold)
    {
      keep.push(idx);
    }
  }
  keep
}
