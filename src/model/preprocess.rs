// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/model/preprocess.rs - 图像预处理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::borrow::Cow;

use image::{
  RgbImage,
  imageops::{self, FilterType},
};
use tracing::error;

use crate::frame::{ChannelOrder, NchwTensor};

use super::Yolov8Error;

/// 将任意尺寸的帧转换为 [1, 3, S, S] 的模型输入
///
/// 依次执行：双线性缩放到 S×S（不做 letterbox）、按需交换 R/B 通道、
/// 归一化到 [0, 1]、HWC 转 CHW，并带上大小为 1 的批维度。
pub fn preprocess(
  frame: &RgbImage,
  size: u32,
  frame_order: ChannelOrder,
  model_order: ChannelOrder,
) -> Result<NchwTensor, Yolov8Error> {
  let (width, height) = frame.dimensions();
  if width == 0 || height == 0 {
    error!("输入帧尺寸无效: {}x{}", width, height);
    return Err(Yolov8Error::EmptyFrame { width, height });
  }
  if size == 0 {
    return Err(Yolov8Error::InvalidConfig("模型输入尺寸不能为 0".to_string()));
  }

  // 尺寸已匹配时跳过缩放
  let resized = if (width, height) == (size, size) {
    Cow::Borrowed(frame)
  } else {
    Cow::Owned(imageops::resize(frame, size, size, FilterType::Triangle))
  };

  let swap = frame_order != model_order;
  let side = size as usize;
  let plane = side * side;
  let mut tensor = NchwTensor::zeros(side);
  let data = tensor.as_mut();

  for (x, y, pixel) in resized.enumerate_pixels() {
    let idx = y as usize * side + x as usize;
    let [c0, c1, c2] = pixel.0;
    let (c0, c2) = if swap { (c2, c0) } else { (c0, c2) };
    data[idx] = c0 as f32 / 255.0;
    data[plane + idx] = c1 as f32 / 255.0;
    data[2 * plane + idx] = c2 as f32 / 255.0;
  }

  Ok(tensor)
}
