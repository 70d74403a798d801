// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/frame.rs - 帧通道顺序与 NCHW 张量定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::str::FromStr;

use serde::Deserialize;

pub const RGB_CHANNELS: usize = 3;

/// 像素通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

impl FromStr for ChannelOrder {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "rgb" => Ok(ChannelOrder::Rgb),
      "bgr" => Ok(ChannelOrder::Bgr),
      other => Err(format!("未知的通道顺序: {}", other)),
    }
  }
}

/// 模型输入张量，布局固定为 [1, 3, S, S]，数值范围 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct NchwTensor {
  size: usize,
  data: Box<[f32]>,
}

impl NchwTensor {
  pub fn zeros(size: usize) -> Self {
    let data = vec![0f32; RGB_CHANNELS * size * size].into_boxed_slice();
    Self { size, data }
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.size, self.size]
  }

  /// 正方形输入边长 S
  pub fn size(&self) -> usize {
    self.size
  }

  pub fn get(&self, channel: usize, y: usize, x: usize) -> f32 {
    self.data[channel * self.size * self.size + y * self.size + x]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

impl AsMut<[f32]> for NchwTensor {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

/// 推理引擎返回的原始输出张量
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
  shape: Box<[usize]>,
  data: Box<[f32]>,
}

impl OutputTensor {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
    Self {
      shape: shape.into_boxed_slice(),
      data: data.into_boxed_slice(),
    }
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn channel_order_parses_case_insensitively() {
    assert_eq!("BGR".parse::<ChannelOrder>(), Ok(ChannelOrder::Bgr));
    assert_eq!("rgb".parse::<ChannelOrder>(), Ok(ChannelOrder::Rgb));
    assert!("yuv".parse::<ChannelOrder>().is_err());
  }

  #[test]
  fn nchw_index_is_plane_major() {
    let mut tensor = NchwTensor::zeros(2);
    tensor.as_mut()[4 + 3] = 1.0;
    assert_eq!(tensor.shape(), [1, 3, 2, 2]);
    assert_eq!(tensor.get(1, 1, 1), 1.0);
  }
}
