// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/config.rs - 检测器配置
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

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::ChannelOrder,
  model::postprocess::PostprocessParams,
  url_path,
};

const DEFAULT_MODEL_PATH: &str = "models/yolov8n.onnx";
const DEFAULT_CONF_THRESHOLD: f32 = 0.5;
const DEFAULT_NMS_IOU_THRESHOLD: f32 = 0.4;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_BOX_COLOR: [u8; 3] = [0, 255, 0];
const DEFAULT_BOX_THICKNESS: u32 = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("无法读取配置文件 {path}: {source}")]
  IoError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("配置文件格式错误: {0}")]
  TomlError(#[from] toml::de::Error),
  #[error("模型 URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: String, found: String },
  #[error("参数 {key} 的值无效: {value}")]
  InvalidValue { key: String, value: String },
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 检测器构造配置，构造完成后不再改变
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  /// ONNX 模型文件路径
  pub model_path: PathBuf,
  pub conf_threshold: f32,
  pub nms_iou_threshold: f32,
  /// 模型的正方形输入边长
  pub input_size: u32,
  /// 自定义类别表（TOML），缺省为 COCO 80 类
  pub labels: Option<PathBuf>,
  /// 输入帧的通道顺序
  pub frame_order: ChannelOrder,
  /// 模型期望的通道顺序
  pub model_order: ChannelOrder,
  /// NMS 后最多保留的数量，0 表示不限制
  pub top_k: usize,
  /// 是否在返回的帧副本上绘制检测结果
  pub annotate: bool,
  /// 标签字体（TTF），缺省时只画框不写字
  pub font: Option<PathBuf>,
  pub box_color: [u8; 3],
  pub box_thickness: u32,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      model_path: PathBuf::from(DEFAULT_MODEL_PATH),
      conf_threshold: DEFAULT_CONF_THRESHOLD,
      nms_iou_threshold: DEFAULT_NMS_IOU_THRESHOLD,
      input_size: DEFAULT_INPUT_SIZE,
      labels: None,
      frame_order: ChannelOrder::Rgb,
      model_order: ChannelOrder::Bgr,
      top_k: 0,
      annotate: true,
      font: None,
      box_color: DEFAULT_BOX_COLOR,
      box_thickness: DEFAULT_BOX_THICKNESS,
    }
  }
}

impl FromUrlWithScheme for DetectorConfig {
  const SCHEME: &'static str = "yolov8";
}

impl FromUrl for DetectorConfig {
  type Error = ConfigError;

  /// `yolov8:///models/yolov8n.onnx?conf=0.5&iou=0.4&size=640`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let mut config = DetectorConfig::default();
    config.apply_url(url)?;
    Ok(config)
  }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
  value.parse().map_err(|_| ConfigError::InvalidValue {
    key: key.to_string(),
    value: value.to_string(),
  })
}

impl DetectorConfig {
  pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
    let config: DetectorConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml_str(&content)
  }

  /// 用模型 URL 的路径和查询参数覆盖当前配置
  pub fn apply_url(&mut self, url: &Url) -> Result<(), ConfigError> {
    if url.scheme() != Self::SCHEME {
      return Err(ConfigError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        found: url.scheme().to_string(),
      });
    }

    let path = url_path(url);
    if !path.as_os_str().is_empty() {
      self.model_path = path;
    }

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "conf" => self.conf_threshold = parse_value(&key, &value)?,
        "iou" => self.nms_iou_threshold = parse_value(&key, &value)?,
        "size" => self.input_size = parse_value(&key, &value)?,
        "top_k" => self.top_k = parse_value(&key, &value)?,
        "annotate" => self.annotate = parse_value(&key, &value)?,
        "labels" => self.labels = Some(PathBuf::from(value.as_ref())),
        "font" => self.font = Some(PathBuf::from(value.as_ref())),
        "frame_order" => self.frame_order = parse_value(&key, &value)?,
        "model_order" => self.model_order = parse_value(&key, &value)?,
        other => warn!("忽略未知的模型参数: {}={}", other, value),
      }
    }

    self.validate()
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !self.conf_threshold.is_finite() || self.conf_threshold < 0.0 {
      return Err(ConfigError::Invalid(format!(
        "置信度阈值必须为非负有限值: {}",
        self.conf_threshold
      )));
    }
    if !self.nms_iou_threshold.is_finite() || self.nms_iou_threshold < 0.0 {
      return Err(ConfigError::Invalid(format!(
        "NMS 阈值必须为非负有限值: {}",
        self.nms_iou_threshold
      )));
    }
    if self.input_size == 0 {
      return Err(ConfigError::Invalid("模型输入尺寸不能为 0".to_string()));
    }
    Ok(())
  }

  pub fn postprocess_params(&self) -> PostprocessParams {
    PostprocessParams {
      conf_threshold: self.conf_threshold,
      nms_iou_threshold: self.nms_iou_threshold,
      input_size: self.input_size,
      top_k: self.top_k,
    }
  }
}
