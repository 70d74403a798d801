// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/output/log_output.rs - 日志输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::DetectResult,
  output::{OutputError, Render},
};

/// 无显示环境下使用：只把检测结果写入日志
#[derive(Debug, Default)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(LogOutput)
  }
}

impl Render<RgbImage, DetectResult> for LogOutput {
  type Error = OutputError;

  fn render_result(&self, frame: &RgbImage, result: &DetectResult) -> Result<(), Self::Error> {
    if result.is_empty() {
      return Ok(());
    }

    info!(
      "{}x{} 帧中检测到 {} 个对象",
      frame.width(),
      frame.height(),
      result.items.len()
    );
    for det in result.items.iter() {
      info!(
        "  - {}: {:.2}% at ({}, {}, {}x{})",
        det.label,
        det.confidence * 100.0,
        det.bbox.x,
        det.bbox.y,
        det.bbox.width,
        det.bbox.height
      );
    }
    Ok(())
  }
}
