// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use qianliyan::{
  FromUrl,
  config::DetectorConfig,
  input::InputWrapper,
  logging,
  model::Yolov8Builder,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};

fn load_config(args: &args::Args) -> Result<DetectorConfig> {
  let mut config = match &args.config {
    Some(path) => {
      info!("读取配置文件: {}", path.display());
      DetectorConfig::from_toml_file(path)?
    }
    None => DetectorConfig::default(),
  };
  if let Some(model) = &args.model {
    config.apply_url(model)?;
  }
  if let Some(confidence) = args.confidence {
    config.conf_threshold = confidence;
  }
  if let Some(nms_threshold) = args.nms_threshold {
    config.nms_iou_threshold = nms_threshold;
  }
  if let Some(font) = &args.font {
    config.font = Some(font.clone());
  }
  config.validate()?;
  Ok(config)
}

fn main() -> Result<()> {
  let args = args::Args::parse();
  logging::init(args.log_file.as_deref())?;

  let config = load_config(&args)?;
  info!("Qianliyan 目标检测");
  info!("模型文件路径: {}", config.model_path.display());
  info!("输入来源: {}", args.input);
  info!("输出: {}", args.output);
  info!("置信度阈值: {}", config.conf_threshold);
  info!("NMS 阈值: {}", config.nms_iou_threshold);

  let model = Yolov8Builder::new(config).build()?;
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_frame_number(args.max_frames)
    .run_task(input, model, output)?;

  Ok(())
}
