// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

/// Qianliyan 目标检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型 URI，例如 yolov8:///models/yolov8n.onnx?conf=0.5&iou=0.4
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,

  /// 输入来源
  /// 支持格式:
  /// - 单张图片: image:///path/to/frame.jpg
  /// - 图片目录: folder:///path/to/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出
  /// 支持格式:
  /// - 标注图片: image:///path/to/result.jpg
  /// - 事件目录: folder:///path/to/events?cooldown=5
  /// - 仅日志: log:
  #[arg(long, value_name = "OUTPUT", default_value = "log:")]
  pub output: Url,

  /// TOML 配置文件，模型 URI 与命令行参数会覆盖其中的值
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 置信度阈值
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// NMS IoU 阈值
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,

  /// 标签字体（TTF）
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 最大处理帧数，不指定时处理全部输入
  #[arg(long, value_name = "COUNT")]
  pub max_frames: Option<usize>,

  /// 日志文件，日志同时写入标准错误输出
  #[arg(long, value_name = "FILE")]
  pub log_file: Option<PathBuf>,
}
