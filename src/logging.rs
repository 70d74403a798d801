// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/logging.rs - 日志初始化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{fs::OpenOptions, path::Path, sync::Mutex};

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, util::TryInitError};

#[derive(Error, Debug)]
pub enum LoggingError {
  #[error("无法打开日志文件: {0}")]
  IoError(#[from] std::io::Error),
  #[error("日志系统初始化失败: {0}")]
  InitError(#[from] TryInitError),
}

/// 初始化日志：终端输出，另可追加写入日志文件
///
/// 日志级别由 `RUST_LOG` 控制，默认 `info`。
pub fn init(log_file: Option<&Path>) -> Result<(), LoggingError> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let file_layer = match log_file {
    Some(path) => {
      if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
          std::fs::create_dir_all(parent)?;
        }
      }
      let file = OpenOptions::new().create(true).append(true).open(path)?;
      Some(
        fmt::layer()
          .with_ansi(false)
          .with_writer(Mutex::new(file)),
      )
    }
    None => None,
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(file_layer)
    .try_init()?;

  Ok(())
}
