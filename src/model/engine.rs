// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/model/engine.rs - 推理引擎抽象
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Mutex;

use thiserror::Error;

use crate::frame::{NchwTensor, OutputTensor};

/// 推理运行时：输入 NCHW 张量，返回一个或多个输出张量
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn run(&self, input: &NchwTensor) -> Result<Vec<OutputTensor>, Self::Error>;

  /// 第一个输出的静态形状，运行时无法确定时返回 None
  fn output_shape(&self) -> Option<Vec<usize>> {
    None
  }
}

#[derive(Error, Debug)]
pub enum SerializedEngineError<E> {
  #[error("推理锁已失效")]
  Poisoned,
  #[error(transparent)]
  Inner(E),
}

/// 为不支持并发读取的运行时加锁，锁只覆盖推理调用本身
pub struct SerializedEngine<E> {
  inner: Mutex<E>,
  output_shape: Option<Vec<usize>>,
}

impl<E: InferenceEngine> SerializedEngine<E> {
  pub fn new(engine: E) -> Self {
    let output_shape = engine.output_shape();
    Self {
      inner: Mutex::new(engine),
      output_shape,
    }
  }
}

impl<E: InferenceEngine> InferenceEngine for SerializedEngine<E> {
  type Error = SerializedEngineError<E::Error>;

  fn run(&self, input: &NchwTensor) -> Result<Vec<OutputTensor>, Self::Error> {
    let engine = self
      .inner
      .lock()
      .map_err(|_| SerializedEngineError::Poisoned)?;
    engine.run(input).map_err(SerializedEngineError::Inner)
  }

  fn output_shape(&self) -> Option<Vec<usize>> {
    self.output_shape.clone()
  }
}
