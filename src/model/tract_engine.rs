// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/model/tract_engine.rs - 基于 tract 的 ONNX 推理引擎
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use tract_onnx::prelude::*;

use crate::{
  frame::{NchwTensor, OutputTensor, RGB_CHANNELS},
  model::InferenceEngine,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum TractEngineError {
  #[error("无法加载 ONNX 模型 {path}: {source}")]
  Load {
    path: PathBuf,
    #[source]
    source: BoxError,
  },
  #[error("输入张量构造失败: {0}")]
  Input(#[source] BoxError),
  #[error("推理失败: {0}")]
  Run(#[source] BoxError),
  #[error("模型输出不是 f32 张量: {0}")]
  Output(#[source] BoxError),
}

/// 纯 Rust 的 CPU 推理，运行时只读，可跨线程共享
pub struct TractEngine {
  plan: TypedRunnableModel<TypedModel>,
  output_shape: Option<Vec<usize>>,
}

impl TractEngine {
  /// 加载模型并把输入固定为 [1, 3, S, S] 的 f32 张量
  pub fn load(model_path: &Path, input_size: u32) -> Result<Self, TractEngineError> {
    let size = input_size as usize;
    let load_error = |e: TractError| TractEngineError::Load {
      path: model_path.to_path_buf(),
      source: e.into(),
    };

    let plan = tract_onnx::onnx()
      .model_for_path(model_path)
      .map_err(load_error)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(1, RGB_CHANNELS, size, size)),
      )
      .map_err(load_error)?
      .into_optimized()
      .map_err(load_error)?
      .into_runnable()
      .map_err(load_error)?;

    let output_shape = plan
      .model()
      .output_fact(0)
      .ok()
      .and_then(|fact| fact.shape.as_concrete().map(|shape| shape.to_vec()));
    debug!("tract 模型输出形状: {:?}", output_shape);

    Ok(Self {
      plan,
      output_shape,
    })
  }
}

impl InferenceEngine for TractEngine {
  type Error = TractEngineError;

  fn run(&self, input: &NchwTensor) -> Result<Vec<OutputTensor>, Self::Error> {
    let size = input.size();
    let array = tract_ndarray::Array4::from_shape_vec(
      (1, RGB_CHANNELS, size, size),
      input.as_slice().to_vec(),
    )
    .map_err(|e| TractEngineError::Input(Box::new(e)))?;

    let outputs = self
      .plan
      .run(tvec!(array.into_tensor().into()))
      .map_err(|e| TractEngineError::Run(e.into()))?;

    outputs
      .iter()
      .map(|value| -> Result<OutputTensor, TractEngineError> {
        let view = value
          .to_array_view::<f32>()
          .map_err(|e| TractEngineError::Output(e.into()))?;
        Ok(OutputTensor::new(
          view.shape().to_vec(),
          view.iter().copied().collect(),
        ))
      })
      .collect()
  }

  fn output_shape(&self) -> Option<Vec<usize>> {
    self.output_shape.clone()
  }
}
