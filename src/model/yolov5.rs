// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolov5.rs - YOLOv5 (ONNX, 内置 NMS) 模型
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

use std::sync::Arc;

use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::{
  model::{Model, ModelError, ModelSpec, RawResult},
  preprocess::PreparedInput,
  tensor::{Tensor, TensorArena},
};

const YOLOV5_NUM_OUTPUTS: usize = 4;

type Plan = RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>;
type OnnxTensor = tract_onnx::prelude::Tensor;

/// 导出时带 NMS 的 YOLOv5 模型
///
/// 输入为 NHWC 的 f32 张量，输出依次为 boxes [1,N,4]、scores [1,N]、
/// classes [1,N]、valid_detections [1]。
pub struct Yolov5 {
  plan: Arc<Plan>,
  spec: ModelSpec,
}

impl Yolov5 {
  pub async fn load(spec: ModelSpec) -> Result<Self, ModelError> {
    let location = spec.path.display().to_string();
    let (width, height) = spec.input_shape;
    info!(
      "加载模型文件: {} ({}, 输入 {}x{})",
      location,
      spec.profile.scheme(),
      width,
      height
    );

    let path = spec.path.clone();
    let plan = tokio::task::spawn_blocking(move || -> TractResult<Plan> {
      tract_onnx::onnx()
        .model_for_path(&path)?
        .with_input_fact(
          0,
          InferenceFact::dt_shape(
            f32::datum_type(),
            tvec![1, height as usize, width as usize, 3],
          ),
        )?
        .into_optimized()?
        .into_runnable()
    })
    .await
    .map_err(|e| ModelError::Load {
      location: location.clone(),
      reason: e.to_string(),
    })?
    .map_err(|e| ModelError::Load {
      location: location.clone(),
      reason: format!("{e:#}"),
    })?;

    info!("模型加载完成");
    Ok(Yolov5 {
      plan: Arc::new(plan),
      spec,
    })
  }

  pub fn spec(&self) -> &ModelSpec {
    &self.spec
  }
}

impl Model for Yolov5 {
  fn input_shape(&self) -> (u32, u32) {
    self.spec.input_shape
  }

  async fn infer(
    &self,
    input: &PreparedInput,
    arena: &TensorArena,
  ) -> Result<RawResult, ModelError> {
    let shape = input.tensor().shape().to_vec();
    let tensor = OnnxTensor::from_shape(&shape, input.data())
      .map_err(|e| ModelError::Inference(format!("{e:#}")))?;

    let plan = self.plan.clone();
    debug!("执行模型推理");
    // TValue 不能跨线程，在阻塞线程内转换为 Tensor
    let outputs = tokio::task::spawn_blocking(move || {
      plan
        .run(tvec!(tensor.into()))
        .map(|values| {
          values
            .into_iter()
            .map(TValue::into_tensor)
            .collect::<Vec<OnnxTensor>>()
        })
    })
    .await
    .map_err(|e| ModelError::Inference(e.to_string()))?
    .map_err(|e| ModelError::Inference(format!("{e:#}")))?;

    if outputs.len() != YOLOV5_NUM_OUTPUTS {
      return Err(ModelError::UnexpectedOutput(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        YOLOV5_NUM_OUTPUTS,
        outputs.len()
      )));
    }
    if outputs[0].shape().last() != Some(&4) {
      return Err(ModelError::UnexpectedOutput(format!(
        "boxes 形状应为 [1, N, 4], 实际为 {:?}",
        outputs[0].shape()
      )));
    }

    let boxes = adopt_f32(&outputs[0], arena)?;
    let scores = adopt_f32(&outputs[1], arena)?;
    let classes = adopt_i32(&outputs[2], arena)?;
    let valid_detections = adopt_i32(&outputs[3], arena)?;
    debug!(
      "模型推理结果: boxes {:?}, scores {:?}, classes {:?}",
      boxes.shape(),
      scores.shape(),
      classes.shape()
    );

    Ok(RawResult {
      boxes,
      scores,
      classes,
      valid_detections,
    })
  }
}

fn output_as_f32(value: &OnnxTensor) -> Result<Vec<f32>, ModelError> {
  let cast = value
    .cast_to::<f32>()
    .map_err(|e| ModelError::UnexpectedOutput(format!("{e:#}")))?;
  let slice = cast
    .as_slice::<f32>()
    .map_err(|e| ModelError::UnexpectedOutput(format!("{e:#}")))?;
  Ok(slice.to_vec())
}

fn adopt_f32(value: &OnnxTensor, arena: &TensorArena) -> Result<Tensor<f32>, ModelError> {
  let data = output_as_f32(value)?;
  Ok(arena.tensor(value.shape(), data)?)
}

fn adopt_i32(value: &OnnxTensor, arena: &TensorArena) -> Result<Tensor<i32>, ModelError> {
  let data = output_as_f32(value)?
    .into_iter()
    .map(|v| v.round() as i32)
    .collect();
  Ok(arena.tensor(value.shape(), data)?)
}
