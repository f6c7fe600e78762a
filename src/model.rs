// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use std::future::Future;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl,
  preprocess::PreparedInput,
  tensor::{Tensor, TensorArena, TensorError},
};

mod decode;
mod label;
pub use self::decode::{DecodeError, Decoder, Detection};
pub use self::label::{COCO_CLASSES, ClassTable, LabelError};

#[cfg(feature = "model_yolov5")]
mod yolov5;
#[cfg(feature = "model_yolov5")]
pub use self::yolov5::Yolov5;

/// 已加载的检测模型
///
/// 推理是异步的，没有超时也不能取消；多次推理可以同时进行。
pub trait Model: Send + Sync + 'static {
  /// 模型要求的输入尺寸 (宽, 高)
  fn input_shape(&self) -> (u32, u32);

  /// 输出缓冲区必须从 `arena` 分配，以便由调用方回收
  fn infer(
    &self,
    input: &PreparedInput,
    arena: &TensorArena,
  ) -> impl Future<Output = Result<RawResult, ModelError>> + Send;
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载失败 ({location}): {reason}")]
  Load { location: String, reason: String },
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("推理失败: {0}")]
  Inference(String),
  #[error("模型输出不符合预期: {0}")]
  UnexpectedOutput(String),
  #[error(transparent)]
  Tensor(#[from] TensorError),
}

/// 带 NMS 的检测模型原始输出
///
/// 各缓冲区容量固定，只有前 `valid_detections` 项有意义。
#[derive(Debug)]
pub struct RawResult {
  /// 归一化坐标 [x1, y1, x2, y2]，每项 4 个数
  pub boxes: Tensor<f32>,
  pub scores: Tensor<f32>,
  pub classes: Tensor<i32>,
  /// 标量
  pub valid_detections: Tensor<i32>,
}

impl RawResult {
  pub fn valid_count(&self) -> Option<i64> {
    self.valid_detections.data().first().map(|&n| n as i64)
  }

  /// 三个逐项缓冲区中最小的容量
  pub fn capacity(&self) -> usize {
    (self.boxes.len() / 4)
      .min(self.scores.len())
      .min(self.classes.len())
  }

  pub fn release(self) {
    let RawResult {
      boxes,
      scores,
      classes,
      valid_detections,
    } = self;
    boxes.release();
    scores.release();
    classes.release();
    valid_detections.release();
  }
}

/// 模型尺寸档位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProfile {
  Nano,
  Small,
}

impl ModelProfile {
  pub const ALL: [ModelProfile; 2] = [ModelProfile::Nano, ModelProfile::Small];

  pub const fn scheme(&self) -> &'static str {
    match self {
      ModelProfile::Nano => "yolov5n",
      ModelProfile::Small => "yolov5s",
    }
  }

  pub fn from_scheme(scheme: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|p| p.scheme() == scheme)
  }

  pub const fn default_location(&self) -> &'static str {
    match self {
      ModelProfile::Nano => "yolov5n/model.onnx",
      ModelProfile::Small => "yolov5s/model.onnx",
    }
  }

  pub const fn input_shape(&self) -> (u32, u32) {
    (640, 640)
  }
}

/// 从模型地址解析出的加载参数
///
/// 地址方案选择档位，路径给出模型文件，例如 `yolov5s:///opt/models/yolov5s.onnx`
/// 或 `yolov5n:?input=320x320`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
  pub profile: ModelProfile,
  pub path: PathBuf,
  pub input_shape: (u32, u32),
}

impl FromUrl for ModelSpec {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let profile = ModelProfile::from_scheme(url.scheme()).ok_or_else(|| {
      ModelError::ModelPathError(format!(
        "未知的模型方案 '{}', 可选: {}, {}",
        url.scheme(),
        ModelProfile::Nano.scheme(),
        ModelProfile::Small.scheme()
      ))
    })?;

    let path = match (url.host_str(), url.path()) {
      (Some(host), path) if !host.is_empty() => format!("{host}{path}"),
      (_, "") => profile.default_location().to_string(),
      (_, path) => path.to_string(),
    };

    let mut input_shape = profile.input_shape();
    for (key, value) in url.query_pairs() {
      if key == "input" {
        input_shape = parse_shape(&value).ok_or_else(|| {
          ModelError::ModelPathError(format!("无法解析输入尺寸 '{}', 应为 宽x高", value))
        })?;
      }
    }

    Ok(ModelSpec {
      profile,
      path: PathBuf::from(path),
      input_shape,
    })
  }
}

fn parse_shape(value: &str) -> Option<(u32, u32)> {
  let (w, h) = value.split_once('x')?;
  let w = w.trim().parse().ok().filter(|&w| w > 0)?;
  let h = h.trim().parse().ok().filter(|&h| h > 0)?;
  Some((w, h))
}
