// 该文件是 Shanan （山南西风） 项目的一部分。
// src/preprocess.rs - 模型输入预处理
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

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use thiserror::Error;
use tracing::trace;

use crate::{
  frame::{Frame, RGB_CHANNELS},
  tensor::{Tensor, TensorArena, TensorError},
};

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("输入张量形状应为 [高, 宽, 通道], 实际为 {0:?}")]
  InvalidShape(Vec<usize>),
  #[error("目标尺寸无效: {0}x{1}")]
  InvalidTarget(u32, u32),
  #[error(transparent)]
  Tensor(#[from] TensorError),
}

/// 归一化、缩放并带批次维度的模型输入，形状为 [1, 高, 宽, 3]
#[derive(Debug)]
pub struct PreparedInput {
  tensor: Tensor<f32>,
}

impl PreparedInput {
  pub fn tensor(&self) -> &Tensor<f32> {
    &self.tensor
  }

  pub fn data(&self) -> &[f32] {
    self.tensor.data()
  }

  pub fn height(&self) -> usize {
    self.tensor.shape()[1]
  }

  pub fn width(&self) -> usize {
    self.tensor.shape()[2]
  }

  pub fn release(self) {
    self.tensor.release()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
  input_width: u32,
  input_height: u32,
}

impl Preprocessor {
  pub fn new((input_width, input_height): (u32, u32)) -> Self {
    Self {
      input_width,
      input_height,
    }
  }

  /// 把帧像素复制为 [高, 宽, 3] 的 u8 张量
  pub fn frame_tensor(frame: &Frame, arena: &TensorArena) -> Result<Tensor<u8>, PreprocessError> {
    let shape = [
      frame.height() as usize,
      frame.width() as usize,
      RGB_CHANNELS,
    ];
    Ok(arena.tensor(&shape, frame.pixels().to_vec())?)
  }

  pub fn prepare(
    &self,
    raw: &Tensor<u8>,
    arena: &TensorArena,
  ) -> Result<PreparedInput, PreprocessError> {
    if self.input_width == 0 || self.input_height == 0 {
      return Err(PreprocessError::InvalidTarget(
        self.input_width,
        self.input_height,
      ));
    }

    let resized = resize_bilinear(
      raw,
      self.input_height as usize,
      self.input_width as usize,
      arena,
    )?;
    let normalized = resized.map(|&v| v as f32 / 255.0);
    // 缩放结果只是中间量
    resized.release();
    let tensor = normalized.expand_dims(0)?;

    trace!("预处理完成: {:?} -> {:?}", raw.shape(), tensor.shape());
    Ok(PreparedInput { tensor })
  }
}

/// 双线性（三角滤波）缩放 [高, 宽, 3] 的像素张量，结果记入 `arena`
pub fn resize_bilinear(
  src: &Tensor<u8>,
  out_h: usize,
  out_w: usize,
  arena: &TensorArena,
) -> Result<Tensor<u8>, PreprocessError> {
  let &[in_h, in_w, RGB_CHANNELS] = src.shape() else {
    return Err(PreprocessError::InvalidShape(src.shape().to_vec()));
  };
  let view = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(in_w as u32, in_h as u32, src.data())
    .filter(|_| in_h > 0 && in_w > 0)
    .ok_or_else(|| PreprocessError::InvalidShape(src.shape().to_vec()))?;

  let resized = imageops::resize(&view, out_w as u32, out_h as u32, FilterType::Triangle);
  Ok(arena.tensor(&[out_h, out_w, RGB_CHANNELS], resized.into_raw())?)
}
