// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 视频帧定义
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

use image::RgbImage;
use thiserror::Error;

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  BufferSize { expected: usize, actual: usize },
}

/// 采集源提供的一帧 RGB 图像（HWC 排布）
#[derive(Debug, Clone)]
pub struct Frame {
  image: RgbImage,
  index: u64,
  timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64, timestamp_ms: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms,
    }
  }

  pub fn from_rgb(
    width: u32,
    height: u32,
    data: Vec<u8>,
    index: u64,
    timestamp_ms: u64,
  ) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width as usize * height as usize;
    let actual = data.len();
    let image =
      RgbImage::from_raw(width, height, data).ok_or(FrameError::BufferSize { expected, actual })?;
    Ok(Self::new(image, index, timestamp_ms))
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn timestamp_ms(&self) -> u64 {
    self.timestamp_ms
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  /// 按行优先排列的 RGB 像素
  pub fn pixels(&self) -> &[u8] {
    self.image.as_raw()
  }
}
