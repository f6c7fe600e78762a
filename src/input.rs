// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

/// 采集源
///
/// 采样器每个节拍先查询 `is_ready`，未就绪时本次节拍什么也不做。
pub trait CaptureSource {
  fn is_ready(&self) -> bool;
  fn current_frame(&self) -> Result<Arc<Frame>, CaptureError>;
}

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("采集源尚未就绪")]
  NotReady,
  #[error("采集源已停止: {0}")]
  Stopped(String),
}

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::{V4lInput, V4lInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "v4l_input")]
  #[error("V4L input error: {0}")]
  V4lInputError(#[from] V4lInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "v4l_input")]
  V4l(V4lInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "v4l_input")]
    if url.scheme() == V4lInput::SCHEME {
      return Ok(InputWrapper::V4l(V4lInput::from_url(url)?));
    }
    if url.scheme() == ImageFileInput::SCHEME {
      return Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?));
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl CaptureSource for InputWrapper {
  fn is_ready(&self) -> bool {
    match self {
      InputWrapper::ReadImageFile(input) => input.is_ready(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.is_ready(),
    }
  }

  fn current_frame(&self) -> Result<Arc<Frame>, CaptureError> {
    match self {
      InputWrapper::ReadImageFile(input) => input.current_frame(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.current_frame(),
    }
  }
}
