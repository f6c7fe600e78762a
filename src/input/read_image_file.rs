// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::{CaptureError, CaptureSource},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 一张静态图片，始终就绪，每次都返回同一帧
pub struct ImageFileInput {
  frame: Arc<Frame>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    info!("读取图像文件: {} ({}x{})", path, image.width(), image.height());

    Ok(Self::from_image(image))
  }
}

impl ImageFileInput {
  pub fn from_image(image: RgbImage) -> Self {
    ImageFileInput {
      frame: Arc::new(Frame::new(image, 0, 0)),
    }
  }
}

impl CaptureSource for ImageFileInput {
  fn is_ready(&self) -> bool {
    true
  }

  fn current_frame(&self) -> Result<Arc<Frame>, CaptureError> {
    Ok(self.frame.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn static_image_is_always_ready() {
    let input = ImageFileInput::from_image(RgbImage::new(6, 4));
    assert!(input.is_ready());
    let frame = input.current_frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (6, 4));
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("v4l:///dev/video0").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
