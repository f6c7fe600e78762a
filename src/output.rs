// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
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

use image::RgbaImage;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 与视频帧对齐的绘图表面
///
/// 接口仿照 2D 画布：尺寸、清屏、矩形描边与填充、文字测量与绘制。
/// 绘制本身不会失败，只有 `present` 把结果交给外部时可能出错。
pub trait Surface {
  fn resize(&mut self, width: u32, height: u32);
  fn clear(&mut self);
  fn set_font(&mut self, size_px: f32);
  fn set_text_baseline(&mut self, baseline: TextBaseline);
  fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32);
  fn fill_rect(&mut self, rect: Rect, color: Color);
  fn measure_text(&self, text: &str) -> f32;
  fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color);

  fn present(&mut self) -> Result<(), OutputError> {
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl Rect {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub [u8; 4]);

impl Color {
  pub const CYAN: Color = Color([0x00, 0xFF, 0xFF, 0xFF]);
  pub const BLACK: Color = Color([0x00, 0x00, 0x00, 0xFF]);
  pub const TRANSPARENT: Color = Color([0x00, 0x00, 0x00, 0x00]);
}

impl From<Color> for image::Rgba<u8> {
  fn from(color: Color) -> Self {
    image::Rgba(color.0)
  }
}

/// 文字纵向锚点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextBaseline {
  #[default]
  Top,
  Middle,
  Alphabetic,
  Bottom,
}

pub mod draw;
pub mod recording;

mod image_surface;
pub use self::image_surface::ImageSurface;

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("字体加载错误: {0}")]
  FontError(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 叠加层的去向
pub enum OutputWrapper {
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
  /// 只保留在内存里
  Discard,
}

const DISCARD_SCHEME: &str = "null";

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFileOutput(
        SaveImageFileOutput::from_url(url)?,
      )),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecordOutput(
        DirectoryRecordOutput::from_url(url)?,
      )),
      DISCARD_SCHEME => Ok(OutputWrapper::Discard),
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl OutputWrapper {
  /// `drawn` 表示自上次清屏以来是否画过东西
  #[cfg_attr(not(feature = "directory_record"), allow(unused_variables))]
  pub fn save(&self, overlay: &RgbaImage, drawn: bool) -> Result<(), OutputError> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => Ok(output.save(overlay)?),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => Ok(output.save(overlay, drawn)?),
      OutputWrapper::Discard => Ok(()),
    }
  }
}
