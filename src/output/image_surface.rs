// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/image_surface.rs - 基于 RGBA 图像的绘图表面
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

use std::path::Path;

use ab_glyph::{Font, FontArc, FontRef, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use tracing::info;

use crate::output::{Color, OutputError, OutputWrapper, Rect, Surface, TextBaseline};

// 默认字体 DejaVu Sans，许可见 assets/font-LICENSE
const DEFAULT_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

/// 透明底的叠加层画布
pub struct ImageSurface {
  canvas: RgbaImage,
  font: FontArc,
  font_size: f32,
  baseline: TextBaseline,
  output: OutputWrapper,
  drawn: bool,
}

impl ImageSurface {
  /// 使用内嵌的默认字体
  pub fn new(output: OutputWrapper) -> Result<Self, OutputError> {
    let font = FontRef::try_from_slice(DEFAULT_FONT)
      .map_err(|e| OutputError::FontError(format!("内嵌字体: {}", e)))?;
    Ok(Self {
      canvas: RgbaImage::new(0, 0),
      font: FontArc::new(font),
      font_size: 16.0,
      baseline: TextBaseline::Top,
      output,
      drawn: false,
    })
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = font;
    self
  }

  pub fn load_font(self, path: &Path) -> Result<Self, OutputError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)
      .map_err(|e| OutputError::FontError(format!("{}: {}", path.display(), e)))?;
    info!("加载字体: {}", path.display());
    Ok(self.with_font(font))
  }

  pub fn canvas(&self) -> &RgbaImage {
    &self.canvas
  }

  pub fn is_drawn(&self) -> bool {
    self.drawn
  }

  fn scale(&self) -> PxScale {
    PxScale::from(self.font_size)
  }

  fn text_top(&self, y: f32) -> f32 {
    match self.baseline {
      TextBaseline::Top => y,
      TextBaseline::Middle => y - self.font_size / 2.0,
      TextBaseline::Alphabetic => y - self.font.as_scaled(self.scale()).ascent(),
      TextBaseline::Bottom => y - self.font_size,
    }
  }
}

fn pixel_rect(x: f32, y: f32, width: f32, height: f32) -> Option<imageproc::rect::Rect> {
  let (width, height) = (width.round(), height.round());
  if width < 1.0 || height < 1.0 {
    return None;
  }
  Some(
    imageproc::rect::Rect::at(x.round() as i32, y.round() as i32)
      .of_size(width as u32, height as u32),
  )
}

impl Surface for ImageSurface {
  fn resize(&mut self, width: u32, height: u32) {
    if self.canvas.dimensions() != (width, height) {
      self.canvas = RgbaImage::new(width, height);
      self.drawn = false;
    }
  }

  fn clear(&mut self) {
    let transparent: Rgba<u8> = Color::TRANSPARENT.into();
    for pixel in self.canvas.pixels_mut() {
      *pixel = transparent;
    }
    self.drawn = false;
  }

  fn set_font(&mut self, size_px: f32) {
    self.font_size = size_px;
  }

  fn set_text_baseline(&mut self, baseline: TextBaseline) {
    self.baseline = baseline;
  }

  fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
    // 线宽以边为中心向内外各延伸一半
    let half = line_width / 2.0;
    let steps = line_width.round().max(1.0) as u32;
    for k in 0..steps {
      let k = k as f32;
      if let Some(ring) = pixel_rect(
        rect.x - half + k,
        rect.y - half + k,
        rect.width + line_width - 2.0 * k,
        rect.height + line_width - 2.0 * k,
      ) {
        draw_hollow_rect_mut(&mut self.canvas, ring, color.into());
        self.drawn = true;
      }
    }
  }

  fn fill_rect(&mut self, rect: Rect, color: Color) {
    if let Some(area) = pixel_rect(rect.x, rect.y, rect.width, rect.height) {
      draw_filled_rect_mut(&mut self.canvas, area, color.into());
      self.drawn = true;
    }
  }

  fn measure_text(&self, text: &str) -> f32 {
    text_size(self.scale(), &self.font, text).0 as f32
  }

  fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
    let top = self.text_top(y);
    let scale = self.scale();
    draw_text_mut(
      &mut self.canvas,
      color.into(),
      x.round() as i32,
      top.round() as i32,
      scale,
      &self.font,
      text,
    );
    self.drawn = true;
  }

  fn present(&mut self) -> Result<(), OutputError> {
    self.output.save(&self.canvas, self.drawn)
  }
}
