// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/recording.rs - 记录绘图调用的表面
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

use crate::output::{Color, OutputError, Rect, Surface, TextBaseline};

const DEFAULT_CHAR_WIDTH: f32 = 8.0;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
  Resize { width: u32, height: u32 },
  Clear,
  SetFont(f32),
  SetTextBaseline(TextBaseline),
  StrokeRect { rect: Rect, color: Color, line_width: f32 },
  FillRect { rect: Rect, color: Color },
  FillText { text: String, x: f32, y: f32, color: Color },
  Present,
}

/// 不画任何像素，只按顺序记下调用
///
/// 文字宽度按字符数乘以固定字宽估算。
#[derive(Debug, Clone)]
pub struct RecordingSurface {
  calls: Vec<DrawCall>,
  char_width: f32,
}

impl Default for RecordingSurface {
  fn default() -> Self {
    Self::new()
  }
}

impl RecordingSurface {
  pub fn new() -> Self {
    Self {
      calls: Vec::new(),
      char_width: DEFAULT_CHAR_WIDTH,
    }
  }

  pub fn with_char_width(mut self, char_width: f32) -> Self {
    self.char_width = char_width;
    self
  }

  pub fn calls(&self) -> &[DrawCall] {
    &self.calls
  }

  pub fn take_calls(&mut self) -> Vec<DrawCall> {
    std::mem::take(&mut self.calls)
  }

  pub fn count(&self, pred: impl Fn(&DrawCall) -> bool) -> usize {
    self.calls.iter().filter(|call| pred(call)).count()
  }
}

impl Surface for RecordingSurface {
  fn resize(&mut self, width: u32, height: u32) {
    self.calls.push(DrawCall::Resize { width, height });
  }

  fn clear(&mut self) {
    self.calls.push(DrawCall::Clear);
  }

  fn set_font(&mut self, size_px: f32) {
    self.calls.push(DrawCall::SetFont(size_px));
  }

  fn set_text_baseline(&mut self, baseline: TextBaseline) {
    self.calls.push(DrawCall::SetTextBaseline(baseline));
  }

  fn stroke_rect(&mut self, rect: Rect, color: Color, line_width: f32) {
    self.calls.push(DrawCall::StrokeRect {
      rect,
      color,
      line_width,
    });
  }

  fn fill_rect(&mut self, rect: Rect, color: Color) {
    self.calls.push(DrawCall::FillRect { rect, color });
  }

  fn measure_text(&self, text: &str) -> f32 {
    text.chars().count() as f32 * self.char_width
  }

  fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Color) {
    self.calls.push(DrawCall::FillText {
      text: text.to_string(),
      x,
      y,
      color,
    });
  }

  fn present(&mut self) -> Result<(), OutputError> {
    self.calls.push(DrawCall::Present);
    Ok(())
  }
}
