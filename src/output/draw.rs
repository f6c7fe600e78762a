// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use tracing::trace;

use crate::{
  model::Detection,
  output::{Color, Rect, Surface, TextBaseline},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: f32 = 4.0;
const BOX_LINE_WIDTH: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
  pub box_color: Color,
  pub line_width: f32,
  pub label_background: Color,
  pub text_color: Color,
  pub font_size: f32,
  pub label_padding: f32,
}

impl Default for OverlayStyle {
  fn default() -> Self {
    Self {
      box_color: Color::CYAN,
      line_width: BOX_LINE_WIDTH,
      label_background: Color::CYAN,
      text_color: Color::BLACK,
      font_size: LABEL_FONT_SIZE,
      label_padding: LABEL_PADDING,
    }
  }
}

/// 把一次检测结果画到表面上
///
/// 先画所有框和标签底色，再画所有文字，避免后一个框的底色盖住前一个框的文字。
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayRenderer {
  style: OverlayStyle,
}

impl OverlayRenderer {
  pub fn new(style: OverlayStyle) -> Self {
    Self { style }
  }

  pub fn style(&self) -> &OverlayStyle {
    &self.style
  }

  pub fn render<S: Surface + ?Sized>(
    &self,
    surface: &mut S,
    width: u32,
    height: u32,
    detections: &[Detection],
  ) {
    let style = &self.style;
    surface.resize(width, height);
    surface.clear();
    surface.set_font(style.font_size);
    surface.set_text_baseline(TextBaseline::Top);

    let labels: Vec<String> = detections.iter().map(Detection::label).collect();

    for (detection, label) in detections.iter().zip(&labels) {
      let [x1, y1, _, _] = detection.bbox;
      surface.stroke_rect(
        Rect::new(x1, y1, detection.width(), detection.height()),
        style.box_color,
        style.line_width,
      );
      let text_width = surface.measure_text(label);
      surface.fill_rect(
        Rect::new(
          x1,
          y1,
          text_width + style.label_padding,
          style.font_size + style.label_padding,
        ),
        style.label_background,
      );
    }

    for (detection, label) in detections.iter().zip(&labels) {
      let [x1, y1, _, _] = detection.bbox;
      surface.fill_text(label, x1, y1, style.text_color);
    }

    trace!("绘制 {} 个检测框 ({}x{})", detections.len(), width, height);
  }
}
