// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decode.rs - 模型输出解码
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

use thiserror::Error;
use tracing::debug;

use super::{ClassTable, LabelError, RawResult};

/// 像素坐标下的一个检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: [f32; 4], // [x1, y1, x2, y2]
  pub score: f32,
  pub class_id: u32,
  pub class_name: &'static str,
}

impl Detection {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }

  /// 叠加层上显示的标签文本，分数保留两位小数
  pub fn label(&self) -> String {
    format!("{}:{:.2}", self.class_name, self.score)
  }
}

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("模型输出缺少有效检测数")]
  MissingCount,
  #[error("有效检测数 {0} 为负数")]
  NegativeCount(i64),
  #[error("有效检测数 {count} 超出输出容量 {capacity}")]
  CountExceedsCapacity { count: usize, capacity: usize },
  #[error("未知类别: {0}")]
  UnknownClass(#[from] LabelError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
  labels: ClassTable,
}

impl Decoder {
  pub fn new(labels: ClassTable) -> Self {
    Self { labels }
  }

  /// 只解码前 `valid_detections` 项，并把归一化坐标换算到帧像素坐标
  pub fn decode(
    &self,
    raw: &RawResult,
    frame_width: u32,
    frame_height: u32,
  ) -> Result<Vec<Detection>, DecodeError> {
    let count = raw.valid_count().ok_or(DecodeError::MissingCount)?;
    let count = usize::try_from(count).map_err(|_| DecodeError::NegativeCount(count))?;
    let capacity = raw.capacity();
    if count > capacity {
      return Err(DecodeError::CountExceedsCapacity { count, capacity });
    }

    let (w, h) = (frame_width as f32, frame_height as f32);
    let boxes = raw.boxes.data();
    let scores = raw.scores.data();
    let classes = raw.classes.data();

    let detections = (0..count)
      .map(|i| {
        let class_id = classes[i];
        let class_name = self.labels.name(class_id as i64)?;
        let b = &boxes[i * 4..(i + 1) * 4];
        Ok(Detection {
          bbox: [b[0] * w, b[1] * h, b[2] * w, b[3] * h],
          score: scores[i],
          class_id: class_id as u32,
          class_name,
        })
      })
      .collect::<Result<Vec<_>, DecodeError>>()?;

    debug!("解码得到 {} 个检测结果 (容量 {})", detections.len(), capacity);
    Ok(detections)
  }
}
