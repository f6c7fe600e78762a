// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{DateTime, Datelike, Utc};
use image::RgbaImage;
use thiserror::Error;
use tracing::debug;

use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期分目录保存每一帧叠加层
///
/// 路径形如 `<dir>/2026/03/14/09-26-53-0001.png`。默认只保存画了东西的帧，
/// 带 `?always` 时每帧都保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn always(&self) -> bool {
    self.always
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  pub fn save(&self, overlay: &RgbaImage, drawn: bool) -> Result<(), DirectoryRecordOutputError> {
    if !self.always && !drawn {
      return Ok(());
    }
    let path = self.frame_path(Utc::now())?;
    overlay.save(&path)?;
    debug!("保存叠加层到 {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn temp_output(tag: &str, always: bool) -> DirectoryRecordOutput {
    let directory = std::env::temp_dir().join(format!("shanan-{}-{}", tag, std::process::id()));
    DirectoryRecordOutput {
      directory,
      frame_counter: AtomicU16::new(0),
      always,
    }
  }

  #[test]
  fn always_flag_comes_from_query() {
    let url = url::Url::parse("folder:///var/shanan?always").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert!(output.always());
    assert_eq!(output.directory(), Path::new("/var/shanan"));

    let url = url::Url::parse("folder:///var/shanan").unwrap();
    assert!(!DirectoryRecordOutput::from_url(&url).unwrap().always());
  }

  #[test]
  fn frames_are_dated_and_numbered() {
    let output = temp_output("dated", true);
    let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
    let first = output.frame_path(now).unwrap();
    let second = output.frame_path(now).unwrap();
    assert_eq!(
      first,
      output.directory().join("2026/03/14/09-26-53-0001.png")
    );
    assert_eq!(
      second,
      output.directory().join("2026/03/14/09-26-53-0002.png")
    );
    std::fs::remove_dir_all(output.directory()).unwrap();
  }

  #[test]
  fn empty_overlays_are_skipped_unless_always() {
    let output = temp_output("skip", false);
    output.save(&RgbaImage::new(2, 2), false).unwrap();
    assert!(!output.directory().exists());
  }
}
