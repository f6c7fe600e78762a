// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_live.rs - 实时视频目标检测
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

use std::path::PathBuf;
use std::sync::Arc;
use std::{thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};
use url::Url;

use shanan_live::{
  FromUrl,
  input::InputWrapper,
  model::{ModelSpec, Yolov5},
  output::{ImageSurface, OutputWrapper},
  task::{OverlapPolicy, Pipeline, PipelineConfig},
};

/// Shanan 实时检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 yolov5n: 或 yolov5s:///opt/models/yolov5s.onnx
  #[arg(long, value_name = "MODEL", default_value = "yolov5n:")]
  pub model: Url,
  /// 输入来源，例如 v4l:///dev/video0
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 叠加层输出，例如 folder:///var/shanan 或 null:
  #[arg(long, value_name = "OUTPUT", default_value = "null:")]
  pub output: Url,
  /// 采样间隔（毫秒）
  #[arg(long, value_name = "MS", default_value_t = 333)]
  pub cadence_ms: u64,
  /// 允许旧的运行覆盖新的结果
  #[arg(long)]
  pub overlap: bool,
  /// 启动指定次数的运行后退出（空转节拍不计入）
  #[arg(long, value_name = "TICKS")]
  pub max_ticks: Option<usize>,
  /// 标签字体文件，缺省使用内嵌字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

fn shutdown_signal() -> Result<Arc<Notify>> {
  let notify = Arc::new(Notify::new());
  let handler_notify = notify.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    handler_notify.notify_one();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(notify)
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let spec = ModelSpec::from_url(&args.model)?;
  let input = InputWrapper::from_url(&args.input)?;
  let mut surface = ImageSurface::new(OutputWrapper::from_url(&args.output)?)?;
  if let Some(font) = &args.font {
    surface = surface.load_font(font)?;
  }

  let overlap = if args.overlap {
    OverlapPolicy::Overlap
  } else {
    OverlapPolicy::DropStale
  };
  let config = PipelineConfig::default()
    .with_cadence(Duration::from_millis(args.cadence_ms))
    .with_overlap(overlap)
    .with_max_ticks(args.max_ticks);

  let notify = shutdown_signal()?;
  let mut pipeline = Pipeline::new(config, input, surface);
  let summary = pipeline
    .run_until(Yolov5::load(spec), async move { notify.notified().await })
    .await?;

  info!("处理完成: {}", summary);

  Ok(())
}
