// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像推理
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

use std::future::pending;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use shanan_live::{
  FromUrl,
  input::InputWrapper,
  model::{ModelError, ModelSpec, Yolov5},
  output::{ImageSurface, OutputWrapper},
  task::{Pipeline, PipelineConfig},
};

/// Shanan 单次推理参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  #[arg(long, value_name = "MODEL", default_value = "yolov5n:")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 标签字体文件，缺省使用内嵌字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let mut surface = ImageSurface::new(OutputWrapper::from_url(&args.output)?)?;
  if let Some(font) = &args.font {
    surface = surface.load_font(font)?;
  }

  let now = std::time::Instant::now();
  let model = Yolov5::load(ModelSpec::from_url(&args.model)?).await?;
  info!("模型加载完成，耗时: {:.2?}", now.elapsed());

  let mut pipeline = Pipeline::new(
    PipelineConfig::default().with_max_ticks(Some(1)),
    input,
    surface,
  );
  pipeline.install_model(model);

  let now = std::time::Instant::now();
  let summary = pipeline
    .run_until(pending::<Result<Yolov5, ModelError>>(), pending())
    .await?;
  info!("推理完成，耗时: {:.2?}", now.elapsed());

  if summary.completed == 0 {
    anyhow::bail!("没有完成任何推理: {}", summary);
  }

  Ok(())
}
