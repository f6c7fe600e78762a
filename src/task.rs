// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 定时采样与推理任务
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

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::{
  frame::Frame,
  input::{CaptureError, CaptureSource},
  model::{ClassTable, DecodeError, Decoder, Model, ModelError},
  output::{
    OutputError, Surface,
    draw::{OverlayRenderer, OverlayStyle},
  },
  preprocess::{PreprocessError, Preprocessor},
  reclaim::RunScope,
  tensor::{ResourceStats, TensorArena},
};

pub const DEFAULT_CADENCE: Duration = Duration::from_millis(333);

/// 多次运行同时在途时如何处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
  /// 更新的运行已经画过时，旧运行丢弃自己的结果
  #[default]
  DropStale,
  /// 每次运行都画，谁最后完成谁留在屏幕上
  Overlap,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  cadence: Duration,
  overlap: OverlapPolicy,
  max_ticks: Option<usize>,
  style: OverlayStyle,
  labels: ClassTable,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      cadence: DEFAULT_CADENCE,
      overlap: OverlapPolicy::default(),
      max_ticks: None,
      style: OverlayStyle::default(),
      labels: ClassTable::default(),
    }
  }
}

impl PipelineConfig {
  pub fn with_cadence(mut self, cadence: Duration) -> Self {
    self.cadence = cadence;
    self
  }

  pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
    self.overlap = overlap;
    self
  }

  /// 启动指定次数的运行后停止采样，空转的节拍不计入
  pub fn with_max_ticks(mut self, max_ticks: Option<usize>) -> Self {
    self.max_ticks = max_ticks;
    self
  }

  pub fn with_style(mut self, style: OverlayStyle) -> Self {
    self.style = style;
    self
  }

  pub fn with_labels(mut self, labels: ClassTable) -> Self {
    self.labels = labels;
    self
  }

  pub fn cadence(&self) -> Duration {
    self.cadence
  }

  pub fn overlap(&self) -> OverlapPolicy {
    self.overlap
  }

  pub fn max_ticks(&self) -> Option<usize> {
    self.max_ticks
  }
}

/// 单次运行的失败原因，只影响这一次运行
#[derive(Error, Debug)]
pub enum RunError {
  #[error("预处理失败: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("推理失败: {0}")]
  Inference(#[from] ModelError),
  #[error("解码失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("绘制输出失败: {0}")]
  Surface(#[from] OutputError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("模型加载失败: {0}")]
  ModelLoad(#[source] ModelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
  pub generation: u64,
  pub detections: usize,
  pub discarded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
  ModelNotLoaded,
  CaptureNotReady,
  CaptureFailed,
  Launched(u64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
  pub ticks: u64,
  pub idle_ticks: u64,
  pub launched: u64,
  pub completed: u64,
  pub failed: u64,
  pub discarded: u64,
  pub resources: ResourceStats,
}

impl fmt::Display for SessionSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "节拍 {} (空闲 {}), 启动 {}, 完成 {}, 失败 {}, 丢弃 {}, 张量 {}",
      self.ticks,
      self.idle_ticks,
      self.launched,
      self.completed,
      self.failed,
      self.discarded,
      self.resources
    )
  }
}

type Joined = Result<(u64, Result<RunReport, RunError>), JoinError>;

/// 实时检测流水线
///
/// 按固定节拍从采集源取帧，每帧启动一个独立的运行任务：预处理、推理、
/// 解码，然后在表面上画出检测框。运行之间不互斥，表面由异步锁保护，
/// 一次运行持锁完成整幅叠加层的绘制。
pub struct Pipeline<M, C, S> {
  config: PipelineConfig,
  capture: C,
  surface: Arc<Mutex<S>>,
  model: Option<Arc<M>>,
  arena: TensorArena,
  runs: JoinSet<(u64, Result<RunReport, RunError>)>,
  generation: u64,
  rendered: Arc<AtomicU64>,
  summary: SessionSummary,
}

impl<M, C, S> Pipeline<M, C, S>
where
  M: Model,
  C: CaptureSource,
  S: Surface + Send + 'static,
{
  pub fn new(config: PipelineConfig, capture: C, surface: S) -> Self {
    Self {
      config,
      capture,
      surface: Arc::new(Mutex::new(surface)),
      model: None,
      arena: TensorArena::new(),
      runs: JoinSet::new(),
      generation: 0,
      rendered: Arc::new(AtomicU64::new(0)),
      summary: SessionSummary::default(),
    }
  }

  pub fn install_model(&mut self, model: M) {
    let (width, height) = model.input_shape();
    info!("模型已就绪, 输入尺寸 {}x{}", width, height);
    self.model = Some(Arc::new(model));
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn surface(&self) -> Arc<Mutex<S>> {
    self.surface.clone()
  }

  pub fn arena(&self) -> &TensorArena {
    &self.arena
  }

  pub fn in_flight(&self) -> usize {
    self.runs.len()
  }

  pub fn summary(&self) -> SessionSummary {
    SessionSummary {
      resources: self.arena.stats(),
      ..self.summary
    }
  }

  /// 一个采样节拍
  ///
  /// 模型未加载或采集源未就绪时什么也不做。否则取当前帧并启动一次运行，
  /// 不等待它完成。
  pub fn tick(&mut self) -> TickOutcome {
    self.summary.ticks += 1;
    self.reap();

    let Some(model) = self.model.clone() else {
      self.summary.idle_ticks += 1;
      trace!("模型尚未加载, 跳过本次节拍");
      return TickOutcome::ModelNotLoaded;
    };
    if !self.capture.is_ready() {
      self.summary.idle_ticks += 1;
      trace!("采集源尚未就绪, 跳过本次节拍");
      return TickOutcome::CaptureNotReady;
    }
    let frame = match self.capture.current_frame() {
      Ok(frame) => frame,
      Err(CaptureError::NotReady) => {
        self.summary.idle_ticks += 1;
        return TickOutcome::CaptureNotReady;
      }
      Err(e) => {
        self.summary.idle_ticks += 1;
        warn!("取帧失败: {}", e);
        return TickOutcome::CaptureFailed;
      }
    };

    self.generation += 1;
    let generation = self.generation;
    let run = Run {
      generation,
      frame,
      model,
      surface: self.surface.clone(),
      arena: self.arena.clone(),
      rendered: self.rendered.clone(),
      overlap: self.config.overlap,
      renderer: OverlayRenderer::new(self.config.style),
      decoder: Decoder::new(self.config.labels),
    };
    self.runs.spawn(async move { (generation, run.execute().await) });
    self.summary.launched += 1;
    debug!("启动运行 #{} (在途 {})", generation, self.runs.len());

    TickOutcome::Launched(generation)
  }

  fn reap(&mut self) {
    while let Some(joined) = self.runs.try_join_next() {
      self.settle(joined);
    }
  }

  fn settle(&mut self, joined: Joined) {
    match joined {
      Ok((generation, Ok(report))) if report.discarded => {
        self.summary.discarded += 1;
        debug!("运行 #{} 已被更新的结果取代, 丢弃", generation);
      }
      Ok((generation, Ok(report))) => {
        self.summary.completed += 1;
        debug!("运行 #{} 完成, 检测到 {} 个目标", generation, report.detections);
      }
      Ok((generation, Err(e))) => {
        self.summary.failed += 1;
        warn!("运行 #{} 失败: {}", generation, e);
      }
      Err(e) if e.is_panic() => {
        self.summary.failed += 1;
        error!("运行任务崩溃: {}", e);
      }
      Err(e) => {
        self.summary.failed += 1;
        warn!("运行任务被取消: {}", e);
      }
    }
  }

  /// 等待所有在途运行结束
  pub async fn drain(&mut self) {
    if !self.runs.is_empty() {
      debug!("等待 {} 个在途运行结束", self.runs.len());
    }
    while let Some(joined) = self.runs.join_next().await {
      self.settle(joined);
    }
  }

  /// 驱动节拍直到 `shutdown` 完成或启动的运行数达到 `max_ticks`
  ///
  /// `loader` 与节拍并发进行，加载完成前的节拍都是空转；加载失败时
  /// 等待在途运行结束后返回错误。
  pub async fn run_until<L, F>(
    &mut self,
    loader: L,
    shutdown: F,
  ) -> Result<SessionSummary, PipelineError>
  where
    L: Future<Output = Result<M, ModelError>>,
    F: Future<Output = ()>,
  {
    info!(
      "开始采样, 间隔 {:?}, 重叠策略 {:?}",
      self.config.cadence, self.config.overlap
    );
    let started = Instant::now();
    let mut ticker = tokio::time::interval(self.config.cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(loader);
    tokio::pin!(shutdown);
    let mut loading = self.model.is_none();

    loop {
      tokio::select! {
        biased;
        _ = &mut shutdown => {
          warn!("收到停止信号, 退出采样循环");
          break;
        }
        loaded = &mut loader, if loading => {
          loading = false;
          match loaded {
            Ok(model) => self.install_model(model),
            Err(e) => {
              error!("模型加载失败: {}", e);
              self.drain().await;
              return Err(PipelineError::ModelLoad(e));
            }
          }
        }
        _ = ticker.tick() => {
          self.tick();
          if self
            .config
            .max_ticks
            .is_some_and(|n| self.summary.launched >= n as u64)
          {
            info!(
              "已启动 {} 次运行 (共 {} 个节拍), 退出采样循环",
              self.summary.launched, self.summary.ticks
            );
            break;
          }
        }
      }
    }

    self.drain().await;
    let summary = self.summary();
    info!("采样结束, 用时 {:.2?}: {}", started.elapsed(), summary);
    Ok(summary)
  }
}

/// 一次运行所需的全部上下文
struct Run<M, S> {
  generation: u64,
  frame: Arc<Frame>,
  model: Arc<M>,
  surface: Arc<Mutex<S>>,
  arena: TensorArena,
  rendered: Arc<AtomicU64>,
  overlap: OverlapPolicy,
  renderer: OverlayRenderer,
  decoder: Decoder,
}

impl<M: Model, S: Surface + Send + 'static> Run<M, S> {
  async fn execute(self) -> Result<RunReport, RunError> {
    // 作用域最先创建、最后丢弃，中途任何返回都会先释放所有张量
    let scope = RunScope::new(&self.arena, self.generation);
    let result = self.process(&scope).await;
    drop(scope);
    if matches!(&result, Err(e) if !matches!(e, RunError::Surface(_))) {
      self.blank().await;
    }
    result
  }

  /// 运行失败时清空叠加层，避免旧的检测框残留
  async fn blank(&self) {
    let mut surface = self.surface.lock().await;
    if self.overlap == OverlapPolicy::DropStale
      && self.rendered.load(Ordering::Acquire) > self.generation
    {
      return;
    }
    surface.resize(self.frame.width(), self.frame.height());
    surface.clear();
    self.rendered.fetch_max(self.generation, Ordering::AcqRel);
    if let Err(e) = surface.present() {
      warn!("运行 #{} 清空叠加层失败: {}", self.generation, e);
    }
  }

  async fn process(&self, scope: &RunScope) -> Result<RunReport, RunError> {
    let arena = scope.arena();
    let started = Instant::now();

    let raw = Preprocessor::frame_tensor(&self.frame, arena)?;
    let prepared = Preprocessor::new(self.model.input_shape()).prepare(&raw, arena);
    raw.release();
    let prepared = prepared?;

    let inferred = self.model.infer(&prepared, arena).await;
    prepared.release();
    let raw_result = inferred?;
    trace!(
      "运行 #{} 推理耗时 {:.2?}",
      self.generation,
      started.elapsed()
    );

    let decoded = self
      .decoder
      .decode(&raw_result, self.frame.width(), self.frame.height());
    raw_result.release();
    let detections = decoded?;

    let mut surface = self.surface.lock().await;
    if self.overlap == OverlapPolicy::DropStale
      && self.rendered.load(Ordering::Acquire) > self.generation
    {
      return Ok(RunReport {
        generation: self.generation,
        detections: detections.len(),
        discarded: true,
      });
    }
    self.renderer.render(
      &mut *surface,
      self.frame.width(),
      self.frame.height(),
      &detections,
    );
    self.rendered.fetch_max(self.generation, Ordering::AcqRel);
    surface.present()?;

    Ok(RunReport {
      generation: self.generation,
      detections: detections.len(),
      discarded: false,
    })
  }
}
