// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline.rs - 流水线集成测试
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

use std::collections::VecDeque;
use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::RgbImage;

use shanan_live::{
  frame::Frame,
  input::{CaptureError, CaptureSource},
  model::{Model, ModelError, RawResult},
  output::{
    Color, Rect,
    recording::{DrawCall, RecordingSurface},
  },
  preprocess::PreparedInput,
  task::{OverlapPolicy, Pipeline, PipelineConfig, PipelineError, TickOutcome},
  tensor::TensorArena,
};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;
const CAPACITY: usize = 4;

enum Outcome {
  Detect(Vec<([f32; 4], f32, i32)>),
  Fail,
  /// 先写好输出缓冲区再报错
  FailAfterOutputs,
  Panic,
}

struct Step {
  delay: Duration,
  outcome: Outcome,
}

fn detect(items: Vec<([f32; 4], f32, i32)>) -> Step {
  Step {
    delay: Duration::ZERO,
    outcome: Outcome::Detect(items),
  }
}

fn fail() -> Step {
  Step {
    delay: Duration::ZERO,
    outcome: Outcome::Fail,
  }
}

fn step(outcome: Outcome) -> Step {
  Step {
    delay: Duration::ZERO,
    outcome,
  }
}

/// 按脚本依次返回结果的模型
struct ScriptedModel {
  script: Mutex<VecDeque<Step>>,
  calls: AtomicUsize,
}

impl ScriptedModel {
  fn new(steps: impl IntoIterator<Item = Step>) -> Self {
    Self {
      script: Mutex::new(steps.into_iter().collect()),
      calls: AtomicUsize::new(0),
    }
  }
}

fn raw_result(arena: &TensorArena, items: &[([f32; 4], f32, i32)]) -> RawResult {
  // 有效项之后填入越界类别，确保解码器不会读到它们
  let mut boxes = vec![0.5f32; CAPACITY * 4];
  let mut scores = vec![0.99f32; CAPACITY];
  let mut classes = vec![999i32; CAPACITY];
  for (i, (bbox, score, class)) in items.iter().enumerate() {
    boxes[i * 4..(i + 1) * 4].copy_from_slice(bbox);
    scores[i] = *score;
    classes[i] = *class;
  }
  RawResult {
    boxes: arena.tensor(&[1, CAPACITY, 4], boxes).unwrap(),
    scores: arena.tensor(&[1, CAPACITY], scores).unwrap(),
    classes: arena.tensor(&[1, CAPACITY], classes).unwrap(),
    valid_detections: arena.tensor(&[1], vec![items.len() as i32]).unwrap(),
  }
}

impl Model for ScriptedModel {
  fn input_shape(&self) -> (u32, u32) {
    (32, 32)
  }

  async fn infer(&self, input: &PreparedInput, arena: &TensorArena) -> Result<RawResult, ModelError> {
    assert_eq!(input.tensor().shape(), &[1, 32, 32, 3]);
    self.calls.fetch_add(1, Ordering::SeqCst);
    let step = self
      .script
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| detect(vec![]));
    if !step.delay.is_zero() {
      tokio::time::sleep(step.delay).await;
    }
    match step.outcome {
      Outcome::Detect(items) => Ok(raw_result(arena, &items)),
      Outcome::Fail => Err(ModelError::Inference("scripted failure".to_string())),
      Outcome::FailAfterOutputs => {
        let _outputs = raw_result(arena, &[([0.1, 0.1, 0.2, 0.2], 0.5, 1)]);
        Err(ModelError::UnexpectedOutput("scripted failure".to_string()))
      }
      Outcome::Panic => {
        let _outputs = raw_result(arena, &[]);
        panic!("scripted panic");
      }
    }
  }
}

struct StubCapture {
  ready: Arc<AtomicBool>,
  frame: Arc<Frame>,
}

impl StubCapture {
  fn new(ready: bool) -> (Self, Arc<AtomicBool>) {
    let flag = Arc::new(AtomicBool::new(ready));
    let capture = Self {
      ready: flag.clone(),
      frame: Arc::new(Frame::new(RgbImage::new(FRAME_WIDTH, FRAME_HEIGHT), 0, 0)),
    };
    (capture, flag)
  }
}

impl CaptureSource for StubCapture {
  fn is_ready(&self) -> bool {
    self.ready.load(Ordering::SeqCst)
  }

  fn current_frame(&self) -> Result<Arc<Frame>, CaptureError> {
    if self.is_ready() {
      Ok(self.frame.clone())
    } else {
      Err(CaptureError::NotReady)
    }
  }
}

type TestPipeline = Pipeline<ScriptedModel, StubCapture, RecordingSurface>;

fn pipeline(config: PipelineConfig, steps: Vec<Step>) -> TestPipeline {
  let (capture, _) = StubCapture::new(true);
  let mut pipeline = Pipeline::new(config, capture, RecordingSurface::new());
  pipeline.install_model(ScriptedModel::new(steps));
  pipeline
}

async fn calls(pipeline: &TestPipeline) -> Vec<DrawCall> {
  pipeline.surface().lock().await.calls().to_vec()
}

fn count(calls: &[DrawCall], pred: impl Fn(&DrawCall) -> bool) -> usize {
  calls.iter().filter(|call| pred(call)).count()
}

#[tokio::test]
async fn tick_without_ready_capture_does_nothing() {
  let (capture, ready) = StubCapture::new(false);
  let mut pipeline: TestPipeline =
    Pipeline::new(PipelineConfig::default(), capture, RecordingSurface::new());
  pipeline.install_model(ScriptedModel::new([detect(vec![])]));

  assert_eq!(pipeline.tick(), TickOutcome::CaptureNotReady);
  pipeline.drain().await;
  assert!(calls(&pipeline).await.is_empty());
  assert_eq!(pipeline.arena().stats().allocated, 0);
  assert_eq!(pipeline.arena().stats().released, 0);

  ready.store(true, Ordering::SeqCst);
  assert_eq!(pipeline.tick(), TickOutcome::Launched(1));
  pipeline.drain().await;
  let summary = pipeline.summary();
  assert_eq!((summary.ticks, summary.idle_ticks), (2, 1));
  assert_eq!(summary.completed, 1);
}

#[tokio::test]
async fn tick_without_model_does_nothing() {
  let (capture, _) = StubCapture::new(true);
  let mut pipeline: TestPipeline =
    Pipeline::new(PipelineConfig::default(), capture, RecordingSurface::new());

  assert_eq!(pipeline.tick(), TickOutcome::ModelNotLoaded);
  pipeline.drain().await;
  assert!(calls(&pipeline).await.is_empty());
  assert_eq!(pipeline.summary().launched, 0);
  assert_eq!(pipeline.arena().stats().allocated, 0);
}

#[tokio::test]
async fn every_buffer_is_released_across_failures() {
  let person = ([0.1, 0.1, 0.5, 0.5], 0.9, 0);
  let steps = vec![
    detect(vec![person]),
    fail(),
    detect(vec![person, person]),
    fail(),
    detect(vec![]),
    fail(),
  ];
  let config = PipelineConfig::default().with_overlap(OverlapPolicy::Overlap);
  let mut pipeline = pipeline(config, steps);

  for _ in 0..6 {
    assert!(matches!(pipeline.tick(), TickOutcome::Launched(_)));
  }
  pipeline.drain().await;

  let summary = pipeline.summary();
  assert_eq!(summary.launched, 6);
  assert_eq!(summary.completed, 3);
  assert_eq!(summary.failed, 3);
  // 成功: 帧、缩放、归一化 + 4 个输出; 失败: 帧、缩放、归一化
  assert_eq!(summary.resources.allocated, 3 * 7 + 3 * 3);
  assert!(summary.resources.is_balanced());
}

#[tokio::test]
async fn outputs_are_released_when_inference_errors_or_panics() {
  let steps = vec![
    step(Outcome::FailAfterOutputs),
    step(Outcome::Panic),
    detect(vec![]),
  ];
  let config = PipelineConfig::default().with_overlap(OverlapPolicy::Overlap);
  let mut pipeline = pipeline(config, steps);

  for _ in 0..3 {
    assert!(matches!(pipeline.tick(), TickOutcome::Launched(_)));
  }
  pipeline.drain().await;

  let summary = pipeline.summary();
  assert_eq!(summary.failed, 2);
  assert_eq!(summary.completed, 1);
  // 每次运行: 帧、缩放、归一化 + 4 个输出
  assert_eq!(summary.resources.allocated, 3 * 7);
  assert!(summary.resources.is_balanced());
}

#[tokio::test]
async fn unknown_class_fails_the_run_and_blanks_the_overlay() {
  let mut pipeline = pipeline(
    PipelineConfig::default(),
    vec![detect(vec![([0.1, 0.1, 0.2, 0.2], 0.8, 80)])],
  );

  pipeline.tick();
  pipeline.drain().await;

  assert_eq!(pipeline.summary().failed, 1);
  assert_eq!(
    calls(&pipeline).await,
    [
      DrawCall::Resize {
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT
      },
      DrawCall::Clear,
      DrawCall::Present,
    ]
  );
  assert!(pipeline.arena().stats().is_balanced());
}

#[tokio::test]
async fn failed_run_removes_previous_boxes() {
  let person = ([0.1, 0.1, 0.5, 0.5], 0.9, 0);
  let mut pipeline = pipeline(PipelineConfig::default(), vec![detect(vec![person]), fail()]);

  pipeline.tick();
  pipeline.drain().await;
  let before = calls(&pipeline).await;
  assert_eq!(last_label(&before), Some("person:0.90"));

  pipeline.tick();
  pipeline.drain().await;
  let after = calls(&pipeline).await;

  assert_eq!(pipeline.summary().failed, 1);
  assert_eq!(
    after[before.len()..],
    [
      DrawCall::Resize {
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT
      },
      DrawCall::Clear,
      DrawCall::Present,
    ]
  );
  assert_eq!(count(&after, |call| matches!(call, DrawCall::Present)), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_failure_keeps_newer_overlay() {
  let steps = vec![
    Step {
      delay: Duration::from_millis(500),
      outcome: Outcome::Fail,
    },
    detect(vec![([0.5, 0.5, 1.0, 1.0], 0.8, 16)]),
  ];
  let mut pipeline = pipeline(PipelineConfig::default(), steps);

  assert_eq!(pipeline.tick(), TickOutcome::Launched(1));
  tokio::time::sleep(Duration::from_millis(10)).await;
  assert_eq!(pipeline.tick(), TickOutcome::Launched(2));
  pipeline.drain().await;
  let calls = calls(&pipeline).await;

  assert_eq!(pipeline.summary().failed, 1);
  assert_eq!(count(&calls, |call| matches!(call, DrawCall::Clear)), 1);
  assert_eq!(calls.last(), Some(&DrawCall::Present));
  assert_eq!(last_label(&calls), Some("dog:0.80"));
}

#[tokio::test]
async fn label_backgrounds_precede_all_text() {
  let mut pipeline = pipeline(
    PipelineConfig::default(),
    vec![detect(vec![
      ([0.25, 0.5, 0.75, 1.0], 0.87, 0),
      ([0.0, 0.0, 0.1, 0.1], 0.5, 79),
    ])],
  );

  pipeline.tick();
  pipeline.drain().await;
  let calls = calls(&pipeline).await;

  let last_fill = calls
    .iter()
    .rposition(|call| matches!(call, DrawCall::FillRect { .. }))
    .unwrap();
  let first_text = calls
    .iter()
    .position(|call| matches!(call, DrawCall::FillText { .. }))
    .unwrap();
  assert!(last_fill < first_text);
  assert_eq!(calls.last(), Some(&DrawCall::Present));

  assert!(calls.contains(&DrawCall::StrokeRect {
    rect: Rect::new(160.0, 240.0, 320.0, 240.0),
    color: Color::CYAN,
    line_width: 4.0,
  }));
  let texts: Vec<_> = calls
    .iter()
    .filter_map(|call| match call {
      DrawCall::FillText { text, .. } => Some(text.as_str()),
      _ => None,
    })
    .collect();
  assert_eq!(texts, ["person:0.87", "toothbrush:0.50"]);
}

#[tokio::test]
async fn zero_detections_only_clear_the_surface() {
  let mut pipeline = pipeline(PipelineConfig::default(), vec![detect(vec![])]);

  pipeline.tick();
  pipeline.drain().await;
  let calls = calls(&pipeline).await;

  assert_eq!(
    calls.first(),
    Some(&DrawCall::Resize {
      width: FRAME_WIDTH,
      height: FRAME_HEIGHT
    })
  );
  assert_eq!(count(&calls, |call| matches!(call, DrawCall::Clear)), 1);
  assert_eq!(
    count(&calls, |call| matches!(
      call,
      DrawCall::StrokeRect { .. } | DrawCall::FillRect { .. } | DrawCall::FillText { .. }
    )),
    0
  );
}

#[tokio::test]
async fn failed_model_load_ends_the_session() {
  let (capture, _) = StubCapture::new(true);
  let mut pipeline: TestPipeline =
    Pipeline::new(PipelineConfig::default(), capture, RecordingSurface::new());

  let loader = async {
    Err(ModelError::Load {
      location: "yolov5n/model.onnx".to_string(),
      reason: "not found".to_string(),
    })
  };
  let result = pipeline.run_until(loader, pending()).await;

  assert!(matches!(result, Err(PipelineError::ModelLoad(ModelError::Load { .. }))));
  assert!(calls(&pipeline).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn sampler_fires_on_cadence() {
  let (capture, _) = StubCapture::new(true);
  let mut pipeline: TestPipeline =
    Pipeline::new(PipelineConfig::default(), capture, RecordingSurface::new());

  let loader = async { Ok(ScriptedModel::new([])) };
  let shutdown = tokio::time::sleep(Duration::from_millis(1100));
  let summary = pipeline.run_until(loader, shutdown).await.unwrap();

  // 0, 333, 666, 999 ms
  assert_eq!(summary.ticks, 4);
  assert_eq!(summary.launched, 4);
  assert_eq!(summary.completed, 4);
  assert!(summary.resources.is_balanced());
}

#[tokio::test(start_paused = true)]
async fn max_ticks_stops_the_sampler() {
  let mut pipeline = pipeline(PipelineConfig::default().with_max_ticks(Some(2)), vec![]);

  let summary = pipeline
    .run_until(pending::<Result<ScriptedModel, ModelError>>(), pending())
    .await
    .unwrap();

  assert_eq!(summary.ticks, 2);
  assert_eq!(summary.completed, 2);
}

#[tokio::test(start_paused = true)]
async fn max_ticks_counts_launched_runs_only() {
  let (capture, _) = StubCapture::new(true);
  let mut pipeline: TestPipeline = Pipeline::new(
    PipelineConfig::default().with_max_ticks(Some(2)),
    capture,
    RecordingSurface::new(),
  );

  let loader = async {
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(ScriptedModel::new([]))
  };
  let summary = pipeline.run_until(loader, pending()).await.unwrap();

  // 0, 333 ms 模型未就绪; 666, 999 ms 启动运行
  assert_eq!(summary.ticks, 4);
  assert_eq!(summary.idle_ticks, 2);
  assert_eq!(summary.launched, 2);
  assert_eq!(summary.completed, 2);
}

#[tokio::test(start_paused = true)]
async fn idle_ticks_do_not_reach_max_ticks() {
  let (capture, _) = StubCapture::new(false);
  let mut pipeline: TestPipeline = Pipeline::new(
    PipelineConfig::default().with_max_ticks(Some(3)),
    capture,
    RecordingSurface::new(),
  );
  pipeline.install_model(ScriptedModel::new([]));

  let shutdown = tokio::time::sleep(Duration::from_millis(2100));
  let summary = pipeline
    .run_until(pending::<Result<ScriptedModel, ModelError>>(), shutdown)
    .await
    .unwrap();

  assert!(summary.ticks > 3);
  assert_eq!(summary.idle_ticks, summary.ticks);
  assert_eq!(summary.launched, 0);
}

#[tokio::test(start_paused = true)]
async fn slow_runs_overlap_with_later_ticks() {
  let slow = |item| Step {
    delay: Duration::from_millis(500),
    outcome: Outcome::Detect(vec![item]),
  };
  let item = ([0.1, 0.1, 0.2, 0.2], 0.6, 2);
  let mut pipeline = pipeline(
    PipelineConfig::default().with_max_ticks(Some(3)),
    vec![slow(item), slow(item), slow(item)],
  );

  let summary = pipeline
    .run_until(pending::<Result<ScriptedModel, ModelError>>(), pending())
    .await
    .unwrap();

  assert_eq!(summary.launched, 3);
  assert_eq!(summary.completed, 3);
  let presents = count(&calls(&pipeline).await, |call| matches!(call, DrawCall::Present));
  assert_eq!(presents, 3);
}

async fn stale_then_fresh(overlap: OverlapPolicy) -> (TestPipeline, Vec<DrawCall>) {
  let steps = vec![
    Step {
      delay: Duration::from_millis(500),
      outcome: Outcome::Detect(vec![([0.0, 0.0, 0.5, 0.5], 0.7, 15)]),
    },
    detect(vec![([0.5, 0.5, 1.0, 1.0], 0.8, 16)]),
  ];
  let mut pipeline = pipeline(PipelineConfig::default().with_overlap(overlap), steps);

  assert_eq!(pipeline.tick(), TickOutcome::Launched(1));
  tokio::time::sleep(Duration::from_millis(10)).await;
  assert_eq!(pipeline.tick(), TickOutcome::Launched(2));
  pipeline.drain().await;
  let calls = calls(&pipeline).await;
  (pipeline, calls)
}

fn last_label(calls: &[DrawCall]) -> Option<&str> {
  calls.iter().rev().find_map(|call| match call {
    DrawCall::FillText { text, .. } => Some(text.as_str()),
    _ => None,
  })
}

#[tokio::test(start_paused = true)]
async fn stale_result_is_dropped_after_newer_render() {
  let (pipeline, calls) = stale_then_fresh(OverlapPolicy::DropStale).await;

  let summary = pipeline.summary();
  assert_eq!(summary.completed, 1);
  assert_eq!(summary.discarded, 1);
  assert_eq!(count(&calls, |call| matches!(call, DrawCall::Present)), 1);
  assert_eq!(last_label(&calls), Some("dog:0.80"));
  assert!(summary.resources.is_balanced());
}

#[tokio::test(start_paused = true)]
async fn overlap_policy_keeps_last_write() {
  let (pipeline, calls) = stale_then_fresh(OverlapPolicy::Overlap).await;

  let summary = pipeline.summary();
  assert_eq!(summary.completed, 2);
  assert_eq!(summary.discarded, 0);
  assert_eq!(count(&calls, |call| matches!(call, DrawCall::Present)), 2);
  assert_eq!(last_label(&calls), Some("cat:0.70"));
}
