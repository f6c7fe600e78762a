// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/v4l_input.rs - V4L 摄像头输入
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{Frame, RGB_CHANNELS},
  input::{CaptureError, CaptureSource},
};

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid query parameter: {0}")]
  InvalidQuery(String),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
  #[error("Frame decode error: {0}")]
  Decode(String),
}

const V4L_DEFAULT_DEVICE: &str = "/dev/video0";
const V4L_BUFFER_COUNT: u32 = 4;

#[derive(Default)]
struct Shared {
  latest: Mutex<Option<Arc<Frame>>>,
  failure: Mutex<Option<String>>,
  ready: AtomicBool,
  stop: AtomicBool,
}

/// V4L2 摄像头
///
/// 后台线程持续取帧，只保留最新的一帧；第一帧解码成功后才算就绪。
pub struct V4lInput {
  device_path: String,
  shared: Arc<Shared>,
  worker: Option<JoinHandle<()>>,
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemaMismatch);
    }

    // v4l:///dev/video0?width=1920&height=1080
    let device_path = if url.path().is_empty() || url.path() == "/" {
      V4L_DEFAULT_DEVICE.to_string()
    } else {
      url.path().to_string()
    };

    let mut requested = (None, None);
    for (key, value) in url.query_pairs() {
      let parsed = || {
        value
          .parse::<u32>()
          .map_err(|_| V4lInputError::InvalidQuery(format!("{}={}", key, value)))
      };
      match key.as_ref() {
        "width" => requested.0 = Some(parsed()?),
        "height" => requested.1 = Some(parsed()?),
        _ => {}
      }
    }

    let device = Device::with_path(&device_path)?;
    let mut format = device.format()?;
    format.fourcc = FourCC::new(b"MJPG");
    if let Some(width) = requested.0 {
      format.width = width;
    }
    if let Some(height) = requested.1 {
      format.height = height;
    }
    let format = device.set_format(&format)?;
    let pixel_format = PixelFormat::from_fourcc(format.fourcc)?;
    info!(
      "打开摄像头 {}: {}x{} {}",
      device_path, format.width, format.height, format.fourcc
    );

    let shared = Arc::new(Shared::default());
    let worker = {
      let shared = shared.clone();
      let (width, height) = (format.width, format.height);
      std::thread::Builder::new()
        .name("v4l-capture".to_string())
        .spawn(move || capture_loop(device, pixel_format, width, height, shared))?
    };

    Ok(V4lInput {
      device_path,
      shared,
      worker: Some(worker),
    })
  }
}

impl CaptureSource for V4lInput {
  fn is_ready(&self) -> bool {
    self.shared.ready.load(Ordering::Acquire)
  }

  fn current_frame(&self) -> Result<Arc<Frame>, CaptureError> {
    if let Some(failure) = lock(&self.shared.failure).as_ref() {
      return Err(CaptureError::Stopped(failure.clone()));
    }
    lock(&self.shared.latest).clone().ok_or(CaptureError::NotReady)
  }
}

impl Drop for V4lInput {
  fn drop(&mut self) {
    self.shared.stop.store(true, Ordering::Release);
    if let Some(worker) = self.worker.take()
      && worker.join().is_err()
    {
      warn!("摄像头 {} 采集线程异常退出", self.device_path);
    }
  }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
  Mjpeg,
  Yuyv,
  Rgb24,
}

impl PixelFormat {
  fn from_fourcc(fourcc: FourCC) -> Result<Self, V4lInputError> {
    match &fourcc.repr {
      b"MJPG" => Ok(PixelFormat::Mjpeg),
      b"YUYV" => Ok(PixelFormat::Yuyv),
      b"RGB3" => Ok(PixelFormat::Rgb24),
      _ => Err(V4lInputError::UnsupportedPixelFormat(fourcc.to_string())),
    }
  }

  fn decode(&self, buf: &[u8], width: u32, height: u32) -> Result<RgbImage, V4lInputError> {
    match self {
      PixelFormat::Mjpeg => image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
        .map(|image| image.to_rgb8())
        .map_err(|e| V4lInputError::Decode(e.to_string())),
      PixelFormat::Yuyv => yuyv_to_rgb(buf, width, height),
      PixelFormat::Rgb24 => {
        let size = RGB_CHANNELS * width as usize * height as usize;
        buf
          .get(..size)
          .and_then(|data| RgbImage::from_raw(width, height, data.to_vec()))
          .ok_or_else(|| V4lInputError::Decode(format!("缓冲区长度 {} 小于 {}", buf.len(), size)))
      }
    }
  }
}

fn capture_loop(mut device: Device, format: PixelFormat, width: u32, height: u32, shared: Arc<Shared>) {
  let mut stream = match v4l::io::mmap::Stream::with_buffers(
    &mut device,
    v4l::buffer::Type::VideoCapture,
    V4L_BUFFER_COUNT,
  ) {
    Ok(stream) => stream,
    Err(e) => {
      error!("无法创建采集流: {}", e);
      *lock(&shared.failure) = Some(e.to_string());
      return;
    }
  };

  let start = Instant::now();
  let mut index = 0u64;
  while !shared.stop.load(Ordering::Acquire) {
    let buf = match stream.next() {
      Ok((buf, _meta)) => buf,
      Err(e) => {
        error!("采集失败: {}", e);
        *lock(&shared.failure) = Some(e.to_string());
        break;
      }
    };

    match format.decode(buf, width, height) {
      Ok(image) => {
        let frame = Frame::new(image, index, start.elapsed().as_millis() as u64);
        *lock(&shared.latest) = Some(Arc::new(frame));
        if !shared.ready.swap(true, Ordering::AcqRel) {
          info!("摄像头已就绪");
        }
        index += 1;
      }
      Err(e) => warn!("丢弃无法解码的帧: {}", e),
    }
  }
  debug!("采集线程退出, 共 {} 帧", index);
}

/// YUYV (YUV 4:2:2) 转 RGB，BT.601
fn yuyv_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<RgbImage, V4lInputError> {
  let pixels = width as usize * height as usize;
  if buf.len() < pixels * 2 {
    return Err(V4lInputError::Decode(format!(
      "缓冲区长度 {} 小于 {}",
      buf.len(),
      pixels * 2
    )));
  }

  let mut rgb = Vec::with_capacity(pixels * RGB_CHANNELS);
  for chunk in buf[..pixels * 2].chunks_exact(4) {
    let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
    for y in [y0, y1] {
      rgb.extend_from_slice(&yuv_to_rgb(y, u, v));
    }
  }

  RgbImage::from_raw(width, height, rgb)
    .ok_or_else(|| V4lInputError::Decode("YUYV 转换后长度不匹配".to_string()))
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
  let y = y as f32;
  let u = u as f32 - 128.0;
  let v = v as f32 - 128.0;
  let r = y + 1.402 * v;
  let g = y - 0.344_136 * u - 0.714_136 * v;
  let b = y + 1.772 * u;
  [
    r.round().clamp(0.0, 255.0) as u8,
    g.round().clamp(0.0, 255.0) as u8,
    b.round().clamp(0.0, 255.0) as u8,
  ]
}
