// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 带分配账本的张量
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
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
  #[error("张量形状 {shape:?} 需要 {expected} 个元素, 实际为 {actual}")]
  ShapeMismatch {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
  #[error("无法在第 {axis} 维插入新维度, 张量维数为 {rank}")]
  InvalidAxis { axis: usize, rank: usize },
}

/// 分配与释放计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceStats {
  pub allocated: u64,
  pub released: u64,
}

impl ResourceStats {
  /// 尚未释放的张量数量
  pub fn live(&self) -> u64 {
    self.allocated.saturating_sub(self.released)
  }

  pub fn is_balanced(&self) -> bool {
    self.allocated == self.released
  }
}

impl fmt::Display for ResourceStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "分配 {} / 释放 {} / 存活 {}",
      self.allocated,
      self.released,
      self.live()
    )
  }
}

#[derive(Debug, Default)]
struct Ledger {
  allocated: AtomicU64,
  released: AtomicU64,
  parent: Option<Arc<Ledger>>,
}

impl Ledger {
  fn record_alloc(&self) {
    self.allocated.fetch_add(1, Ordering::AcqRel);
    if let Some(parent) = &self.parent {
      parent.record_alloc();
    }
  }

  fn record_release(&self) {
    self.released.fetch_add(1, Ordering::AcqRel);
    if let Some(parent) = &self.parent {
      parent.record_release();
    }
  }

  fn stats(&self) -> ResourceStats {
    ResourceStats {
      allocated: self.allocated.load(Ordering::Acquire),
      released: self.released.load(Ordering::Acquire),
    }
  }
}

/// 张量分配器
///
/// 所有经由同一个 `TensorArena` 分配的张量共享一本账本。`scope` 创建的子分配器
/// 拥有独立账本，同时把每次分配与释放上报给父账本。
#[derive(Debug, Clone, Default)]
pub struct TensorArena {
  ledger: Arc<Ledger>,
}

impl TensorArena {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn scope(&self) -> TensorArena {
    TensorArena {
      ledger: Arc::new(Ledger {
        parent: Some(self.ledger.clone()),
        ..Ledger::default()
      }),
    }
  }

  pub fn stats(&self) -> ResourceStats {
    self.ledger.stats()
  }

  pub fn tensor<T>(&self, shape: &[usize], data: Vec<T>) -> Result<Tensor<T>, TensorError> {
    let expected = shape.iter().product::<usize>();
    if expected != data.len() {
      return Err(TensorError::ShapeMismatch {
        shape: shape.to_vec(),
        expected,
        actual: data.len(),
      });
    }
    Ok(Tensor::new(shape.to_vec(), data, self.ledger.clone()))
  }

  pub fn from_fn<T>(&self, shape: &[usize], f: impl FnMut(usize) -> T) -> Tensor<T> {
    let len = shape.iter().product::<usize>();
    let data = (0..len).map(f).collect();
    Tensor::new(shape.to_vec(), data, self.ledger.clone())
  }
}

/// 一块数值缓冲区
///
/// 张量被丢弃即视为释放，所有权保证每块缓冲区恰好释放一次。
pub struct Tensor<T> {
  shape: Vec<usize>,
  data: Vec<T>,
  ledger: Arc<Ledger>,
}

impl<T> Tensor<T> {
  fn new(shape: Vec<usize>, data: Vec<T>, ledger: Arc<Ledger>) -> Self {
    ledger.record_alloc();
    Self {
      shape,
      data,
      ledger,
    }
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn rank(&self) -> usize {
    self.shape.len()
  }

  pub fn data(&self) -> &[T] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// 在 `axis` 处插入长度为 1 的维度，不产生新的分配
  pub fn expand_dims(mut self, axis: usize) -> Result<Self, TensorError> {
    if axis > self.shape.len() {
      return Err(TensorError::InvalidAxis {
        axis,
        rank: self.shape.len(),
      });
    }
    self.shape.insert(axis, 1);
    Ok(self)
  }

  /// 逐元素变换，结果记入同一本账本
  pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Tensor<U> {
    let data = self.data.iter().map(f).collect();
    Tensor::new(self.shape.clone(), data, self.ledger.clone())
  }

  pub fn release(self) {
    drop(self)
  }
}

impl<T> Drop for Tensor<T> {
  fn drop(&mut self) {
    self.ledger.record_release();
  }
}

impl<T> fmt::Debug for Tensor<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Tensor")
      .field("shape", &self.shape)
      .field("len", &self.data.len())
      .finish()
  }
}
