// 该文件是 Shanan （山南西风） 项目的一部分。
// src/reclaim.rs - 单次运行的资源回收
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

use tracing::{error, trace};

use crate::tensor::{ResourceStats, TensorArena};

/// 一次运行的回收作用域
///
/// 运行中的所有张量都从 `arena()` 分配。作用域必须最先创建、最后丢弃，
/// 丢弃时账本若不平衡则记录错误。
pub struct RunScope {
  generation: u64,
  arena: TensorArena,
}

impl RunScope {
  pub fn new(parent: &TensorArena, generation: u64) -> Self {
    Self {
      generation,
      arena: parent.scope(),
    }
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn arena(&self) -> &TensorArena {
    &self.arena
  }

  pub fn stats(&self) -> ResourceStats {
    self.arena.stats()
  }
}

impl Drop for RunScope {
  fn drop(&mut self) {
    let stats = self.arena.stats();
    if stats.is_balanced() {
      trace!("运行 #{} 资源已全部回收: {}", self.generation, stats);
    } else {
      error!("运行 #{} 结束时仍有张量未释放: {}", self.generation, stats);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scope_tracks_only_its_own_run() {
    let arena = TensorArena::new();
    let outside = arena.from_fn(&[3], |_| 0u8);

    let scope = RunScope::new(&arena, 7);
    let inside = scope.arena().from_fn(&[3], |_| 0f32);
    assert_eq!(scope.generation(), 7);
    assert_eq!(scope.stats().live(), 1);
    drop(inside);
    assert!(scope.stats().is_balanced());
    drop(scope);

    assert_eq!(arena.stats().live(), 1);
    drop(outside);
    assert!(arena.stats().is_balanced());
  }
}
