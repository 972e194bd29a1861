// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decode/topk.rs - 分类结果 top-k 选择
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

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::model::ClassResult;

#[derive(Debug, Clone, Copy)]
struct Entry {
  score: f32,
  index: usize,
}

// 分数高者更大，分数相同时下标小者更大
impl Ord for Entry {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .score
      .total_cmp(&other.score)
      .then_with(|| other.index.cmp(&self.index))
  }
}

impl PartialOrd for Entry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl PartialEq for Entry {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Entry {}

/// 选出分数最高的 `k` 个类别，按分数降序排列
///
/// `k` 为 1 时线性扫描；否则维护容量为 `k` 的小顶堆，
/// 只有严格大于堆顶时才替换。分数相同时下标小者在前。
pub fn select(scores: &[f32], k: usize) -> Vec<ClassResult> {
  if k == 0 || scores.is_empty() {
    return Vec::new();
  }

  if k == 1 {
    let best = scores
      .iter()
      .enumerate()
      .map(|(index, score)| Entry { score: *score, index })
      .reduce(|best, e| if e > best { e } else { best });
    return best
      .map(|e| ClassResult::new(e.index as u32, e.score))
      .into_iter()
      .collect();
  }

  let mut heap: BinaryHeap<Reverse<Entry>> = BinaryHeap::with_capacity(k + 1);
  for (index, score) in scores.iter().enumerate() {
    let entry = Entry { score: *score, index };
    if heap.len() < k {
      heap.push(Reverse(entry));
    } else if let Some(mut top) = heap.peek_mut() {
      if entry > top.0 {
        *top = Reverse(entry);
      }
    }
  }

  heap
    .into_sorted_vec()
    .into_iter()
    .map(|Reverse(e)| ClassResult::new(e.index as u32, e.score))
    .collect()
}
