// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decode/anchor.rs - 先验框生成与缓存
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

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::config::{S3fdParams, SsdParams};
use crate::geometry::Anchor;

/// 按层与特征图尺寸生成 SSD 先验框
///
/// 每个网格单元依次生成：边长为 `min_size` 的正方形、边长为
/// `sqrt(min_size * max_size)` 的正方形，以及每个非零宽高比 r 对应的
/// `(min_size * sqrt(r), min_size / sqrt(r))`。
/// 先验框序号为 `(h * width + w) * anchors_per_cell + a`。
pub fn ssd_anchors(params: &SsdParams, layer: usize, height: usize, width: usize) -> Vec<Anchor> {
  let step = params.step[layer];
  let [min_size, max_size] = params.anchor_size[layer];
  let ratios = params.anchor_ratio[layer];
  let [offset_y, offset_x] = params.offset;
  let big = (min_size * max_size).sqrt();

  let mut anchors = Vec::with_capacity(height * width * params.anchors_per_cell(layer));
  for h in 0..height {
    for w in 0..width {
      let cy = (h as f32 + offset_y) * step;
      let cx = (w as f32 + offset_x) * step;
      anchors.push(Anchor::new(cx, cy, min_size, min_size));
      anchors.push(Anchor::new(cx, cy, big, big));
      for ratio in ratios.iter().filter(|r| **r != 0.0) {
        let sr = ratio.sqrt();
        anchors.push(Anchor::new(cx, cy, min_size * sr, min_size / sr));
      }
    }
  }
  anchors
}

/// S3FD 每个网格单元一个先验框，中心固定偏移半个网格
///
/// `min_size` 每项按 (高, 宽) 排列。
pub fn s3fd_anchors(params: &S3fdParams, layer: usize, height: usize, width: usize) -> Vec<Anchor> {
  let step = params.step[layer];
  let [size_h, size_w] = params.min_size[layer];
  (0..height)
    .flat_map(|h| {
      (0..width).map(move |w| {
        Anchor::new((w as f32 + 0.5) * step, (h as f32 + 0.5) * step, size_w, size_h)
      })
    })
    .collect()
}

/// YOLO 的一个预测槽位：网格坐标与该槽位的先验宽高
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloSlot {
  pub grid_x: usize,
  pub grid_y: usize,
  pub index: usize,
  pub anchor_w: f32,
  pub anchor_h: f32,
}

/// 按 (h, w, k) 顺序遍历 YOLO 特征图的全部预测槽位
pub fn yolo_slots(
  height: usize,
  width: usize,
  anchors: &[[f32; 2]],
) -> impl Iterator<Item = YoloSlot> + '_ {
  (0..height).flat_map(move |h| {
    (0..width).flat_map(move |w| {
      anchors.iter().enumerate().map(move |(k, [aw, ah])| YoloSlot {
        grid_x: w,
        grid_y: h,
        index: k,
        anchor_w: *aw,
        anchor_h: *ah,
      })
    })
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorFamily {
  Ssd,
  S3fd,
}

/// 先验框缓存键：架构、层号与该层特征图分辨率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorKey {
  pub family: AnchorFamily,
  pub layer: usize,
  pub height: usize,
  pub width: usize,
}

/// 线程安全的先验框缓存
///
/// 同一个键只会保留第一次写入的结果，并发填充时生成结果相同，
/// 后写入者直接取用已有条目。
#[derive(Debug, Default)]
pub struct AnchorCache {
  inner: RwLock<HashMap<AnchorKey, Arc<[Anchor]>>>,
}

impl AnchorCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get_or_generate<F>(&self, key: AnchorKey, generate: F) -> Arc<[Anchor]>
  where
    F: FnOnce() -> Vec<Anchor>,
  {
    if let Some(anchors) = self
      .inner
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(&key)
    {
      return Arc::clone(anchors);
    }

    let anchors: Arc<[Anchor]> = generate().into();
    debug!(
      "生成先验框: {:?} 第 {} 层 {}x{}, 共 {} 个",
      key.family,
      key.layer,
      key.height,
      key.width,
      anchors.len()
    );
    let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(map.entry(key).or_insert(anchors))
  }

  pub fn len(&self) -> usize {
    self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
