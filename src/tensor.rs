// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 模型输出张量视图
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

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TensorError {
  #[error("缓冲区长度不足: 期望至少 {expected}, 实际为 {actual}")]
  BufferTooSmall { expected: usize, actual: usize },
  #[error("对齐形状 {aligned:?} 小于逻辑形状 {logical:?}")]
  AlignedSmallerThanLogical { logical: Shape, aligned: Shape },
}

/// 张量内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Layout {
  #[default]
  Nhwc,
  Nchw,
}

/// 四维形状，字段按语义命名，与布局无关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Shape {
  pub batch: usize,
  pub height: usize,
  pub width: usize,
  pub channel: usize,
}

impl Shape {
  pub const fn new(batch: usize, height: usize, width: usize, channel: usize) -> Self {
    Self {
      batch,
      height,
      width,
      channel,
    }
  }

  /// 按布局顺序给出的维度构造形状，NHWC 为 [n, h, w, c]，NCHW 为 [n, c, h, w]
  pub fn from_dims(layout: Layout, dims: [usize; 4]) -> Self {
    match layout {
      Layout::Nhwc => Self::new(dims[0], dims[1], dims[2], dims[3]),
      Layout::Nchw => Self::new(dims[0], dims[2], dims[3], dims[1]),
    }
  }

  pub fn len(&self) -> usize {
    self.batch * self.height * self.width * self.channel
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn covers(&self, other: &Shape) -> bool {
    self.batch >= other.batch
      && self.height >= other.height
      && self.width >= other.width
      && self.channel >= other.channel
  }
}

/// 推理输出缓冲区
///
/// 加速器写入的内存在 CPU 读取前需要使缓存失效，
/// 对于普通内存该操作为空。
pub trait OutputBuffer {
  fn invalidate_cpu_cache(&self) {}
  fn as_f32(&self) -> &[f32];
}

impl OutputBuffer for [f32] {
  fn as_f32(&self) -> &[f32] {
    self
  }
}

impl OutputBuffer for Vec<f32> {
  fn as_f32(&self) -> &[f32] {
    self
  }
}

/// 单个特征图的原始输出视图
///
/// `shape` 为逻辑形状，`aligned` 为实际内存步长所对应的形状。
/// 所有索引都经由对齐形状计算，不能假设逻辑宽度等于内存步长。
#[derive(Debug, Clone, Copy)]
pub struct RawTensor<'a> {
  data: &'a [f32],
  layout: Layout,
  shape: Shape,
  aligned: Shape,
}

impl<'a> RawTensor<'a> {
  pub fn new(data: &'a [f32], layout: Layout, shape: Shape) -> Result<Self, TensorError> {
    Self::with_aligned(data, layout, shape, shape)
  }

  pub fn with_aligned(
    data: &'a [f32],
    layout: Layout,
    shape: Shape,
    aligned: Shape,
  ) -> Result<Self, TensorError> {
    if !aligned.covers(&shape) {
      return Err(TensorError::AlignedSmallerThanLogical {
        logical: shape,
        aligned,
      });
    }
    if data.len() < aligned.len() {
      return Err(TensorError::BufferTooSmall {
        expected: aligned.len(),
        actual: data.len(),
      });
    }
    Ok(Self {
      data,
      layout,
      shape,
      aligned,
    })
  }

  /// 从推理输出缓冲区构造视图，读取前先使 CPU 缓存失效
  pub fn from_buffer<B: OutputBuffer + ?Sized>(
    buffer: &'a B,
    layout: Layout,
    shape: Shape,
    aligned: Shape,
  ) -> Result<Self, TensorError> {
    buffer.invalidate_cpu_cache();
    Self::with_aligned(buffer.as_f32(), layout, shape, aligned)
  }

  pub fn layout(&self) -> Layout {
    self.layout
  }

  pub fn shape(&self) -> Shape {
    self.shape
  }

  pub fn aligned_shape(&self) -> Shape {
    self.aligned
  }

  /// 特征图的 (高, 宽)，任一维度为 0 时返回 None
  pub fn grid(&self) -> Option<(usize, usize)> {
    let (h, w) = (self.shape.height, self.shape.width);
    if h == 0 || w == 0 || self.aligned.height == 0 || self.aligned.width == 0 {
      None
    } else {
      Some((h, w))
    }
  }

  pub fn offset_at(&self, n: usize, h: usize, w: usize, c: usize) -> usize {
    let a = &self.aligned;
    match self.layout {
      Layout::Nhwc => ((n * a.height + h) * a.width + w) * a.channel + c,
      Layout::Nchw => ((n * a.channel + c) * a.height + h) * a.width + w,
    }
  }

  /// 第 0 个批次中 (h, w, c) 位置的偏移
  pub fn offset(&self, h: usize, w: usize, c: usize) -> usize {
    self.offset_at(0, h, w, c)
  }

  pub fn get(&self, h: usize, w: usize, c: usize) -> f32 {
    self.data[self.offset(h, w, c)]
  }

  /// 按布局顺序遍历全部逻辑元素，跳过对齐填充
  pub fn logical_values(&self) -> impl Iterator<Item = f32> + '_ {
    let s = self.shape;
    let (outer, inner) = match self.layout {
      Layout::Nhwc => (s.height, s.channel),
      Layout::Nchw => (s.channel, s.width),
    };
    let middle = match self.layout {
      Layout::Nhwc => s.width,
      Layout::Nchw => s.height,
    };
    (0..s.batch).flat_map(move |n| {
      (0..outer).flat_map(move |o| {
        (0..middle).flat_map(move |m| {
          (0..inner).map(move |i| {
            let idx = match self.layout {
              Layout::Nhwc => self.offset_at(n, o, m, i),
              Layout::Nchw => self.offset_at(n, m, i, o),
            };
            self.data[idx]
          })
        })
      })
    })
  }
}

/// 持有数据的张量，用于离线回放与测试
#[derive(Debug, Clone)]
pub struct TensorBuffer {
  data: Vec<f32>,
  layout: Layout,
  shape: Shape,
  aligned: Shape,
}

impl TensorBuffer {
  pub fn new(data: Vec<f32>, layout: Layout, shape: Shape) -> Result<Self, TensorError> {
    Self::with_aligned(data, layout, shape, shape)
  }

  pub fn with_aligned(
    data: Vec<f32>,
    layout: Layout,
    shape: Shape,
    aligned: Shape,
  ) -> Result<Self, TensorError> {
    RawTensor::with_aligned(&data, layout, shape, aligned)?;
    Ok(Self {
      data,
      layout,
      shape,
      aligned,
    })
  }

  pub fn view(&self) -> RawTensor<'_> {
    self.invalidate_cpu_cache();
    RawTensor {
      data: &self.data,
      layout: self.layout,
      shape: self.shape,
      aligned: self.aligned,
    }
  }
}

impl OutputBuffer for TensorBuffer {
  fn as_f32(&self) -> &[f32] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn nhwc_offset_uses_aligned_width() {
    // 逻辑宽度 3，对齐宽度 4
    let shape = Shape::new(1, 2, 3, 2);
    let aligned = Shape::new(1, 2, 4, 2);
    let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
    let t = RawTensor::with_aligned(&data, Layout::Nhwc, shape, aligned).unwrap();
    assert_eq!(t.offset(1, 0, 0), 8);
    assert_eq!(t.get(1, 2, 1), 13.0);
  }

  #[test]
  fn nchw_offset_walks_planes() {
    let shape = Shape::from_dims(Layout::Nchw, [1, 3, 2, 2]);
    assert_eq!(shape, Shape::new(1, 2, 2, 3));
    let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let t = RawTensor::new(&data, Layout::Nchw, shape).unwrap();
    assert_eq!(t.get(0, 0, 1), 4.0);
    assert_eq!(t.get(1, 1, 2), 11.0);
  }

  #[test]
  fn logical_values_skip_padding() {
    let shape = Shape::new(1, 2, 2, 1);
    let aligned = Shape::new(1, 2, 3, 1);
    let data = vec![1.0, 2.0, -1.0, 3.0, 4.0, -1.0];
    let t = RawTensor::with_aligned(&data, Layout::Nhwc, shape, aligned).unwrap();
    let values: Vec<f32> = t.logical_values().collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
  }

  #[test]
  fn short_buffer_is_rejected() {
    let data = vec![0.0; 5];
    let err = RawTensor::new(&data, Layout::Nhwc, Shape::new(1, 2, 3, 1)).unwrap_err();
    assert_eq!(
      err,
      TensorError::BufferTooSmall {
        expected: 6,
        actual: 5
      }
    );
  }

  #[test]
  fn zero_sized_grid_has_no_dims() {
    let data: Vec<f32> = Vec::new();
    let t = RawTensor::new(&data, Layout::Nhwc, Shape::new(1, 0, 4, 4)).unwrap();
    assert!(t.grid().is_none());
  }
}
