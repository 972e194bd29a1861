// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

#![allow(dead_code)]

use shanan_perception::{Detection, ImageMeta, Layout, Shape, TensorBuffer};

/// 线性同余伪随机数，保证测试数据可复现
pub struct Lcg(u64);

impl Lcg {
  pub fn new(seed: u64) -> Self {
    Self(seed)
  }

  /// [0, 1) 区间的浮点数
  pub fn next_f32(&mut self) -> f32 {
    self.0 = self
      .0
      .wrapping_mul(6_364_136_223_846_793_005)
      .wrapping_add(1_442_695_040_888_963_407);
    (self.0 >> 40) as f32 / (1u64 << 24) as f32
  }

  pub fn range(&mut self, lo: f32, hi: f32) -> f32 {
    lo + (hi - lo) * self.next_f32()
  }
}

/// 按 (h, w, c) 取值构造紧密排列的 NHWC 张量
pub fn nhwc<F>(height: usize, width: usize, channel: usize, f: F) -> TensorBuffer
where
  F: Fn(usize, usize, usize) -> f32,
{
  let shape = Shape::new(1, height, width, channel);
  let mut data = Vec::with_capacity(shape.len());
  for h in 0..height {
    for w in 0..width {
      for c in 0..channel {
        data.push(f(h, w, c));
      }
    }
  }
  TensorBuffer::new(data, Layout::Nhwc, shape).unwrap()
}

/// 同样的取值，按 NCHW 排列并在宽度方向填充 `pad` 列
pub fn nchw_padded<F>(height: usize, width: usize, channel: usize, pad: usize, f: F) -> TensorBuffer
where
  F: Fn(usize, usize, usize) -> f32,
{
  let shape = Shape::new(1, height, width, channel);
  let aligned = Shape::new(1, height, width + pad, channel);
  let mut data = vec![f32::NAN; aligned.len()];
  for c in 0..channel {
    for h in 0..height {
      for w in 0..width {
        data[(c * height + h) * (width + pad) + w] = f(h, w, c);
      }
    }
  }
  TensorBuffer::with_aligned(data, Layout::Nchw, shape, aligned).unwrap()
}

/// 所有框都落在原图范围内且方向正确
pub fn assert_inside(detections: &[Detection], image: &ImageMeta) {
  let max_x = image.original_width as f32 - 1.0;
  let max_y = image.original_height as f32 - 1.0;
  for d in detections {
    let b = &d.bbox;
    assert!(0.0 <= b.xmin && b.xmin <= b.xmax && b.xmax <= max_x, "{:?}", b);
    assert!(0.0 <= b.ymin && b.ymin <= b.ymax && b.ymax <= max_y, "{:?}", b);
  }
}

/// 检测结果按置信度降序排列
pub fn assert_sorted(detections: &[Detection]) {
  assert!(
    detections.windows(2).all(|w| w[0].score >= w[1].score),
    "结果未按置信度降序排列"
  );
}
