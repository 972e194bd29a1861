// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decode/bbox.rs - 边界框解码与还原
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

use crate::frame::CoordUnmapper;
use crate::geometry::{Anchor, Bbox};

/// 网络输入空间中的框 [xmin, ymin, xmax, ymax]
pub type NetBox = [f64; 4];

fn from_center(cx: f64, cy: f64, half_w: f64, half_h: f64) -> NetBox {
  [cx - half_w, cy - half_h, cx + half_w, cy + half_h]
}

/// SSD 框解码，偏移量先按 `std`、`mean` 反归一化
pub fn ssd_box(raw: [f32; 4], anchor: &Anchor, std: &[f32; 4], mean: &[f32; 4]) -> NetBox {
  let t = |i: usize| (raw[i] * std[i] + mean[i]) as f64;
  let cx = t(0) * anchor.w as f64 + anchor.cx as f64;
  let cy = t(1) * anchor.h as f64 + anchor.cy as f64;
  let half_w = t(2).exp() * anchor.w as f64 / 2.0;
  let half_h = t(3).exp() * anchor.h as f64 / 2.0;
  from_center(cx, cy, half_w, half_h)
}

/// S3FD 框解码，`variance` 为 [中心方差, 尺度方差]
pub fn s3fd_box(raw: [f32; 4], anchor: &Anchor, variance: &[f32; 2]) -> NetBox {
  let (aw, ah) = (anchor.w as f64, anchor.h as f64);
  let (v0, v1) = (variance[0] as f64, variance[1] as f64);
  let cx = anchor.cx as f64 + raw[0] as f64 * v0 * aw;
  let cy = anchor.cy as f64 + raw[1] as f64 * v0 * ah;
  let half_w = aw * (raw[2] as f64 * v1).exp() / 2.0;
  let half_h = ah * (raw[3] as f64 * v1).exp() / 2.0;
  from_center(cx, cy, half_w, half_h)
}

fn sigmoid(x: f32) -> f64 {
  1.0 / (1.0 + (-(x as f64)).exp())
}

/// YOLOv2/v3 框解码，先验宽高以网格为单位
pub fn yolo_box(raw: [f32; 4], grid_x: usize, grid_y: usize, anchor: [f32; 2], stride: f32) -> NetBox {
  let stride = stride as f64;
  let cx = (sigmoid(raw[0]) + grid_x as f64) * stride;
  let cy = (sigmoid(raw[1]) + grid_y as f64) * stride;
  let w = (raw[2] as f64).exp() * anchor[0] as f64 * stride;
  let h = (raw[3] as f64).exp() * anchor[1] as f64 * stride;
  from_center(cx, cy, w / 2.0, h / 2.0)
}

/// YOLOv5 框解码，先验宽高以像素为单位
pub fn yolo5_box(raw: [f32; 4], grid_x: usize, grid_y: usize, anchor: [f32; 2], stride: f32) -> NetBox {
  let stride = stride as f64;
  let cx = (2.0 * sigmoid(raw[0]) - 0.5 + grid_x as f64) * stride;
  let cy = (2.0 * sigmoid(raw[1]) - 0.5 + grid_y as f64) * stride;
  let w = (2.0 * sigmoid(raw[2])).powi(2) * anchor[0] as f64;
  let h = (2.0 * sigmoid(raw[3])).powi(2) * anchor[1] as f64;
  from_center(cx, cy, w / 2.0, h / 2.0)
}

/// 框还原后的取舍规则
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxRule {
  /// 丢弃反向的框与完全落在图像外的框，其余裁剪到图像内
  #[default]
  Clamp,
  /// 在 `Clamp` 基础上，右下角任一坐标不大于 0 时丢弃
  RejectNonPositiveMax,
}

/// 将网络空间的框还原到原图并裁剪
///
/// 返回的框满足 `0 <= xmin <= xmax <= width - 1`，y 方向同理。
pub fn finalize(net: NetBox, unmapper: &CoordUnmapper, rule: BoxRule) -> Option<Bbox> {
  let xmin = unmapper.x(net[0]);
  let ymin = unmapper.y(net[1]);
  let xmax = unmapper.x(net[2]);
  let ymax = unmapper.y(net[3]);

  if ![xmin, ymin, xmax, ymax].iter().all(|v| v.is_finite()) {
    return None;
  }
  if xmin > xmax || ymin > ymax {
    return None;
  }
  if rule == BoxRule::RejectNonPositiveMax && (xmax <= 0.0 || ymax <= 0.0) {
    return None;
  }

  let (max_x, max_y) = unmapper.limits();
  if xmax < 0.0 || ymax < 0.0 || xmin > max_x || ymin > max_y {
    return None;
  }

  Some(Bbox::new(
    xmin.clamp(0.0, max_x) as f32,
    ymin.clamp(0.0, max_y) as f32,
    xmax.clamp(0.0, max_x) as f32,
    ymax.clamp(0.0, max_y) as f32,
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::ImageMeta;
  use approx::assert_relative_eq;

  #[test]
  fn ssd_zero_offsets_reproduce_anchor() {
    let anchor = Anchor::new(4.0, 4.0, 30.0, 30.0);
    let b = ssd_box([0.0; 4], &anchor, &[0.1, 0.1, 0.2, 0.2], &[0.0; 4]);
    assert_eq!(b, [-11.0, -11.0, 19.0, 19.0]);
  }

  #[test]
  fn s3fd_applies_variance() {
    let anchor = Anchor::new(8.0, 8.0, 16.0, 16.0);
    let b = s3fd_box([1.0, 0.0, 0.0, 0.0], &anchor, &[0.1, 0.2]);
    assert_relative_eq!(b[0], 1.6, epsilon = 1e-6);
    assert_relative_eq!(b[2], 17.6, epsilon = 1e-6);
  }

  #[test]
  fn yolo_center_cell_box() {
    let b = yolo_box([0.0; 4], 0, 0, [1.0, 1.0], 32.0);
    assert_eq!(b, [0.0, 0.0, 32.0, 32.0]);
  }

  #[test]
  fn yolo5_zero_offsets() {
    // 中心 (2 * 0.5 - 0.5 + 1) * 8 = 12，宽高 (2 * 0.5)^2 * 10 = 10
    let b = yolo5_box([0.0; 4], 1, 1, [10.0, 10.0], 8.0);
    assert_eq!(b, [7.0, 7.0, 17.0, 17.0]);
  }

  #[test]
  fn finalize_clamps_into_image() {
    let u = ImageMeta::new(100, 100, 200, 100).unmapper();
    let b = finalize([-10.0, 20.0, 120.0, 80.0], &u, BoxRule::Clamp).unwrap();
    assert_eq!(b, Bbox::new(0.0, 20.0, 199.0, 80.0));
  }

  #[test]
  fn finalize_rejects_inverted_and_outside() {
    let u = ImageMeta::new(100, 100, 100, 100).unmapper();
    assert!(finalize([50.0, 10.0, 40.0, 20.0], &u, BoxRule::Clamp).is_none());
    assert!(finalize([-30.0, 10.0, -5.0, 20.0], &u, BoxRule::Clamp).is_none());
    assert!(finalize([10.0, 120.0, 20.0, 130.0], &u, BoxRule::Clamp).is_none());
    assert!(finalize([10.0, f64::NAN, 20.0, 30.0], &u, BoxRule::Clamp).is_none());
  }

  #[test]
  fn non_positive_max_rule() {
    let u = ImageMeta::new(100, 100, 100, 100).unmapper();
    let net = [-10.0, -10.0, 0.0, 5.0];
    assert!(finalize(net, &u, BoxRule::Clamp).is_some());
    assert!(finalize(net, &u, BoxRule::RejectNonPositiveMax).is_none());
  }
}
