// 该文件是 Shanan （山南西风） 项目的一部分。
// src/geometry.rs - 先验框与边界框
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

use serde::Serialize;

/// 先验框：中心点与宽高，坐标位于网络输入分辨率的像素空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
}

impl Anchor {
  pub const fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self { cx, cy, w, h }
  }
}

/// 轴对齐边界框 [x_min, y_min, x_max, y_max]，位于原图像素空间
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bbox {
  pub xmin: f32,
  pub ymin: f32,
  pub xmax: f32,
  pub ymax: f32,
}

impl Bbox {
  pub const fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
    Self {
      xmin,
      ymin,
      xmax,
      ymax,
    }
  }

  pub fn width(&self) -> f32 {
    self.xmax - self.xmin
  }

  pub fn height(&self) -> f32 {
    self.ymax - self.ymin
  }

  /// 面积，反向的框面积为 0
  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  /// 计算两个边界框的 IoU，任一框面积为 0 时结果为 0
  pub fn iou(&self, other: &Bbox) -> f32 {
    let area_a = self.area();
    let area_b = other.area();
    if area_a <= 0.0 || area_b <= 0.0 {
      return 0.0;
    }

    let x1 = self.xmin.max(other.xmin);
    let y1 = self.ymin.max(other.ymin);
    let x2 = self.xmax.min(other.xmax);
    let y2 = self.ymax.min(other.ymax);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  #[test]
  fn iou_of_identical_boxes_is_one() {
    let b = Bbox::new(10.0, 10.0, 20.0, 30.0);
    assert_relative_eq!(b.iou(&b), 1.0);
  }

  #[test]
  fn iou_of_half_overlap() {
    let a = Bbox::new(0.0, 0.0, 10.0, 10.0);
    let b = Bbox::new(5.0, 0.0, 15.0, 10.0);
    // 交集 50，并集 150
    assert_relative_eq!(a.iou(&b), 50.0 / 150.0, epsilon = 1e-6);
  }

  #[test]
  fn zero_area_box_never_overlaps() {
    let line = Bbox::new(5.0, 5.0, 5.0, 20.0);
    let b = Bbox::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(line.iou(&b), 0.0);
    assert_eq!(b.iou(&line), 0.0);
    assert_eq!(line.iou(&line), 0.0);
  }

  #[test]
  fn disjoint_boxes_have_zero_iou() {
    let a = Bbox::new(0.0, 0.0, 10.0, 10.0);
    let b = Bbox::new(20.0, 20.0, 30.0, 30.0);
    assert_eq!(a.iou(&b), 0.0);
  }
}
