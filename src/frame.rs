// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 帧元数据与坐标还原
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

use crate::tensor::{RawTensor, TensorBuffer};

/// 图像元数据：网络输入分辨率与原图分辨率
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
  pub input_width: u32,
  pub input_height: u32,
  pub original_width: u32,
  pub original_height: u32,
  /// 预处理是否为保持长宽比的缩放加填充（letterbox）
  #[serde(default)]
  pub is_pad_resize: bool,
}

impl ImageMeta {
  pub fn new(input_width: u32, input_height: u32, original_width: u32, original_height: u32) -> Self {
    Self {
      input_width,
      input_height,
      original_width,
      original_height,
      is_pad_resize: false,
    }
  }

  pub fn with_pad_resize(mut self, is_pad_resize: bool) -> Self {
    self.is_pad_resize = is_pad_resize;
    self
  }

  pub fn unmapper(&self) -> CoordUnmapper {
    CoordUnmapper::new(self)
  }
}

/// 将网络输入坐标还原到原图坐标
///
/// 非填充缩放时两个方向独立缩放；letterbox 时共享 `min(w_ratio, h_ratio)`
/// 并先减去居中填充。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordUnmapper {
  w_ratio: f64,
  h_ratio: f64,
  w_padding: f64,
  h_padding: f64,
  max_x: f64,
  max_y: f64,
}

impl CoordUnmapper {
  pub fn new(meta: &ImageMeta) -> Self {
    let net_w = meta.input_width as f64;
    let net_h = meta.input_height as f64;
    let ori_w = meta.original_width as f64;
    let ori_h = meta.original_height as f64;

    let mut w_ratio = net_w / ori_w;
    let mut h_ratio = net_h / ori_h;
    if meta.is_pad_resize {
      let resize_ratio = w_ratio.min(h_ratio);
      w_ratio = resize_ratio;
      h_ratio = resize_ratio;
    }

    Self {
      w_ratio,
      h_ratio,
      w_padding: (net_w - w_ratio * ori_w) / 2.0,
      h_padding: (net_h - h_ratio * ori_h) / 2.0,
      max_x: (ori_w - 1.0).max(0.0),
      max_y: (ori_h - 1.0).max(0.0),
    }
  }

  pub fn x(&self, x: f64) -> f64 {
    (x - self.w_padding) / self.w_ratio
  }

  pub fn y(&self, y: f64) -> f64 {
    (y - self.h_padding) / self.h_ratio
  }

  /// 原图坐标上限 (width - 1, height - 1)
  pub fn limits(&self) -> (f64, f64) {
    (self.max_x, self.max_y)
  }
}

/// 一帧推理输出：按输出序号排列的张量与图像元数据
#[derive(Debug, Clone)]
pub struct Frame {
  pub index: usize,
  pub name: Option<String>,
  pub image: ImageMeta,
  pub outputs: Vec<TensorBuffer>,
}

impl Frame {
  pub fn tensors(&self) -> Vec<RawTensor<'_>> {
    self.outputs.iter().map(TensorBuffer::view).collect()
  }
}
