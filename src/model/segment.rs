// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/segment.rs - 语义分割后处理
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

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use tracing::{debug, warn};

use crate::decode::score::argmax;
use crate::frame::ImageMeta;
use crate::model::{DecodeError, PostProcess, SegmentationMask, require_tensors};
use crate::tensor::RawTensor;

/// 语义分割解码器
///
/// 单通道输出直接视为类别号；多通道输出逐像素取最大通道。
/// 类别图最后用最近邻插值缩放到原图分辨率。
#[derive(Debug, Default)]
pub struct SegmentDecoder;

impl SegmentDecoder {
  pub fn new() -> Self {
    Self
  }

  fn class_map(tensor: &RawTensor<'_>, height: usize, width: usize) -> GrayImage {
    let channels = tensor.shape().channel;
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
      let (h, w) = (y as usize, x as usize);
      let id = if channels > 1 {
        argmax((0..channels).map(|c| tensor.get(h, w, c)))
          .map(|(c, _)| c as f32)
          .unwrap_or(0.0)
      } else {
        tensor.get(h, w, 0)
      };
      // 浮点到 u8 的转换饱和截断，NaN 为 0
      Luma([id as u8])
    })
  }
}

impl PostProcess for SegmentDecoder {
  type Output = SegmentationMask;

  fn postprocess(
    &self,
    tensors: &[RawTensor<'_>],
    image: &ImageMeta,
  ) -> Result<Self::Output, DecodeError> {
    require_tensors(tensors, 1)?;
    let (width, height) = (image.original_width, image.original_height);

    let tensor = &tensors[0];
    let grid = tensor.grid().filter(|_| tensor.shape().channel > 0);
    let Some((map_h, map_w)) = grid else {
      warn!("分割输出尺寸为 0, 返回全背景");
      return Ok(SegmentationMask {
        width,
        height,
        data: vec![0; width as usize * height as usize],
      });
    };

    let map = Self::class_map(tensor, map_h, map_w);
    let resized = if (map_w as u32, map_h as u32) == (width, height) {
      map
    } else {
      imageops::resize(&map, width, height, FilterType::Nearest)
    };
    debug!("分割结果 {}x{} 缩放至 {}x{}", map_w, map_h, width, height);

    Ok(SegmentationMask {
      width,
      height,
      data: resized.into_raw(),
    })
  }
}
