// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolo5.rs - YOLOv5 后处理
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

use tracing::debug;

use crate::config::Yolo5Config;
use crate::decode::suppress;
use crate::decode::yolo::{YoloLayer, YoloVariant, decode_layer};
use crate::frame::ImageMeta;
use crate::model::{DecodeError, Detection, PostProcess, require_tensors};
use crate::tensor::RawTensor;

/// YOLOv5 解码器
///
/// 先验框以像素为单位；右下角落在图像左侧或上方的框直接丢弃。
#[derive(Debug)]
pub struct Yolo5Decoder {
  config: Yolo5Config,
}

impl Yolo5Decoder {
  pub fn new(config: Yolo5Config) -> Result<Self, DecodeError> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &Yolo5Config {
    &self.config
  }
}

impl PostProcess for Yolo5Decoder {
  type Output = Vec<Detection>;

  fn postprocess(
    &self,
    tensors: &[RawTensor<'_>],
    image: &ImageMeta,
  ) -> Result<Self::Output, DecodeError> {
    let params = &self.config.yolo5;
    require_tensors(tensors, params.layer_num())?;

    let unmapper = image.unmapper();
    let mut detections = Vec::new();
    for (i, (stride, anchors)) in params.strides.iter().zip(&params.anchors_table).enumerate() {
      let layer = YoloLayer {
        stride: *stride,
        anchors,
        class_num: params.class_num,
        class_names: &params.class_names,
        score_threshold: self.config.score_threshold,
        variant: YoloVariant::V5,
      };
      decode_layer(i, &tensors[i], &layer, &unmapper, &mut detections);
    }

    let candidates = detections.len();
    let kept = suppress(detections, &self.config.nms());
    debug!("YOLOv5 候选框 {} 个, 抑制后保留 {} 个", candidates, kept.len());
    Ok(kept)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::YoloParams;
  use crate::tensor::{Layout, Shape};
  use approx::assert_relative_eq;

  fn single_layer(threshold: f32) -> Yolo5Decoder {
    let config = Yolo5Config {
      score_threshold: threshold,
      yolo5: YoloParams {
        strides: vec![8.0],
        anchors_table: vec![vec![[10.0, 10.0]]],
        class_num: 2,
        class_names: vec!["a".into(), "b".into()],
      },
      ..Yolo5Config::default()
    };
    Yolo5Decoder::new(config).unwrap()
  }

  #[test]
  fn pixel_anchor_box_in_wide_grid() {
    // 1x3 特征图，只有最右侧的单元有目标
    let shape = Shape::new(1, 1, 3, 7);
    let mut data = vec![-10.0f32; shape.len()];
    let cell = 2 * 7;
    data[cell..cell + 4].copy_from_slice(&[0.0, 0.0, 0.0, 0.0]);
    data[cell + 4] = 10.0;
    data[cell + 6] = 10.0;
    let tensor = RawTensor::new(&data, Layout::Nhwc, shape).unwrap();

    let dets = single_layer(0.5)
      .postprocess(&[tensor], &ImageMeta::new(24, 8, 24, 8))
      .unwrap();
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].class_id, 1);
    // 中心 x = (1 - 0.5 + 2) * 8 = 20，宽 10
    assert_relative_eq!(dets[0].bbox.xmin, 15.0);
    assert_relative_eq!(dets[0].bbox.xmax, 23.0);
  }

  #[test]
  fn threshold_is_inclusive() {
    let shape = Shape::new(1, 1, 1, 7);
    let mut data = vec![0.0f32; shape.len()];
    data[5] = -10.0;
    let tensor = RawTensor::new(&data, Layout::Nhwc, shape).unwrap();
    let image = ImageMeta::new(8, 8, 8, 8);
    // sigmoid(0) * sigmoid(0) = 0.25
    assert_eq!(single_layer(0.25).postprocess(&[tensor], &image).unwrap().len(), 1);
    assert!(single_layer(0.26).postprocess(&[tensor], &image).unwrap().is_empty());
  }
}
