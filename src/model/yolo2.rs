// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolo2.rs - YOLOv2 后处理
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

use crate::config::Yolo2Config;
use crate::decode::suppress;
use crate::decode::yolo::{YoloLayer, YoloVariant, decode_layer};
use crate::frame::ImageMeta;
use crate::model::{DecodeError, Detection, PostProcess, require_tensors};
use crate::tensor::RawTensor;

/// YOLOv2 解码器，单个输出层
#[derive(Debug)]
pub struct Yolo2Decoder {
  config: Yolo2Config,
}

impl Yolo2Decoder {
  pub fn new(config: Yolo2Config) -> Result<Self, DecodeError> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &Yolo2Config {
    &self.config
  }
}

impl PostProcess for Yolo2Decoder {
  type Output = Vec<Detection>;

  fn postprocess(
    &self,
    tensors: &[RawTensor<'_>],
    image: &ImageMeta,
  ) -> Result<Self::Output, DecodeError> {
    require_tensors(tensors, 1)?;
    let params = &self.config.yolo2;
    let layer = YoloLayer {
      stride: params.stride,
      anchors: &params.anchors_table,
      class_num: params.class_num,
      class_names: &params.class_names,
      score_threshold: self.config.score_threshold,
      variant: YoloVariant::Classic,
    };

    let mut detections = Vec::new();
    decode_layer(0, &tensors[0], &layer, &image.unmapper(), &mut detections);

    let candidates = detections.len();
    let kept = suppress(detections, &self.config.nms());
    debug!("YOLOv2 候选框 {} 个, 抑制后保留 {} 个", candidates, kept.len());
    Ok(kept)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Yolo2Params;
  use crate::tensor::{Layout, Shape};

  #[test]
  fn low_objectness_yields_nothing() {
    let decoder = Yolo2Decoder::new(Yolo2Config::default()).unwrap();
    let shape = Shape::new(1, 13, 13, 5 * 85);
    let data = vec![-10.0f32; shape.len()];
    let tensor = RawTensor::new(&data, Layout::Nhwc, shape).unwrap();
    let dets = decoder
      .postprocess(&[tensor], &ImageMeta::new(416, 416, 640, 480))
      .unwrap();
    assert!(dets.is_empty());
  }

  #[test]
  fn threshold_is_inclusive() {
    let decoder = |threshold: f32| {
      let config = Yolo2Config {
        score_threshold: threshold,
        yolo2: Yolo2Params {
          stride: 8.0,
          anchors_table: vec![[1.0, 1.0]],
          class_num: 1,
          class_names: vec!["thing".into()],
        },
        ..Yolo2Config::default()
      };
      Yolo2Decoder::new(config).unwrap()
    };
    let shape = Shape::new(1, 1, 1, 6);
    let data = vec![0.0f32; shape.len()];
    let tensor = RawTensor::new(&data, Layout::Nhwc, shape).unwrap();
    let image = ImageMeta::new(8, 8, 8, 8);
    // sigmoid(0) * sigmoid(0) = 0.25
    assert_eq!(decoder(0.25).postprocess(&[tensor], &image).unwrap().len(), 1);
    assert!(decoder(0.26).postprocess(&[tensor], &image).unwrap().is_empty());
  }
}
