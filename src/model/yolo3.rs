// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolo3.rs - YOLOv3 后处理
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

use crate::config::Yolo3Config;
use crate::decode::suppress;
use crate::decode::yolo::{YoloLayer, YoloVariant, decode_layer};
use crate::frame::ImageMeta;
use crate::model::{DecodeError, Detection, PostProcess, require_tensors};
use crate::tensor::RawTensor;

/// YOLOv3 解码器，每个步长对应一个输出层
#[derive(Debug)]
pub struct Yolo3Decoder {
  config: Yolo3Config,
}

impl Yolo3Decoder {
  pub fn new(config: Yolo3Config) -> Result<Self, DecodeError> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &Yolo3Config {
    &self.config
  }
}

impl PostProcess for Yolo3Decoder {
  type Output = Vec<Detection>;

  fn postprocess(
    &self,
    tensors: &[RawTensor<'_>],
    image: &ImageMeta,
  ) -> Result<Self::Output, DecodeError> {
    let params = &self.config.yolo3;
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
        variant: YoloVariant::Classic,
      };
      decode_layer(i, &tensors[i], &layer, &unmapper, &mut detections);
    }

    let candidates = detections.len();
    let kept = suppress(detections, &self.config.nms());
    debug!("YOLOv3 候选框 {} 个, 抑制后保留 {} 个", candidates, kept.len());
    Ok(kept)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::YoloParams;
  use crate::tensor::{Layout, Shape};

  #[test]
  fn needs_one_tensor_per_stride() {
    let decoder = Yolo3Decoder::new(Yolo3Config::default()).unwrap();
    let shape = Shape::new(1, 13, 13, 3 * 85);
    let data = vec![0.0f32; shape.len()];
    let tensor = RawTensor::new(&data, Layout::Nhwc, shape).unwrap();
    let err = decoder
      .postprocess(&[tensor], &ImageMeta::new(416, 416, 416, 416))
      .unwrap_err();
    assert!(matches!(err, DecodeError::TensorCount { expected: 3, actual: 1 }));
  }

  #[test]
  fn empty_layer_is_skipped() {
    let mut config = Yolo3Config::default();
    config.yolo3.class_num = 1;
    config.yolo3.class_names = vec!["thing".into()];
    let decoder = Yolo3Decoder::new(config).unwrap();

    let empty: Vec<f32> = Vec::new();
    let shape = Shape::new(1, 1, 1, 3 * 6);
    let mut data = vec![-10.0f32; shape.len()];
    // 第一个先验框：objectness 与类别 logit 都很大
    data[4] = 10.0;
    data[5] = 10.0;
    let tensors = [
      RawTensor::new(&empty, Layout::Nhwc, Shape::new(1, 0, 0, 18)).unwrap(),
      RawTensor::new(&data, Layout::Nhwc, shape).unwrap(),
      RawTensor::new(&empty, Layout::Nhwc, Shape::new(1, 0, 0, 18)).unwrap(),
    ];
    let dets = decoder
      .postprocess(&tensors, &ImageMeta::new(16, 16, 16, 16))
      .unwrap();
    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].class_name.as_deref(), Some("thing"));
  }

  #[test]
  fn threshold_is_inclusive() {
    let decoder = |threshold: f32| {
      let config = Yolo3Config {
        score_threshold: threshold,
        yolo3: YoloParams {
          strides: vec![8.0],
          anchors_table: vec![vec![[1.0, 1.0]]],
          class_num: 2,
          class_names: vec!["a".into(), "b".into()],
        },
        ..Yolo3Config::default()
      };
      Yolo3Decoder::new(config).unwrap()
    };
    let shape = Shape::new(1, 1, 1, 7);
    let mut data = vec![0.0f32; shape.len()];
    data[6] = -10.0;
    let tensor = RawTensor::new(&data, Layout::Nhwc, shape).unwrap();
    let image = ImageMeta::new(8, 8, 8, 8);
    // sigmoid(0) * sigmoid(0) = 0.25
    assert_eq!(decoder(0.25).postprocess(&[tensor], &image).unwrap().len(), 1);
    assert!(decoder(0.26).postprocess(&[tensor], &image).unwrap().is_empty());
  }
}
