// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/s3fd.rs - S3FD 人脸检测后处理
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

use tracing::{debug, warn};

use crate::config::{S3fdConfig, class_name};
use crate::decode::anchor::{self, AnchorCache, AnchorFamily, AnchorKey};
use crate::decode::bbox::{self, BoxRule};
use crate::decode::score::s3fd_face_score;
use crate::decode::suppress;
use crate::frame::{CoordUnmapper, ImageMeta};
use crate::model::{DecodeError, Detection, PostProcess, require_tensors};
use crate::tensor::RawTensor;

/// S3FD 解码器
///
/// 每层 `tensors[2i]` 为框回归（4 通道），`tensors[2i + 1]` 为分类，
/// 分类的最后一个通道为人脸，其余通道取最大值作为背景。
#[derive(Debug)]
pub struct S3fdDecoder {
  config: S3fdConfig,
  anchors: AnchorCache,
}

impl S3fdDecoder {
  pub fn new(config: S3fdConfig) -> Result<Self, DecodeError> {
    config.validate()?;
    Ok(Self {
      config,
      anchors: AnchorCache::new(),
    })
  }

  pub fn config(&self) -> &S3fdConfig {
    &self.config
  }

  fn decode_layer(
    &self,
    layer: usize,
    box_tensor: &RawTensor<'_>,
    cls_tensor: &RawTensor<'_>,
    unmapper: &CoordUnmapper,
    detections: &mut Vec<Detection>,
  ) {
    let params = &self.config.s3fd;
    let Some((height, width)) = box_tensor.grid() else {
      warn!("S3FD 第 {} 层特征图尺寸为 0, 跳过", layer);
      return;
    };
    let channels = cls_tensor.shape().channel;
    if cls_tensor.grid() != Some((height, width)) || box_tensor.shape().channel < 4 || channels < 2 {
      warn!("S3FD 第 {} 层输出形状不匹配, 跳过", layer);
      return;
    }

    let key = AnchorKey {
      family: AnchorFamily::S3fd,
      layer,
      height,
      width,
    };
    let anchors = self
      .anchors
      .get_or_generate(key, || anchor::s3fd_anchors(params, layer, height, width));

    let face = class_name(&params.class_names, 0);
    let mut logits = vec![0.0f32; channels];
    for h in 0..height {
      for w in 0..width {
        for (c, logit) in logits.iter_mut().enumerate() {
          *logit = cls_tensor.get(h, w, c);
        }
        let score = s3fd_face_score(&logits);
        if score < self.config.score_threshold {
          continue;
        }

        let raw = [
          box_tensor.get(h, w, 0),
          box_tensor.get(h, w, 1),
          box_tensor.get(h, w, 2),
          box_tensor.get(h, w, 3),
        ];
        let net = bbox::s3fd_box(raw, &anchors[h * width + w], &params.variance);
        if let Some(bbox) = bbox::finalize(net, unmapper, BoxRule::Clamp) {
          detections.push(Detection::new(0, score, bbox).with_class_name(face.clone()));
        }
      }
    }
  }
}

impl PostProcess for S3fdDecoder {
  type Output = Vec<Detection>;

  fn postprocess(
    &self,
    tensors: &[RawTensor<'_>],
    image: &ImageMeta,
  ) -> Result<Self::Output, DecodeError> {
    let layer_num = self.config.s3fd.layer_num();
    require_tensors(tensors, layer_num * 2)?;

    let unmapper = image.unmapper();
    let mut detections = Vec::new();
    for layer in 0..layer_num {
      self.decode_layer(
        layer,
        &tensors[layer * 2],
        &tensors[layer * 2 + 1],
        &unmapper,
        &mut detections,
      );
    }

    let candidates = detections.len();
    let kept = suppress(detections, &self.config.nms());
    debug!("S3FD 候选人脸 {} 个, 抑制后保留 {} 个", candidates, kept.len());
    Ok(kept)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::S3fdParams;
  use crate::tensor::{Layout, Shape};

  #[test]
  fn face_over_max_out_background() {
    let config = S3fdConfig {
      s3fd: S3fdParams {
        step: vec![4.0],
        min_size: vec![[16.0, 16.0]],
        ..S3fdParams::default()
      },
      ..S3fdConfig::default()
    };
    let decoder = S3fdDecoder::new(config).unwrap();

    let boxes = vec![0.0f32; 2 * 2 * 4];
    // 4 个分类通道：3 个背景候选 + 人脸
    let mut cls = vec![0.0f32; 2 * 2 * 4];
    for cell in 0..4 {
      cls[cell * 4 + 1] = 5.0;
    }
    cls[3] = 8.0;
    // 第二个单元背景候选更大，人脸被压制
    cls[4 + 3] = 1.0;

    let tensors = [
      RawTensor::new(&boxes, Layout::Nhwc, Shape::new(1, 2, 2, 4)).unwrap(),
      RawTensor::new(&cls, Layout::Nhwc, Shape::new(1, 2, 2, 4)).unwrap(),
    ];
    let dets = decoder.postprocess(&tensors, &ImageMeta::new(8, 8, 8, 8)).unwrap();

    assert_eq!(dets.len(), 1);
    assert_eq!(dets[0].class_id, 0);
    assert_eq!(dets[0].class_name.as_deref(), Some("face"));
    assert!(dets[0].score > 0.9);
    // 先验框中心 (2, 2)，边长 16
    assert_eq!(dets[0].bbox.xmin, 0.0);
    assert_eq!(dets[0].bbox.xmax, 7.0);
  }
}
