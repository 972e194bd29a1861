// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/ssd.rs - SSD 后处理
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

use crate::config::{SsdConfig, class_name};
use crate::decode::anchor::{self, AnchorCache, AnchorFamily, AnchorKey};
use crate::decode::bbox::{self, BoxRule};
use crate::decode::score::{CUT_OFF_THRESHOLD, cut_off, softmax};
use crate::decode::suppress;
use crate::frame::{CoordUnmapper, ImageMeta};
use crate::model::{DecodeError, Detection, PostProcess, require_tensors};
use crate::tensor::RawTensor;

/// SSD 解码器
///
/// 每层两个输出：`tensors[2i]` 为框回归（每个先验框 4 个通道），
/// `tensors[2i + 1]` 为分类（每个先验框 `class_num + 1` 个通道，0 为背景）。
#[derive(Debug)]
pub struct SsdDecoder {
  config: SsdConfig,
  anchors: AnchorCache,
}

impl SsdDecoder {
  pub fn new(config: SsdConfig) -> Result<Self, DecodeError> {
    config.validate()?;
    Ok(Self {
      config,
      anchors: AnchorCache::new(),
    })
  }

  pub fn config(&self) -> &SsdConfig {
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
    let params = &self.config.ssd;
    let Some((height, width)) = box_tensor.grid() else {
      warn!("SSD 第 {} 层特征图尺寸为 0, 跳过", layer);
      return;
    };
    if cls_tensor.grid() != Some((height, width)) {
      warn!("SSD 第 {} 层框回归与分类特征图尺寸不一致, 跳过", layer);
      return;
    }

    let per_cell = params.anchors_per_cell(layer);
    let classes = params.class_num + 1;
    if box_tensor.shape().channel < per_cell * 4 || cls_tensor.shape().channel < per_cell * classes {
      warn!(
        "SSD 第 {} 层通道数不足: 框 {}, 分类 {}, 每单元先验框 {}",
        layer,
        box_tensor.shape().channel,
        cls_tensor.shape().channel,
        per_cell
      );
      return;
    }

    let key = AnchorKey {
      family: AnchorFamily::Ssd,
      layer,
      height,
      width,
    };
    let anchors = self
      .anchors
      .get_or_generate(key, || anchor::ssd_anchors(params, layer, height, width));

    let threshold = self.config.score_threshold;
    let mut logits = vec![0.0f32; classes];
    let mut probs = vec![0.0f32; classes];
    for h in 0..height {
      for w in 0..width {
        for a in 0..per_cell {
          for (c, logit) in logits.iter_mut().enumerate() {
            *logit = cls_tensor.get(h, w, a * classes + c);
          }
          softmax(&logits, &mut probs);
          cut_off(&mut probs, CUT_OFF_THRESHOLD);
          if !probs[1..].iter().any(|p| *p > threshold) {
            continue;
          }

          let raw = [
            box_tensor.get(h, w, a * 4),
            box_tensor.get(h, w, a * 4 + 1),
            box_tensor.get(h, w, a * 4 + 2),
            box_tensor.get(h, w, a * 4 + 3),
          ];
          let anchor = &anchors[(h * width + w) * per_cell + a];
          let net = bbox::ssd_box(raw, anchor, &params.std, &params.mean);
          let Some(bbox) = bbox::finalize(net, unmapper, BoxRule::Clamp) else {
            continue;
          };

          for (c, p) in probs.iter().enumerate().skip(1) {
            if *p > threshold {
              let id = c - 1;
              detections.push(
                Detection::new(id as u32, *p, bbox)
                  .with_class_name(class_name(&params.class_names, id)),
              );
            }
          }
        }
      }
    }
  }
}

impl PostProcess for SsdDecoder {
  type Output = Vec<Detection>;

  fn postprocess(
    &self,
    tensors: &[RawTensor<'_>],
    image: &ImageMeta,
  ) -> Result<Self::Output, DecodeError> {
    let layer_num = self.config.ssd.layer_num();
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
    debug!("SSD 候选框 {} 个, 抑制后保留 {} 个", candidates, kept.len());
    Ok(kept)
  }
}
