// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decode/yolo.rs - YOLO 特征图遍历
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

use crate::config::class_name;
use crate::decode::anchor::yolo_slots;
use crate::decode::bbox::{self, BoxRule};
use crate::decode::score::yolo_confidence;
use crate::frame::CoordUnmapper;
use crate::model::Detection;
use crate::tensor::RawTensor;

/// 每个槽位的固定字段：x, y, w, h, objectness
const YOLO_BOX_FIELDS: usize = 5;

/// 框解码与取舍方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YoloVariant {
  /// YOLOv2/v3：先验宽高以网格为单位
  Classic,
  /// YOLOv5：先验宽高以像素为单位
  V5,
}

/// 单层解码参数
#[derive(Debug, Clone, Copy)]
pub struct YoloLayer<'p> {
  pub stride: f32,
  pub anchors: &'p [[f32; 2]],
  pub class_num: usize,
  pub class_names: &'p [String],
  pub score_threshold: f32,
  pub variant: YoloVariant,
}

impl YoloLayer<'_> {
  fn channels_per_slot(&self) -> usize {
    self.class_num + YOLO_BOX_FIELDS
  }

  /// 置信度不低于阈值即保留
  fn accepts(&self, confidence: f32) -> bool {
    confidence >= self.score_threshold
  }
}

/// 解码一个 YOLO 输出层，结果追加到 `detections`
///
/// 通道按 `k * (5 + class_num) + field` 排列，遍历范围为逻辑高宽。
/// 特征图为空或通道数不足时跳过该层。
pub fn decode_layer(
  layer_index: usize,
  tensor: &RawTensor<'_>,
  layer: &YoloLayer<'_>,
  unmapper: &CoordUnmapper,
  detections: &mut Vec<Detection>,
) {
  let Some((height, width)) = tensor.grid() else {
    warn!("YOLO 第 {} 层特征图尺寸为 0, 跳过", layer_index);
    return;
  };

  let per_slot = layer.channels_per_slot();
  let required = layer.anchors.len() * per_slot;
  if tensor.shape().channel < required {
    warn!(
      "YOLO 第 {} 层通道数不足: 期望 {}, 实际为 {}, 跳过",
      layer_index,
      required,
      tensor.shape().channel
    );
    return;
  }

  let before = detections.len();
  for slot in yolo_slots(height, width, layer.anchors) {
    let (h, w) = (slot.grid_y, slot.grid_x);
    let base = slot.index * per_slot;
    let field = |f: usize| tensor.get(h, w, base + f);

    let classes = (0..layer.class_num).map(|c| field(YOLO_BOX_FIELDS + c));
    let Some((class_id, confidence)) = yolo_confidence(field(4), classes) else {
      continue;
    };
    if !layer.accepts(confidence) {
      continue;
    }

    let raw = [field(0), field(1), field(2), field(3)];
    let anchor = [slot.anchor_w, slot.anchor_h];
    let (net, rule) = match layer.variant {
      YoloVariant::Classic => (
        bbox::yolo_box(raw, w, h, anchor, layer.stride),
        BoxRule::Clamp,
      ),
      YoloVariant::V5 => (
        bbox::yolo5_box(raw, w, h, anchor, layer.stride),
        BoxRule::RejectNonPositiveMax,
      ),
    };
    let Some(bbox) = bbox::finalize(net, unmapper, rule) else {
      continue;
    };

    detections.push(
      Detection::new(class_id as u32, confidence, bbox)
        .with_class_name(class_name(layer.class_names, class_id)),
    );
  }

  debug!(
    "YOLO 第 {} 层 {}x{}: 候选框 {} 个",
    layer_index,
    height,
    width,
    detections.len() - before
  );
}
