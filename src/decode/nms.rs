// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decode/nms.rs - 非极大值抑制
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

use crate::config::NmsConfig;
use crate::model::Detection;

/// 贪心非极大值抑制
///
/// 候选框按置信度降序稳定排序，依次保留与已保留框 IoU 均不超过阈值的框，
/// 保留数量达到 `max_keep` 后停止。`per_class` 为 true 时仅在同类别间抑制。
pub fn suppress(mut candidates: Vec<Detection>, config: &NmsConfig) -> Vec<Detection> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<Detection> = Vec::with_capacity(config.max_keep.min(candidates.len()));
  for candidate in candidates {
    if kept.len() >= config.max_keep {
      break;
    }
    let suppressed = kept.iter().any(|k| {
      (!config.per_class || k.class_id == candidate.class_id)
        && k.bbox.iou(&candidate.bbox) > config.iou_threshold
    });
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}
