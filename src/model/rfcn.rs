// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/rfcn.rs - R-FCN / Faster R-CNN 后处理
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

use tracing::{debug, error};

use crate::config::{RfcnConfig, class_name};
use crate::decode::bbox::{self, BoxRule};
use crate::decode::suppress;
use crate::frame::ImageMeta;
use crate::model::{DecodeError, Detection, PostProcess, require_tensors};
use crate::tensor::RawTensor;

/// 每条记录 (score, class_id, x1, y1, x2, y2)
const RECORD_LEN: usize = 6;
/// 得分低于该值的记录视为列表结束
const TERMINATOR_SCORE: f32 = 0.001;

/// 候选区域网络的解码器
///
/// 模型输出已经是排好序的检测记录，这里只做截断、过滤与坐标还原。
#[derive(Debug)]
pub struct RfcnDecoder {
  config: RfcnConfig,
}

impl RfcnDecoder {
  pub fn new(config: RfcnConfig) -> Result<Self, DecodeError> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &RfcnConfig {
    &self.config
  }
}

impl PostProcess for RfcnDecoder {
  type Output = Vec<Detection>;

  fn postprocess(
    &self,
    tensors: &[RawTensor<'_>],
    image: &ImageMeta,
  ) -> Result<Self::Output, DecodeError> {
    require_tensors(tensors, 1)?;
    let values: Vec<f32> = tensors[0].logical_values().collect();
    let unmapper = image.unmapper();

    let mut detections = Vec::new();
    let mut invalid = 0usize;
    for record in values.chunks_exact(RECORD_LEN) {
      let score = record[0];
      // 非有限分数既不是结束标记也不是有效检测
      if !score.is_finite() {
        continue;
      }
      if score < TERMINATOR_SCORE {
        break;
      }
      if score < self.config.score_threshold {
        continue;
      }

      let id = record[1];
      let in_range = id >= 0.0 && (id as usize) < self.config.class_num;
      if !in_range {
        invalid += 1;
        continue;
      }
      let id = id as usize;

      let net = [record[2], record[3], record[4], record[5]].map(|v| v as f64);
      if let Some(bbox) = bbox::finalize(net, &unmapper, BoxRule::Clamp) {
        detections.push(
          Detection::new(id as u32, score, bbox)
            .with_class_name(class_name(&self.config.class_names, id)),
        );
      }
    }

    if invalid > 0 {
      error!("R-FCN 输出中有 {} 条记录的类别号超出范围 [0, {})", invalid, self.config.class_num);
    }

    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    let detections = match self.config.nms() {
      Some(nms) => suppress(detections, &nms),
      None => detections,
    };
    debug!("R-FCN 检测结果 {} 个", detections.len());
    Ok(detections)
  }
}
