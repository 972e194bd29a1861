// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/classification.rs - 分类后处理
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

use crate::config::{ClassificationConfig, class_name};
use crate::decode::score::softmax_in_place;
use crate::decode::select;
use crate::frame::ImageMeta;
use crate::model::{ClassResult, DecodeError, PostProcess, require_tensors};
use crate::tensor::RawTensor;

/// 分类网络解码器，取第 0 个批次的展平得分做 top-k
#[derive(Debug)]
pub struct ClassificationDecoder {
  config: ClassificationConfig,
}

impl ClassificationDecoder {
  pub fn new(config: ClassificationConfig) -> Result<Self, DecodeError> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &ClassificationConfig {
    &self.config
  }
}

impl PostProcess for ClassificationDecoder {
  type Output = Vec<ClassResult>;

  fn postprocess(
    &self,
    tensors: &[RawTensor<'_>],
    _image: &ImageMeta,
  ) -> Result<Self::Output, DecodeError> {
    require_tensors(tensors, 1)?;
    let shape = tensors[0].shape();
    let per_batch = shape.height * shape.width * shape.channel;
    let mut scores: Vec<f32> = tensors[0].logical_values().take(per_batch).collect();
    if self.config.softmax {
      softmax_in_place(&mut scores);
    }

    let results: Vec<ClassResult> = select(&scores, self.config.top_k)
      .into_iter()
      .map(|mut r| {
        r.class_name = class_name(&self.config.class_names, r.class_id as usize);
        r
      })
      .collect();
    debug!("分类结果: {:?}", results);
    Ok(results)
  }
}
