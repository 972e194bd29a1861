// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 感知结果与后处理接口
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

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::frame::ImageMeta;
use crate::geometry::Bbox;
use crate::tensor::RawTensor;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("不支持的模型: {0}")]
  UnsupportedModel(String),
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("输出张量数量不足: 期望 {expected}, 实际为 {actual}")]
  TensorCount { expected: usize, actual: usize },
}

/// 将一帧的输出张量解码为感知结果
pub trait PostProcess {
  type Output;

  fn postprocess(
    &self,
    tensors: &[RawTensor<'_>],
    image: &ImageMeta,
  ) -> Result<Self::Output, DecodeError>;
}

impl<T: PostProcess + ?Sized> PostProcess for &T {
  type Output = T::Output;

  fn postprocess(
    &self,
    tensors: &[RawTensor<'_>],
    image: &ImageMeta,
  ) -> Result<Self::Output, DecodeError> {
    (**self).postprocess(tensors, image)
  }
}

pub(crate) fn require_tensors(tensors: &[RawTensor<'_>], expected: usize) -> Result<(), DecodeError> {
  if tensors.len() < expected {
    return Err(DecodeError::TensorCount {
      expected,
      actual: tensors.len(),
    });
  }
  Ok(())
}

/// 单个检测结果，边界框位于原图像素空间
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub class_id: u32,
  pub score: f32,
  pub bbox: Bbox,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub class_name: Option<String>,
}

impl Detection {
  pub fn new(class_id: u32, score: f32, bbox: Bbox) -> Self {
    Self {
      class_id,
      score,
      bbox,
      class_name: None,
    }
  }

  pub fn with_class_name(mut self, class_name: Option<String>) -> Self {
    self.class_name = class_name;
    self
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassResult {
  pub class_id: u32,
  pub score: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub class_name: Option<String>,
}

impl ClassResult {
  pub fn new(class_id: u32, score: f32) -> Self {
    Self {
      class_id,
      score,
      class_name: None,
    }
  }
}

/// 按原图分辨率排列的逐像素类别号
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentationMask {
  pub width: u32,
  pub height: u32,
  pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerceptionResult {
  Detections(Vec<Detection>),
  Classifications(Vec<ClassResult>),
  Segmentation(SegmentationMask),
}

impl PerceptionResult {
  pub fn detections(&self) -> Option<&[Detection]> {
    match self {
      PerceptionResult::Detections(items) => Some(items),
      _ => None,
    }
  }

  pub fn classifications(&self) -> Option<&[ClassResult]> {
    match self {
      PerceptionResult::Classifications(items) => Some(items),
      _ => None,
    }
  }

  pub fn segmentation(&self) -> Option<&SegmentationMask> {
    match self {
      PerceptionResult::Segmentation(mask) => Some(mask),
      _ => None,
    }
  }

  /// 结果条目数，分割结果为像素数
  pub fn len(&self) -> usize {
    match self {
      PerceptionResult::Detections(items) => items.len(),
      PerceptionResult::Classifications(items) => items.len(),
      PerceptionResult::Segmentation(mask) => mask.data.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

mod classification;
mod rfcn;
mod s3fd;
mod segment;
mod ssd;
mod yolo2;
mod yolo3;
mod yolo5;

pub use self::classification::ClassificationDecoder;
pub use self::rfcn::RfcnDecoder;
pub use self::s3fd::S3fdDecoder;
pub use self::segment::SegmentDecoder;
pub use self::ssd::SsdDecoder;
pub use self::yolo2::Yolo2Decoder;
pub use self::yolo3::Yolo3Decoder;
pub use self::yolo5::Yolo5Decoder;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn detections_serialize_with_tag() {
    let result = PerceptionResult::Detections(vec![
      Detection::new(2, 0.5, Bbox::new(1.0, 2.0, 3.0, 4.0)).with_class_name(Some("car".into())),
    ]);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["detections"][0]["class_name"], "car");
    assert_eq!(json["detections"][0]["bbox"]["xmax"], 3.0);
  }

  #[test]
  fn class_name_omitted_when_absent() {
    let json = serde_json::to_string(&ClassResult::new(7, 0.25)).unwrap();
    assert_eq!(json, r#"{"class_id":7,"score":0.25}"#);
  }
}
