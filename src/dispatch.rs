// 该文件是 Shanan （山南西风） 项目的一部分。
// src/dispatch.rs - 按模型名称选择解码器
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

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::FromUrl;
use crate::config::{
  self, ClassificationConfig, ConfigError, RfcnConfig, S3fdConfig, SsdConfig, Yolo2Config,
  Yolo3Config, Yolo5Config,
};
use crate::frame::ImageMeta;
use crate::model::{
  ClassificationDecoder, DecodeError, PerceptionResult, PostProcess, RfcnDecoder, S3fdDecoder,
  SegmentDecoder, SsdDecoder, Yolo2Decoder, Yolo3Decoder, Yolo5Decoder,
};
use crate::tensor::RawTensor;

/// 归入分类解码器的模型名称
const CLASSIFICATION_MODELS: [&str; 9] = [
  "classification",
  "lenet",
  "lenet_gray",
  "resnet18",
  "resnet50_feature",
  "googlenet",
  "se_resnet_gray",
  "mobilenetv1",
  "mobilenetv2",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
  Ssd,
  S3fd,
  Yolo2,
  Yolo3,
  Yolo5,
  Rfcn,
  Classification,
  Segment,
}

impl Architecture {
  pub fn from_model_name(name: &str) -> Result<Self, DecodeError> {
    let arch = match name {
      "ssd" => Architecture::Ssd,
      "s3fd" => Architecture::S3fd,
      "yolov2" => Architecture::Yolo2,
      "yolov3" => Architecture::Yolo3,
      "yolov5" => Architecture::Yolo5,
      "rfcn" | "fasterrcnn" => Architecture::Rfcn,
      "segment" => Architecture::Segment,
      n if CLASSIFICATION_MODELS.contains(&n) || n.contains("efficientnet") => {
        Architecture::Classification
      }
      other => return Err(DecodeError::UnsupportedModel(other.to_string())),
    };
    Ok(arch)
  }

  pub fn name(&self) -> &'static str {
    match self {
      Architecture::Ssd => "ssd",
      Architecture::S3fd => "s3fd",
      Architecture::Yolo2 => "yolov2",
      Architecture::Yolo3 => "yolov3",
      Architecture::Yolo5 => "yolov5",
      Architecture::Rfcn => "rfcn",
      Architecture::Classification => "classification",
      Architecture::Segment => "segment",
    }
  }
}

impl FromStr for Architecture {
  type Err = DecodeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::from_model_name(s)
  }
}

impl fmt::Display for Architecture {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// 已配置好的解码器，按架构分派
#[derive(Debug)]
pub enum Decoder {
  Ssd(SsdDecoder),
  S3fd(S3fdDecoder),
  Yolo2(Yolo2Decoder),
  Yolo3(Yolo3Decoder),
  Yolo5(Yolo5Decoder),
  Rfcn(RfcnDecoder),
  Classification(ClassificationDecoder),
  Segment(SegmentDecoder),
}

impl Decoder {
  /// 使用内置默认配置构造
  pub fn with_defaults(architecture: Architecture) -> Result<Self, DecodeError> {
    DecoderBuilder::for_architecture(architecture).build()
  }

  pub fn architecture(&self) -> Architecture {
    match self {
      Decoder::Ssd(_) => Architecture::Ssd,
      Decoder::S3fd(_) => Architecture::S3fd,
      Decoder::Yolo2(_) => Architecture::Yolo2,
      Decoder::Yolo3(_) => Architecture::Yolo3,
      Decoder::Yolo5(_) => Architecture::Yolo5,
      Decoder::Rfcn(_) => Architecture::Rfcn,
      Decoder::Classification(_) => Architecture::Classification,
      Decoder::Segment(_) => Architecture::Segment,
    }
  }

  /// 解码一帧输出，张量按模型输出序号排列
  pub fn decode(
    &self,
    tensors: &[RawTensor<'_>],
    image: &ImageMeta,
  ) -> Result<PerceptionResult, DecodeError> {
    let result = match self {
      Decoder::Ssd(d) => PerceptionResult::Detections(d.postprocess(tensors, image)?),
      Decoder::S3fd(d) => PerceptionResult::Detections(d.postprocess(tensors, image)?),
      Decoder::Yolo2(d) => PerceptionResult::Detections(d.postprocess(tensors, image)?),
      Decoder::Yolo3(d) => PerceptionResult::Detections(d.postprocess(tensors, image)?),
      Decoder::Yolo5(d) => PerceptionResult::Detections(d.postprocess(tensors, image)?),
      Decoder::Rfcn(d) => PerceptionResult::Detections(d.postprocess(tensors, image)?),
      Decoder::Classification(d) => {
        PerceptionResult::Classifications(d.postprocess(tensors, image)?)
      }
      Decoder::Segment(d) => PerceptionResult::Segmentation(d.postprocess(tensors, image)?),
    };
    Ok(result)
  }
}

impl PostProcess for Decoder {
  type Output = PerceptionResult;

  fn postprocess(
    &self,
    tensors: &[RawTensor<'_>],
    image: &ImageMeta,
  ) -> Result<Self::Output, DecodeError> {
    self.decode(tensors, image)
  }
}

#[derive(Debug, Clone, PartialEq)]
enum ConfigSource {
  Defaults,
  File(PathBuf),
  Json(String),
}

/// 解码器构造器
///
/// URL 形式为 `<模型名>:///path/to/config.json`，路径为空时使用内置默认配置。
#[derive(Debug, Clone)]
pub struct DecoderBuilder {
  architecture: Architecture,
  source: ConfigSource,
}

impl FromUrl for DecoderBuilder {
  type Error = DecodeError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let builder = Self::new(url.scheme())?;
    let path = url.path();
    if path.is_empty() || path == "/" {
      Ok(builder)
    } else {
      Ok(builder.config_file(path))
    }
  }
}

/// 命令行写法：模型名称，或 `<模型名>:///path/config.json`
///
/// URL 方案不允许包含 `_`，因此按第一个 `:` 手动拆分，
/// `lenet_gray:///cfg.json` 这类名称同样可用。
impl FromStr for DecoderBuilder {
  type Err = DecodeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let Some((name, rest)) = s.split_once(':') else {
      return Self::new(s);
    };
    let builder = Self::new(name)?;
    let path = rest.strip_prefix("//").unwrap_or(rest);
    if path.is_empty() || path == "/" {
      Ok(builder)
    } else {
      Ok(builder.config_file(path))
    }
  }
}

impl DecoderBuilder {
  pub fn new(model_name: &str) -> Result<Self, DecodeError> {
    Ok(Self::for_architecture(Architecture::from_model_name(model_name)?))
  }

  pub fn for_architecture(architecture: Architecture) -> Self {
    Self {
      architecture,
      source: ConfigSource::Defaults,
    }
  }

  pub fn architecture(&self) -> Architecture {
    self.architecture
  }

  pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
    self.source = ConfigSource::File(path.into());
    self
  }

  pub fn config_json(mut self, json: impl Into<String>) -> Self {
    self.source = ConfigSource::Json(json.into());
    self
  }

  fn load<T: DeserializeOwned + Default>(&self) -> Result<T, ConfigError> {
    match &self.source {
      ConfigSource::Defaults => Ok(T::default()),
      ConfigSource::File(path) => {
        info!("加载配置文件: {}", path.display());
        config::from_json_file(path)
      }
      ConfigSource::Json(json) => config::from_json_str(json),
    }
  }

  pub fn build(self) -> Result<Decoder, DecodeError> {
    debug!("构造 {} 解码器, 配置来源: {:?}", self.architecture, self.source);
    let decoder = match self.architecture {
      Architecture::Ssd => Decoder::Ssd(SsdDecoder::new(self.load::<SsdConfig>()?)?),
      Architecture::S3fd => Decoder::S3fd(S3fdDecoder::new(self.load::<S3fdConfig>()?)?),
      Architecture::Yolo2 => Decoder::Yolo2(Yolo2Decoder::new(self.load::<Yolo2Config>()?)?),
      Architecture::Yolo3 => Decoder::Yolo3(Yolo3Decoder::new(self.load::<Yolo3Config>()?)?),
      Architecture::Yolo5 => Decoder::Yolo5(Yolo5Decoder::new(self.load::<Yolo5Config>()?)?),
      Architecture::Rfcn => Decoder::Rfcn(RfcnDecoder::new(self.load::<RfcnConfig>()?)?),
      Architecture::Classification => Decoder::Classification(ClassificationDecoder::new(
        self.load::<ClassificationConfig>()?,
      )?),
      Architecture::Segment => Decoder::Segment(SegmentDecoder::new()),
    };
    info!("{} 解码器就绪", self.architecture);
    Ok(decoder)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn aliases_map_to_architectures() {
    assert_eq!(Architecture::from_model_name("fasterrcnn").unwrap(), Architecture::Rfcn);
    assert_eq!(Architecture::from_model_name("rfcn").unwrap(), Architecture::Rfcn);
    assert_eq!(
      Architecture::from_model_name("se_resnet_gray").unwrap(),
      Architecture::Classification
    );
    assert_eq!(
      "efficientnet_b0".parse::<Architecture>().unwrap(),
      Architecture::Classification
    );
  }

  #[test]
  fn unknown_model_fails_fast() {
    let err = Architecture::from_model_name("yolov9").unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedModel(name) if name == "yolov9"));
  }

  #[test]
  fn url_without_path_uses_defaults() {
    let url = Url::parse("yolov5:").unwrap();
    let decoder = DecoderBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(decoder.architecture(), Architecture::Yolo5);
    match decoder {
      Decoder::Yolo5(d) => assert_eq!(d.config().nms_top_k, 5000),
      other => panic!("意外的解码器: {:?}", other.architecture()),
    }
  }

  #[test]
  fn url_path_is_config_file() {
    let url = Url::parse("ssd:///etc/perception/ssd.json").unwrap();
    let builder = DecoderBuilder::from_url(&url).unwrap();
    assert_eq!(
      builder.source,
      ConfigSource::File(PathBuf::from("/etc/perception/ssd.json"))
    );
  }

  #[test]
  fn missing_config_file_is_io_error() {
    let err = DecoderBuilder::new("yolov3")
      .unwrap()
      .config_file("/nonexistent/shanan/yolov3.json")
      .build()
      .unwrap_err();
    assert!(matches!(err, DecodeError::Config(ConfigError::Io(_))));
  }

  #[test]
  fn underscore_model_names_parse_with_config_path() {
    let builder: DecoderBuilder = "lenet_gray:///etc/shanan/lenet.json".parse().unwrap();
    assert_eq!(builder.architecture(), Architecture::Classification);
    assert_eq!(
      builder.source,
      ConfigSource::File(PathBuf::from("/etc/shanan/lenet.json"))
    );

    let builder: DecoderBuilder = "resnet50_feature".parse().unwrap();
    assert_eq!(builder.source, ConfigSource::Defaults);
    let builder: DecoderBuilder = "se_resnet_gray:".parse().unwrap();
    assert_eq!(builder.source, ConfigSource::Defaults);

    let err = "mystery_net:///cfg.json".parse::<DecoderBuilder>().unwrap_err();
    assert!(matches!(err, DecodeError::UnsupportedModel(name) if name == "mystery_net"));
  }

  #[test]
  fn invalid_config_is_rejected_at_build() {
    let err = DecoderBuilder::new("s3fd")
      .unwrap()
      .config_json(r#"{"s3fd": {"step": [4, 8], "min_size": [[16, 16]]}}"#)
      .build()
      .unwrap_err();
    assert!(matches!(err, DecodeError::Config(ConfigError::Invalid(_))));
  }
}
