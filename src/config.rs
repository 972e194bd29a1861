// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 各模型后处理配置
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

//! 配置均为不可变的值类型，启动时构造后注入解码器。
//! JSON 中缺省的字段取内置默认值。

use serde::{Deserialize, Deserializer, de::Error as _};
use std::path::Path;
use thiserror::Error;

use crate::labels::{COCO_CLASSES, FACE_CLASSES, VOC_CLASSES, to_owned_names};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("解析配置失败: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

impl ConfigError {
  fn invalid(msg: impl Into<String>) -> Self {
    ConfigError::Invalid(msg.into())
  }
}

/// 从 JSON 字符串加载配置
pub fn from_json_str<T: for<'de> Deserialize<'de>>(json: &str) -> Result<T, ConfigError> {
  Ok(serde_json::from_str(json)?)
}

/// 从 JSON 文件加载配置
pub fn from_json_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
  let contents = std::fs::read_to_string(path)?;
  from_json_str(&contents)
}

/// 非极大值抑制参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsConfig {
  pub iou_threshold: f32,
  pub max_keep: usize,
  /// 为 true 时仅在同类别之间抑制
  pub per_class: bool,
}

impl NmsConfig {
  pub fn new(iou_threshold: f32, max_keep: usize) -> Self {
    Self {
      iou_threshold,
      max_keep,
      per_class: false,
    }
  }
}

pub(crate) fn class_name(names: &[String], id: usize) -> Option<String> {
  names.get(id).cloned()
}

// 成对表既接受嵌套形式 [[a, b], ...]，也接受展平形式 [a, b, ...]

#[derive(Deserialize)]
#[serde(untagged)]
enum PairTable {
  Nested(Vec<[f32; 2]>),
  Flat(Vec<f32>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuadTable {
  Nested(Vec<[f32; 4]>),
  Flat(Vec<f32>),
}

fn de_pairs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<[f32; 2]>, D::Error> {
  match PairTable::deserialize(deserializer)? {
    PairTable::Nested(pairs) => Ok(pairs),
    PairTable::Flat(flat) => {
      if flat.len() % 2 != 0 {
        return Err(D::Error::custom(format!(
          "展平的成对表长度必须为偶数, 实际为 {}",
          flat.len()
        )));
      }
      Ok(flat.chunks_exact(2).map(|p| [p[0], p[1]]).collect())
    }
  }
}

fn de_quads<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<[f32; 4]>, D::Error> {
  match QuadTable::deserialize(deserializer)? {
    QuadTable::Nested(quads) => Ok(quads),
    QuadTable::Flat(flat) => {
      if flat.len() % 4 != 0 {
        return Err(D::Error::custom(format!(
          "展平的四元组表长度必须为 4 的倍数, 实际为 {}",
          flat.len()
        )));
      }
      Ok(
        flat
          .chunks_exact(4)
          .map(|q| [q[0], q[1], q[2], q[3]])
          .collect(),
      )
    }
  }
}

fn check_class_num(class_num: usize) -> Result<(), ConfigError> {
  if class_num == 0 {
    return Err(ConfigError::invalid("class_num 必须大于 0"));
  }
  Ok(())
}

// ---------------------------------------------------------------- SSD

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SsdParams {
  pub std: [f32; 4],
  pub mean: [f32; 4],
  /// 先验框中心偏移 (y, x)，单位为网格
  pub offset: [f32; 2],
  pub step: Vec<f32>,
  /// 每层 (min_size, max_size)
  #[serde(deserialize_with = "de_pairs")]
  pub anchor_size: Vec<[f32; 2]>,
  /// 每层 4 个宽高比，0 表示不使用
  #[serde(deserialize_with = "de_quads")]
  pub anchor_ratio: Vec<[f32; 4]>,
  pub class_num: usize,
  pub class_names: Vec<String>,
}

impl Default for SsdParams {
  fn default() -> Self {
    Self {
      std: [0.1, 0.1, 0.2, 0.2],
      mean: [0.0, 0.0, 0.0, 0.0],
      offset: [0.5, 0.5],
      step: vec![8.0, 16.0, 32.0, 64.0, 100.0, 300.0],
      anchor_size: vec![
        [30.0, 60.0],
        [60.0, 111.0],
        [111.0, 162.0],
        [162.0, 213.0],
        [213.0, 264.0],
        [264.0, 315.0],
      ],
      anchor_ratio: vec![
        [2.0, 0.5, 0.0, 0.0],
        [2.0, 0.5, 3.0, 1.0 / 3.0],
        [2.0, 0.5, 3.0, 1.0 / 3.0],
        [2.0, 0.5, 3.0, 1.0 / 3.0],
        [2.0, 0.5, 0.0, 0.0],
        [2.0, 0.5, 0.0, 0.0],
      ],
      class_num: VOC_CLASSES.len(),
      class_names: to_owned_names(&VOC_CLASSES),
    }
  }
}

impl SsdParams {
  pub fn layer_num(&self) -> usize {
    self.step.len()
  }

  /// 单个网格单元上的先验框数量
  pub fn anchors_per_cell(&self, layer: usize) -> usize {
    2 + self.anchor_ratio[layer].iter().filter(|r| **r != 0.0).count()
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SsdConfig {
  pub score_threshold: f32,
  pub nms_threshold: f32,
  pub nms_top_k: usize,
  pub per_class_nms: bool,
  pub ssd: SsdParams,
}

impl Default for SsdConfig {
  fn default() -> Self {
    Self {
      score_threshold: 0.3,
      nms_threshold: 0.3,
      nms_top_k: 200,
      per_class_nms: false,
      ssd: SsdParams::default(),
    }
  }
}

impl SsdConfig {
  pub fn nms(&self) -> NmsConfig {
    NmsConfig {
      iou_threshold: self.nms_threshold,
      max_keep: self.nms_top_k,
      per_class: self.per_class_nms,
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let p = &self.ssd;
    if p.step.is_empty() {
      return Err(ConfigError::invalid("ssd.step 不能为空"));
    }
    if p.anchor_size.len() != p.step.len() || p.anchor_ratio.len() != p.step.len() {
      return Err(ConfigError::invalid(format!(
        "ssd 各层表长度不一致: step={}, anchor_size={}, anchor_ratio={}",
        p.step.len(),
        p.anchor_size.len(),
        p.anchor_ratio.len()
      )));
    }
    check_class_num(p.class_num)
  }
}

// ---------------------------------------------------------------- S3FD

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct S3fdParams {
  /// [中心方差, 尺度方差]
  pub variance: [f32; 2],
  pub step: Vec<f32>,
  /// 每层先验框尺寸 (高, 宽)
  #[serde(deserialize_with = "de_pairs")]
  pub min_size: Vec<[f32; 2]>,
  pub class_num: usize,
  pub class_names: Vec<String>,
}

impl Default for S3fdParams {
  fn default() -> Self {
    Self {
      variance: [0.1, 0.2],
      step: vec![4.0, 8.0, 16.0, 32.0, 64.0, 128.0],
      min_size: vec![
        [16.0, 16.0],
        [32.0, 32.0],
        [64.0, 64.0],
        [128.0, 128.0],
        [256.0, 256.0],
        [512.0, 512.0],
      ],
      class_num: 1,
      class_names: to_owned_names(&FACE_CLASSES),
    }
  }
}

impl S3fdParams {
  pub fn layer_num(&self) -> usize {
    self.step.len()
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct S3fdConfig {
  pub score_threshold: f32,
  pub nms_threshold: f32,
  pub nms_top_k: usize,
  pub per_class_nms: bool,
  pub s3fd: S3fdParams,
}

impl Default for S3fdConfig {
  fn default() -> Self {
    Self {
      score_threshold: 0.2,
      nms_threshold: 0.2,
      nms_top_k: 750,
      per_class_nms: false,
      s3fd: S3fdParams::default(),
    }
  }
}

impl S3fdConfig {
  pub fn nms(&self) -> NmsConfig {
    NmsConfig {
      iou_threshold: self.nms_threshold,
      max_keep: self.nms_top_k,
      per_class: self.per_class_nms,
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let p = &self.s3fd;
    if p.step.is_empty() {
      return Err(ConfigError::invalid("s3fd.step 不能为空"));
    }
    if p.min_size.len() != p.step.len() {
      return Err(ConfigError::invalid(format!(
        "s3fd 各层表长度不一致: step={}, min_size={}",
        p.step.len(),
        p.min_size.len()
      )));
    }
    check_class_num(p.class_num)
  }
}

// ---------------------------------------------------------------- YOLOv2

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Yolo2Params {
  pub stride: f32,
  /// 先验框宽高，单位为网格
  #[serde(deserialize_with = "de_pairs")]
  pub anchors_table: Vec<[f32; 2]>,
  pub class_num: usize,
  pub class_names: Vec<String>,
}

impl Default for Yolo2Params {
  fn default() -> Self {
    Self {
      stride: 32.0,
      anchors_table: vec![
        [0.57273, 0.677385],
        [1.87446, 2.06253],
        [3.33843, 5.47434],
        [7.88282, 3.52778],
        [9.77052, 9.16828],
      ],
      class_num: COCO_CLASSES.len(),
      class_names: to_owned_names(&COCO_CLASSES),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Yolo2Config {
  pub score_threshold: f32,
  pub nms_threshold: f32,
  pub nms_top_k: usize,
  pub per_class_nms: bool,
  pub yolo2: Yolo2Params,
}

impl Default for Yolo2Config {
  fn default() -> Self {
    Self {
      score_threshold: 0.3,
      nms_threshold: 0.45,
      nms_top_k: 500,
      per_class_nms: false,
      yolo2: Yolo2Params::default(),
    }
  }
}

impl Yolo2Config {
  pub fn nms(&self) -> NmsConfig {
    NmsConfig {
      iou_threshold: self.nms_threshold,
      max_keep: self.nms_top_k,
      per_class: self.per_class_nms,
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let p = &self.yolo2;
    if p.stride <= 0.0 {
      return Err(ConfigError::invalid("yolo2.stride 必须大于 0"));
    }
    if p.anchors_table.is_empty() {
      return Err(ConfigError::invalid("yolo2.anchors_table 不能为空"));
    }
    check_class_num(p.class_num)
  }
}

// ---------------------------------------------------------------- YOLOv3 / YOLOv5

/// 多尺度 YOLO 参数，v3 与 v5 共用
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct YoloParams {
  pub strides: Vec<f32>,
  /// 每层若干先验框宽高
  pub anchors_table: Vec<Vec<[f32; 2]>>,
  pub class_num: usize,
  pub class_names: Vec<String>,
}

impl YoloParams {
  /// YOLOv3 默认值，先验框单位为网格
  pub fn yolo3_default() -> Self {
    Self {
      strides: vec![32.0, 16.0, 8.0],
      anchors_table: vec![
        vec![[3.625, 2.8125], [4.875, 6.1875], [11.65625, 10.1875]],
        vec![[1.875, 3.8125], [3.875, 2.8125], [3.6875, 7.4375]],
        vec![[1.25, 1.625], [2.0, 3.75], [4.125, 2.875]],
      ],
      class_num: COCO_CLASSES.len(),
      class_names: to_owned_names(&COCO_CLASSES),
    }
  }

  /// YOLOv5 默认值，先验框单位为像素
  pub fn yolo5_default() -> Self {
    Self {
      strides: vec![8.0, 16.0, 32.0],
      anchors_table: vec![
        vec![[10.0, 13.0], [16.0, 30.0], [33.0, 23.0]],
        vec![[30.0, 61.0], [62.0, 45.0], [59.0, 119.0]],
        vec![[116.0, 90.0], [156.0, 198.0], [373.0, 326.0]],
      ],
      class_num: COCO_CLASSES.len(),
      class_names: to_owned_names(&COCO_CLASSES),
    }
  }

  pub fn layer_num(&self) -> usize {
    self.strides.len()
  }

  fn validate(&self, section: &str) -> Result<(), ConfigError> {
    if self.strides.is_empty() {
      return Err(ConfigError::invalid(format!("{section}.strides 不能为空")));
    }
    if self.anchors_table.len() != self.strides.len() {
      return Err(ConfigError::invalid(format!(
        "{section} 特征层数量 {} 与先验框表层数 {} 不一致",
        self.strides.len(),
        self.anchors_table.len()
      )));
    }
    if self.strides.iter().any(|s| *s <= 0.0) {
      return Err(ConfigError::invalid(format!("{section}.strides 必须大于 0")));
    }
    if self.anchors_table.iter().any(Vec::is_empty) {
      return Err(ConfigError::invalid(format!(
        "{section}.anchors_table 每层至少需要一个先验框"
      )));
    }
    check_class_num(self.class_num)
  }
}

impl Default for YoloParams {
  fn default() -> Self {
    Self::yolo3_default()
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Yolo3Config {
  pub score_threshold: f32,
  pub nms_threshold: f32,
  pub nms_top_k: usize,
  pub per_class_nms: bool,
  pub yolo3: YoloParams,
}

impl Default for Yolo3Config {
  fn default() -> Self {
    Self {
      score_threshold: 0.3,
      nms_threshold: 0.45,
      nms_top_k: 500,
      per_class_nms: false,
      yolo3: YoloParams::yolo3_default(),
    }
  }
}

impl Yolo3Config {
  pub fn nms(&self) -> NmsConfig {
    NmsConfig {
      iou_threshold: self.nms_threshold,
      max_keep: self.nms_top_k,
      per_class: self.per_class_nms,
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.yolo3.validate("yolo3")
  }
}

// YoloParams 的缺省值为 v3 的表，v5 段落需要单独的缺省值
#[derive(Deserialize)]
#[serde(default)]
struct Yolo5Section {
  strides: Vec<f32>,
  anchors_table: Vec<Vec<[f32; 2]>>,
  class_num: usize,
  class_names: Vec<String>,
}

impl Default for Yolo5Section {
  fn default() -> Self {
    let p = YoloParams::yolo5_default();
    Self {
      strides: p.strides,
      anchors_table: p.anchors_table,
      class_num: p.class_num,
      class_names: p.class_names,
    }
  }
}

fn de_yolo5<'de, D: Deserializer<'de>>(deserializer: D) -> Result<YoloParams, D::Error> {
  let s = Yolo5Section::deserialize(deserializer)?;
  Ok(YoloParams {
    strides: s.strides,
    anchors_table: s.anchors_table,
    class_num: s.class_num,
    class_names: s.class_names,
  })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Yolo5Config {
  pub score_threshold: f32,
  pub nms_threshold: f32,
  pub nms_top_k: usize,
  pub per_class_nms: bool,
  #[serde(deserialize_with = "de_yolo5")]
  pub yolo5: YoloParams,
}

impl Default for Yolo5Config {
  fn default() -> Self {
    Self {
      score_threshold: 0.001,
      nms_threshold: 0.65,
      nms_top_k: 5000,
      per_class_nms: false,
      yolo5: YoloParams::yolo5_default(),
    }
  }
}

impl Yolo5Config {
  pub fn nms(&self) -> NmsConfig {
    NmsConfig {
      iou_threshold: self.nms_threshold,
      max_keep: self.nms_top_k,
      per_class: self.per_class_nms,
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    self.yolo5.validate("yolo5")?;
    let per_layer = self.yolo5.anchors_table[0].len();
    if self.yolo5.anchors_table.iter().any(|a| a.len() != per_layer) {
      return Err(ConfigError::invalid("yolo5 每层先验框数量必须相同"));
    }
    Ok(())
  }
}

// ---------------------------------------------------------------- 候选区域

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RfcnConfig {
  pub score_threshold: f32,
  pub class_num: usize,
  pub class_names: Vec<String>,
  /// 模型自身已做抑制，设置后才再做一次
  pub nms_threshold: Option<f32>,
  pub nms_top_k: usize,
}

impl Default for RfcnConfig {
  fn default() -> Self {
    Self {
      score_threshold: 0.8,
      class_num: VOC_CLASSES.len(),
      class_names: to_owned_names(&VOC_CLASSES),
      nms_threshold: None,
      nms_top_k: 300,
    }
  }
}

impl RfcnConfig {
  pub fn nms(&self) -> Option<NmsConfig> {
    self
      .nms_threshold
      .map(|iou_threshold| NmsConfig::new(iou_threshold, self.nms_top_k))
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    check_class_num(self.class_num)
  }
}

// ---------------------------------------------------------------- 分类

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
  pub top_k: usize,
  pub class_names: Vec<String>,
  /// 对展平的得分向量做 softmax
  pub softmax: bool,
}

impl Default for ClassificationConfig {
  fn default() -> Self {
    Self {
      top_k: 1,
      class_names: Vec::new(),
      softmax: true,
    }
  }
}

impl ClassificationConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.top_k == 0 {
      return Err(ConfigError::invalid("top_k 必须大于 0"));
    }
    Ok(())
  }
}
