// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 推理输出回放输入
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

//! 从磁盘回放推理输出。
//!
//! 清单文件为 JSON，列出每一帧的图像元数据与各输出张量的转储文件：
//!
//! ```json
//! { "frames": [ { "name": "000001",
//!     "image": { "input_width": 416, "input_height": 416,
//!                "original_width": 640, "original_height": 480 },
//!     "tensors": [ { "file": "000001_0.bin", "layout": "NHWC",
//!                    "shape": [1, 13, 13, 425], "aligned_shape": [1, 13, 16, 425] } ] } ] }
//! ```
//!
//! 转储文件为小端 `f32` 序列，长度按对齐形状计算；相对路径相对于清单所在目录。

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::frame::{Frame, ImageMeta};
use crate::tensor::{Layout, Shape, TensorBuffer, TensorError};
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("读取 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("解析清单失败: {0}")]
  Manifest(#[from] serde_json::Error),
  #[error("张量 {path} 的字节数 {len} 不是 4 的倍数")]
  Misaligned { path: PathBuf, len: usize },
  #[error("张量形状错误: {0}")]
  Tensor(#[from] TensorError),
}

#[derive(Debug, Deserialize)]
struct Manifest {
  frames: Vec<FrameEntry>,
}

#[derive(Debug, Deserialize)]
struct FrameEntry {
  #[serde(default)]
  name: Option<String>,
  image: ImageMeta,
  tensors: Vec<TensorEntry>,
}

#[derive(Debug, Deserialize)]
struct TensorEntry {
  file: PathBuf,
  #[serde(default)]
  layout: Layout,
  /// 按布局顺序给出的逻辑维度
  shape: [usize; 4],
  #[serde(default)]
  aligned_shape: Option<[usize; 4]>,
}

fn read_f32_le(path: &Path) -> Result<Vec<f32>, InputError> {
  let bytes = std::fs::read(path).map_err(|source| InputError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  if bytes.len() % 4 != 0 {
    return Err(InputError::Misaligned {
      path: path.to_path_buf(),
      len: bytes.len(),
    });
  }
  Ok(
    bytes
      .chunks_exact(4)
      .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
      .collect(),
  )
}

impl TensorEntry {
  fn load(&self, base: &Path) -> Result<TensorBuffer, InputError> {
    let path = base.join(&self.file);
    let data = read_f32_le(&path)?;
    let shape = Shape::from_dims(self.layout, self.shape);
    let aligned = self
      .aligned_shape
      .map(|dims| Shape::from_dims(self.layout, dims))
      .unwrap_or(shape);
    Ok(TensorBuffer::with_aligned(data, self.layout, shape, aligned)?)
  }
}

const FEATURE_REPLAY_SCHEME: &str = "replay";

/// 按清单顺序逐帧读取推理输出
///
/// 读取失败的帧记录错误后跳过。
pub struct FeatureReplayInput {
  base: PathBuf,
  frames: std::vec::IntoIter<FrameEntry>,
  index: usize,
}

impl FromUrl for FeatureReplayInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != FEATURE_REPLAY_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        FEATURE_REPLAY_SCHEME,
        url.scheme()
      );
      return Err(InputError::SchemeMismatch);
    }
    Self::open(url.path())
  }
}

impl FromUrlWithScheme for FeatureReplayInput {
  const SCHEME: &'static str = FEATURE_REPLAY_SCHEME;
}

impl FeatureReplayInput {
  pub fn open(manifest: impl AsRef<Path>) -> Result<Self, InputError> {
    let manifest = manifest.as_ref();
    info!("加载回放清单: {}", manifest.display());
    let json = std::fs::read_to_string(manifest).map_err(|source| InputError::Io {
      path: manifest.to_path_buf(),
      source,
    })?;
    let base = manifest.parent().map(Path::to_path_buf).unwrap_or_default();
    Self::from_manifest_str(&json, base)
  }

  /// 从清单文本构造，`base` 为张量文件相对路径的根目录
  pub fn from_manifest_str(json: &str, base: impl Into<PathBuf>) -> Result<Self, InputError> {
    let manifest: Manifest = serde_json::from_str(json)?;
    debug!("回放清单共 {} 帧", manifest.frames.len());
    Ok(Self {
      base: base.into(),
      frames: manifest.frames.into_iter(),
      index: 0,
    })
  }

  fn load(&self, index: usize, entry: FrameEntry) -> Result<Frame, InputError> {
    let outputs = entry
      .tensors
      .iter()
      .map(|t| t.load(&self.base))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Frame {
      index,
      name: entry.name,
      image: entry.image,
      outputs,
    })
  }
}

impl Iterator for FeatureReplayInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      let entry = self.frames.next()?;
      let index = self.index;
      self.index += 1;
      match self.load(index, entry) {
        Ok(frame) => return Some(frame),
        Err(e) => error!("读取第 {} 帧失败, 跳过: {}", index, e),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("shanan-input-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  fn write_f32(path: &Path, values: &[f32]) {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    std::fs::write(path, bytes).unwrap();
  }

  #[test]
  fn replays_frames_in_order() {
    let dir = scratch_dir("order");
    write_f32(&dir.join("a.bin"), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    write_f32(&dir.join("b.bin"), &[7.0, 8.0]);
    let manifest = r#"{ "frames": [
      { "name": "first", "image": { "input_width": 2, "input_height": 1,
          "original_width": 4, "original_height": 2 },
        "tensors": [ { "file": "a.bin", "shape": [1, 1, 2, 2], "aligned_shape": [1, 1, 3, 2] } ] },
      { "image": { "input_width": 2, "input_height": 1,
          "original_width": 2, "original_height": 1, "is_pad_resize": true },
        "tensors": [ { "file": "b.bin", "layout": "NCHW", "shape": [1, 2, 1, 1] } ] } ] }"#;
    std::fs::write(dir.join("manifest.json"), manifest).unwrap();

    let url = Url::parse(&format!("replay://{}", dir.join("manifest.json").display())).unwrap();
    let frames: Vec<Frame> = FeatureReplayInput::from_url(&url).unwrap().collect();
    assert_eq!(frames.len(), 2);

    assert_eq!(frames[0].name.as_deref(), Some("first"));
    let t = frames[0].tensors()[0];
    assert_eq!(t.aligned_shape().width, 3);
    assert_eq!(t.get(0, 1, 1), 4.0);

    assert_eq!(frames[1].index, 1);
    assert!(frames[1].image.is_pad_resize);
    assert_eq!(frames[1].tensors()[0].shape().channel, 2);
  }

  #[test]
  fn broken_frame_is_skipped() {
    let dir = scratch_dir("broken");
    write_f32(&dir.join("ok.bin"), &[1.0]);
    std::fs::write(dir.join("odd.bin"), [0u8; 3]).unwrap();
    let manifest = r#"{ "frames": [
      { "image": { "input_width": 1, "input_height": 1, "original_width": 1, "original_height": 1 },
        "tensors": [ { "file": "odd.bin", "shape": [1, 1, 1, 1] } ] },
      { "image": { "input_width": 1, "input_height": 1, "original_width": 1, "original_height": 1 },
        "tensors": [ { "file": "missing.bin", "shape": [1, 1, 1, 1] } ] },
      { "image": { "input_width": 1, "input_height": 1, "original_width": 1, "original_height": 1 },
        "tensors": [ { "file": "ok.bin", "shape": [1, 1, 1, 1] } ] } ] }"#;
    let frames: Vec<Frame> = FeatureReplayInput::from_manifest_str(manifest, dir.clone())
      .unwrap()
      .collect();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].index, 2);
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("image:///tmp/a.png").unwrap();
    assert!(matches!(
      FeatureReplayInput::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));
  }
}
