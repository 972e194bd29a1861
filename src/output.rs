// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 感知结果输出
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

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::frame::{Frame, ImageMeta};
use crate::model::PerceptionResult;
use crate::{FromUrl, FromUrlWithScheme};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

/// 每帧一行的输出记录
#[derive(Debug, Serialize)]
struct Record<'a> {
  frame: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  name: Option<&'a str>,
  image: &'a ImageMeta,
  result: &'a PerceptionResult,
}

const JSON_LINES_SCHEME: &str = "jsonl";

/// 将每帧结果写为一行 JSON
///
/// `jsonl:///path/to/result.jsonl` 写入文件，路径为空时写到标准输出。
/// 查询参数 `skip_empty` 表示跳过没有结果的帧。
pub struct JsonLinesOutput {
  sink: Mutex<Box<dyn Write + Send>>,
  skip_empty: bool,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = JSON_LINES_SCHEME;
}

impl FromUrl for JsonLinesOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(OutputError::SchemeMismatch);
    }

    let skip_empty = url.query_pairs().any(|(k, _)| k == "skip_empty");
    let path = url.path();
    let output = if path.is_empty() || path == "/" {
      Self::stdout()
    } else {
      Self::create(path)?
    };
    Ok(output.skip_empty(skip_empty))
  }
}

impl JsonLinesOutput {
  pub fn stdout() -> Self {
    Self::to_writer(std::io::stdout())
  }

  pub fn create(path: impl AsRef<Path>) -> Result<Self, OutputError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }
    info!("结果写入文件: {}", path.display());
    Ok(Self::to_writer(BufWriter::new(File::create(path)?)))
  }

  pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
    Self {
      sink: Mutex::new(Box::new(writer)),
      skip_empty: false,
    }
  }

  pub fn skip_empty(mut self, skip_empty: bool) -> Self {
    self.skip_empty = skip_empty;
    self
  }
}

impl Render<Frame, PerceptionResult> for JsonLinesOutput {
  type Error = OutputError;

  fn render_result(&self, frame: &Frame, result: &PerceptionResult) -> Result<(), Self::Error> {
    if self.skip_empty && result.is_empty() {
      debug!("第 {} 帧没有结果, 跳过输出", frame.index);
      return Ok(());
    }

    let record = Record {
      frame: frame.index,
      name: frame.name.as_deref(),
      image: &frame.image,
      result,
    };
    let line = serde_json::to_string(&record)?;

    let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
    writeln!(sink, "{}", line)?;
    sink.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::Bbox;
  use crate::model::Detection;
  use std::sync::Arc;

  #[derive(Clone, Default)]
  struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

  impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  fn frame(index: usize) -> Frame {
    Frame {
      index,
      name: Some(format!("{index:06}")),
      image: ImageMeta::new(416, 416, 640, 480),
      outputs: Vec::new(),
    }
  }

  #[test]
  fn writes_one_line_per_frame() {
    let buffer = SharedBuffer::default();
    let output = JsonLinesOutput::to_writer(buffer.clone());
    let result = PerceptionResult::Detections(vec![Detection::new(
      0,
      0.9,
      Bbox::new(1.0, 2.0, 3.0, 4.0),
    )]);
    output.render_result(&frame(0), &result).unwrap();
    output
      .render_result(&frame(1), &PerceptionResult::Detections(Vec::new()))
      .unwrap();

    let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["frame"], 0);
    assert_eq!(first["name"], "000000");
    assert_eq!(first["image"]["original_width"], 640);
    assert_eq!(first["result"]["detections"][0]["class_id"], 0);
  }

  #[test]
  fn skip_empty_drops_blank_frames() {
    let buffer = SharedBuffer::default();
    let output = JsonLinesOutput::to_writer(buffer.clone()).skip_empty(true);
    output
      .render_result(&frame(0), &PerceptionResult::Classifications(Vec::new()))
      .unwrap();
    assert!(buffer.0.lock().unwrap().is_empty());
  }

  #[test]
  fn scheme_must_be_jsonl() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      JsonLinesOutput::from_url(&url),
      Err(OutputError::SchemeMismatch)
    ));
  }
}
