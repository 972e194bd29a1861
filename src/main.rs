// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 离线回放解码程序
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

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;
use url::Url;

use shanan_perception::{
  DecoderBuilder, FromUrl,
  input::FeatureReplayInput,
  output::JsonLinesOutput,
  task::{ContinuousTask, OneShotTask, ParallelTask, RepeatShotTask, Task},
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
  /// 只处理第一帧
  Oneshot,
  /// 顺序处理全部帧
  Continuous,
  /// 重复解码第一帧并统计耗时
  Repeat,
  /// 多线程并行解码
  Parallel,
}

/// Shanan 感知后处理参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// 模型名称（如 yolov3、lenet_gray）或 `<模型名>:///path/config.json`
  #[arg(long, value_name = "MODEL")]
  model: String,
  /// JSON 配置文件，优先于模型 URL 中的路径
  #[arg(long, value_name = "FILE")]
  config: Option<PathBuf>,
  /// 回放清单，如 replay:///data/manifest.json
  #[arg(long, value_name = "SOURCE")]
  input: Url,
  /// 输出路径，如 jsonl:///data/result.jsonl，路径为空时写到标准输出
  #[arg(long, value_name = "OUTPUT", default_value = "jsonl:")]
  output: Url,
  /// 运行方式
  #[arg(long, value_enum, default_value_t = Mode::Continuous)]
  mode: Mode,
  /// 并行模式的工作线程数，默认取 CPU 核数
  #[arg(long, value_name = "COUNT")]
  workers: Option<usize>,
  /// 最多处理的帧数
  #[arg(long, value_name = "COUNT")]
  frames: Option<usize>,
  /// 重复模式的解码次数
  #[arg(long, value_name = "COUNT", default_value_t = 1000)]
  repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let mut builder: DecoderBuilder = args.model.parse()?;
  if let Some(config) = &args.config {
    builder = builder.config_file(config);
  }
  let decoder = builder.build()?;
  let input = FeatureReplayInput::from_url(&args.input)?;
  let output = JsonLinesOutput::from_url(&args.output)?;

  match args.mode {
    Mode::Oneshot => OneShotTask.run_task(input, &decoder, output),
    Mode::Continuous => ContinuousTask::default()
      .with_frame_number(args.frames)
      .run_task(input, &decoder, output),
    Mode::Repeat => RepeatShotTask::default()
      .with_repeat(args.repeat)
      .run_task(input, &decoder, output),
    Mode::Parallel => {
      let task = match args.workers {
        Some(workers) => ParallelTask::default().with_workers(workers),
        None => ParallelTask::default(),
      };
      let input = input.take(args.frames.unwrap_or(usize::MAX));
      task.run_task(input, &decoder, output)
    }
  }
}
