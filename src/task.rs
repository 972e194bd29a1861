// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 任务调度
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

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::frame::Frame;
use crate::model::PostProcess;
use crate::output::Render;

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

fn decode_frame<M, E>(model: &M, frame: &Frame) -> Result<M::Output, E>
where
  M: PostProcess,
  E: From<crate::model::DecodeError>,
{
  let tensors = frame.tensors();
  Ok(model.postprocess(&tensors, &frame.image)?)
}

/// 只处理第一帧
pub struct OneShotTask;

impl<D, RE, I, M, O> Task<I, M, O> for OneShotTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  M: PostProcess<Output = D>,
  O: Render<Frame, D, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始解码...");
    let now = Instant::now();
    let result = decode_frame::<_, anyhow::Error>(&model, &frame)?;
    let elapsed = now.elapsed();
    info!("解码完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("输出完成，耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 重复解码第一帧，统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }
}

impl<D, RE, I, M, O> Task<I, M, O> for RepeatShotTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  M: PostProcess<Output = D>,
  O: Render<Frame, D, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始解码...");
    let mut times = Vec::with_capacity(self.repeat);
    let mut last = None;
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = decode_frame::<_, anyhow::Error>(&model, &frame)?;
      let elapsed = now.elapsed();
      debug!("({})解码完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(result);
    }
    if let Some(result) = last {
      output.render_result(&frame, &result)?;
    }

    // 前两次包含先验框生成等预热开销
    let warm = if times.len() > 2 { &times[2..] } else { &times[..] };
    warn!(
      "平均解码时间: {:.2?}",
      warm.iter().sum::<Duration>() / warm.len() as u32
    );

    Ok(())
  }
}

/// 顺序处理全部帧，可限制帧数
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<D, RE, I, M, O> Task<I, M, O> for ContinuousTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  M: PostProcess<Output = D>,
  O: Render<Frame, D, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut count = 0usize;
    for frame in input {
      count += 1;
      let now = Instant::now();
      let result = decode_frame::<_, anyhow::Error>(&model, &frame)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &result)?;
      debug!(
        "第 {} 帧完成，耗时: {:.2?} / {:.2?}",
        frame.index,
        elapsed_a,
        now.elapsed()
      );
      if self.frame_number.is_some_and(|n| count >= n) {
        info!("达到指定帧数 {}, 退出任务循环", count);
        break;
      }
    }

    info!("任务完成，共处理 {} 帧", count);
    Ok(())
  }
}

/// 多线程解码，按输入顺序输出
///
/// 每批取 `workers` 帧，在作用域线程中并行解码后依次输出。
/// 解码器在线程间只读共享。
#[derive(Debug)]
pub struct ParallelTask {
  workers: usize,
}

impl Default for ParallelTask {
  fn default() -> Self {
    let workers = std::thread::available_parallelism()
      .map(|n| n.get())
      .unwrap_or(1);
    Self { workers }
  }
}

impl ParallelTask {
  pub fn with_workers(mut self, workers: usize) -> Self {
    self.workers = workers.max(1);
    self
  }
}

impl<D, RE, I, M, O> Task<I, M, O> for ParallelTask
where
  D: Send,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Frame>,
  M: PostProcess<Output = D> + Sync,
  O: Render<Frame, D, Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务, 工作线程 {} 个...", self.workers);
    let started = Instant::now();
    let mut count = 0usize;

    loop {
      let batch: Vec<Frame> = input.by_ref().take(self.workers).collect();
      if batch.is_empty() {
        break;
      }

      let model = &model;
      let results: Vec<anyhow::Result<D>> = std::thread::scope(|s| {
        let handles: Vec<_> = batch
          .iter()
          .map(|frame| s.spawn(move || decode_frame::<_, anyhow::Error>(model, frame)))
          .collect();
        handles
          .into_iter()
          .map(|h| {
            h.join()
              .unwrap_or_else(|_| Err(anyhow::anyhow!("解码线程异常退出")))
          })
          .collect()
      });

      for (frame, result) in batch.iter().zip(results) {
        output.render_result(frame, &result?)?;
        count += 1;
      }
    }

    info!("任务完成，共处理 {} 帧，耗时: {:.2?}", count, started.elapsed());
    Ok(())
  }
}
