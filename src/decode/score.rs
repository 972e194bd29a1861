// 该文件是 Shanan （山南西风） 项目的一部分。
// src/decode/score.rs - 置信度计算
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

/// softmax 后低于该值的概率置为 0
pub const CUT_OFF_THRESHOLD: f32 = 0.01;

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 数值稳定的 softmax，结果写入 `out`
///
/// 先减去最大值再取指数，`out` 长度须与 `logits` 相同。
pub fn softmax(logits: &[f32], out: &mut [f32]) {
  debug_assert_eq!(logits.len(), out.len());
  let Some(max) = logits.iter().copied().reduce(f32::max) else {
    return;
  };

  let mut sum = 0.0f64;
  for (o, l) in out.iter_mut().zip(logits) {
    *o = (l - max).exp();
    sum += *o as f64;
  }
  for o in out.iter_mut() {
    *o = (*o as f64 / sum) as f32;
  }
}

pub fn softmax_in_place(values: &mut [f32]) {
  let logits = values.to_vec();
  softmax(&logits, values);
}

/// 将低于 `threshold` 的概率置为 0
pub fn cut_off(probs: &mut [f32], threshold: f32) {
  for p in probs.iter_mut().filter(|p| **p < threshold) {
    *p = 0.0;
  }
}

/// S3FD 人脸置信度
///
/// 除最后一个通道外的所有通道取最大值作为背景，
/// 与最后一个通道（人脸）做二分类 softmax。
pub fn s3fd_face_score(logits: &[f32]) -> f32 {
  let Some((face, background)) = logits.split_last() else {
    return 0.0;
  };
  let Some(background) = background.iter().copied().reduce(f32::max) else {
    return 0.0;
  };

  let mut probs = [0.0; 2];
  softmax(&[background, *face], &mut probs);
  if probs[1] < CUT_OFF_THRESHOLD { 0.0 } else { probs[1] }
}

/// 最大值及其下标，相等时取最靠前的下标
pub fn argmax<I>(values: I) -> Option<(usize, f32)>
where
  I: IntoIterator<Item = f32>,
{
  let mut best: Option<(usize, f32)> = None;
  for (i, v) in values.into_iter().enumerate() {
    if best.is_none_or(|(_, b)| v > b) {
      best = Some((i, v));
    }
  }
  best
}

/// YOLO 置信度：`sigmoid(objectness) * sigmoid(最大类别 logit)`
///
/// 返回 (类别号, 置信度)，没有类别时返回 None。
pub fn yolo_confidence<I>(objectness: f32, class_logits: I) -> Option<(usize, f32)>
where
  I: IntoIterator<Item = f32>,
{
  argmax(class_logits).map(|(id, logit)| (id, sigmoid(objectness) * sigmoid(logit)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  #[test]
  fn softmax_sums_to_one() {
    let logits = [1.0, 2.0, 3.0, -4.0, 0.5];
    let mut probs = [0.0; 5];
    softmax(&logits, &mut probs);
    assert_relative_eq!(probs.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
    assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
  }

  #[test]
  fn softmax_survives_large_logits() {
    let mut probs = [1000.0, 1000.0];
    softmax_in_place(&mut probs);
    assert_relative_eq!(probs[0], 0.5);
    assert_relative_eq!(probs[1], 0.5);
  }

  #[test]
  fn cut_off_zeroes_small_probabilities() {
    let mut probs = [0.005, 0.5, 0.495];
    cut_off(&mut probs, CUT_OFF_THRESHOLD);
    assert_eq!(probs, [0.0, 0.5, 0.495]);
  }

  #[test]
  fn s3fd_uses_max_out_background() {
    // 背景取 max(1.0, 3.0) = 3.0
    let score = s3fd_face_score(&[1.0, 3.0, 2.0, 3.0]);
    assert_relative_eq!(score, 0.5);
    // 人脸概率过低时被截断
    assert_eq!(s3fd_face_score(&[10.0, 0.0]), 0.0);
  }

  #[test]
  fn argmax_prefers_first_maximum() {
    assert_eq!(argmax([1.0, 3.0, 3.0, 2.0]), Some((1, 3.0)));
    assert_eq!(argmax(Vec::<f32>::new()), None);
  }

  #[test]
  fn yolo_confidence_multiplies_sigmoids() {
    let (id, conf) = yolo_confidence(0.0, [-1.0, 0.0, -2.0]).unwrap();
    assert_eq!(id, 1);
    assert_relative_eq!(conf, 0.25);
  }
}
