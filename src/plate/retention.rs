// 该文件是 Chewei （车位） 项目的一部分。
// src/plate/retention.rs - 候选车牌保留缓冲区
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

//! 在整个视频流中保留置信度最高的 K 个候选区域。
//!
//! 缓冲区是一个容量固定的小顶堆：堆顶是当前“最差”的候选。
//! 缓冲区满时，新候选只有严格高于堆顶置信度才会替换它。
//! 每接受一个候选，冷却计数重置为 `cooldown_frames`，
//! 冷却期内任何候选都会被忽略，避免同一块车牌的相邻帧占满缓冲区。
//!
//! 置信度相同时先到者优先：`drain` 中排在前面，也不会被同分的后来者替换。

use std::{cmp::Ordering, collections::BinaryHeap};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("缓冲区容量必须至少为 1")]
  ZeroCapacity,
  #[error("置信度阈值必须在 [0, 1] 内: {0}")]
  ThresholdOutOfRange(f32),
}

fn default_capacity() -> usize {
  3
}

fn default_cooldown_frames() -> u32 {
  5
}

fn default_threshold() -> f32 {
  0.6
}

/// 保留缓冲区配置
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RetentionConfig {
  /// 最多保留的候选数 K
  #[serde(default = "default_capacity")]
  pub capacity: usize,
  /// 接受一个候选后忽略的帧数 C
  #[serde(default = "default_cooldown_frames")]
  pub cooldown_frames: u32,
  /// 接受候选的最低置信度
  #[serde(default = "default_threshold")]
  pub threshold: f32,
}

impl Default for RetentionConfig {
  fn default() -> Self {
    Self {
      capacity: default_capacity(),
      cooldown_frames: default_cooldown_frames(),
      threshold: default_threshold(),
    }
  }
}

impl RetentionConfig {
  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  pub fn with_cooldown_frames(mut self, cooldown_frames: u32) -> Self {
    self.cooldown_frames = cooldown_frames;
    self
  }

  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.capacity == 0 {
      return Err(ConfigError::ZeroCapacity);
    }
    if !(0.0..=1.0).contains(&self.threshold) {
      return Err(ConfigError::ThresholdOutOfRange(self.threshold));
    }
    Ok(())
  }
}

/// 被保留的候选
#[derive(Debug, Clone)]
pub struct Candidate<T> {
  pub confidence: f32,
  /// 到达顺序，用于同分排序
  pub sequence: u64,
  pub region: T,
}

/// 排名更差的候选更“大”，因此位于 `BinaryHeap` 堆顶
impl<T> Ord for Candidate<T> {
  fn cmp(&self, other: &Self) -> Ordering {
    other
      .confidence
      .total_cmp(&self.confidence)
      .then(self.sequence.cmp(&other.sequence))
  }
}

impl<T> PartialOrd for Candidate<T> {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl<T> PartialEq for Candidate<T> {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl<T> Eq for Candidate<T> {}

#[derive(Debug)]
pub struct RetentionBuffer<T> {
  config: RetentionConfig,
  items: BinaryHeap<Candidate<T>>,
  cooldown_remaining: u32,
  next_sequence: u64,
}

impl<T> RetentionBuffer<T> {
  pub fn new(config: RetentionConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self {
      config,
      items: BinaryHeap::with_capacity(config.capacity),
      cooldown_remaining: 0,
      next_sequence: 0,
    })
  }

  pub fn config(&self) -> &RetentionConfig {
    &self.config
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn is_full(&self) -> bool {
    self.items.len() >= self.config.capacity
  }

  pub fn cooldown_remaining(&self) -> u32 {
    self.cooldown_remaining
  }

  /// 当前保留的最低置信度
  pub fn min_confidence(&self) -> Option<f32> {
    self.items.peek().map(|c| c.confidence)
  }

  /// `observe` 是否会接受该置信度，不修改状态
  pub fn admits(&self, confidence: f32) -> bool {
    if self.cooldown_remaining > 0 {
      return false;
    }
    if confidence.is_nan() || confidence < self.config.threshold {
      return false;
    }
    match self.min_confidence() {
      Some(min) if self.is_full() => confidence > min,
      _ => true,
    }
  }

  /// 提交一个候选，返回是否被接受
  pub fn observe(&mut self, confidence: f32, region: T) -> bool {
    if !self.admits(confidence) {
      return false;
    }

    if self.is_full()
      && let Some(evicted) = self.items.pop()
    {
      debug!("替换候选: {:.3} -> {:.3}", evicted.confidence, confidence);
    }

    self.items.push(Candidate {
      confidence,
      sequence: self.next_sequence,
      region,
    });
    self.next_sequence += 1;
    self.cooldown_remaining = self.config.cooldown_frames;
    true
  }

  /// 每处理一帧调用一次
  pub fn tick(&mut self) {
    self.cooldown_remaining = self.cooldown_remaining.saturating_sub(1);
  }

  /// 取出全部候选，置信度从高到低，同分时先到者在前
  pub fn drain(&mut self) -> Vec<Candidate<T>> {
    // 升序排列即“从最好到最差”
    let mut candidates = std::mem::take(&mut self.items).into_sorted_vec();
    candidates.shrink_to_fit();
    candidates
  }

  pub fn clear(&mut self) {
    self.items.clear();
    self.cooldown_remaining = 0;
  }
}
