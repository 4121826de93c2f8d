// 该文件是 Chewei （车位） 项目的一部分。
// src/plate.rs - 车牌识别流水线
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

//! 车牌识别流水线
//!
//! 状态机：`Scanning -> Reading -> Aggregating -> Done`。
//!
//! - 扫描：逐帧检测，车牌类别的检测框裁剪、二值化后送入保留缓冲区；
//!   缓冲区满或帧源耗尽时结束。
//! - 读取：按置信度从高到低对每个候选做文字识别，丢弃空结果和识别失败的候选。
//! - 汇总：对识别结果做多数投票。
//!
//! 找不到车牌是正常结果（[`PlateOutcome::NotFound`]），不是错误。

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  CancelFlag,
  frame::Frame,
  input::InputError,
  model::{DetectItem, Detector, Recognizer},
};

mod retention;
pub use self::retention::{Candidate, ConfigError, RetentionBuffer, RetentionConfig};

mod vote;
pub use self::vote::{Vote, majority_vote};

fn default_stop_when_full() -> bool {
  true
}

fn default_min_text_len() -> usize {
  1
}

/// 车牌识别配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlateConfig {
  #[serde(default)]
  pub retention: RetentionConfig,
  /// 检测器中车牌对应的类别
  #[serde(default)]
  pub plate_class: u32,
  /// 缓冲区满后提前结束扫描
  #[serde(default = "default_stop_when_full")]
  pub stop_when_full: bool,
  /// 识别结果去掉首尾空白后的最小字符数
  #[serde(default = "default_min_text_len")]
  pub min_text_len: usize,
  /// 最多扫描的帧数
  #[serde(default)]
  pub max_frames: Option<u64>,
}

impl Default for PlateConfig {
  fn default() -> Self {
    Self {
      retention: RetentionConfig::default(),
      plate_class: 0,
      stop_when_full: default_stop_when_full(),
      min_text_len: default_min_text_len(),
      max_frames: None,
    }
  }
}

impl PlateConfig {
  pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
    self.retention = retention;
    self
  }

  pub fn with_plate_class(mut self, plate_class: u32) -> Self {
    self.plate_class = plate_class;
    self
  }

  pub fn with_stop_when_full(mut self, stop_when_full: bool) -> Self {
    self.stop_when_full = stop_when_full;
    self
  }

  pub fn with_min_text_len(mut self, min_text_len: usize) -> Self {
    self.min_text_len = min_text_len;
    self
  }

  pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
    self.max_frames = max_frames;
    self
  }
}

#[derive(Error, Debug)]
pub enum ResolveError {
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("检测器失败 (帧 {frame}): {source}")]
  AdapterFailure {
    frame: u64,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
  #[error("扫描在 {frames_scanned} 帧后被取消")]
  Cancelled { frames_scanned: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotFoundReason {
  /// 帧源耗尽，没有保留任何候选
  NoDetection,
  /// 所有候选都没有识别出文字
  NoReadableText,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateReading {
  pub plate: String,
  /// 获胜结果的票数
  pub votes: usize,
  /// 全部有效识别结果，置信度从高到低
  pub readings: Vec<String>,
  /// 参与识别的候选数
  pub candidates: usize,
  pub frames_scanned: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PlateOutcome {
  Found(PlateReading),
  NotFound {
    reason: NotFoundReason,
    frames_scanned: u64,
  },
}

impl PlateOutcome {
  pub fn plate(&self) -> Option<&str> {
    match self {
      PlateOutcome::Found(reading) => Some(&reading.plate),
      PlateOutcome::NotFound { .. } => None,
    }
  }

  pub fn not_found_reason(&self) -> Option<NotFoundReason> {
    match self {
      PlateOutcome::Found(_) => None,
      PlateOutcome::NotFound { reason, .. } => Some(*reason),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Scanning,
  Reading,
  Aggregating,
  Done,
}

/// 车牌识别流水线
///
/// `resolve` 消耗自身，每次识别需要新的实例。
pub struct PlateResolver<D, R> {
  detector: D,
  recognizer: R,
  config: PlateConfig,
  buffer: RetentionBuffer<GrayImage>,
  stage: Stage,
  cancel: Option<CancelFlag>,
}

impl<D, R> PlateResolver<D, R>
where
  D: Detector,
  D::Error: std::error::Error + Send + Sync + 'static,
  R: Recognizer,
  R::Error: std::fmt::Display,
{
  pub fn new(detector: D, recognizer: R, config: PlateConfig) -> Result<Self, ConfigError> {
    let buffer = RetentionBuffer::new(config.retention)?;
    Ok(Self {
      detector,
      recognizer,
      config,
      buffer,
      stage: Stage::Scanning,
      cancel: None,
    })
  }

  pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
    self.cancel = Some(cancel);
    self
  }

  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub fn resolve<I>(mut self, frames: I) -> Result<PlateOutcome, ResolveError>
  where
    I: IntoIterator<Item = Result<Frame, InputError>>,
  {
    let frames_scanned = self.scan(frames.into_iter())?;

    self.transition(Stage::Reading);
    let candidates = self.buffer.drain();
    if candidates.is_empty() {
      info!("扫描 {} 帧，未保留任何候选", frames_scanned);
      self.transition(Stage::Done);
      return Ok(PlateOutcome::NotFound {
        reason: NotFoundReason::NoDetection,
        frames_scanned,
      });
    }
    let readings = self.read(&candidates);

    self.transition(Stage::Aggregating);
    let outcome = match majority_vote(&readings) {
      Some(vote) => {
        info!(
          "车牌识别结果: {} ({}/{} 票)",
          vote.text,
          vote.count,
          readings.len()
        );
        PlateOutcome::Found(PlateReading {
          plate: vote.text.to_string(),
          votes: vote.count,
          readings: readings.clone(),
          candidates: candidates.len(),
          frames_scanned,
        })
      }
      None => {
        info!("{} 个候选均未识别出文字", candidates.len());
        PlateOutcome::NotFound {
          reason: NotFoundReason::NoReadableText,
          frames_scanned,
        }
      }
    };

    self.buffer.clear();
    self.transition(Stage::Done);
    Ok(outcome)
  }

  fn transition(&mut self, next: Stage) {
    debug!("流水线阶段: {:?} -> {:?}", self.stage, next);
    self.stage = next;
  }

  /// 扫描帧源，返回处理的帧数
  fn scan(
    &mut self,
    mut frames: impl Iterator<Item = Result<Frame, InputError>>,
  ) -> Result<u64, ResolveError> {
    let mut frames_scanned = 0u64;

    loop {
      if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
        warn!("扫描在第 {} 帧前被取消", frames_scanned);
        return Err(ResolveError::Cancelled { frames_scanned });
      }
      if self.config.max_frames.is_some_and(|max| frames_scanned >= max) {
        info!("达到最大帧数 {}, 停止扫描", frames_scanned);
        break;
      }
      let Some(frame) = frames.next() else {
        debug!("帧源耗尽");
        break;
      };
      let frame = frame?;

      self.scan_frame(&frame)?;
      self.buffer.tick();
      frames_scanned += 1;

      if self.config.stop_when_full && self.buffer.is_full() {
        info!("第 {} 帧后缓冲区已满，停止扫描", frame.index);
        break;
      }
    }

    Ok(frames_scanned)
  }

  fn scan_frame(&mut self, frame: &Frame) -> Result<(), ResolveError> {
    let result = self
      .detector
      .infer(frame)
      .map_err(|e| ResolveError::AdapterFailure {
        frame: frame.index,
        source: Box::new(e),
      })?;
    if let Some(item) = result.first_invalid() {
      return Err(ResolveError::AdapterFailure {
        frame: frame.index,
        source: format!("非法检测结果: {:?}", item).into(),
      });
    }

    // 同一帧内先处理置信度最高的车牌
    let mut plates: Vec<&DetectItem> = result
      .items
      .iter()
      .filter(|item| item.class_id == self.config.plate_class)
      .collect();
    plates.sort_by(|a, b| b.score.total_cmp(&a.score));

    for item in plates {
      if !self.buffer.admits(item.score) {
        continue;
      }
      let Some(region) = frame.plate_region(&item.bbox) else {
        debug!("帧 {}: 检测框 {:?} 在图像之外", frame.index, item.bbox);
        continue;
      };
      if self.buffer.observe(item.score, region) {
        debug!(
          "帧 {}: 保留候选 {:.3} ({}/{})",
          frame.index,
          item.score,
          self.buffer.len(),
          self.buffer.config().capacity
        );
      }
    }

    Ok(())
  }

  fn read(&self, candidates: &[Candidate<GrayImage>]) -> Vec<String> {
    let min_len = self.config.min_text_len.max(1);
    let mut readings = Vec::with_capacity(candidates.len());

    for candidate in candidates {
      match self.recognizer.infer(&candidate.region) {
        Ok(text) => {
          let text = text.trim();
          if text.chars().count() >= min_len {
            debug!("候选 {:.3} 识别为 {:?}", candidate.confidence, text);
            readings.push(text.to_string());
          } else {
            debug!("候选 {:.3} 识别结果过短: {:?}", candidate.confidence, text);
          }
        }
        Err(e) => {
          warn!("候选 {:.3} 文字识别失败: {}", candidate.confidence, e);
        }
      }
    }

    readings
  }
}
