// 该文件是 Chewei （车位） 项目的一部分。
// src/model/replay.rs - 回放检测结果的检测器
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

//! 从 JSON 文件回放预先计算好的检测结果。
//!
//! 文件格式：
//!
//! ```json
//! {
//!   "frames": [
//!     { "index": 3, "detections": [ { "class_id": 0, "score": 0.9, "bbox": [10, 20, 110, 50] } ] }
//!   ]
//! }
//! ```
//!
//! 未出现的帧索引视为没有检测结果。

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{DetectItem, DetectResult, Model},
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("检测记录解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("帧 {0} 出现重复记录")]
  DuplicateFrame(u64),
}

#[derive(Deserialize)]
struct ReplayFile {
  frames: Vec<ReplayFrame>,
}

#[derive(Deserialize)]
struct ReplayFrame {
  index: u64,
  #[serde(default)]
  detections: Vec<DetectItem>,
}

/// 按帧索引回放检测结果
#[derive(Debug, Clone, Default)]
pub struct ReplayDetector {
  frames: HashMap<u64, Vec<DetectItem>>,
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetector {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    info!("加载检测记录: {}", url.path());
    let content = std::fs::read_to_string(url.path())?;
    Self::from_json_str(&content)
  }
}

impl ReplayDetector {
  pub fn from_json_str(content: &str) -> Result<Self, ReplayError> {
    let file: ReplayFile = serde_json::from_str(content)?;
    let mut frames = HashMap::with_capacity(file.frames.len());
    for frame in file.frames {
      if frames.insert(frame.index, frame.detections).is_some() {
        return Err(ReplayError::DuplicateFrame(frame.index));
      }
    }
    debug!("检测记录包含 {} 帧", frames.len());
    Ok(Self { frames })
  }

  pub fn with_frame(mut self, index: u64, detections: Vec<DetectItem>) -> Self {
    self.frames.insert(index, detections);
    self
  }
}

impl Model for ReplayDetector {
  type Input = Frame;
  type Output = DetectResult;
  type Error = ReplayError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let items = self.frames.get(&input.index).cloned().unwrap_or_default();
    Ok(DetectResult::from(items))
  }
}
