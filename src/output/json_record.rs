// 该文件是 Chewei （车位） 项目的一部分。
// src/output/json_record.rs - JSON 行记录输出
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

use std::{
  fs::OpenOptions,
  io::Write,
  path::Path,
  sync::{Mutex, PoisonError},
};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, frame::Frame, occupancy::OccupancyReport, output::Render,
  plate::PlateOutcome,
};

#[derive(Error, Debug)]
pub enum JsonRecordError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct PlateRecord<'a> {
  source: &'a str,
  #[serde(flatten)]
  outcome: &'a PlateOutcome,
}

#[derive(Serialize)]
struct OccupancyRecord<'a> {
  frame: u64,
  timestamp_ms: u64,
  #[serde(flatten)]
  report: &'a OccupancyReport,
}

/// 每个结果写一行 JSON
///
/// `json://stdout` 写到标准输出，`json:///path/to/records.jsonl` 追加到文件。
pub struct JsonRecordOutput {
  writer: Mutex<Box<dyn Write + Send>>,
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonRecordError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    if url.host_str() == Some("stdout") {
      return Ok(Self::stdout());
    }
    Self::append(url.path())
  }
}

impl JsonRecordOutput {
  pub fn stdout() -> Self {
    Self::from_writer(std::io::stdout())
  }

  pub fn append(path: impl AsRef<Path>) -> Result<Self, JsonRecordError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    debug!("JSON 记录输出到文件: {}", path.display());
    Ok(Self::from_writer(file))
  }

  pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
    Self {
      writer: Mutex::new(Box::new(writer)),
    }
  }

  fn write_record<T: Serialize>(&self, record: &T) -> Result<(), JsonRecordError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
  }
}

impl Render<str, PlateOutcome> for JsonRecordOutput {
  type Error = JsonRecordError;

  fn render_result(&self, source: &str, result: &PlateOutcome) -> Result<(), Self::Error> {
    self.write_record(&PlateRecord {
      source,
      outcome: result,
    })
  }
}

impl Render<Frame, OccupancyReport> for JsonRecordOutput {
  type Error = JsonRecordError;

  fn render_result(&self, frame: &Frame, result: &OccupancyReport) -> Result<(), Self::Error> {
    self.write_record(&OccupancyRecord {
      frame: frame.index,
      timestamp_ms: frame.timestamp_ms,
      report: result,
    })
  }
}
