// 该文件是 Chewei （车位） 项目的一部分。
// src/occupancy/layout.rs - 车位布局
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

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, geometry::BoundingBox};

#[derive(Error, Debug)]
pub enum LayoutError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("布局解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("车位编号重复: {0}")]
  DuplicateSlot(String),
  #[error("车位 {id} 的区域无效: {roi:?}")]
  DegenerateRoi { id: String, roi: BoundingBox },
}

/// 车位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
  pub id: String,
  pub roi: BoundingBox,
}

impl Slot {
  pub fn new(id: impl Into<String>, roi: BoundingBox) -> Self {
    Self { id: id.into(), roi }
  }
}

/// 车位布局，格式为 `{"slots": [{"id": "slot1", "roi": [x1, y1, x2, y2]}]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotLayout {
  pub slots: Vec<Slot>,
}

impl FromUrlWithScheme for SlotLayout {
  const SCHEME: &'static str = "layout";
}

impl FromUrl for SlotLayout {
  type Error = LayoutError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(LayoutError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::load(url.path())
  }
}

impl SlotLayout {
  pub fn new(slots: Vec<Slot>) -> Result<Self, LayoutError> {
    let layout = Self { slots };
    layout.validate()?;
    Ok(layout)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, LayoutError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let layout = Self::from_json_str(&content)?;
    info!(
      "车位布局已加载: {} ({} 个车位)",
      path.as_ref().display(),
      layout.slots.len()
    );
    Ok(layout)
  }

  pub fn from_json_str(content: &str) -> Result<Self, LayoutError> {
    let layout: SlotLayout = serde_json::from_str(content)?;
    layout.validate()?;
    Ok(layout)
  }

  fn validate(&self) -> Result<(), LayoutError> {
    let mut seen = HashSet::with_capacity(self.slots.len());
    for slot in &self.slots {
      if !seen.insert(slot.id.as_str()) {
        return Err(LayoutError::DuplicateSlot(slot.id.clone()));
      }
      if !slot.roi.is_finite() || !slot.roi.is_proper() {
        return Err(LayoutError::DegenerateRoi {
          id: slot.id.clone(),
          roi: slot.roi,
        });
      }
    }
    Ok(())
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_layout_file_format() {
    let layout = SlotLayout::from_json_str(
      r#"{"slots": [
        {"id": "slot1", "roi": [10, 10, 110, 210]},
        {"id": "slot2", "roi": [120, 10, 220, 210]}
      ]}"#,
    )
    .unwrap();
    assert_eq!(layout.slots.len(), 2);
    assert_eq!(layout.slots[1].id, "slot2");
    assert_eq!(layout.slots[1].roi, BoundingBox::new(120.0, 10.0, 220.0, 210.0));
  }

  #[test]
  fn empty_layout_is_valid() {
    assert!(SlotLayout::from_json_str(r#"{"slots": []}"#).unwrap().is_empty());
  }

  #[test]
  fn duplicate_ids_are_rejected() {
    let result = SlotLayout::from_json_str(
      r#"{"slots": [{"id": "a", "roi": [0, 0, 1, 1]}, {"id": "a", "roi": [2, 2, 3, 3]}]}"#,
    );
    assert!(matches!(result, Err(LayoutError::DuplicateSlot(id)) if id == "a"));
  }

  #[test]
  fn inverted_roi_is_rejected() {
    let result = SlotLayout::new(vec![Slot::new("a", BoundingBox::new(5.0, 0.0, 1.0, 4.0))]);
    assert!(matches!(result, Err(LayoutError::DegenerateRoi { .. })));
  }

  #[test]
  fn loads_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("parking_layout.json");
    std::fs::write(&path, r#"{"slots": [{"id": "slot1", "roi": [0, 0, 4, 4]}]}"#).unwrap();

    let url = Url::parse(&format!("layout://{}", path.display())).unwrap();
    let layout = SlotLayout::from_url(&url).unwrap();
    assert_eq!(layout.slots.len(), 1);
  }
}
