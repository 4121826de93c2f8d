// 该文件是 Chewei （车位） 项目的一部分。
// src/occupancy.rs - 车位占用判定
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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::Frame,
  input::InputError,
  model::{DetectItem, Detector},
};

mod layout;
pub use self::layout::{LayoutError, Slot, SlotLayout};

/// 车位编号 -> 是否占用
pub type OccupancyMap = BTreeMap<String, bool>;

fn default_accept_threshold() -> f32 {
  0.5
}

fn default_iou_threshold() -> f32 {
  0.5
}

/// 占用判定配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OccupancyConfig {
  /// 参与判定的检测框最低置信度
  #[serde(default = "default_accept_threshold")]
  pub accept_threshold: f32,
  /// IoU 超过该值即视为占用
  #[serde(default = "default_iou_threshold")]
  pub iou_threshold: f32,
  /// 只统计这些类别，`None` 表示全部类别
  #[serde(default)]
  pub vehicle_classes: Option<Vec<u32>>,
}

impl Default for OccupancyConfig {
  fn default() -> Self {
    Self {
      accept_threshold: default_accept_threshold(),
      iou_threshold: default_iou_threshold(),
      vehicle_classes: None,
    }
  }
}

impl OccupancyConfig {
  pub fn with_accept_threshold(mut self, accept_threshold: f32) -> Self {
    self.accept_threshold = accept_threshold;
    self
  }

  pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn with_vehicle_classes(mut self, vehicle_classes: Option<Vec<u32>>) -> Self {
    self.vehicle_classes = vehicle_classes;
    self
  }

  fn accepts(&self, item: &DetectItem) -> bool {
    item.score >= self.accept_threshold
      && self
        .vehicle_classes
        .as_ref()
        .is_none_or(|classes| classes.contains(&item.class_id))
  }
}

#[derive(Error, Debug)]
pub enum OccupancyError {
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("检测器失败: {0}")]
  AdapterFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("阈值必须在 [0, 1] 内: {0}")]
  ThresholdOutOfRange(f32),
}

/// 一次占用判定的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyReport {
  pub occupancy: OccupancyMap,
  /// 参与判定的检测框
  pub detections: Vec<DetectItem>,
  pub occupied: usize,
  pub free: usize,
  /// 布局中的车位，供可视化使用
  #[serde(skip)]
  pub slots: Vec<Slot>,
}

impl OccupancyReport {
  pub fn new(occupancy: OccupancyMap, detections: Vec<DetectItem>, slots: Vec<Slot>) -> Self {
    let occupied = occupancy.values().filter(|&&o| o).count();
    let free = occupancy.len() - occupied;
    Self {
      occupancy,
      detections,
      occupied,
      free,
      slots,
    }
  }

  pub fn is_occupied(&self, slot_id: &str) -> Option<bool> {
    self.occupancy.get(slot_id).copied()
  }
}

/// 逐个车位与所有合格检测框计算 IoU
///
/// 车位之间互不影响：一个大车跨两个车位时两个车位都会被标记为占用。
pub fn classify_detections(
  slots: &[Slot],
  detections: &[DetectItem],
  config: &OccupancyConfig,
) -> OccupancyMap {
  let accepted: Vec<&DetectItem> = detections
    .iter()
    .filter(|item| config.accepts(item))
    .collect();

  slots
    .iter()
    .map(|slot| {
      let occupied = accepted
        .iter()
        .any(|item| slot.roi.iou(&item.bbox) > config.iou_threshold);
      (slot.id.clone(), occupied)
    })
    .collect()
}

/// 车位占用判定
pub struct OccupancyEngine<D> {
  detector: D,
  config: OccupancyConfig,
}

impl<D> OccupancyEngine<D>
where
  D: Detector,
  D::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(detector: D, config: OccupancyConfig) -> Result<Self, OccupancyError> {
    for threshold in [config.accept_threshold, config.iou_threshold] {
      if !(0.0..=1.0).contains(&threshold) {
        return Err(OccupancyError::ThresholdOutOfRange(threshold));
      }
    }
    Ok(Self { detector, config })
  }

  pub fn config(&self) -> &OccupancyConfig {
    &self.config
  }

  /// 对一帧图像判定每个车位是否被占用
  pub fn classify(
    &self,
    frame: &Frame,
    layout: &SlotLayout,
  ) -> Result<OccupancyReport, OccupancyError> {
    let result = self
      .detector
      .infer(frame)
      .map_err(|e| OccupancyError::AdapterFailure(Box::new(e)))?;
    if let Some(item) = result.first_invalid() {
      return Err(OccupancyError::AdapterFailure(
        format!("非法检测结果: {:?}", item).into(),
      ));
    }

    let occupancy = classify_detections(&layout.slots, &result.items, &self.config);
    let detections: Vec<DetectItem> = result
      .items
      .iter()
      .filter(|item| self.config.accepts(item))
      .cloned()
      .collect();
    debug!(
      "检测到 {} 个目标，其中 {} 个参与判定",
      result.items.len(),
      detections.len()
    );

    let report = OccupancyReport::new(occupancy, detections, layout.slots.clone());
    info!("占用: {}, 空闲: {}", report.occupied, report.free);
    Ok(report)
  }

  /// 读取图像文件后判定
  #[cfg(feature = "read_image_file")]
  pub fn classify_path(
    &self,
    path: impl AsRef<std::path::Path>,
    layout: &SlotLayout,
  ) -> Result<OccupancyReport, OccupancyError> {
    let image = crate::input::decode_image_file(path.as_ref())?;
    self.classify(&Frame::new(image, 0), layout)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::geometry::BoundingBox;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox: BoundingBox::from(bbox),
    }
  }

  fn slots() -> Vec<Slot> {
    vec![
      Slot::new("slot1", BoundingBox::new(0.0, 0.0, 100.0, 200.0)),
      Slot::new("slot2", BoundingBox::new(100.0, 0.0, 200.0, 200.0)),
    ]
  }

  #[test]
  fn no_slots_is_empty_map() {
    let detections = [item(2, 0.9, [0.0, 0.0, 10.0, 10.0])];
    assert!(classify_detections(&[], &detections, &OccupancyConfig::default()).is_empty());
  }

  #[test]
  fn low_confidence_boxes_are_ignored() {
    let detections = [item(2, 0.49, [0.0, 0.0, 100.0, 200.0])];
    let map = classify_detections(&slots(), &detections, &OccupancyConfig::default());
    assert!(!map["slot1"]);
  }

  #[test]
  fn iou_must_exceed_threshold() {
    // IoU 正好 0.5
    let detections = [item(2, 0.9, [0.0, 0.0, 100.0, 100.0])];
    let config = OccupancyConfig::default();
    assert!(!classify_detections(&slots(), &detections, &config)["slot1"]);
    let config = config.with_iou_threshold(0.49);
    assert!(classify_detections(&slots(), &detections, &config)["slot1"]);
  }

  #[test]
  fn vehicle_class_filter() {
    let detections = [item(0, 0.9, [0.0, 0.0, 100.0, 200.0])];
    let config = OccupancyConfig::default().with_vehicle_classes(Some(vec![2, 5, 7]));
    assert!(!classify_detections(&slots(), &detections, &config)["slot1"]);
    let config = config.with_vehicle_classes(None);
    assert!(classify_detections(&slots(), &detections, &config)["slot1"]);
  }

  #[derive(Debug, thiserror::Error)]
  #[error("detector offline")]
  struct Offline;

  struct FailingDetector;

  impl crate::model::Model for FailingDetector {
    type Input = Frame;
    type Output = crate::model::DetectResult;
    type Error = Offline;

    fn infer(&self, _input: &Frame) -> Result<Self::Output, Offline> {
      Err(Offline)
    }
  }

  fn layout() -> SlotLayout {
    SlotLayout::new(slots()).unwrap()
  }

  fn frame() -> Frame {
    Frame::new(image::RgbImage::new(200, 200), 0)
  }

  #[test]
  fn detector_error_is_adapter_failure() {
    let engine = OccupancyEngine::new(FailingDetector, OccupancyConfig::default()).unwrap();
    match engine.classify(&frame(), &layout()) {
      Err(OccupancyError::AdapterFailure(e)) => assert_eq!(e.to_string(), "detector offline"),
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[test]
  fn out_of_range_score_is_adapter_failure() {
    let detector = crate::model::ReplayDetector::default()
      .with_frame(0, vec![item(2, 1.5, [0.0, 0.0, 100.0, 200.0])]);
    let engine = OccupancyEngine::new(detector, OccupancyConfig::default()).unwrap();
    assert!(matches!(
      engine.classify(&frame(), &layout()),
      Err(OccupancyError::AdapterFailure(_))
    ));
  }

  #[test]
  fn rejects_out_of_range_thresholds() {
    let config = OccupancyConfig::default().with_iou_threshold(1.2);
    assert!(matches!(
      OccupancyEngine::new(crate::model::ReplayDetector::default(), config),
      Err(OccupancyError::ThresholdOutOfRange(_))
    ));
  }
}
