// 该文件是 Chewei （车位） 项目的一部分。
// src/geometry.rs - 轴对齐矩形与 IoU
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

use serde::{Deserialize, Serialize};

/// 像素坐标下的轴对齐边界框 [x1, y1, x2, y2]
///
/// 序列化为四元数组，与车位布局文件中 `roi` 字段的格式一致。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl From<[f32; 4]> for BoundingBox {
  fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
    Self { x1, y1, x2, y2 }
  }
}

impl From<BoundingBox> for [f32; 4] {
  fn from(bbox: BoundingBox) -> Self {
    [bbox.x1, bbox.y1, bbox.x2, bbox.y2]
  }
}

impl BoundingBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  /// 面积，退化的框返回 0
  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }

  pub fn is_finite(&self) -> bool {
    self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
  }

  /// 宽高均为正
  pub fn is_proper(&self) -> bool {
    self.x2 > self.x1 && self.y2 > self.y1
  }

  /// 交集面积，不相交时返回 `None`
  pub fn intersection(&self, other: &Self) -> Option<f32> {
    let x1 = self.x1.max(other.x1);
    let y1 = self.y1.max(other.y1);
    let x2 = self.x2.min(other.x2);
    let y2 = self.y2.min(other.y2);

    if x1 < x2 && y1 < y2 {
      Some((x2 - x1) * (y2 - y1))
    } else {
      None
    }
  }

  /// 计算两个边界框的 IoU
  ///
  /// 不相交的两个框直接返回 0，不做除法。
  pub fn iou(&self, other: &Self) -> f32 {
    let Some(intersection) = self.intersection(other) else {
      return 0.0;
    };

    let union = self.area() + other.area() - intersection;
    if union > 0.0 {
      (intersection / union).clamp(0.0, 1.0)
    } else {
      0.0
    }
  }

  /// 将框裁剪到 `width` x `height` 的图像内，返回整数像素区域 (x, y, w, h)
  pub fn clamp_to_pixels(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    if !self.is_finite() {
      return None;
    }

    let x1 = self.x1.floor().clamp(0.0, width as f32) as u32;
    let y1 = self.y1.floor().clamp(0.0, height as f32) as u32;
    let x2 = self.x2.ceil().clamp(0.0, width as f32) as u32;
    let y2 = self.y2.ceil().clamp(0.0, height as f32) as u32;

    if x1 >= x2 || y1 >= y2 {
      return None;
    }
    Some((x1, y1, x2 - x1, y2 - y1))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn iou_of_box_with_itself_is_one() {
    let a = BoundingBox::new(10.0, 20.0, 110.0, 70.0);
    assert_eq!(a.iou(&a), 1.0);
  }

  #[test]
  fn disjoint_boxes_have_zero_iou() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
    assert_eq!(a.iou(&b), 0.0);
    assert_eq!(b.iou(&a), 0.0);
  }

  #[test]
  fn touching_edges_do_not_overlap() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
    assert_eq!(a.intersection(&b), None);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn iou_is_symmetric_and_bounded() {
    let boxes = [
      BoundingBox::new(0.0, 0.0, 10.0, 10.0),
      BoundingBox::new(5.0, 5.0, 15.0, 15.0),
      BoundingBox::new(-3.0, 2.0, 4.0, 40.0),
      BoundingBox::new(2.0, 2.0, 3.0, 3.0),
      BoundingBox::new(0.0, 0.0, 100.0, 100.0),
    ];
    for a in &boxes {
      for b in &boxes {
        let ab = a.iou(b);
        let ba = b.iou(a);
        assert_eq!(ab, ba);
        assert!((0.0..=1.0).contains(&ab));
      }
    }
  }

  #[test]
  fn half_overlap_iou() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
    // 交集 50，并集 150
    assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn roi_deserializes_from_array() {
    let bbox: BoundingBox = serde_json::from_str("[1, 2, 30, 40]").unwrap();
    assert_eq!(bbox, BoundingBox::new(1.0, 2.0, 30.0, 40.0));
    assert_eq!(serde_json::to_string(&bbox).unwrap(), "[1.0,2.0,30.0,40.0]");
  }

  #[test]
  fn clamp_to_pixels_limits_to_image() {
    let bbox = BoundingBox::new(-5.0, 2.5, 50.0, 8.2);
    assert_eq!(bbox.clamp_to_pixels(20, 10), Some((0, 2, 20, 7)));
    let outside = BoundingBox::new(30.0, 30.0, 40.0, 40.0);
    assert_eq!(outside.clamp_to_pixels(20, 10), None);
  }
}
