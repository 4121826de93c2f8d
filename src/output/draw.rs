// 该文件是 Chewei （车位） 项目的一部分。
// src/output/draw.rs - 车位占用结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::debug;

use crate::{frame::Frame, geometry::BoundingBox, occupancy::OccupancyReport};

const BORDER_THICKNESS: u32 = 2;
const OCCUPIED_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const FREE_COLOR: [u8; 3] = [0, 255, 0]; // 绿色
const DETECTION_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色
const SUMMARY_BACKGROUND: [u8; 3] = [0, 0, 0];

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: u32 = 2;
const SUMMARY_OFFSET: i32 = 10;

/// 加载 TrueType/OpenType 字体文件
pub fn load_font(path: impl AsRef<Path>) -> std::io::Result<FontArc> {
  let data = std::fs::read(path)?;
  FontArc::try_from_vec(data)
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// 车位占用可视化
///
/// 未设置字体时只画边框，设置后额外写出车位编号、检测置信度和占用统计。
pub struct Draw {
  thickness: u32,
  occupied_color: [u8; 3],
  free_color: [u8; 3],
  detection_color: [u8; 3],
  font: Option<FontArc>,
  font_size: f32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BORDER_THICKNESS,
      occupied_color: OCCUPIED_COLOR,
      free_color: FREE_COLOR,
      detection_color: DETECTION_COLOR,
      font: None,
      font_size: LABEL_FONT_SIZE,
    }
  }
}

impl Draw {
  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  /// 在帧的副本上绘制车位与检测框
  ///
  /// 先画检测框，车位边框画在最上层。
  pub fn draw_occupancy(&self, frame: &Frame, report: &OccupancyReport) -> RgbImage {
    let mut image = frame.image.clone();

    for item in &report.detections {
      self.draw_bbox(&mut image, &item.bbox, self.detection_color);
      self.draw_label(
        &mut image,
        &item.bbox,
        &format!("{:.2}", item.score),
        self.detection_color,
      );
    }

    for slot in &report.slots {
      let color = match report.is_occupied(&slot.id) {
        Some(true) => self.occupied_color,
        _ => self.free_color,
      };
      self.draw_bbox(&mut image, &slot.roi, color);
      self.draw_label(&mut image, &slot.roi, &format!("ID: {}", slot.id), color);
    }

    let summary = format!("Occupied: {}, Free: {}", report.occupied, report.free);
    self.draw_text(
      &mut image,
      SUMMARY_OFFSET,
      SUMMARY_OFFSET,
      &summary,
      SUMMARY_BACKGROUND,
    );

    image
  }

  // 标签画在框的上方，放不下时画在框内顶部
  fn draw_label(&self, image: &mut RgbImage, bbox: &BoundingBox, label: &str, color: [u8; 3]) {
    let Some((x, y, _, _)) = bbox.clamp_to_pixels(image.width(), image.height()) else {
      return;
    };
    let height = self.font_size.ceil() as i32 + 2 * LABEL_PADDING as i32;
    let top = if y as i32 >= height { y as i32 - height } else { y as i32 };
    self.draw_text(image, x as i32, top, label, color);
  }

  fn draw_text(&self, image: &mut RgbImage, x: i32, y: i32, text: &str, background: [u8; 3]) {
    let Some(font) = &self.font else {
      debug!("未设置字体，跳过文本: {}", text);
      return;
    };
    let scale = PxScale::from(self.font_size);
    let (text_width, _) = text_size(scale, font, text);
    let width = text_width + 2 * LABEL_PADDING;
    let height = self.font_size.ceil() as u32 + 2 * LABEL_PADDING;

    let rect = Rect::at(x, y).of_size(width, height);
    draw_filled_rect_mut(image, rect, Rgb(background));
    draw_text_mut(
      image,
      Rgb(TEXT_COLOR),
      x + LABEL_PADDING as i32,
      y + LABEL_PADDING as i32,
      scale,
      font,
      text,
    );
  }

  // 逐圈向内绘制，边框不会超出 bbox
  fn draw_bbox(&self, image: &mut RgbImage, bbox: &BoundingBox, color: [u8; 3]) {
    let Some((x, y, w, h)) = bbox.clamp_to_pixels(image.width(), image.height()) else {
      return;
    };

    for t in 0..self.thickness {
      if w <= 2 * t || h <= 2 * t {
        break;
      }
      let rect = Rect::at((x + t) as i32, (y + t) as i32).of_size(w - 2 * t, h - 2 * t);
      draw_hollow_rect_mut(image, rect, Rgb(color));
    }
  }
}
