// 该文件是 Chewei （车位） 项目的一部分。
// src/frame.rs - 帧定义与车牌区域预处理
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

use image::{GrayImage, RgbImage, imageops};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};

use crate::geometry::BoundingBox;

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64) -> Self {
    Self {
      image,
      index,
      timestamp_ms: 0,
    }
  }

  pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
    self.timestamp_ms = timestamp_ms;
    self
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 截取车牌区域并二值化
  ///
  /// 框先裁剪到图像范围内，裁剪后为空时返回 `None`。
  pub fn plate_region(&self, bbox: &BoundingBox) -> Option<GrayImage> {
    let (x, y, w, h) = bbox.clamp_to_pixels(self.width(), self.height())?;
    let cropped = imageops::crop_imm(&self.image, x, y, w, h).to_image();
    Some(binarize(&imageops::grayscale(&cropped)))
  }
}

/// Otsu 阈值二值化
pub fn binarize(gray: &GrayImage) -> GrayImage {
  let level = otsu_level(gray);
  threshold(gray, level, ThresholdType::Binary)
}
