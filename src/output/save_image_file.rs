// 该文件是 Chewei （车位） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  occupancy::OccupancyReport,
  output::{
    Render,
    draw::{Draw, load_font},
  },
};

/// 把占用判定结果画到帧上并保存，路径相同时覆盖
pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数无效: {0}")]
  InvalidArgument(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let mut draw = Draw::default();
    for (key, value) in uri.query_pairs() {
      match key.as_ref() {
        "thickness" => {
          let thickness = value
            .parse()
            .map_err(|_| SaveImageFileError::InvalidArgument(format!("thickness={}", value)))?;
          draw = draw.with_thickness(thickness);
        }
        "font" => {
          let font = load_font(&*value)?;
          info!("标注字体: {}", value);
          draw = draw.with_font(font);
        }
        "font_size" => {
          let font_size = value
            .parse()
            .map_err(|_| SaveImageFileError::InvalidArgument(format!("font_size={}", value)))?;
          draw = draw.with_font_size(font_size);
        }
        _ => {}
      }
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(uri.path()),
      draw,
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      draw: Draw::default(),
    }
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = Path::new(&self.path).parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<Frame, OccupancyReport> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &Frame, result: &OccupancyReport) -> Result<(), Self::Error> {
    let image = self.draw.draw_occupancy(frame, result);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn saves_visualization_creating_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vis").join("occupancy.png");
    let url = Url::parse(&format!("image://{}?thickness=1", path.display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();

    let frame = Frame::new(RgbImage::new(16, 12), 3);
    let report = OccupancyReport::new(Default::default(), Vec::new(), Vec::new());
    output.render_result(&frame, &report).unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (16, 12));
  }

  #[test]
  fn missing_font_is_rejected() {
    let url = Url::parse("image:///tmp/out.png?font=/nonexistent/chewei/font.ttf").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::IoError(_))
    ));
  }

  #[test]
  fn bad_thickness_is_rejected() {
    let url = Url::parse("image:///tmp/out.png?thickness=wide").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::InvalidArgument(_))
    ));
  }
}
