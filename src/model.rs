// 该文件是 Chewei （车位） 项目的一部分。
// src/model.rs - 模型适配器
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

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, geometry::BoundingBox};

/// 推理模型
///
/// 检测器实现 `Model<Input = Frame, Output = DetectResult>`，
/// 文字识别器实现 `Model<Input = GrayImage, Output = String>`。
/// 实现必须只依赖输入本身，不得在多次调用之间保留影响结果的状态。
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model + ?Sized> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

/// 检测器
pub trait Detector: Model<Input = Frame, Output = DetectResult> {}
impl<M: Model<Input = Frame, Output = DetectResult>> Detector for M {}

/// 文字识别器
pub trait Recognizer: Model<Input = GrayImage, Output = String> {}
impl<M: Model<Input = GrayImage, Output = String>> Recognizer for M {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: BoundingBox, // 像素坐标 [x_min, y_min, x_max, y_max]
}

impl DetectItem {
  /// 分数在 [0, 1] 内且坐标有限
  pub fn is_valid(&self) -> bool {
    (0.0..=1.0).contains(&self.score) && self.bbox.is_finite()
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// 第一个不合法的检测项
  pub fn first_invalid(&self) -> Option<&DetectItem> {
    self.items.iter().find(|item| !item.is_valid())
  }
}

mod replay;
pub use self::replay::{ReplayDetector, ReplayError};

mod tesseract;
pub use self::tesseract::{TesseractError, TesseractRecognizer};

#[cfg(feature = "tesseract_ocr")]
mod tess_api;
#[cfg(feature = "tesseract_ocr")]
pub use self::tess_api::{TessApiError, TessApiOptions, TessApiRecognizer};

#[derive(Error, Debug)]
pub enum RecognizerError {
  #[error("tesseract 命令行错误: {0}")]
  TesseractError(#[from] TesseractError),
  #[cfg(feature = "tesseract_ocr")]
  #[error("libtesseract 错误: {0}")]
  TessApiError(#[from] TessApiError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择文字识别器
#[derive(Debug)]
pub enum RecognizerWrapper {
  Tesseract(TesseractRecognizer),
  #[cfg(feature = "tesseract_ocr")]
  TessApi(TessApiRecognizer),
}

impl FromUrl for RecognizerWrapper {
  type Error = RecognizerError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      TesseractRecognizer::SCHEME => Ok(RecognizerWrapper::Tesseract(
        TesseractRecognizer::from_url(url)?,
      )),
      #[cfg(feature = "tesseract_ocr")]
      TessApiOptions::SCHEME => Ok(RecognizerWrapper::TessApi(TessApiRecognizer::from_url(
        url,
      )?)),
      scheme => Err(RecognizerError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl Model for RecognizerWrapper {
  type Input = GrayImage;
  type Output = String;
  type Error = RecognizerError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    match self {
      RecognizerWrapper::Tesseract(recognizer) => Ok(recognizer.infer(input)?),
      #[cfg(feature = "tesseract_ocr")]
      RecognizerWrapper::TessApi(recognizer) => Ok(recognizer.infer(input)?),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recognizer_is_chosen_by_scheme() {
    let url = Url::parse("tesseract:///?psm=8").unwrap();
    assert!(matches!(
      RecognizerWrapper::from_url(&url),
      Ok(RecognizerWrapper::Tesseract(_))
    ));

    let url = Url::parse("paddle:///models/rec").unwrap();
    assert!(matches!(
      RecognizerWrapper::from_url(&url),
      Err(RecognizerError::SchemeMismatch(scheme)) if scheme == "paddle"
    ));
  }
}
