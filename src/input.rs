// 该文件是 Chewei （车位） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use thiserror::Error;

use crate::{FromUrl, frame::Frame};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageSequenceInput, decode_image_file};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputPipelineBuilder};

/// 输入错误
///
/// 所有输入源的错误都归为两类：无法打开/读取（`SourceUnavailable`）
/// 和无法解码（`Decode`），二者对当前调用都是致命的。
#[derive(Error, Debug)]
pub enum InputError {
  #[error("输入源不可用 {source_url}: {reason}")]
  SourceUnavailable { source_url: String, reason: String },
  #[error("解码失败 {source_url}: {reason}")]
  Decode { source_url: String, reason: String },
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

impl InputError {
  pub fn unavailable(source_url: impl Into<String>, reason: impl ToString) -> Self {
    InputError::SourceUnavailable {
      source_url: source_url.into(),
      reason: reason.to_string(),
    }
  }

  pub fn decode(source_url: impl Into<String>, reason: impl ToString) -> Self {
    InputError::Decode {
      source_url: source_url.into(),
      reason: reason.to_string(),
    }
  }
}

/// 帧源：有限、有序、不可重启的帧序列
///
/// 迭代结束即表示帧源耗尽。
pub trait FrameSource: Iterator<Item = Result<Frame, InputError>> {}
impl<I: Iterator<Item = Result<Frame, InputError>>> FrameSource for I {}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "read_image_file")]
  ImageSequence(ImageSequenceInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
      if url.scheme() == ImageSequenceInput::SCHEME {
        let input = ImageSequenceInput::from_url(url)?;
        return Ok(InputWrapper::ImageSequence(input));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Iterator for InputWrapper {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageSequence(input) => input.next(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next(),
    }
  }
}
