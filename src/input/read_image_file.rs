// 该文件是 Chewei （车位） 项目的一部分。
// src/input/read_image_file.rs - 图像文件与图像序列输入
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
  cmp::Ordering,
  iter::Peekable,
  path::{Path, PathBuf},
  str::Chars,
};

use image::{ImageReader, RgbImage};
use tracing::{debug, error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, input::InputError};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

/// 读取并解码一张图像
///
/// 文件无法打开时返回 `SourceUnavailable`，无法解码时返回 `Decode`。
pub fn decode_image_file(path: &Path) -> Result<RgbImage, InputError> {
  let path_str = path.display().to_string();
  let reader = ImageReader::open(path)
    .map_err(|e| InputError::unavailable(&path_str, e))?
    .with_guessed_format()
    .map_err(|e| InputError::unavailable(&path_str, e))?;
  let image = reader
    .decode()
    .map_err(|e| InputError::decode(&path_str, e))?;
  Ok(image.to_rgb8())
}

fn check_scheme(url: &Url, expected: &str) -> Result<(), InputError> {
  if url.scheme() != expected {
    error!(
      "URI scheme mismatch: expected '{}', found '{}'",
      expected,
      url.scheme()
    );
    return Err(InputError::SchemeMismatch(url.scheme().to_string()));
  }
  Ok(())
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default()
}

/// 按自然顺序比较文件名，数字段按数值比较
///
/// `frame2` 排在 `frame10` 之前；数值相同时前导零较少者在前。
fn natural_cmp(a: &str, b: &str) -> Ordering {
  let mut a = a.chars().peekable();
  let mut b = b.chars().peekable();
  loop {
    match (a.peek().copied(), b.peek().copied()) {
      (None, None) => return Ordering::Equal,
      (None, Some(_)) => return Ordering::Less,
      (Some(_), None) => return Ordering::Greater,
      (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
        let run_a = take_digits(&mut a);
        let run_b = take_digits(&mut b);
        let num_a = run_a.trim_start_matches('0');
        let num_b = run_b.trim_start_matches('0');
        let ord = num_a
          .len()
          .cmp(&num_b.len())
          .then_with(|| num_a.cmp(num_b))
          .then_with(|| run_a.len().cmp(&run_b.len()));
        if ord != Ordering::Equal {
          return ord;
        }
      }
      (Some(x), Some(y)) => {
        if x != y {
          return x.cmp(&y);
        }
        a.next();
        b.next();
      }
    }
  }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
  let mut run = String::new();
  while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
    run.push(c);
  }
  run
}

/// 单张图像输入，产生一帧
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    Self::open(url.path())
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, InputError> {
    let image = decode_image_file(path.as_ref())?;
    info!(
      "图像已加载: {} ({}x{})",
      path.as_ref().display(),
      image.width(),
      image.height()
    );
    Ok(Self { image: Some(image) })
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take().map(|image| Ok(Frame::new(image, 0)))
  }
}

/// 目录中按文件名自然顺序排列的图像序列，按需逐帧解码
pub struct ImageSequenceInput {
  paths: std::vec::IntoIter<PathBuf>,
  index: u64,
}

impl FromUrlWithScheme for ImageSequenceInput {
  const SCHEME: &'static str = "frames";
}

impl FromUrl for ImageSequenceInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    check_scheme(url, Self::SCHEME)?;
    Self::open(url.path())
  }
}

impl ImageSequenceInput {
  pub fn open(dir: impl AsRef<Path>) -> Result<Self, InputError> {
    let dir = dir.as_ref();
    let dir_str = dir.display().to_string();
    let entries = std::fs::read_dir(dir).map_err(|e| InputError::unavailable(&dir_str, e))?;

    let mut paths = Vec::new();
    for entry in entries {
      let path = entry
        .map_err(|e| InputError::unavailable(&dir_str, e))?
        .path();
      let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
      if path.is_file() && is_image {
        paths.push(path);
      }
    }
    paths.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));

    info!("图像序列: {} 共 {} 帧", dir_str, paths.len());
    Ok(Self {
      paths: paths.into_iter(),
      index: 0,
    })
  }
}

impl Iterator for ImageSequenceInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.paths.next()?;
    debug!("读取第 {} 帧: {}", self.index, path.display());
    let frame = decode_image_file(&path).map(|image| Frame::new(image, self.index));
    self.index += 1;
    Some(frame)
  }
}
