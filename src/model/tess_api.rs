// 该文件是 Chewei （车位） 项目的一部分。
// src/model/tess_api.rs - 链接 libtesseract 的文字识别
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

//! # libtesseract 文字识别
//!
//! 通过 `leptess` 在进程内调用 Tesseract，避免每个候选区域启动一次子进程。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libleptonica-dev libtesseract-dev tesseract-ocr-eng
//! ```
//!
//! ## URL 格式
//!
//! `leptess:///usr/share/tesseract-ocr/5/tessdata?lang=eng&psm=7&whitelist=AB12`
//!
//! 路径为 tessdata 目录，为空时使用 Tesseract 的默认位置。

use std::{cell::RefCell, collections::HashMap, ffi::CString, io::Cursor};

use image::{GrayImage, ImageFormat};
use leptess::{leptonica, tesseract::TessApi};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{
    Model,
    tesseract::{DEFAULT_LANG, DEFAULT_PSM, DEFAULT_WHITELIST},
  },
};

#[derive(Error, Debug)]
pub enum TessApiError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数错误: {0}")]
  InvalidArgument(String),
  #[error("Tesseract 初始化失败: {0}")]
  InitError(String),
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("识别失败: {0}")]
  RecognizeError(String),
}

/// 初始化 Tesseract 所需的参数
#[derive(Debug, Clone, PartialEq)]
pub struct TessApiOptions {
  pub data_path: Option<String>,
  pub lang: String,
  pub psm: u32,
  pub whitelist: String,
}

impl Default for TessApiOptions {
  fn default() -> Self {
    Self {
      data_path: None,
      lang: DEFAULT_LANG.to_string(),
      psm: DEFAULT_PSM,
      whitelist: DEFAULT_WHITELIST.to_string(),
    }
  }
}

impl FromUrlWithScheme for TessApiOptions {
  const SCHEME: &'static str = "leptess";
}

impl FromUrl for TessApiOptions {
  type Error = TessApiError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TessApiError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let mut options = Self::default();
    match url.path() {
      "" | "/" => {}
      path => options.data_path = Some(path.to_string()),
    }
    if let Some(lang) = query.get("lang") {
      options.lang = lang.clone();
    }
    if let Some(psm) = query.get("psm") {
      options.psm = psm
        .parse()
        .map_err(|_| TessApiError::InvalidArgument(format!("psm: {}", psm)))?;
    }
    if let Some(whitelist) = query.get("whitelist") {
      options.whitelist = whitelist.clone();
    }
    Ok(options)
  }
}

fn c_string(value: &str) -> Result<CString, TessApiError> {
  CString::new(value).map_err(|e| TessApiError::InvalidArgument(e.to_string()))
}

/// 进程内的 Tesseract 识别器
///
/// `TessApi` 的识别调用需要可变借用，因此放在 `RefCell` 中；
/// 每次识别都重新设置图像，前一次的结果不会影响下一次。
pub struct TessApiRecognizer {
  api: RefCell<TessApi>,
  options: TessApiOptions,
}

impl std::fmt::Debug for TessApiRecognizer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TessApiRecognizer")
      .field("options", &self.options)
      .finish_non_exhaustive()
  }
}

impl FromUrl for TessApiRecognizer {
  type Error = TessApiError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::new(TessApiOptions::from_url(url)?)
  }
}

impl TessApiRecognizer {
  pub fn new(options: TessApiOptions) -> Result<Self, TessApiError> {
    let mut api = TessApi::new(options.data_path.as_deref(), &options.lang)
      .map_err(|e| TessApiError::InitError(e.to_string()))?;

    let mut variables = vec![("tessedit_pageseg_mode", options.psm.to_string())];
    if !options.whitelist.is_empty() {
      variables.push(("tessedit_char_whitelist", options.whitelist.clone()));
    }
    for (name, value) in variables {
      api
        .raw
        .set_variable(&c_string(name)?, &c_string(&value)?)
        .map_err(|e| TessApiError::InvalidArgument(format!("{}: {}", name, e)))?;
    }

    info!(
      "Tesseract 已初始化: lang={}, psm={}",
      options.lang, options.psm
    );
    Ok(Self {
      api: RefCell::new(api),
      options,
    })
  }
}

impl Model for TessApiRecognizer {
  type Input = GrayImage;
  type Output = String;
  type Error = TessApiError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let mut png = Vec::new();
    input.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    let pix = leptonica::pix_read_mem(&png)
      .map_err(|e| TessApiError::RecognizeError(e.to_string()))?;

    let mut api = self.api.borrow_mut();
    api.set_image(&pix);
    let text = api
      .get_utf8_text()
      .map_err(|e| TessApiError::RecognizeError(e.to_string()))?;
    let text = text.trim().to_string();
    debug!("tesseract 识别结果: {:?}", text);
    Ok(text)
  }
}
