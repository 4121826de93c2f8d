// 该文件是 Chewei （车位） 项目的一部分。
// src/model/tesseract.rs - Tesseract 命令行文字识别
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
  collections::HashMap,
  io::{Cursor, ErrorKind, Write},
  process::{Command, Stdio},
};

use image::{GrayImage, ImageFormat};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::Model};

const DEFAULT_PROGRAM: &str = "tesseract";
pub(super) const DEFAULT_LANG: &str = "eng";
// 单行文本
pub(super) const DEFAULT_PSM: u32 = 7;
pub(super) const DEFAULT_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Error, Debug)]
pub enum TesseractError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("参数错误: {0}")]
  InvalidArgument(String),
  #[error("图像编码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("tesseract 退出状态 {status}: {stderr}")]
  ProcessFailed { status: String, stderr: String },
}

/// 通过 `tesseract` 命令行识别车牌文字
///
/// 区域编码为 PNG 后经标准输入送入进程，识别结果从标准输出读取。
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
  program: String,
  lang: String,
  psm: u32,
  whitelist: String,
}

impl Default for TesseractRecognizer {
  fn default() -> Self {
    Self {
      program: DEFAULT_PROGRAM.to_string(),
      lang: DEFAULT_LANG.to_string(),
      psm: DEFAULT_PSM,
      whitelist: DEFAULT_WHITELIST.to_string(),
    }
  }
}

impl FromUrlWithScheme for TesseractRecognizer {
  const SCHEME: &'static str = "tesseract";
}

impl FromUrl for TesseractRecognizer {
  type Error = TesseractError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TesseractError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let mut recognizer = Self::default();
    match url.path() {
      "" | "/" => {}
      path => recognizer.program = path.to_string(),
    }
    if let Some(lang) = query.get("lang") {
      recognizer.lang = lang.clone();
    }
    if let Some(psm) = query.get("psm") {
      recognizer.psm = psm
        .parse()
        .map_err(|_| TesseractError::InvalidArgument(format!("psm: {}", psm)))?;
    }
    if let Some(whitelist) = query.get("whitelist") {
      recognizer.whitelist = whitelist.clone();
    }

    Ok(recognizer)
  }
}

impl TesseractRecognizer {
  fn command(&self) -> Command {
    let mut command = Command::new(&self.program);
    command
      .args(["stdin", "stdout"])
      .arg("-l")
      .arg(&self.lang)
      .arg("--psm")
      .arg(self.psm.to_string());
    if !self.whitelist.is_empty() {
      command
        .arg("-c")
        .arg(format!("tessedit_char_whitelist={}", self.whitelist));
    }
    command
  }
}

impl Model for TesseractRecognizer {
  type Input = GrayImage;
  type Output = String;
  type Error = TesseractError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let mut png = Vec::new();
    input.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    let mut child = self
      .command()
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()?;

    // 进程可能在读完输入前退出，写入失败也要等待进程结束并取回 stderr
    let written = match child.stdin.take() {
      Some(mut stdin) => stdin.write_all(&png),
      None => Ok(()),
    };
    let output = child.wait_with_output()?;

    if !output.status.success() {
      return Err(TesseractError::ProcessFailed {
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }
    match written {
      Err(e) if e.kind() != ErrorKind::BrokenPipe => return Err(e.into()),
      _ => {}
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    debug!("tesseract 识别结果: {:?}", text);
    Ok(text)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_url_options() {
    let url = Url::parse("tesseract:///opt/bin/tesseract?psm=8&lang=deu&whitelist=AB12").unwrap();
    let recognizer = TesseractRecognizer::from_url(&url).unwrap();
    assert_eq!(recognizer.program, "/opt/bin/tesseract");
    assert_eq!(recognizer.psm, 8);
    assert_eq!(recognizer.lang, "deu");
    assert_eq!(recognizer.whitelist, "AB12");
  }

  #[test]
  fn defaults_to_program_on_path() {
    let url = Url::parse("tesseract:///").unwrap();
    let recognizer = TesseractRecognizer::from_url(&url).unwrap();
    assert_eq!(recognizer.program, DEFAULT_PROGRAM);
    assert_eq!(recognizer.psm, DEFAULT_PSM);
  }

  #[test]
  fn rejects_bad_psm() {
    let url = Url::parse("tesseract:///?psm=line").unwrap();
    assert!(matches!(
      TesseractRecognizer::from_url(&url),
      Err(TesseractError::InvalidArgument(_))
    ));
  }

  #[test]
  fn missing_program_is_an_error() {
    let recognizer = TesseractRecognizer {
      program: "/nonexistent/tesseract-binary".to_string(),
      ..TesseractRecognizer::default()
    };
    let result = recognizer.infer(&GrayImage::new(4, 4));
    assert!(matches!(result, Err(TesseractError::IoError(_))));
  }

  #[cfg(unix)]
  fn script(dir: &std::path::Path, body: &str) -> TesseractRecognizer {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("tesseract");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    TesseractRecognizer {
      program: path.display().to_string(),
      ..TesseractRecognizer::default()
    }
  }

  #[cfg(unix)]
  fn noise(size: u32) -> GrayImage {
    GrayImage::from_fn(size, size, |x, y| {
      let mut v = x.wrapping_mul(0x9e37_79b1) ^ y.wrapping_mul(0x85eb_ca77);
      v ^= v >> 15;
      v = v.wrapping_mul(0x2c1b_3c6d);
      image::Luma([(v >> 24) as u8])
    })
  }

  #[cfg(unix)]
  #[test]
  fn early_exit_reports_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let recognizer = script(dir.path(), "echo 'Error opening data file' >&2\nexit 1");

    // 输入远大于管道缓冲区，进程退出后写入必然失败
    match recognizer.infer(&noise(1024)) {
      Err(TesseractError::ProcessFailed { stderr, .. }) => {
        assert!(stderr.contains("Error opening data file"))
      }
      other => panic!("unexpected result: {:?}", other),
    }
  }

  #[cfg(unix)]
  #[test]
  fn reads_trimmed_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let recognizer = script(dir.path(), "cat > /dev/null\necho '  AB1234  '");
    assert_eq!(recognizer.infer(&noise(64)).unwrap(), "AB1234");
  }
}
