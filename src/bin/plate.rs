// 该文件是 Chewei （车位） 项目的一部分。
// src/bin/plate.rs - 车牌识别命令行
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use chewei::{
  FromUrl,
  input::InputWrapper,
  model::{RecognizerWrapper, ReplayDetector},
  output::OutputWrapper,
  plate::PlateConfig,
  task::{PlateTask, Task, install_interrupt_handler},
};

/// 从帧源中识别车牌
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测结果来源，例如 replay:///data/detections.json
  #[arg(long, value_name = "DETECTOR")]
  pub detector: Url,
  /// 文字识别: tesseract:///usr/bin/tesseract?psm=7 或 leptess:///usr/share/tessdata?lang=eng
  #[arg(long, value_name = "OCR", default_value = "tesseract:///")]
  pub ocr: Url,
  /// 输入来源: image:///a.jpg, frames:///dir, gst://file/a.mp4
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出: json://stdout 或 json:///path/plates.jsonl
  #[arg(long, value_name = "OUTPUT", default_value = "json://stdout")]
  pub output: Url,
  /// JSON 配置文件，命令行参数优先
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 保留的候选数
  #[arg(long)]
  pub capacity: Option<usize>,
  /// 两次保留之间至少间隔的帧数
  #[arg(long)]
  pub cooldown: Option<u32>,
  /// 候选的最低置信度
  #[arg(long)]
  pub threshold: Option<f32>,
  /// 车牌的类别编号
  #[arg(long)]
  pub plate_class: Option<u32>,
  /// 有效识别结果的最短字符数
  #[arg(long)]
  pub min_text_len: Option<usize>,
  /// 最多扫描的帧数
  #[arg(long)]
  pub max_frames: Option<u64>,
  /// 缓冲区满后继续扫描直到帧源耗尽
  #[arg(long)]
  pub no_early_stop: bool,
}

impl Args {
  fn plate_config(&self) -> Result<PlateConfig> {
    let mut config = match &self.config {
      Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
      None => PlateConfig::default(),
    };

    let mut retention = config.retention;
    if let Some(capacity) = self.capacity {
      retention = retention.with_capacity(capacity);
    }
    if let Some(cooldown) = self.cooldown {
      retention = retention.with_cooldown_frames(cooldown);
    }
    if let Some(threshold) = self.threshold {
      retention = retention.with_threshold(threshold);
    }
    config = config.with_retention(retention);

    if let Some(plate_class) = self.plate_class {
      config = config.with_plate_class(plate_class);
    }
    if let Some(min_text_len) = self.min_text_len {
      config = config.with_min_text_len(min_text_len);
    }
    if self.max_frames.is_some() {
      config = config.with_max_frames(self.max_frames);
    }
    if self.no_early_stop {
      config = config.with_stop_when_full(false);
    }
    Ok(config)
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测结果来源: {}", args.detector);
  info!("文字识别程序: {}", args.ocr);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = args.plate_config()?;
  info!("配置: {:?}", config);

  let detector = ReplayDetector::from_url(&args.detector)?;
  let recognizer = RecognizerWrapper::from_url(&args.ocr)?;
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let cancel = install_interrupt_handler()?;

  let outcome = PlateTask::new(config, args.input.as_str())
    .with_cancel_flag(cancel)
    .run_task(input, (detector, recognizer), output)?;

  match outcome.plate() {
    Some(plate) => info!("车牌: {}", plate),
    None => warn!("未识别出车牌: {:?}", outcome.not_found_reason()),
  }

  Ok(())
}
