// 该文件是 Chewei （车位） 项目的一部分。
// src/bin/occupancy.rs - 车位占用判定命令行
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use chewei::{
  FromUrl,
  input::InputWrapper,
  model::ReplayDetector,
  occupancy::{OccupancyConfig, SlotLayout},
  output::OutputWrapper,
  task::{OccupancyTask, Task, install_interrupt_handler},
};

/// 根据车位布局判定每个车位是否被占用
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 车位布局，例如 layout:///etc/chewei/parking_layout.json
  #[arg(long, value_name = "LAYOUT")]
  pub layout: Url,
  /// 检测结果来源，例如 replay:///data/detections.json
  #[arg(long, value_name = "DETECTOR")]
  pub detector: Url,
  /// 输入来源: image:///a.jpg, frames:///dir, gst://camera/0
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出: json://stdout, json:///path/occupancy.jsonl 或 image:///path/vis.png?font=/path/font.ttf
  #[arg(long, value_name = "OUTPUT", default_value = "json://stdout")]
  pub output: Url,

  /// 参与判定的检测框最低置信度
  #[arg(long, default_value_t = 0.5)]
  pub accept_threshold: f32,
  /// IoU 超过该值即视为占用
  #[arg(long, default_value_t = 0.5)]
  pub iou_threshold: f32,
  /// 只统计这些类别，逗号分隔，缺省为全部类别
  #[arg(long, value_delimiter = ',')]
  pub classes: Vec<u32>,

  /// 处理的帧数上限
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("车位布局: {}", args.layout);
  info!("检测结果来源: {}", args.detector);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let layout = SlotLayout::from_url(&args.layout)?;
  let config = OccupancyConfig::default()
    .with_accept_threshold(args.accept_threshold)
    .with_iou_threshold(args.iou_threshold)
    .with_vehicle_classes((!args.classes.is_empty()).then(|| args.classes.clone()));

  let detector = ReplayDetector::from_url(&args.detector)?;
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let cancel = install_interrupt_handler()?;

  OccupancyTask::new(layout, config)
    .with_frame_number(args.frame_number)
    .with_cancel_flag(cancel)
    .run_task(input, detector, output)?;

  Ok(())
}
