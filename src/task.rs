// 该文件是 Chewei （车位） 项目的一部分。
// src/task.rs - 任务流程
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

use std::{thread, time::Duration};
use tracing::{info, warn};

use crate::{
  CancelFlag,
  frame::Frame,
  input::InputError,
  model::{Detector, Recognizer},
  occupancy::{OccupancyConfig, OccupancyEngine, OccupancyReport, SlotLayout},
  output::Render,
  plate::{PlateConfig, PlateOutcome, PlateResolver},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 注册 Ctrl-C 处理函数，收到信号后置位返回的取消标志
///
/// 第一次信号后 30 秒仍未退出则强制结束进程。
pub fn install_interrupt_handler() -> Result<CancelFlag, ctrlc::Error> {
  let cancel = CancelFlag::new();
  let flag = cancel.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    flag.cancel();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(cancel)
}

/// 从一个帧源中识别一块车牌
#[derive(Debug)]
pub struct PlateTask {
  config: PlateConfig,
  source: String,
  cancel: CancelFlag,
}

impl PlateTask {
  /// `source` 只用于输出记录，标明结果来自哪个帧源
  pub fn new(config: PlateConfig, source: impl Into<String>) -> Self {
    Self {
      config,
      source: source.into(),
      cancel: CancelFlag::new(),
    }
  }

  pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
    self.cancel = cancel;
    self
  }
}

impl<I, D, R, O> Task<I, (D, R), O> for PlateTask
where
  I: IntoIterator<Item = Result<Frame, InputError>>,
  D: Detector,
  D::Error: std::error::Error + Send + Sync + 'static,
  R: Recognizer,
  R::Error: std::fmt::Display,
  O: Render<str, PlateOutcome>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Output = PlateOutcome;
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    (detector, recognizer): (D, R),
    output: O,
  ) -> Result<PlateOutcome, Self::Error> {
    info!("开始车牌识别任务: {}", self.source);
    let now = std::time::Instant::now();
    let outcome = PlateResolver::new(detector, recognizer, self.config)?
      .with_cancel_flag(self.cancel)
      .resolve(input)?;
    info!("识别完成，耗时: {:.2?}", now.elapsed());

    output.render_result(self.source.as_str(), &outcome)?;
    Ok(outcome)
  }
}

/// 对帧源中的每一帧做占用判定
#[derive(Debug)]
pub struct OccupancyTask {
  layout: SlotLayout,
  config: OccupancyConfig,
  frame_number: Option<usize>,
  cancel: CancelFlag,
}

impl OccupancyTask {
  pub fn new(layout: SlotLayout, config: OccupancyConfig) -> Self {
    Self {
      layout,
      config,
      frame_number: None,
      cancel: CancelFlag::new(),
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
    self.cancel = cancel;
    self
  }
}

impl<I, D, O> Task<I, D, O> for OccupancyTask
where
  I: IntoIterator<Item = Result<Frame, InputError>>,
  D: Detector,
  D::Error: std::error::Error + Send + Sync + 'static,
  O: Render<Frame, OccupancyReport>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  /// 处理的帧数
  type Output = usize;
  type Error = anyhow::Error;

  fn run_task(self, input: I, detector: D, output: O) -> Result<usize, Self::Error> {
    info!("开始占用判定任务，共 {} 个车位", self.layout.slots.len());
    let engine = OccupancyEngine::new(detector, self.config)?;

    let mut processed = 0;
    for frame in input {
      if self.cancel.is_cancelled() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      let frame = frame?;
      info!("处理第 {} 帧图像", frame.index);
      let now = std::time::Instant::now();
      let report = engine.classify(&frame, &self.layout)?;
      let elapsed_a = now.elapsed();
      output.render_result(&frame, &report)?;
      info!("判定完成，耗时: {:.2?} / {:.2?}", elapsed_a, now.elapsed());

      processed += 1;
      if self.frame_number.is_some_and(|n| processed >= n) {
        info!("达到指定帧数 {}, 退出任务循环", processed);
        break;
      }
    }

    info!("任务完成，共处理 {} 帧", processed);
    Ok(processed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    geometry::BoundingBox,
    model::{DetectItem, Model, ReplayDetector},
    occupancy::Slot,
    plate::RetentionConfig,
  };
  use image::{GrayImage, RgbImage};
  use std::{cell::RefCell, convert::Infallible};

  struct FixedText(&'static str);

  impl Model for FixedText {
    type Input = GrayImage;
    type Output = String;
    type Error = Infallible;

    fn infer(&self, _input: &GrayImage) -> Result<String, Infallible> {
      Ok(self.0.to_string())
    }
  }

  struct Collect<T>(RefCell<Vec<T>>);

  impl<T> Default for Collect<T> {
    fn default() -> Self {
      Self(RefCell::new(Vec::new()))
    }
  }

  impl Render<str, PlateOutcome> for &Collect<(String, PlateOutcome)> {
    type Error = Infallible;

    fn render_result(&self, source: &str, result: &PlateOutcome) -> Result<(), Infallible> {
      self.0.borrow_mut().push((source.to_string(), result.clone()));
      Ok(())
    }
  }

  impl Render<Frame, OccupancyReport> for &Collect<(u64, OccupancyReport)> {
    type Error = Infallible;

    fn render_result(&self, frame: &Frame, result: &OccupancyReport) -> Result<(), Infallible> {
      self.0.borrow_mut().push((frame.index, result.clone()));
      Ok(())
    }
  }

  fn frames(count: u64) -> impl Iterator<Item = Result<Frame, InputError>> {
    (0..count).map(|index| Ok(Frame::new(RgbImage::new(40, 20), index)))
  }

  fn car(bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id: 0,
      score: 0.9,
      bbox: BoundingBox::from(bbox),
    }
  }

  #[test]
  fn plate_task_renders_outcome_with_source() {
    let detector = ReplayDetector::default().with_frame(1, vec![car([4.0, 4.0, 30.0, 12.0])]);
    let config = PlateConfig::default()
      .with_retention(RetentionConfig::default().with_capacity(1))
      .with_stop_when_full(true);
    let sink: Collect<(String, PlateOutcome)> = Collect::default();

    let outcome = PlateTask::new(config, "frames:///gate")
      .run_task(frames(5), (detector, FixedText("AB1234")), &sink)
      .unwrap();

    assert_eq!(outcome.plate(), Some("AB1234"));
    let rendered = sink.0.borrow();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].0, "frames:///gate");
    assert_eq!(rendered[0].1, outcome);
  }

  #[test]
  fn plate_task_cancelled_before_start_is_an_error() {
    let cancel = CancelFlag::new();
    cancel.cancel();
    let sink: Collect<(String, PlateOutcome)> = Collect::default();

    let result = PlateTask::new(PlateConfig::default(), "frames:///gate")
      .with_cancel_flag(cancel)
      .run_task(frames(5), (ReplayDetector::default(), FixedText("X")), &sink);

    assert!(result.is_err());
    assert!(sink.0.borrow().is_empty());
  }

  #[test]
  fn occupancy_task_renders_every_frame() {
    let layout = SlotLayout::new(vec![
      Slot::new("a", BoundingBox::new(0.0, 0.0, 20.0, 20.0)),
      Slot::new("b", BoundingBox::new(20.0, 0.0, 40.0, 20.0)),
    ])
    .unwrap();
    let detector = ReplayDetector::default().with_frame(2, vec![car([0.0, 0.0, 20.0, 18.0])]);
    let sink: Collect<(u64, OccupancyReport)> = Collect::default();

    let processed = OccupancyTask::new(layout, OccupancyConfig::default())
      .run_task(frames(3), detector, &sink)
      .unwrap();

    assert_eq!(processed, 3);
    let rendered = sink.0.borrow();
    assert_eq!(rendered.len(), 3);
    assert_eq!(rendered[0].1.is_occupied("a"), Some(false));
    assert_eq!(rendered[2].0, 2);
    assert_eq!(rendered[2].1.is_occupied("a"), Some(true));
    assert_eq!(rendered[2].1.is_occupied("b"), Some(false));
  }

  #[test]
  fn occupancy_task_stops_at_frame_number() {
    let sink: Collect<(u64, OccupancyReport)> = Collect::default();
    let processed = OccupancyTask::new(SlotLayout::default(), OccupancyConfig::default())
      .with_frame_number(Some(2))
      .run_task(frames(10), ReplayDetector::default(), &sink)
      .unwrap();
    assert_eq!(processed, 2);
    assert_eq!(sink.0.borrow().len(), 2);
  }
}
