// 该文件是 Chewei （车位） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频输入
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

//! # GStreamer 视频输入模块
//!
//! 将视频文件或摄像头解码为 RGB 帧序列，供车牌识别流水线逐帧消费。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## URL 格式
//!
//! - 视频文件: `gst://file/path/to/video.mp4`
//! - 摄像头: `gst://camera/dev/video0?width=1280&height=720&fps=15`
//!
//! 管道在 [`GStreamerInput`] 被丢弃时置为 `Null` 状态，
//! 因此无论流水线以何种方式退出，采集句柄都会被释放。

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use tracing::{debug, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, input::InputError};

const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 720;
const DEFAULT_CAMERA_FPS: u32 = 15;
const SAMPLE_POLL: gst::ClockTime = gst::ClockTime::from_mseconds(100);

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        width,
        height,
        fps,
      } => format!(
        "v4l2src device={} ! video/x-raw,width={},height={},framerate={}/1",
        camera, width, height, fps
      ),
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  source: String,
  items: Vec<GStreamerInputBuilderItem>,
  live: bool,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let number = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    let (item, live) = match url.host_str() {
      Some("file") => (
        GStreamerInputBuilderItem::FileSource(url.path().to_string()),
        false,
      ),
      Some("camera") => (
        GStreamerInputBuilderItem::CameraSource {
          camera: url.path().to_string(),
          width: number("width", DEFAULT_CAMERA_WIDTH),
          height: number("height", DEFAULT_CAMERA_HEIGHT),
          fps: number("fps", DEFAULT_CAMERA_FPS),
        },
        true,
      ),
      _ => return Err(InputError::SchemeMismatch(url.to_string())),
    };

    Ok(GStreamerInputPipelineBuilder {
      source: url.to_string(),
      items: vec![
        item,
        GStreamerInputBuilderItem::TargetFormat {
          format: "RGB".to_string(),
        },
      ],
      live,
    })
  }
}

impl GStreamerInputPipelineBuilder {
  pub fn build(self) -> Result<GStreamerInput, InputError> {
    let unavailable = |e: &dyn std::fmt::Display| InputError::unavailable(&self.source, e);

    gst::init().map_err(|e| unavailable(&e))?;

    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    // 文件源需要逐帧消费，不能丢帧；实时源只保留最新的帧
    let sink = if self.live {
      "appsink max-buffers=2 drop=true name=sink"
    } else {
      "appsink sync=false name=sink"
    };
    let full_pipeline = format!("{} ! {}", basic_pipeline, sink);

    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)
      .map_err(|e| unavailable(&e))?
      .downcast::<gst::Pipeline>()
      .map_err(|_| unavailable(&"Failed to create pipeline"))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or_else(|| unavailable(&"Failed to get appsink element"))?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| unavailable(&"Failed to convert element to appsink"))?;

    let input = GStreamerInput {
      source: self.source.clone(),
      pipeline,
      appsink,
      index: 0,
      finished: false,
    };
    // 启动失败时 input 被丢弃，管道随之置为 Null
    input
      .pipeline
      .set_state(gst::State::Playing)
      .map_err(|e| unavailable(&e))?;

    Ok(input)
  }
}

/// GStreamer 视频输入
///
/// 逐帧轮询 appsink；没有新帧时先检查总线上的错误再检查 EOS，
/// 区分正常耗尽与解码失败。
pub struct GStreamerInput {
  source: String,
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  index: u64,
  finished: bool,
}

impl GStreamerInput {
  /// 取出总线上第一条错误消息
  fn bus_error(&self) -> Option<InputError> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    let gst::MessageView::Error(err) = message.view() else {
      return None;
    };
    let reason = match err.debug() {
      Some(debug) => format!("{} ({})", err.error(), debug),
      None => err.error().to_string(),
    };
    warn!("GStreamer 管道错误 {}: {}", self.source, reason);
    if err.error().is::<gst::ResourceError>() {
      Some(InputError::unavailable(&self.source, reason))
    } else {
      Some(InputError::decode(&self.source, reason))
    }
  }

  /// 流结束或出错后立即停止管道，释放采集句柄
  fn finish(&mut self) {
    self.finished = true;
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    let sample = loop {
      if let Some(sample) = self.appsink.try_pull_sample(SAMPLE_POLL) {
        break sample;
      }
      // 解码失败时 decodebin 可能不再向下游送出 EOS，只能从总线得知
      if let Some(error) = self.bus_error() {
        self.finish();
        return Some(Err(error));
      }
      if self.appsink.is_eos() {
        debug!("视频流结束: {}", self.source);
        self.finish();
        return None;
      }
    };

    let timestamp_ms = sample
      .buffer()
      .and_then(|buffer| buffer.pts())
      .map(|pts| pts.mseconds());
    let index = self.index;
    self.index += 1;
    let frame = convert_sample(&self.source, sample).map(|image| {
      let frame = Frame::new(image, index);
      match timestamp_ms {
        Some(timestamp_ms) => frame.with_timestamp(timestamp_ms),
        None => frame,
      }
    });
    Some(frame)
  }
}

fn convert_sample(source: &str, sample: gst::Sample) -> Result<RgbImage, InputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| InputError::decode(source, "No buffer in sample"))?;
  let caps = sample
    .caps()
    .ok_or_else(|| InputError::decode(source, "No caps in sample"))?;

  let video_info = gst_video::VideoInfo::from_caps(caps)
    .map_err(|_| InputError::decode(source, "Failed to get video info from caps"))?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(InputError::decode(source, "Unsupported video format"));
  }

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer
    .map_readable()
    .map_err(|e| InputError::decode(source, format!("Failed to map buffer: {}", e)))?;
  let data = map.as_slice();

  let expected_size = stride * (height.saturating_sub(1)) + width * 3;
  if data.len() < expected_size {
    return Err(InputError::decode(
      source,
      format!(
        "Buffer size mismatch: expected {} bytes, got {} bytes",
        expected_size,
        data.len()
      ),
    ));
  }

  // 处理步长对齐的数据
  let mut image_data = Vec::with_capacity(width * height * 3);
  for y in 0..height {
    let row_start = y * stride;
    image_data.extend_from_slice(&data[row_start..row_start + width * 3]);
  }

  RgbImage::from_raw(width as u32, height as u32, image_data)
    .ok_or_else(|| InputError::decode(source, "无法创建 RGB 图像"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_camera_url() {
    let url = Url::parse("gst://camera/dev/video2?width=640&fps=5").unwrap();
    let builder = GStreamerInputPipelineBuilder::from_url(&url).unwrap();
    assert!(builder.live);
    assert!(matches!(
      &builder.items[0],
      GStreamerInputBuilderItem::CameraSource { camera, width: 640, height: DEFAULT_CAMERA_HEIGHT, fps: 5 }
        if camera == "/dev/video2"
    ));
  }

  #[test]
  fn rejects_unknown_host() {
    let url = Url::parse("gst://rtsp/live").unwrap();
    assert!(matches!(
      GStreamerInputPipelineBuilder::from_url(&url),
      Err(InputError::SchemeMismatch(_))
    ));
  }

  #[test]
  fn corrupt_video_is_an_error_and_stops_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.mp4");
    std::fs::write(&path, vec![0x5a; 64 * 1024]).unwrap();

    let url = Url::parse(&format!("gst://file{}", path.display())).unwrap();
    let mut input = GStreamerInputPipelineBuilder::from_url(&url)
      .unwrap()
      .build()
      .unwrap();

    assert!(matches!(input.next(), Some(Err(InputError::Decode { .. }))));
    assert!(input.next().is_none());
    assert_eq!(input.pipeline.current_state(), gst::State::Null);
  }
}
