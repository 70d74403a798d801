// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/output/directory_record.rs - 目录事件记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  fs::OpenOptions,
  io::Write,
  path::{Path, PathBuf},
  sync::Mutex,
  time::{Duration, Instant},
};

use chrono::{DateTime, Datelike, Local};
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectResult, Detection},
  output::Render,
  url_path,
};

const EVENTS_FILE: &str = "events.jsonl";

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("参数 {0} 的值无效: {1}")]
  InvalidParameter(String, String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("事件序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 事件记录，每行一个 JSON 对象
#[derive(Debug, Serialize)]
struct EventRecord<'a> {
  timestamp: String,
  image: &'a Path,
  detections: &'a [Detection],
}

#[derive(Debug, Default)]
struct RecordState {
  frame_counter: u16,
  last_saved: Option<Instant>,
}

/// 将有检测结果的帧按日期目录保存，并在冷却时间内只保存一次
///
/// `folder:///var/qianliyan/events?cooldown=5&always`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  cooldown: Duration,
  always: bool,
  state: Mutex<RecordState>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mut output = DirectoryRecordOutput::new(url_path(uri));
    for (key, value) in uri.query_pairs() {
      match key.as_ref() {
        "cooldown" => {
          let seconds: f64 = value.parse().map_err(|_| {
            DirectoryRecordOutputError::InvalidParameter(key.to_string(), value.to_string())
          })?;
          if !seconds.is_finite() || seconds < 0.0 {
            return Err(DirectoryRecordOutputError::InvalidParameter(
              key.to_string(),
              value.to_string(),
            ));
          }
          output.cooldown = Duration::from_secs_f64(seconds);
        }
        "always" => output.always = true,
        _ => {}
      }
    }

    Ok(output)
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      cooldown: Duration::ZERO,
      always: false,
      state: Mutex::new(RecordState::default()),
    }
  }

  pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
    self.cooldown = cooldown;
    self
  }

  pub fn with_always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 冷却检查通过时返回新的帧编号，冷却计时在保存成功后才更新
  fn try_acquire_slot(&self, now: Instant) -> Option<u16> {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(last) = state.last_saved {
      if now.duration_since(last) < self.cooldown {
        return None;
      }
    }
    state.frame_counter = state.frame_counter.wrapping_add(1);
    Some(state.frame_counter)
  }

  fn mark_saved(&self, now: Instant) {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    state.last_saved = Some(now);
  }

  fn save_event(
    &self,
    result: &DetectResult,
    frame_id: u16,
  ) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let path = self.frame_path(&now, frame_id);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    result.annotated.save(&path)?;

    self.append_event(&EventRecord {
      timestamp: now.to_rfc3339(),
      image: &path,
      detections: &result.items,
    })?;
    Ok(path)
  }

  fn frame_path(&self, now: &DateTime<Local>, frame_id: u16) -> PathBuf {
    self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()))
      .join(format!(
        "detect_{}-{:04X}.jpg",
        now.format("%Y%m%d_%H%M%S"),
        frame_id
      ))
  }

  fn append_event(&self, record: &EventRecord<'_>) -> Result<(), DirectoryRecordOutputError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(self.directory.join(EVENTS_FILE))?;
    file.write_all(line.as_bytes())?;
    Ok(())
  }
}

impl Render<RgbImage, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, _frame: &RgbImage, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let started = Instant::now();
    let Some(frame_id) = self.try_acquire_slot(started) else {
      debug!("冷却时间内，跳过保存");
      return Ok(());
    };

    let path = self.save_event(result, frame_id)?;
    self.mark_saved(started);
    info!("保存事件: {} ({} 个对象)", path.display(), result.items.len());

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoundingBox;

  fn result_with(items: Vec<Detection>) -> DetectResult {
    DetectResult {
      annotated: RgbImage::new(16, 16),
      items: items.into_boxed_slice(),
    }
  }

  fn person() -> Detection {
    Detection {
      class_id: 0,
      label: "person".to_string(),
      confidence: 0.9,
      bbox: BoundingBox {
        x: 1,
        y: 2,
        width: 3,
        height: 4,
      },
    }
  }

  fn saved_images(dir: &Path) -> usize {
    fn walk(dir: &Path, count: &mut usize) {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          walk(&path, count);
        } else if path.extension().is_some_and(|ext| ext == "jpg") {
          *count += 1;
        }
      }
    }
    let mut count = 0;
    walk(dir, &mut count);
    count
  }

  #[test]
  fn parses_query_parameters() {
    let url = Url::parse("folder:///tmp/events?cooldown=2.5&always").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory(), Path::new("/tmp/events"));
    assert_eq!(output.cooldown, Duration::from_millis(2500));
    assert!(output.always);
  }

  #[test]
  fn rejects_negative_cooldown() {
    let url = Url::parse("folder:///tmp/events?cooldown=-1").unwrap();
    assert!(DirectoryRecordOutput::from_url(&url).is_err());
  }

  #[test]
  fn records_frames_with_detections() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path());
    let frame = RgbImage::new(16, 16);

    output.render_result(&frame, &result_with(vec![person()])).unwrap();
    output.render_result(&frame, &result_with(vec![])).unwrap();
    output.render_result(&frame, &result_with(vec![person()])).unwrap();

    assert_eq!(saved_images(dir.path()), 2);
    let events = std::fs::read_to_string(dir.path().join(EVENTS_FILE)).unwrap();
    let lines: Vec<&str> = events.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["detections"][0]["label"], "person");
    assert_eq!(first["detections"][0]["bbox"]["width"], 3);
  }

  #[test]
  fn cooldown_limits_saves() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path()).with_cooldown(Duration::from_secs(3600));
    let frame = RgbImage::new(16, 16);

    output.render_result(&frame, &result_with(vec![person()])).unwrap();
    output.render_result(&frame, &result_with(vec![person()])).unwrap();

    assert_eq!(saved_images(dir.path()), 1);
  }

  #[test]
  fn failed_save_does_not_start_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, "not a directory").unwrap();
    let output = DirectoryRecordOutput::new(&blocked).with_cooldown(Duration::from_secs(3600));
    let frame = RgbImage::new(16, 16);

    assert!(output.render_result(&frame, &result_with(vec![person()])).is_err());

    std::fs::remove_file(&blocked).unwrap();
    output.render_result(&frame, &result_with(vec![person()])).unwrap();
    assert_eq!(saved_images(&blocked), 1);
  }

  #[test]
  fn always_records_empty_frames() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path()).with_always(true);
    output
      .render_result(&RgbImage::new(16, 16), &result_with(vec![]))
      .unwrap();
    assert_eq!(saved_images(dir.path()), 1);
  }
}
