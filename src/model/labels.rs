// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/model/labels.rs - 类别表
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{path::Path, sync::Arc};

use serde::Deserialize;
use thiserror::Error;

/// COCO 数据集类别名称，顺序即模型训练时的类别顺序
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum ClassTableError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("类别文件格式错误: {0}")]
  TomlError(#[from] toml::de::Error),
  #[error("类别表为空")]
  Empty,
}

#[derive(Deserialize)]
struct LabelFile {
  labels: Vec<String>,
}

/// 构造后不可变的有序类别表，克隆开销为一次引用计数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTable {
  labels: Arc<[String]>,
}

impl Default for ClassTable {
  fn default() -> Self {
    Self::coco()
  }
}

impl ClassTable {
  pub fn coco() -> Self {
    Self {
      labels: COCO_CLASSES.iter().map(|label| label.to_string()).collect(),
    }
  }

  pub fn new<I, S>(labels: I) -> Result<Self, ClassTableError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let labels: Arc<[String]> = labels.into_iter().map(Into::into).collect();
    if labels.is_empty() {
      return Err(ClassTableError::Empty);
    }
    Ok(Self { labels })
  }

  /// 从形如 `labels = ["person", ...]` 的 TOML 文本读取
  pub fn from_toml_str(content: &str) -> Result<Self, ClassTableError> {
    let file: LabelFile = toml::from_str(content)?;
    Self::new(file.labels)
  }

  pub fn from_toml_file(path: &Path) -> Result<Self, ClassTableError> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.labels.get(class_id).map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_table_keeps_training_order() {
    let table = ClassTable::coco();
    assert_eq!(table.len(), 80);
    assert_eq!(table.get(0), Some("person"));
    assert_eq!(table.get(2), Some("car"));
    assert_eq!(table.get(79), Some("toothbrush"));
    assert_eq!(table.get(80), None);
  }

  #[test]
  fn loads_labels_from_toml() {
    let table = ClassTable::from_toml_str(r#"labels = ["cat", "dog"]"#).unwrap();
    assert_eq!(table.iter().collect::<Vec<_>>(), vec!["cat", "dog"]);
  }

  #[test]
  fn rejects_empty_label_file() {
    let err = ClassTable::from_toml_str("labels = []").unwrap_err();
    assert!(matches!(err, ClassTableError::Empty));
  }
}
