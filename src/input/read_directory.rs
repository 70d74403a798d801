// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/input/read_directory.rs - 图像目录输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{collections::VecDeque, path::PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_path};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按文件名顺序逐张读取目录中的图像，无法解码的文件会被跳过
pub struct DirectoryInput {
  paths: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryInputError::SchemaMismatch);
    }
    Self::open(url_path(url))
  }
}

fn is_image(path: &std::path::Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

impl DirectoryInput {
  pub fn open(directory: PathBuf) -> Result<Self, DirectoryInputError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      if path.is_file() && is_image(&path) {
        paths.push(path);
      }
    }
    paths.sort();
    info!("目录 {} 中共有 {} 张图像", directory.display(), paths.len());

    Ok(Self {
      paths: paths.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.paths.len()
  }
}

impl Iterator for DirectoryInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(path) = self.paths.pop_front() {
      let decoded = ImageReader::open(&path)
        .map_err(image::ImageError::from)
        .and_then(|reader| reader.decode());
      match decoded {
        Ok(image) => return Some(image.to_rgb8()),
        Err(e) => warn!("跳过无法读取的图像 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reads_images_in_name_order_and_skips_others() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(2, 2).save(dir.path().join("b.png")).unwrap();
    RgbImage::new(1, 1).save(dir.path().join("a.png")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();
    std::fs::write(dir.path().join("broken.jpg"), "not a jpeg").unwrap();

    let input = DirectoryInput::open(dir.path().to_path_buf()).unwrap();
    assert_eq!(input.remaining(), 3);
    let sizes: Vec<(u32, u32)> = input.map(|image| image.dimensions()).collect();
    assert_eq!(sizes, vec![(1, 1), (2, 2)]);
  }
}
