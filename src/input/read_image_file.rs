// 该文件是 Qianliyan （千里眼） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 单张图像输入，只产出一帧
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(&url_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: &Path) -> Result<Self, ImageFileInputError> {
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    info!(
      "读取图像 {}: {}x{}",
      path.display(),
      image.width(),
      image.height()
    );
    Ok(Self::from_image(image))
  }

  pub fn from_image(image: RgbImage) -> Self {
    Self { image: Some(image) }
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_one_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    RgbImage::new(4, 3).save(&path).unwrap();

    let mut input = ImageFileInput::open(&path).unwrap();
    assert_eq!(input.next().map(|image| image.dimensions()), Some((4, 3)));
    assert!(input.next().is_none());
  }

  #[test]
  fn missing_file_is_an_error() {
    assert!(matches!(
      ImageFileInput::open(Path::new("/nonexistent/frame.png")),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
