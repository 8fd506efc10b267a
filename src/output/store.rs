// 该文件是 Guardian （守望者） 项目的一部分。
// src/output/store.rs - 检测结果图像存储
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
  fs::{File, OpenOptions},
  io::{BufWriter, ErrorKind, Write},
  path::{Path, PathBuf},
};

use chrono::Utc;
use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{debug, warn};

pub const OUTPUT_DIR: &str = "outputs";
const RESULT_PREFIX: &str = "guardian_result";
const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("无法在 {0} 下分配新的文件名")]
  NameExhausted(PathBuf),
}

/// 输出目录只追加写入，每次扫描产生一个新文件，不覆盖已有结果
#[derive(Debug, Clone)]
pub struct ResultStore {
  directory: PathBuf,
}

impl Default for ResultStore {
  fn default() -> Self {
    ResultStore::new(OUTPUT_DIR)
  }
}

impl ResultStore {
  pub fn new(directory: impl AsRef<Path>) -> Self {
    ResultStore {
      directory: directory.as_ref().to_path_buf(),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// `guardian_result_<unix 秒>.png`，同一秒内重名时追加 `_<n>`
  fn file_name(timestamp: i64, attempt: u32) -> String {
    if attempt == 0 {
      format!("{}_{}.png", RESULT_PREFIX, timestamp)
    } else {
      format!("{}_{}_{}.png", RESULT_PREFIX, timestamp, attempt)
    }
  }

  fn create_unique(&self, timestamp: i64) -> Result<(PathBuf, File), StoreError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
      let path = self.directory.join(Self::file_name(timestamp, attempt));
      match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => return Ok((path, file)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
          debug!("文件已存在，尝试下一个名称: {}", path.display());
        }
        Err(e) => return Err(e.into()),
      }
    }
    Err(StoreError::NameExhausted(self.directory.clone()))
  }

  pub fn save(&self, image: &RgbImage) -> Result<PathBuf, StoreError> {
    self.save_at(image, Utc::now().timestamp())
  }

  pub fn save_at(&self, image: &RgbImage, timestamp: i64) -> Result<PathBuf, StoreError> {
    if !self.directory.exists() {
      std::fs::create_dir_all(&self.directory)?;
    }

    let (path, file) = self.create_unique(timestamp)?;
    let mut writer = BufWriter::new(file);
    let written = image
      .write_to(&mut writer, ImageFormat::Png)
      .map_err(StoreError::from)
      .and_then(|_| writer.flush().map_err(StoreError::from));

    if let Err(e) = written {
      // 不留下半截文件
      let _ = std::fs::remove_file(&path);
      return Err(e);
    }

    warn!("保存图像到文件: {}", path.display());
    Ok(path)
  }
}
