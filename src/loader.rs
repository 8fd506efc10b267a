// 该文件是 Guardian （守望者） 项目的一部分。
// src/loader.rs - 模型加载
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::model::{LabelError, LabelTable, Model, YoloV8, YoloV8Builder, YoloV8Error};

pub const LOCAL_WEIGHTS: &str = "weights/best.onnx";
pub const FALLBACK_WEIGHTS: &str = "yolov8n.onnx";
const LABELS_FILE_NAME: &str = "labels.toml";

#[derive(Error, Debug)]
pub enum LoadError {
  #[error("模型加载错误: {0}")]
  ModelError(#[from] YoloV8Error),
  #[error("标签加载错误: {0}")]
  LabelError(#[from] LabelError),
}

/// 模型来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
  Local(PathBuf),
  Fallback { missing: PathBuf, fallback: PathBuf },
}

impl ModelSource {
  pub fn weights(&self) -> &Path {
    match self {
      ModelSource::Local(path) => path,
      ModelSource::Fallback { fallback, .. } => fallback,
    }
  }

  pub fn is_demo(&self) -> bool {
    matches!(self, ModelSource::Fallback { .. })
  }

  pub fn status(&self) -> String {
    match self {
      ModelSource::Local(path) => format!("✅ Using local model: {}", path.display()),
      ModelSource::Fallback { missing, fallback } => format!(
        "⚠️ Demo mode: {} not found. Falling back to {}",
        missing.display(),
        fallback.display()
      ),
    }
  }
}

/// 进程启动时构造一次的检测服务，持有模型及其来源说明
pub struct ModelService<M> {
  model: M,
  source: ModelSource,
}

impl<M: Model> ModelService<M> {
  pub fn new(model: M, source: ModelSource) -> Self {
    ModelService { model, source }
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn source(&self) -> &ModelSource {
    &self.source
  }

  pub fn status(&self) -> String {
    self.source.status()
  }

  pub fn labels(&self) -> &LabelTable {
    self.model.labels()
  }
}

pub struct ModelLoader {
  local: PathBuf,
  fallback: PathBuf,
  labels: Option<PathBuf>,
  input_size: Option<u32>,
  confidence: Option<f32>,
  nms_threshold: Option<f32>,
}

impl Default for ModelLoader {
  fn default() -> Self {
    ModelLoader::new(LOCAL_WEIGHTS, FALLBACK_WEIGHTS)
  }
}

impl ModelLoader {
  pub fn new(local: impl AsRef<Path>, fallback: impl AsRef<Path>) -> Self {
    ModelLoader {
      local: local.as_ref().to_path_buf(),
      fallback: fallback.as_ref().to_path_buf(),
      labels: None,
      input_size: None,
      confidence: None,
      nms_threshold: None,
    }
  }

  pub fn labels(mut self, labels: Option<PathBuf>) -> Self {
    self.labels = labels;
    self
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = Some(input_size);
    self
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = Some(confidence);
    self
  }

  pub fn nms_threshold(mut self, nms_threshold: f32) -> Self {
    self.nms_threshold = Some(nms_threshold);
    self
  }

  /// 本地权重存在时使用本地权重，否则回退到通用预训练权重
  pub fn locate(&self) -> ModelSource {
    if self.local.is_file() {
      ModelSource::Local(self.local.clone())
    } else {
      ModelSource::Fallback {
        missing: self.local.clone(),
        fallback: self.fallback.clone(),
      }
    }
  }

  /// 显式指定的标签文件优先，其次是权重旁的 `labels.toml`，最后是 COCO 类别
  pub fn resolve_labels(&self, weights: &Path) -> Result<LabelTable, LabelError> {
    if let Some(path) = &self.labels {
      return LabelTable::from_file(path);
    }

    let beside = weights
      .parent()
      .map(|dir| dir.join(LABELS_FILE_NAME))
      .filter(|path| path.is_file());
    match beside {
      Some(path) => LabelTable::from_file(&path),
      None => Ok(LabelTable::coco()),
    }
  }

  pub fn load(&self) -> Result<ModelService<YoloV8>, LoadError> {
    let source = self.locate();
    match &source {
      ModelSource::Local(path) => info!("使用本地模型: {}", path.display()),
      ModelSource::Fallback { missing, fallback } => warn!(
        "未找到本地模型 {}，回退到演示模型 {}",
        missing.display(),
        fallback.display()
      ),
    }

    let labels = self.resolve_labels(source.weights())?;
    let mut builder = YoloV8Builder::new(source.weights()).labels(labels);
    if let Some(input_size) = self.input_size {
      builder = builder.input_size(input_size);
    }
    if let Some(confidence) = self.confidence {
      builder = builder.confidence(confidence);
    }
    if let Some(nms_threshold) = self.nms_threshold {
      builder = builder.nms_threshold(nms_threshold);
    }

    let model = builder.build()?;
    Ok(ModelService::new(model, source))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn locate_prefers_local_weights() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("best.onnx");
    std::fs::write(&local, b"onnx").unwrap();

    let loader = ModelLoader::new(&local, dir.path().join("yolov8n.onnx"));
    let source = loader.locate();
    assert_eq!(source, ModelSource::Local(local.clone()));
    assert!(!source.is_demo());
    assert!(source.status().starts_with("✅ Using local model"));
  }

  #[test]
  fn locate_falls_back_when_local_missing() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("weights/best.onnx");
    let fallback = dir.path().join("yolov8n.onnx");

    let source = ModelLoader::new(&local, &fallback).locate();
    assert!(source.is_demo());
    assert_eq!(source.weights(), fallback.as_path());
    let status = source.status();
    assert!(status.starts_with("⚠️ Demo mode"));
    assert!(status.contains("not found. Falling back to"));
  }

  #[test]
  fn load_fails_when_no_weights_exist() {
    let dir = tempfile::tempdir().unwrap();
    let loader = ModelLoader::new(dir.path().join("a.onnx"), dir.path().join("b.onnx"));
    let err = loader.load().err().unwrap();
    assert!(matches!(
      err,
      LoadError::ModelError(YoloV8Error::ModelNotFound(_))
    ));
  }

  #[test]
  fn labels_beside_weights_are_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let weights = dir.path().join("best.onnx");
    std::fs::write(dir.path().join("labels.toml"), "names = [\"knife\", \"gun\"]\n").unwrap();

    let loader = ModelLoader::new(&weights, "yolov8n.onnx");
    let labels = loader.resolve_labels(&weights).unwrap();
    assert_eq!(labels.label(1), "gun");

    let coco = loader.resolve_labels(Path::new("elsewhere/best.onnx")).unwrap();
    assert_eq!(coco.label(0), "person");
  }
}
