// 该文件是 Guardian （守望者） 项目的一部分。
// src/workflow.rs - 扫描流程控制
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
  path::{Path, PathBuf},
  time::{Duration, Instant},
};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  loader::ModelService,
  model::{DetectResult, Model},
  output::{Draw, ResultStore, StoreError},
};

mod progress;
pub use self::progress::{Phase, Progress, ProgressSink, Silent};

pub const UPLOAD_REQUIRED: &str = "Please upload an image first.";
pub const PRIVACY_NOTICE: &str =
  "Privacy: Uploads are processed on demand and not stored permanently.";
pub const EMPTY_LABEL: &str = "None";
pub const EMPTY_CONFIDENCE: &str = "—";

/// 两列表格的一行：`[标签, 置信度]`
pub type Row = [String; 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Upload,
  Processing,
  Results,
}

impl Stage {
  pub fn title(self) -> &'static str {
    match self {
      Stage::Upload => "1) Upload",
      Stage::Processing => "2) Processing",
      Stage::Results => "3) Results",
    }
  }
}

#[derive(Error, Debug)]
pub enum ScanError {
  #[error("推理失败: {0}")]
  InferenceError(#[source] Box<dyn std::error::Error + Send + Sync>),
  #[error("保存结果失败: {0}")]
  StoreError(#[from] StoreError),
  #[error("图像读取失败: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("当前阶段 {actual:?} 不允许该操作，需要 {expected:?}")]
  StageMismatch { expected: Stage, actual: Stage },
}

/// 置信度显示为一位小数的百分比，如 0.873 显示为 `87.3%`
pub fn format_confidence(confidence: f32) -> String {
  format!("{:.1}%", f64::from(confidence) * 100.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub label: String,
  pub confidence: f32,
}

impl Detection {
  pub fn row(&self) -> Row {
    [self.label.clone(), format_confidence(self.confidence)]
  }
}

#[derive(Debug, Clone)]
pub struct ScanResult {
  pub annotated_image: RgbImage,
  /// 保持模型的输出顺序
  pub detections: Vec<Detection>,
  pub status_message: String,
  pub output_file: PathBuf,
}

impl ScanResult {
  /// 没有检测到任何物体时返回占位行，表格永不为空
  pub fn table(&self) -> Vec<Row> {
    if self.detections.is_empty() {
      vec![[EMPTY_LABEL.to_string(), EMPTY_CONFIDENCE.to_string()]]
    } else {
      self.detections.iter().map(Detection::row).collect()
    }
  }
}

/// 单次用户交互的会话状态，重置时整体丢弃
#[derive(Debug, Clone)]
pub struct ScanSession {
  stage: Stage,
  source_image: Option<RgbImage>,
  progress: f32,
  phase: Option<Phase>,
  notice: Option<String>,
  result: Option<ScanResult>,
}

impl Default for ScanSession {
  fn default() -> Self {
    ScanSession {
      stage: Stage::Upload,
      source_image: None,
      progress: 0.0,
      phase: None,
      notice: None,
      result: None,
    }
  }
}

impl ScanSession {
  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub fn source_image(&self) -> Option<&RgbImage> {
    self.source_image.as_ref()
  }

  pub fn progress(&self) -> f32 {
    self.progress
  }

  pub fn phase(&self) -> Option<Phase> {
    self.phase
  }

  /// 上传页的提示信息
  pub fn notice(&self) -> Option<&str> {
    self.notice.as_deref()
  }

  pub fn result(&self) -> Option<&ScanResult> {
    self.result.as_ref()
  }

  pub fn annotated_image(&self) -> Option<&RgbImage> {
    self.result.as_ref().map(|r| &r.annotated_image)
  }

  pub fn table(&self) -> Vec<Row> {
    self.result.as_ref().map(ScanResult::table).unwrap_or_default()
  }

  pub fn status(&self) -> &str {
    self
      .result
      .as_ref()
      .map(|r| r.status_message.as_str())
      .unwrap_or("")
  }

  pub fn download(&self) -> Option<&Path> {
    self.result.as_ref().map(|r| r.output_file.as_path())
  }

  fn report(&mut self, sink: &mut impl ProgressSink, phase: Phase) {
    let progress = Progress::from(phase);
    self.progress = progress.fraction;
    self.phase = Some(phase);
    debug!("进度 {:.0}%: {}", progress.fraction * 100.0, phase.label());
    sink.notify(progress);
  }
}

/// 点击检测按钮的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  /// 未上传图像，停留在上传页
  Validation(String),
  /// 进入下一阶段
  Advanced(Stage),
}

pub struct ScanController<M> {
  service: ModelService<M>,
  store: ResultStore,
  draw: Draw,
  phase_delay: Duration,
  session: ScanSession,
}

impl<M> ScanController<M>
where
  M: Model<Input = RgbImage, Output = DetectResult>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(service: ModelService<M>, store: ResultStore, draw: Draw) -> Self {
    ScanController {
      service,
      store,
      draw,
      phase_delay: Duration::ZERO,
      session: ScanSession::default(),
    }
  }

  /// 检查点之间的停顿，仅用于界面节奏
  pub fn with_phase_delay(mut self, phase_delay: Duration) -> Self {
    self.phase_delay = phase_delay;
    self
  }

  pub fn session(&self) -> &ScanSession {
    &self.session
  }

  pub fn service(&self) -> &ModelService<M> {
    &self.service
  }

  pub fn store(&self) -> &ResultStore {
    &self.store
  }

  pub fn upload(&mut self, image: RgbImage) {
    info!("已上传图像 {}x{}", image.width(), image.height());
    self.session.source_image = Some(image);
    self.session.notice = None;
  }

  pub fn upload_file(&mut self, path: &Path) -> Result<(), ScanError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    self.upload(image.to_rgb8());
    Ok(())
  }

  /// Upload → Processing
  pub fn start_detection(&mut self) -> Result<Outcome, ScanError> {
    if self.session.stage == Stage::Processing {
      return Err(ScanError::StageMismatch {
        expected: Stage::Upload,
        actual: Stage::Processing,
      });
    }

    if self.session.source_image.is_none() {
      warn!("未上传图像，无法开始检测");
      self.session.notice = Some(UPLOAD_REQUIRED.to_string());
      return Ok(Outcome::Validation(UPLOAD_REQUIRED.to_string()));
    }

    self.session.stage = Stage::Processing;
    self.session.progress = 0.0;
    self.session.phase = None;
    self.session.notice = None;
    self.session.result = None;
    Ok(Outcome::Advanced(Stage::Processing))
  }

  fn pace(&self) {
    if !self.phase_delay.is_zero() {
      std::thread::sleep(self.phase_delay);
    }
  }

  /// 在 Processing 阶段运行一次完整的检测，失败时停留在 Processing
  pub fn run_detection(&mut self, sink: &mut impl ProgressSink) -> Result<&ScanResult, ScanError> {
    if self.session.stage != Stage::Processing {
      return Err(ScanError::StageMismatch {
        expected: Stage::Processing,
        actual: self.session.stage,
      });
    }
    let Some(image) = self.session.source_image.take() else {
      return Err(ScanError::StageMismatch {
        expected: Stage::Upload,
        actual: Stage::Processing,
      });
    };

    let outcome = self.detect_image(&image, sink);
    self.session.source_image = Some(image);

    match outcome {
      Ok(result) => {
        self.session.report(sink, Phase::Done);
        Ok(self.session.result.insert(result))
      }
      Err(e) => {
        error!("检测失败: {}", e);
        Err(e)
      }
    }
  }

  fn detect_image(
    &mut self,
    image: &RgbImage,
    sink: &mut impl ProgressSink,
  ) -> Result<ScanResult, ScanError> {
    info!("开始检测...");
    self.session.report(sink, Phase::Initializing);
    let start = Instant::now();

    self.pace();
    self.session.report(sink, Phase::PreProcessing);

    self.pace();
    self.session.report(sink, Phase::RunningInference);
    let raw = self
      .service
      .model()
      .infer(image)
      .map_err(|e| ScanError::InferenceError(Box::new(e)))?;
    info!("推理完成，耗时: {:.2?}", start.elapsed());

    self.pace();
    self.session.report(sink, Phase::ExtractingDetections);
    let labels = self.service.labels();
    let detections: Vec<Detection> = raw
      .items
      .iter()
      .map(|item| Detection {
        label: labels.label(item.class_id),
        confidence: item.score.clamp(0.0, 1.0),
      })
      .collect();
    for det in &detections {
      info!("  - {}: {}", det.label, format_confidence(det.confidence));
    }

    self.pace();
    self.session.report(sink, Phase::RenderingBoxes);
    let annotated_image = self.draw.annotate(image, &raw, labels);

    self.pace();
    self.session.report(sink, Phase::Finalizing);
    let elapsed = start.elapsed();
    let status_message = format!(
      "{}\nProcessed in {:.2}s\n{}",
      self.service.status(),
      elapsed.as_secs_f64(),
      PRIVACY_NOTICE
    );
    let output_file = self.store.save(&annotated_image)?;
    info!("检测完成，共 {} 个物体，耗时: {:.2?}", detections.len(), elapsed);

    Ok(ScanResult {
      annotated_image,
      detections,
      status_message,
      output_file,
    })
  }

  /// Processing → Results
  pub fn show_results(&mut self) -> Result<Outcome, ScanError> {
    if self.session.stage != Stage::Processing || self.session.result.is_none() {
      return Err(ScanError::StageMismatch {
        expected: Stage::Processing,
        actual: self.session.stage,
      });
    }
    self.session.stage = Stage::Results;
    Ok(Outcome::Advanced(Stage::Results))
  }

  /// "Detect Weapons" 按钮：依次执行开始检测、检测、展示结果
  pub fn detect(&mut self, sink: &mut impl ProgressSink) -> Result<Outcome, ScanError> {
    if let Outcome::Validation(message) = self.start_detection()? {
      return Ok(Outcome::Validation(message));
    }
    self.run_detection(sink)?;
    self.show_results()
  }

  /// "New Scan" 按钮：任意阶段回到上传页并清空会话
  pub fn reset(&mut self) {
    info!("重置扫描会话");
    self.session = ScanSession::default();
  }
}
