use std::path::{Path, PathBuf};

use guardian::{
  ModelService, ModelSource, Outcome, ScanController, ScanError, Stage,
  model::{DetectItem, DetectResult, LabelTable, Model},
  output::{Draw, ResultStore},
  workflow::{Phase, Progress, Silent, UPLOAD_REQUIRED},
};
use image::{Rgb, RgbImage};

/// 固定输出的检测模型，按预设顺序返回结果
struct ScriptedModel {
  items: Vec<DetectItem>,
  labels: LabelTable,
}

impl Model for ScriptedModel {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = std::io::Error;

  fn infer(&self, _input: &RgbImage) -> Result<DetectResult, std::io::Error> {
    Ok(self.items.clone().into())
  }

  fn labels(&self) -> &LabelTable {
    &self.labels
  }
}

fn weapon(class_id: u32, score: f32) -> DetectItem {
  DetectItem {
    class_id,
    score,
    bbox: [0.2, 0.2, 0.6, 0.7],
  }
}

fn controller(items: Vec<DetectItem>, outputs: &Path) -> ScanController<ScriptedModel> {
  let model = ScriptedModel {
    items,
    labels: ["knife", "gun"].into_iter().collect(),
  };
  let source = ModelSource::Fallback {
    missing: PathBuf::from("weights/best.onnx"),
    fallback: PathBuf::from("yolov8n.onnx"),
  };
  ScanController::new(
    ModelService::new(model, source),
    ResultStore::new(outputs),
    Draw::default(),
  )
}

fn sample_image() -> RgbImage {
  RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8, y as u8, 128]))
}

fn strings(rows: &[[&str; 2]]) -> Vec<[String; 2]> {
  rows
    .iter()
    .map(|[a, b]| [a.to_string(), b.to_string()])
    .collect()
}

#[test]
fn two_weapons_fill_the_table_in_model_order() {
  let dir = tempfile::tempdir().unwrap();
  let mut ctl = controller(vec![weapon(0, 0.91), weapon(1, 0.77)], dir.path());
  ctl.upload(sample_image());

  let outcome = ctl.detect(&mut Silent).unwrap();

  assert_eq!(outcome, Outcome::Advanced(Stage::Results));
  assert_eq!(ctl.session().stage(), Stage::Results);
  assert_eq!(
    ctl.session().table(),
    strings(&[["knife", "91.0%"], ["gun", "77.0%"]])
  );

  let annotated = ctl.session().annotated_image().unwrap();
  assert_eq!(annotated.dimensions(), (64, 48));
  assert_ne!(annotated, &sample_image());
}

#[test]
fn nothing_found_shows_sentinel_row() {
  let dir = tempfile::tempdir().unwrap();
  let mut ctl = controller(vec![], dir.path());
  ctl.upload(sample_image());

  ctl.detect(&mut Silent).unwrap();

  assert_eq!(ctl.session().stage(), Stage::Results);
  assert_eq!(ctl.session().table(), strings(&[["None", "—"]]));
  assert!(ctl.session().download().unwrap().is_file());
}

#[test]
fn missing_upload_is_a_validation_message() {
  let dir = tempfile::tempdir().unwrap();
  let outputs = dir.path().join("outputs");
  let mut ctl = controller(vec![weapon(0, 0.9)], &outputs);

  let outcome = ctl.detect(&mut Silent).unwrap();

  assert_eq!(outcome, Outcome::Validation(UPLOAD_REQUIRED.to_string()));
  assert_eq!(ctl.session().stage(), Stage::Upload);
  assert!(ctl.session().table().is_empty());
  assert!(!outputs.exists());
}

#[test]
fn every_scan_writes_one_new_file() {
  let dir = tempfile::tempdir().unwrap();
  let outputs = dir.path().join("outputs");
  let mut ctl = controller(vec![weapon(1, 0.6)], &outputs);
  ctl.upload(sample_image());

  let mut written = Vec::new();
  for round in 1..=3 {
    ctl.detect(&mut Silent).unwrap();
    written.push(ctl.session().download().unwrap().to_path_buf());
    assert_eq!(std::fs::read_dir(&outputs).unwrap().count(), round);
  }

  written.sort();
  written.dedup();
  assert_eq!(written.len(), 3);
  for path in &written {
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("guardian_result_"));
    assert!(name.ends_with(".png"));
  }
}

#[test]
fn reset_clears_everything_from_any_stage() {
  let dir = tempfile::tempdir().unwrap();
  let mut ctl = controller(vec![weapon(0, 0.8)], dir.path());

  // Upload 阶段
  ctl.upload(sample_image());
  ctl.reset();
  assert!(ctl.session().source_image().is_none());

  // Processing 阶段
  ctl.upload(sample_image());
  ctl.start_detection().unwrap();
  assert_eq!(ctl.session().stage(), Stage::Processing);
  ctl.reset();
  assert_eq!(ctl.session().stage(), Stage::Upload);

  // Results 阶段
  ctl.upload(sample_image());
  ctl.detect(&mut Silent).unwrap();
  assert_eq!(ctl.session().stage(), Stage::Results);
  ctl.reset();

  let session = ctl.session();
  assert_eq!(session.stage(), Stage::Upload);
  assert!(session.source_image().is_none());
  assert!(session.annotated_image().is_none());
  assert!(session.table().is_empty());
  assert_eq!(session.status(), "");
  assert!(session.download().is_none());
  assert_eq!(session.progress(), 0.0);
}

#[test]
fn progress_and_status_describe_the_run() {
  let dir = tempfile::tempdir().unwrap();
  let mut ctl = controller(vec![weapon(0, 0.873)], dir.path());
  ctl.upload(sample_image());

  let mut updates: Vec<(f32, &'static str)> = Vec::new();
  ctl
    .detect(&mut |p: Progress| updates.push((p.fraction, p.phase.label())))
    .unwrap();

  let expected: Vec<(f32, &'static str)> = Phase::ALL
    .iter()
    .map(|p| (p.fraction(), p.label()))
    .collect();
  assert_eq!(updates, expected);
  assert_eq!(updates[1], (0.15, "Pre-processing…"));

  assert_eq!(ctl.session().table(), strings(&[["knife", "87.3%"]]));
  let status = ctl.session().status();
  assert!(status.starts_with("⚠️ Demo mode: weights/best.onnx not found. Falling back to yolov8n.onnx\n"));
  assert!(status.contains("\nProcessed in "));
  assert!(status.ends_with("Privacy: Uploads are processed on demand and not stored permanently."));
}

#[test]
fn save_failure_keeps_processing_until_reset() {
  let dir = tempfile::tempdir().unwrap();
  // 输出目录的父路径是普通文件，无法创建目录
  let blocker = dir.path().join("blocker");
  std::fs::write(&blocker, b"not a directory").unwrap();
  let mut ctl = controller(vec![weapon(0, 0.9)], &blocker.join("outputs"));
  ctl.upload(sample_image());

  let err = ctl.detect(&mut Silent).unwrap_err();

  assert!(matches!(err, ScanError::StoreError(_)));
  let session = ctl.session();
  assert_eq!(session.stage(), Stage::Processing);
  assert!(session.result().is_none());
  assert!(session.download().is_none());
  assert!(session.source_image().is_some());

  ctl.reset();
  assert_eq!(ctl.session().stage(), Stage::Upload);
  assert!(ctl.session().source_image().is_none());

  // 恢复后可以重新开始
  ctl.upload(sample_image());
  assert_eq!(ctl.session().stage(), Stage::Upload);
}
