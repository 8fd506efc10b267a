// 该文件是 Guardian （守望者） 项目的一部分。
// src/workflow/progress.rs - 扫描进度
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

/// 检测过程的固定检查点，按声明顺序依次发出
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
  Initializing,
  PreProcessing,
  RunningInference,
  ExtractingDetections,
  RenderingBoxes,
  Finalizing,
  Done,
}

impl Phase {
  pub const ALL: [Phase; 7] = [
    Phase::Initializing,
    Phase::PreProcessing,
    Phase::RunningInference,
    Phase::ExtractingDetections,
    Phase::RenderingBoxes,
    Phase::Finalizing,
    Phase::Done,
  ];

  pub fn fraction(self) -> f32 {
    match self {
      Phase::Initializing => 0.05,
      Phase::PreProcessing => 0.15,
      Phase::RunningInference => 0.35,
      Phase::ExtractingDetections => 0.55,
      Phase::RenderingBoxes => 0.75,
      Phase::Finalizing => 0.90,
      Phase::Done => 1.0,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Phase::Initializing => "Initializing…",
      Phase::PreProcessing => "Pre-processing…",
      Phase::RunningInference => "Running inference…",
      Phase::ExtractingDetections => "Extracting detections…",
      Phase::RenderingBoxes => "Rendering bounding boxes…",
      Phase::Finalizing => "Finalizing output…",
      Phase::Done => "Done ✅",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
  pub fraction: f32,
  pub phase: Phase,
}

impl From<Phase> for Progress {
  fn from(phase: Phase) -> Self {
    Progress {
      fraction: phase.fraction(),
      phase,
    }
  }
}

/// 进度订阅者，在检测过程中被同步调用
pub trait ProgressSink {
  fn notify(&mut self, progress: Progress);
}

impl<F: FnMut(Progress)> ProgressSink for F {
  fn notify(&mut self, progress: Progress) {
    self(progress)
  }
}

/// 不关心进度时使用
pub struct Silent;

impl ProgressSink for Silent {
  fn notify(&mut self, _progress: Progress) {}
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn checkpoints_are_strictly_increasing() {
    let fractions: Vec<f32> = Phase::ALL.iter().map(|p| p.fraction()).collect();
    assert_eq!(fractions, vec![0.05, 0.15, 0.35, 0.55, 0.75, 0.90, 1.0]);
    assert!(fractions.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn closures_subscribe_to_progress() {
    let mut seen = Vec::new();
    {
      let mut sink = |p: Progress| seen.push(p.phase);
      sink.notify(Phase::RunningInference.into());
      sink.notify(Phase::Done.into());
    }
    assert_eq!(seen, vec![Phase::RunningInference, Phase::Done]);
    assert_eq!(Phase::Done.label(), "Done ✅");
  }
}
