// 该文件是 Guardian （守望者） 项目的一部分。
// src/ui.rs - 终端界面
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

use std::{fmt::Write, path::PathBuf, str::FromStr};

use thiserror::Error;

use crate::workflow::{Progress, Row, ScanSession, Stage};

pub const TITLE: &str = "🛡️ The Guardian — Weapon Detection";
pub const DETECT_BUTTON: &str = "Detect Weapons";
pub const RESET_BUTTON: &str = "New Scan";
const TABLE_HEADERS: [&str; 2] = ["Label", "Confidence"];
const PROGRESS_BAR_WIDTH: usize = 30;

/// 交互模式下的一行输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Upload(PathBuf),
  Detect,
  Reset,
  Show,
  Help,
  Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
  #[error("empty command")]
  Empty,
  #[error("`upload` needs an image path")]
  MissingPath,
  #[error("unknown command `{0}`, type `help`")]
  Unknown(String),
}

impl FromStr for Command {
  type Err = CommandError;

  fn from_str(line: &str) -> Result<Self, Self::Err> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
      Some((word, rest)) => (word, rest.trim()),
      None => (line, ""),
    };

    match word.to_lowercase().as_str() {
      "" => Err(CommandError::Empty),
      "upload" | "u" if rest.is_empty() => Err(CommandError::MissingPath),
      "upload" | "u" => Ok(Command::Upload(PathBuf::from(rest))),
      "detect" | "d" => Ok(Command::Detect),
      "new" | "reset" | "n" => Ok(Command::Reset),
      "show" | "s" => Ok(Command::Show),
      "help" | "h" | "?" => Ok(Command::Help),
      "quit" | "exit" | "q" => Ok(Command::Quit),
      other => Err(CommandError::Unknown(other.to_string())),
    }
  }
}

pub fn help() -> String {
  format!(
    "Commands:\n  \
     upload <path>   choose the image to scan\n  \
     detect          {DETECT_BUTTON}\n  \
     new             {RESET_BUTTON}\n  \
     show            redraw the current view\n  \
     quit            leave"
  )
}

pub fn header(model_status: &str) -> String {
  format!(
    "{TITLE}\nThree-click workflow: Upload → Detect → Results. No training required.\n\
     Privacy-first design: upload-based scanning, files are not retained after inference.\n\
     Model status: {model_status}\n"
  )
}

pub fn progress_line(progress: &Progress) -> String {
  format!(
    "{} {}",
    progress_bar(progress.fraction),
    progress.phase.label()
  )
}

fn progress_bar(fraction: f32) -> String {
  let fraction = fraction.clamp(0.0, 1.0);
  let filled = (fraction * PROGRESS_BAR_WIDTH as f32).round() as usize;
  format!(
    "[{}{}] {:>3.0}%",
    "#".repeat(filled),
    ".".repeat(PROGRESS_BAR_WIDTH - filled),
    fraction * 100.0
  )
}

/// 以等宽两列表格显示检测结果
pub fn table(rows: &[Row]) -> String {
  let width = rows
    .iter()
    .map(|row| row[0].chars().count())
    .chain(std::iter::once(TABLE_HEADERS[0].len()))
    .max()
    .unwrap_or(0);

  let mut out = String::new();
  let _ = writeln!(out, "{:<width$}  {}", TABLE_HEADERS[0], TABLE_HEADERS[1]);
  let _ = writeln!(out, "{}  {}", "-".repeat(width), "-".repeat(TABLE_HEADERS[1].len()));
  for [label, confidence] in rows {
    let _ = writeln!(out, "{:<width$}  {}", label, confidence);
  }
  out
}

/// 渲染当前阶段对应的界面
pub fn render(session: &ScanSession) -> String {
  let mut out = String::new();
  let stage = session.stage();
  let _ = writeln!(out, "== {} ==", stage.title());

  match stage {
    Stage::Upload => {
      match session.source_image() {
        Some(image) => {
          let _ = writeln!(out, "Image ready: {}x{}", image.width(), image.height());
        }
        None => {
          let _ = writeln!(out, "Upload Image (JPG/PNG): `upload <path>`");
        }
      }
      if let Some(notice) = session.notice() {
        let _ = writeln!(out, "! {}", notice);
      }
      let _ = writeln!(out, "[{DETECT_BUTTON}]  [{RESET_BUTTON}]");
    }
    Stage::Processing => {
      let _ = writeln!(out, "Scanning for weapons…");
      let label = session.phase().map(|p| p.label()).unwrap_or("⏳ Please wait…");
      let _ = writeln!(out, "{} {}", progress_bar(session.progress()), label);
    }
    Stage::Results => {
      let _ = writeln!(out, "Detections:");
      out.push_str(&table(&session.table()));
      let _ = writeln!(out, "\nRun Details:");
      let _ = writeln!(out, "{}", session.status());
      if let Some(path) = session.download() {
        let _ = writeln!(out, "\nDownload Annotated Image: {}", path.display());
      }
      let _ = writeln!(out, "[{RESET_BUTTON}]");
    }
  }

  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::workflow::Phase;

  #[test]
  fn parses_commands() {
    assert_eq!(
      "upload  photos/a b.png ".parse::<Command>(),
      Ok(Command::Upload(PathBuf::from("photos/a b.png")))
    );
    assert_eq!("DETECT".parse::<Command>(), Ok(Command::Detect));
    assert_eq!("new".parse::<Command>(), Ok(Command::Reset));
    assert_eq!("q".parse::<Command>(), Ok(Command::Quit));
    assert_eq!("upload".parse::<Command>(), Err(CommandError::MissingPath));
    assert_eq!("   ".parse::<Command>(), Err(CommandError::Empty));
    assert!(matches!("fly".parse::<Command>(), Err(CommandError::Unknown(_))));
  }

  #[test]
  fn table_aligns_columns() {
    let rows = vec![
      ["knife".to_string(), "91.0%".to_string()],
      ["gun".to_string(), "77.0%".to_string()],
    ];
    let text = table(&rows);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Label  Confidence");
    assert_eq!(lines[2], "knife  91.0%");
    assert_eq!(lines[3], "gun    77.0%");
  }

  #[test]
  fn progress_bar_tracks_fraction() {
    let line = progress_line(&Phase::RunningInference.into());
    assert!(line.contains(" 35%"));
    assert!(line.ends_with("Running inference…"));
    assert!(progress_bar(0.0).starts_with(&format!("[{}]", ".".repeat(PROGRESS_BAR_WIDTH))));
  }

  #[test]
  fn fresh_session_renders_upload_view() {
    let text = render(&ScanSession::default());
    assert!(text.starts_with("== 1) Upload =="));
    assert!(text.contains(DETECT_BUTTON));
  }
}
