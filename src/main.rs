// 该文件是 Guardian （守望者） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{
  io::{self, BufRead, Write},
  time::Duration,
};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use guardian::{
  ModelLoader, Outcome, ScanController,
  model::YoloV8,
  output::{Draw, ResultStore},
  ui::{self, Command},
  workflow::Progress,
};

fn print_progress(progress: Progress) {
  println!("{}", ui::progress_line(&progress));
}

/// 点击检测按钮，推理失败时只结束本次扫描
fn press_detect(controller: &mut ScanController<YoloV8>) {
  match controller.detect(&mut print_progress) {
    Ok(Outcome::Validation(message)) => info!("{}", message),
    Ok(Outcome::Advanced(stage)) => info!("进入阶段: {:?}", stage),
    Err(e) => {
      error!("本次扫描失败: {}", e);
      println!("Scan failed: {e}. Use `new` to start over.");
    }
  }
}

fn interactive(controller: &mut ScanController<YoloV8>) -> Result<()> {
  println!("{}", ui::help());
  print!("{}", ui::render(controller.session()));

  let stdin = io::stdin();
  let mut stdout = io::stdout();
  loop {
    print!("> ");
    stdout.flush()?;

    let mut line = String::new();
    if stdin.lock().read_line(&mut line)? == 0 {
      break;
    }

    let command = match line.parse::<Command>() {
      Ok(command) => command,
      Err(ui::CommandError::Empty) => continue,
      Err(e) => {
        println!("{e}");
        continue;
      }
    };

    match command {
      Command::Upload(path) => {
        if let Err(e) = controller.upload_file(&path) {
          println!("Cannot open {}: {e}", path.display());
        }
      }
      Command::Detect => press_detect(controller),
      Command::Reset => controller.reset(),
      Command::Show => {}
      Command::Help => {
        println!("{}", ui::help());
        continue;
      }
      Command::Quit => break,
    }

    print!("{}", ui::render(controller.session()));
  }

  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("本地权重: {}", args.weights.display());
  info!("回退权重: {}", args.fallback_weights.display());

  info!("正在加载模型...");
  let service = ModelLoader::new(&args.weights, &args.fallback_weights)
    .labels(args.labels.clone())
    .input_size(args.input_size)
    .confidence(args.confidence)
    .nms_threshold(args.nms_threshold)
    .load()?;
  info!("模型加载完成: {}", service.status());

  let draw = Draw::discover(args.font.as_deref())?;
  if !draw.has_font() {
    warn!("未找到标签字体，标注图像只绘制检测框，可用 --font 指定");
  }
  let mut controller = ScanController::new(service, ResultStore::new(&args.output_dir), draw)
    .with_phase_delay(Duration::from_millis(args.phase_delay_ms));
  info!("输出目录: {}", controller.store().directory().display());

  println!("{}", ui::header(&controller.service().status()));

  match &args.image {
    Some(path) => {
      controller.upload_file(path)?;
      controller.detect(&mut print_progress)?;
      print!("{}", ui::render(controller.session()));
    }
    None => interactive(&mut controller)?,
  }

  Ok(())
}
