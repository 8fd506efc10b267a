// 该文件是 Guardian （守望者） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;
use guardian::{loader, output};

/// Guardian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 本地训练好的 ONNX 权重文件
  #[arg(long, value_name = "FILE", default_value = loader::LOCAL_WEIGHTS)]
  pub weights: PathBuf,

  /// 本地权重不存在时使用的通用预训练权重
  #[arg(long, value_name = "FILE", default_value = loader::FALLBACK_WEIGHTS)]
  pub fallback_weights: PathBuf,

  /// 类别标签文件（TOML），默认读取权重旁的 labels.toml
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 检测结果图像的保存目录
  #[arg(long, value_name = "DIR", default_value = output::OUTPUT_DIR)]
  pub output_dir: PathBuf,

  /// 标签字体（TTF/OTF），默认尝试系统字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 进度检查点之间的停顿（毫秒）
  #[arg(long, default_value = "200", value_name = "MILLIS")]
  pub phase_delay_ms: u64,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 模型输入边长
  #[arg(long, default_value = "640", value_name = "PIXELS")]
  pub input_size: u32,

  /// 单次扫描：上传该图像、检测并输出结果后退出
  #[arg(long, value_name = "IMAGE")]
  pub image: Option<PathBuf>,
}
