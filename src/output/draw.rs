// 该文件是 Guardian （守望者） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{DetectItem, DetectResult, LabelTable};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const PALETTE_SIZE: u32 = 80;

/// 常见系统字体位置
const SYSTEM_FONTS: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/Library/Fonts/Arial.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("无效的字体文件: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 在图像上绘制检测框与标签
///
/// 没有字体时只绘制边框和标签底色。
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    // 生成 80 种不同的颜色，按类别编号取用
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      colors,
    }
  }
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_file(self, path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    info!("加载标签字体: {}", path.display());
    Ok(self.with_font(font))
  }

  /// 指定字体优先，否则尝试常见系统字体
  pub fn discover(font: Option<&Path>) -> Result<Self, DrawError> {
    if let Some(path) = font {
      return Draw::default().with_font_file(path);
    }

    for candidate in SYSTEM_FONTS.iter().map(Path::new) {
      if candidate.is_file()
        && let Ok(draw) = Draw::default().with_font_file(candidate)
      {
        return Ok(draw);
      }
    }

    debug!("未找到可用字体，标签将不绘制文字");
    Ok(Draw::default())
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  fn color_of(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// 返回带检测框的新图像，原图不变
  pub fn annotate(&self, image: &RgbImage, result: &DetectResult, labels: &LabelTable) -> RgbImage {
    let mut annotated = image.clone();
    for item in result.items.iter() {
      let caption = format!("{} {:.2}", labels.label(item.class_id), item.score);
      self.draw_bbox_with_label(&mut annotated, item, &caption);
    }
    annotated
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem, caption: &str) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    if w < 1.0 || h < 1.0 {
      return;
    }
    let color = self.color_of(item.class_id);
    let bbox = &item.bbox;

    let x_min = ((bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 绘制边框（加粗）
    for thickness in 0..BOX_THICKNESS {
      let width = x_max - x_min + 1 - 2 * thickness;
      let height = y_max - y_min + 1 - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + thickness, y_min + thickness).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    // 标签背景在边框上方，贴顶时放在框内
    let text_width = (caption.chars().count() as f32 * self.label_char_width) as i32;
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min(w as i32 - label_x);
    let label_height = self.label_text_height.min(h as i32 - label_y);

    if label_width <= 0 || label_height <= 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width as u32, label_height as u32);
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        caption,
      );
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score: 0.9,
      bbox,
    }
  }

  #[test]
  fn annotate_draws_box_edges_without_touching_source() {
    let image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
    let result = DetectResult::from(vec![item(0, [0.5, 0.5, 0.9, 0.9])]);
    let draw = Draw::default();
    assert!(!draw.has_font());

    let annotated = draw.annotate(&image, &result, &LabelTable::coco());

    let color = draw.color_of(0);
    assert_eq!(*annotated.get_pixel(50, 70), color);
    assert_eq!(*annotated.get_pixel(70, 90), color);
    // 框内部保持原样
    assert_eq!(*annotated.get_pixel(70, 70), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(50, 70), Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_boxes_are_skipped() {
    let image = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
    let result = DetectResult::from(vec![item(3, [0.5, 0.5, 0.5, 0.5])]);
    let annotated = Draw::default().annotate(&image, &result, &LabelTable::coco());
    assert_eq!(annotated, image);
  }

  #[test]
  fn palette_wraps_by_class_id() {
    let draw = Draw::default();
    assert_eq!(draw.color_of(1), draw.color_of(81));
    assert_ne!(draw.color_of(0), draw.color_of(40));
  }

  #[test]
  fn missing_font_file_is_an_error() {
    let result = Draw::discover(Some(Path::new("no/such/font.ttf")));
    assert!(matches!(result, Err(DrawError::IoError(_))));
  }
}
