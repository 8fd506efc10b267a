// 该文件是 Guardian （守望者） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 ONNX 模型
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

use image::{
  RgbImage,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;

use crate::model::{DetectItem, DetectResult, LabelTable, Model};

const YOLOV8_INPUT_SIZE: u32 = 640;
const YOLOV8_BOX_ATTRS: usize = 4;
const YOLOV8_CONFIDENCE_THRESH: f32 = 0.25;
const YOLOV8_NMS_THRESH: f32 = 0.45;

type Plan = TypedRunnableModel<TypedModel>;

#[derive(Error, Debug)]
pub enum YoloV8Error {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("模型加载错误: {0:#}")]
  ModelLoadError(TractError),
  #[error("推理错误: {0:#}")]
  InferenceError(TractError),
  #[error("模型输出无效: {0}")]
  InvalidOutput(String),
  #[error("输入图像无效: {0}x{1}")]
  InvalidImage(u32, u32),
}

pub struct YoloV8 {
  plan: Plan,
  input_size: u32,
  confidence: f32,
  nms_threshold: f32,
  labels: LabelTable,
}

pub struct YoloV8Builder {
  model_path: PathBuf,
  input_size: u32,
  confidence: f32,
  nms_threshold: f32,
  labels: LabelTable,
}

impl YoloV8Builder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    YoloV8Builder {
      model_path: model_path.as_ref().to_path_buf(),
      input_size: YOLOV8_INPUT_SIZE,
      confidence: YOLOV8_CONFIDENCE_THRESH,
      nms_threshold: YOLOV8_NMS_THRESH,
      labels: LabelTable::coco(),
    }
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn nms_threshold(mut self, nms_threshold: f32) -> Self {
    self.nms_threshold = nms_threshold;
    self
  }

  pub fn labels(mut self, labels: LabelTable) -> Self {
    self.labels = labels;
    self
  }

  pub fn build(self) -> Result<YoloV8, YoloV8Error> {
    if !self.model_path.is_file() {
      return Err(YoloV8Error::ModelNotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path.display());
    let size = self.input_size as usize;
    let plan = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .map_err(YoloV8Error::ModelLoadError)?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
      )
      .map_err(YoloV8Error::ModelLoadError)?
      .into_optimized()
      .map_err(YoloV8Error::ModelLoadError)?
      .into_runnable()
      .map_err(YoloV8Error::ModelLoadError)?;
    info!("模型加载完成");
    debug!(
      "输入尺寸: {0}x{0}, 置信度阈值: {1}, NMS 阈值: {2}, 类别数: {3}",
      self.input_size,
      self.confidence,
      self.nms_threshold,
      self.labels.len()
    );

    Ok(YoloV8 {
      plan,
      input_size: self.input_size,
      confidence: self.confidence,
      nms_threshold: self.nms_threshold,
      labels: self.labels,
    })
  }
}

impl YoloV8 {
  /// 缩放到模型输入尺寸，转为 NCHW 格式的 [0, 1] 浮点张量
  fn preprocess(&self, image: &RgbImage) -> Result<Tensor, YoloV8Error> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(YoloV8Error::InvalidImage(width, height));
    }

    let resized = imageops::resize(
      image,
      self.input_size,
      self.input_size,
      FilterType::Triangle,
    );
    let size = self.input_size as usize;
    let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
      resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    });

    Ok(input.into_tensor())
  }
}

impl Model for YoloV8 {
  type Input = RgbImage;
  type Output = DetectResult;
  type Error = YoloV8Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("预处理输入图像 {}x{}", input.width(), input.height());
    let tensor = self.preprocess(input)?;

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(YoloV8Error::InferenceError)?;

    let output = outputs
      .first()
      .ok_or_else(|| YoloV8Error::InvalidOutput("模型没有输出".to_string()))?;
    let view = output
      .to_array_view::<f32>()
      .map_err(YoloV8Error::InferenceError)?;
    let shape = view.shape().to_vec();
    let data: Vec<f32> = view.iter().copied().collect();
    debug!("模型输出形状: {:?}", shape);

    let layout = OutputLayout::from_shape(&shape, self.labels.len())?;
    let items = decode(
      &data,
      layout,
      self.input_size as f32,
      self.confidence,
    );
    let items = nms(items, self.nms_threshold);
    debug!("检测到 {} 个物体", items.len());

    Ok(items.into())
  }

  fn labels(&self) -> &LabelTable {
    &self.labels
  }
}

/// 输出张量 `[1, 4 + 类别数, 锚点数]`，部分导出会转置为 `[1, 锚点数, 4 + 类别数]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputLayout {
  attrs: usize,
  anchors: usize,
  transposed: bool,
}

impl OutputLayout {
  /// 默认按 `[1, 4 + 类别数, 锚点数]` 解读，只有中间维不等于 `4 + 类别数`
  /// 而最后一维等于时才视为转置
  fn from_shape(shape: &[usize], num_classes: usize) -> Result<Self, YoloV8Error> {
    let (a, b) = match shape {
      [1, a, b] => (*a, *b),
      [a, b] => (*a, *b),
      _ => {
        return Err(YoloV8Error::InvalidOutput(format!(
          "无法识别的输出形状 {:?}",
          shape
        )));
      }
    };

    let expected = YOLOV8_BOX_ATTRS + num_classes;
    let layout = if a != expected && b == expected {
      OutputLayout {
        attrs: b,
        anchors: a,
        transposed: true,
      }
    } else {
      OutputLayout {
        attrs: a,
        anchors: b,
        transposed: false,
      }
    };

    if layout.attrs <= YOLOV8_BOX_ATTRS {
      return Err(YoloV8Error::InvalidOutput(format!(
        "输出属性数 {} 不足",
        layout.attrs
      )));
    }
    Ok(layout)
  }

  fn at(&self, data: &[f32], attr: usize, anchor: usize) -> f32 {
    if self.transposed {
      data[anchor * self.attrs + attr]
    } else {
      data[attr * self.anchors + anchor]
    }
  }
}

fn decode(data: &[f32], layout: OutputLayout, input_size: f32, confidence: f32) -> Vec<DetectItem> {
  let num_classes = layout.attrs - YOLOV8_BOX_ATTRS;
  let mut items = Vec::new();

  for anchor in 0..layout.anchors {
    let (score, class_id) = {
      let mut max_score = f32::MIN;
      let mut cls_idx = 0usize;
      for c in 0..num_classes {
        let score = layout.at(data, YOLOV8_BOX_ATTRS + c, anchor);
        if score > max_score {
          max_score = score;
          cls_idx = c;
        }
      }
      (max_score, cls_idx as u32)
    };

    if score < confidence {
      continue;
    }

    let cx = layout.at(data, 0, anchor);
    let cy = layout.at(data, 1, anchor);
    let w = layout.at(data, 2, anchor);
    let h = layout.at(data, 3, anchor);

    let x_min = ((cx - w / 2.0) / input_size).clamp(0.0, 1.0);
    let y_min = ((cy - h / 2.0) / input_size).clamp(0.0, 1.0);
    let x_max = ((cx + w / 2.0) / input_size).clamp(0.0, 1.0);
    let y_max = ((cy + h / 2.0) / input_size).clamp(0.0, 1.0);

    if x_min >= x_max || y_min >= y_max {
      continue;
    }

    items.push(DetectItem {
      class_id,
      score,
      bbox: [x_min, y_min, x_max, y_max],
    });
  }

  items
}

/// 非极大值抑制，结果按置信度降序
fn nms(mut items: Vec<DetectItem>, threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<DetectItem> = Vec::new();
  for item in items {
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == item.class_id && iou(&kept.bbox, &item.bbox) >= threshold);
    if !suppressed {
      result.push(item);
    }
  }

  result
}

/// 计算两个边界框的 IoU
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}
