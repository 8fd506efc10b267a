// 该文件是 Guardian （守望者） 项目的一部分。
// src/model/labels.rs - 类别标签表
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

use std::{collections::BTreeMap, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件解析错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("无效的类别编号: {0}")]
  InvalidClassId(String),
  #[error("标签文件中没有 `names` 或 `[labels]`")]
  Empty,
}

/// 标签文件格式，两种写法任选其一：
///
/// ```toml
/// names = ["knife", "gun"]
/// ```
///
/// ```toml
/// [labels]
/// 0 = "knife"
/// 3 = "gun"
/// ```
#[derive(Deserialize, Debug)]
struct LabelFile {
  names: Option<Vec<String>>,
  labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
  names: BTreeMap<u32, String>,
}

impl LabelTable {
  pub fn coco() -> Self {
    COCO_CLASSES.iter().copied().collect()
  }

  pub fn from_toml_str(text: &str) -> Result<Self, LabelError> {
    let file: LabelFile = toml::from_str(text)?;
    let mut names = BTreeMap::new();

    if let Some(list) = file.names {
      names.extend((0u32..).zip(list));
    }
    if let Some(map) = file.labels {
      for (id, name) in map {
        let id = id
          .trim()
          .parse::<u32>()
          .map_err(|_| LabelError::InvalidClassId(id.clone()))?;
        names.insert(id, name);
      }
    }

    if names.is_empty() {
      return Err(LabelError::Empty);
    }
    debug!("标签表共 {} 个类别", names.len());
    Ok(LabelTable { names })
  }

  pub fn from_file(path: &Path) -> Result<Self, LabelError> {
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Self::from_toml_str(&text)
  }

  pub fn get(&self, class_id: u32) -> Option<&str> {
    self.names.get(&class_id).map(String::as_str)
  }

  /// 未登记的类别编号直接显示为数字
  pub fn label(&self, class_id: u32) -> String {
    self
      .get(class_id)
      .map(str::to_string)
      .unwrap_or_else(|| class_id.to_string())
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    LabelTable {
      names: (0u32..).zip(iter.into_iter().map(Into::into)).collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coco_table_maps_known_ids() {
    let table = LabelTable::coco();
    assert_eq!(table.len(), 80);
    assert_eq!(table.label(0), "person");
    assert_eq!(table.label(43), "knife");
  }

  #[test]
  fn unknown_id_falls_back_to_number() {
    let table: LabelTable = ["knife", "gun"].into_iter().collect();
    assert_eq!(table.label(1), "gun");
    assert_eq!(table.label(7), "7");
    assert!(table.get(7).is_none());
  }

  #[test]
  fn parses_names_array() {
    let table = LabelTable::from_toml_str(r#"names = ["knife", "gun", "rifle"]"#).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.label(2), "rifle");
  }

  #[test]
  fn parses_sparse_label_map() {
    let text = r#"
[labels]
0 = "knife"
5 = "gun"
"#;
    let table = LabelTable::from_toml_str(text).unwrap();
    assert_eq!(table.label(0), "knife");
    assert_eq!(table.label(5), "gun");
    assert_eq!(table.label(1), "1");
  }

  #[test]
  fn rejects_bad_ids_and_empty_files() {
    let bad = LabelTable::from_toml_str("[labels]\nfirst = \"knife\"\n");
    assert!(matches!(bad, Err(LabelError::InvalidClassId(_))));

    let empty = LabelTable::from_toml_str("");
    assert!(matches!(empty, Err(LabelError::Empty)));
  }
}
