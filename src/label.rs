// 该文件是 Biaozhu （标注） 项目的一部分。
// src/label.rs - 标注行解析
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

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

/// 每行至少需要的字段数：类别、cx、cy、w、h
const LABEL_FIELDS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LabelParseError {
  #[error("字段数量不足: 期望至少 5 个, 实际 {0} 个")]
  TooFewFields(usize),
  #[error("无效的类别索引: {0}")]
  InvalidClass(String),
  #[error("无效的坐标值: {0}")]
  InvalidCoordinate(String),
}

/// 一条标注记录，坐标均为归一化值 (中心点 + 宽高)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  pub class_index: u32,
  pub cx: f32,
  pub cy: f32,
  pub width: f32,
  pub height: f32,
}

fn parse_class_index(token: &str) -> Result<u32, LabelParseError> {
  if let Ok(idx) = token.parse::<u32>() {
    return Ok(idx);
  }
  // 部分导出工具会把类别写成 "3.0"
  match token.parse::<f64>() {
    Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 => {
      Ok(v as u32)
    }
    _ => Err(LabelParseError::InvalidClass(token.to_string())),
  }
}

fn parse_coordinate(token: &str) -> Result<f32, LabelParseError> {
  match token.parse::<f32>() {
    Ok(v) if v.is_finite() => Ok(v),
    _ => Err(LabelParseError::InvalidCoordinate(token.to_string())),
  }
}

impl FromStr for Detection {
  type Err = LabelParseError;

  fn from_str(line: &str) -> Result<Self, Self::Err> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < LABEL_FIELDS {
      return Err(LabelParseError::TooFewFields(fields.len()));
    }

    Ok(Detection {
      class_index: parse_class_index(fields[0])?,
      cx: parse_coordinate(fields[1])?,
      cy: parse_coordinate(fields[2])?,
      width: parse_coordinate(fields[3])?,
      height: parse_coordinate(fields[4])?,
    })
  }
}

/// 解析整个标注文件，格式错误的行直接跳过
pub fn parse_labels(content: &str) -> Vec<Detection> {
  content
    .lines()
    .enumerate()
    .filter_map(|(n, line)| match line.parse::<Detection>() {
      Ok(det) => Some(det),
      Err(e) => {
        if !line.trim().is_empty() {
          debug!("跳过第 {} 行标注: {}", n + 1, e);
        }
        None
      }
    })
    .collect()
}

/// 类别标签，越界的索引不会导致失败
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClassLabel {
  Known(String),
  Unknown(u32),
}

impl fmt::Display for ClassLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ClassLabel::Known(name) => f.write_str(name),
      ClassLabel::Unknown(idx) => write!(f, "Unknown({idx})"),
    }
  }
}

/// 数据集清单中的类别名列表，按索引寻址
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames {
  names: Vec<String>,
}

impl ClassNames {
  pub fn new(names: Vec<String>) -> Self {
    Self { names }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn resolve(&self, class_index: u32) -> ClassLabel {
    match self.names.get(class_index as usize) {
      Some(name) => ClassLabel::Known(name.clone()),
      None => ClassLabel::Unknown(class_index),
    }
  }
}

impl From<Vec<String>> for ClassNames {
  fn from(names: Vec<String>) -> Self {
    Self::new(names)
  }
}
