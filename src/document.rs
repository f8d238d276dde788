// 该文件是 Biaozhu （标注） 项目的一部分。
// src/document.rs - 结果与统计文档
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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const METRIC_TOTAL_COUNT: &str = "Total Count";
pub const METRIC_CATEGORIES: &str = "Categories";
pub const NO_CATEGORIES: &str = "None";
pub const SECTION_TITLE: &str = "Object Statistics";
pub const PROCESSING_PLACEHOLDER_URL: &str = "https://via.placeholder.com/600x400?text=Processing";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
  pub date: String,
  pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
  pub label: String,
  pub value: String,
}

/// 单张图像的渲染结果记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
  pub id: u32,
  pub main_image: String,
  pub card_title: String,
  pub meta: Meta,
  pub section_title: String,
  pub metrics: Vec<Metric>,
}

impl ImageResult {
  pub fn new(
    id: u32,
    url: impl Into<String>,
    project_id: &str,
    count: usize,
    categories: impl Into<String>,
    meta: Meta,
  ) -> Self {
    ImageResult {
      id,
      main_image: url.into(),
      card_title: format!("Detection: {project_id}"),
      meta,
      section_title: SECTION_TITLE.to_string(),
      metrics: vec![
        Metric {
          label: METRIC_TOTAL_COUNT.to_string(),
          value: count.to_string(),
        },
        Metric {
          label: METRIC_CATEGORIES.to_string(),
          value: categories.into(),
        },
      ],
    }
  }

  fn metric(&self, label: &str) -> Option<&str> {
    // 同名指标以最后一个为准
    self
      .metrics
      .iter()
      .rev()
      .find(|m| m.label == label)
      .map(|m| m.value.as_str())
  }

  /// 无法解析时视为 0
  pub fn count(&self) -> u64 {
    self
      .metric(METRIC_TOTAL_COUNT)
      .and_then(|v| v.trim().parse().ok())
      .unwrap_or(0)
  }

  pub fn categories(&self) -> &str {
    self.metric(METRIC_CATEGORIES).unwrap_or(NO_CATEGORIES)
  }

  /// 由类别字符串还原出的类别列表，"None" 与空串不计
  pub fn labels(&self) -> Vec<&str> {
    self
      .categories()
      .split(',')
      .map(str::trim)
      .filter(|l| !l.is_empty() && *l != NO_CATEGORIES)
      .collect()
  }
}

/// 一个项目完整的渲染输出，也是缓存单元
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultDocument {
  pub project_id: String,
  pub images: Vec<ImageResult>,
}

impl ResultDocument {
  pub fn new(project_id: impl Into<String>) -> Self {
    ResultDocument {
      project_id: project_id.into(),
      images: Vec::new(),
    }
  }
}

/// 处理中返回的占位记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderImage {
  pub id: String,
  pub main_image: String,
  pub card_title: String,
  pub meta: Meta,
  pub section_title: String,
  pub metrics: Vec<Metric>,
}

impl Default for PlaceholderImage {
  fn default() -> Self {
    PlaceholderImage {
      id: String::new(),
      main_image: PROCESSING_PLACEHOLDER_URL.to_string(),
      card_title: "Processing...".to_string(),
      meta: Meta {
        date: String::new(),
        location: String::new(),
      },
      section_title: "Processing".to_string(),
      metrics: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarEntry {
  pub name: String,
  #[serde(rename = "Total")]
  pub total: u64,
  #[serde(rename = "Images")]
  pub images: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieEntry {
  pub name: String,
  pub value: u64,
  pub color: String,
}

/// 累计曲线中的一个点，键为类别名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaEntry {
  pub name: String,
  #[serde(flatten)]
  pub totals: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEntry {
  pub name: String,
  #[serde(rename = "Detections")]
  pub detections: u64,
  #[serde(rename = "Confidence")]
  pub confidence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryEntry {
  pub id: u32,
  pub url: String,
  pub species: String,
  pub count: u64,
}

/// 面向仪表盘的统计视图，完全由 ResultDocument 推导
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsDocument {
  pub bar_data: Vec<BarEntry>,
  pub pie_data: Vec<PieEntry>,
  pub area_data: Vec<AreaEntry>,
  pub line_data: Vec<LineEntry>,
  pub gallery: Vec<GalleryEntry>,
}
