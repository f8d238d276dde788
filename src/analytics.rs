// 该文件是 Biaozhu （标注） 项目的一部分。
// src/analytics.rs - 统计聚合
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

use indexmap::IndexMap;

use crate::document::{
  AnalyticsDocument, AreaEntry, BarEntry, GalleryEntry, LineEntry, PieEntry, ResultDocument,
};

/// 饼图配色，类别多于颜色数时循环使用
pub const PALETTE: [&str; 5] = ["#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6"];
/// 检测结果为预先给定的标注，置信度固定
pub const FIXED_CONFIDENCE: u32 = 95;

#[derive(Debug, Default, Clone, Copy)]
struct ClassStats {
  total: u64,
  images: u64,
}

pub fn palette_color(index: usize) -> &'static str {
  PALETTE[index % PALETTE.len()]
}

/// 把结果文档折叠成仪表盘序列；类别按首次出现的顺序排列
pub fn aggregate(document: &ResultDocument) -> AnalyticsDocument {
  let mut stats: IndexMap<String, ClassStats> = IndexMap::new();
  let mut running: BTreeMap<String, u64> = BTreeMap::new();
  let mut analytics = AnalyticsDocument::default();

  for (i, image) in document.images.iter().enumerate() {
    let count = image.count();

    analytics.gallery.push(GalleryEntry {
      id: image.id,
      url: image.main_image.clone(),
      species: image.categories().to_string(),
      count,
    });

    // 图像中的每个类别都计入该图像的检测总数
    for label in image.labels() {
      let entry = stats.entry(label.to_string()).or_default();
      entry.total += count;
      entry.images += 1;
      *running.entry(label.to_string()).or_default() += count;
    }

    analytics.line_data.push(LineEntry {
      name: format!("Observation {}", i + 1),
      detections: count,
      confidence: FIXED_CONFIDENCE,
    });
    analytics.area_data.push(AreaEntry {
      name: format!("Batch {}", i + 1),
      totals: running.clone(),
    });
  }

  for (idx, (name, s)) in stats.iter().enumerate() {
    analytics.bar_data.push(BarEntry {
      name: name.clone(),
      total: s.total,
      images: s.images,
    });
    analytics.pie_data.push(PieEntry {
      name: name.clone(),
      value: s.total,
      color: palette_color(idx).to_string(),
    });
  }

  analytics
}
