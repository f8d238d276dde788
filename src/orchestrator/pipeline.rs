// 该文件是 Biaozhu （标注） 项目的一部分。
// src/orchestrator/pipeline.rs - 单个项目的渲染流水线
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
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::Shared;
use crate::analytics::aggregate;
use crate::cache::CacheError;
use crate::dataset::{Dataset, DatasetEntry, DatasetError, ProjectId};
use crate::document::{ImageResult, Meta, ResultDocument};
use crate::label::{ClassNames, parse_labels};
use crate::publish::{PublishError, Publisher};
use crate::render::{self, Draw, RenderError};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("数据集错误: {0}")]
  Dataset(#[from] DatasetError),
  #[error("渲染错误: {0}")]
  Render(#[from] RenderError),
  #[error("发布错误: {0}")]
  Publish(#[from] PublishError),
  #[error("缓存错误: {0}")]
  Cache(#[from] CacheError),
  #[error("读取 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("渲染线程错误: {0}")]
  Join(#[from] tokio::task::JoinError),
  #[error("图像编号溢出: 起始编号 {first} 加序号 {position}")]
  ImageIdOverflow { first: u32, position: usize },
}

/// 渲染完成、等待发布的图像
struct Artifact {
  bytes: Vec<u8>,
  count: usize,
  categories: String,
}

/// 逐张渲染并发布，全部成功后写入结果与统计文档
pub(super) async fn run<P: Publisher + 'static>(
  shared: &Shared<P>,
  id: &ProjectId,
  root: &Path,
) -> Result<ResultDocument, PipelineError> {
  let started = Instant::now();
  let dataset = Dataset::open(id.clone(), root).await?;
  let entries = dataset.entries().await?;
  let class_names = Arc::new(dataset.class_names().clone());

  let date = shared
    .config
    .capture_date
    .unwrap_or_else(|| chrono::Local::now().date_naive())
    .format("%Y-%m-%d")
    .to_string();
  let meta = Meta {
    date,
    location: shared.config.location.clone(),
  };

  let mut document = ResultDocument::new(id.as_str());
  for entry in &entries {
    if !entry.is_supported_image() {
      debug!("跳过非图像文件: {}", entry.file_name);
      continue;
    }

    let first = shared.config.first_image_id;
    let image_id = u32::try_from(entry.position)
      .ok()
      .and_then(|position| first.checked_add(position))
      .ok_or(PipelineError::ImageIdOverflow {
        first,
        position: entry.position,
      })?;

    let now = Instant::now();
    let Some(artifact) = render_entry(&shared.draw, &dataset, entry, &class_names).await? else {
      continue;
    };

    let name = format!("{}_{}", id, entry.file_name);
    let url = shared.publisher.publish(&name, artifact.bytes).await?;
    info!(
      "({}) {} 检测 {} 个, 耗时 {:.2?}",
      entry.position,
      entry.file_name,
      artifact.count,
      now.elapsed()
    );

    document.images.push(ImageResult::new(
      image_id,
      url.as_str(),
      id.as_str(),
      artifact.count,
      artifact.categories,
      meta.clone(),
    ));
  }

  // 结果文档是完成标记，最后写入
  let analytics = aggregate(&document);
  shared.cache.save_analytics(id, &analytics).await?;
  if let Err(e) = shared.cache.save(id, &document).await {
    if let Err(cleanup) = shared.cache.invalidate(id).await {
      warn!("项目 {} 清理统计文档失败: {}", id, cleanup);
    }
    return Err(e.into());
  }

  info!(
    "项目 {} 共渲染 {} 张图像, 总耗时 {:.2?}",
    id,
    document.images.len(),
    started.elapsed()
  );
  Ok(document)
}

/// 读取图像与标签并在阻塞线程中绘制；无法解码的图像返回 None
async fn render_entry(
  draw: &Arc<Draw>,
  dataset: &Dataset,
  entry: &DatasetEntry,
  class_names: &Arc<ClassNames>,
) -> Result<Option<Artifact>, PipelineError> {
  let bytes = match tokio::fs::read(&entry.path).await {
    Ok(bytes) => bytes,
    Err(e) => {
      warn!("无法读取图像 {}: {}", entry.path.display(), e);
      return Ok(None);
    }
  };

  let label_path = dataset.label_path(entry);
  let detections = match tokio::fs::read(&label_path).await {
    Ok(content) => parse_labels(&String::from_utf8_lossy(&content)),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      debug!("没有标签文件: {}", label_path.display());
      Vec::new()
    }
    Err(source) => {
      return Err(PipelineError::Io {
        path: label_path,
        source,
      });
    }
  };

  let draw = Arc::clone(draw);
  let class_names = Arc::clone(class_names);
  let format = render::output_format(&entry.file_name);
  let file_name = entry.file_name.clone();

  let artifact = tokio::task::spawn_blocking(move || -> Result<Option<Artifact>, RenderError> {
    let image = match render::decode_image(&bytes) {
      Ok(image) => image,
      Err(e) => {
        warn!("跳过无法解码的图像 {}: {}", file_name, e);
        return Ok(None);
      }
    };
    let rendered = render::render_image(&draw, image, &detections, &class_names);
    let bytes = render::encode_image(&rendered.image, format)?;
    Ok(Some(Artifact {
      bytes,
      count: rendered.count,
      categories: rendered.categories(),
    }))
  })
  .await??;

  Ok(artifact)
}
