// 该文件是 Biaozhu （标注） 项目的一部分。
// src/cache.rs - 结果缓存
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

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use crate::dataset::ProjectId;
use crate::document::{AnalyticsDocument, ResultDocument};

#[derive(Error, Debug)]
pub enum CacheError {
  #[error("项目 {0} 没有缓存结果")]
  Missing(ProjectId),
  #[error("缓存文件 I/O 错误 {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("缓存文件格式错误 {path}: {source}")]
  Json {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// 以项目编号为键的文件缓存：结果文档存在即表示项目已处理完成
#[derive(Debug, Clone)]
pub struct ResultCache {
  dir: PathBuf,
}

impl ResultCache {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn result_path(&self, id: &ProjectId) -> PathBuf {
    self.dir.join(format!("imageData_{id}.json"))
  }

  pub fn analytics_path(&self, id: &ProjectId) -> PathBuf {
    self.dir.join(format!("analytics_{id}.json"))
  }

  /// 无法判断时返回错误，不当作未命中
  pub async fn exists(&self, id: &ProjectId) -> Result<bool, CacheError> {
    let path = self.result_path(id);
    tokio::fs::try_exists(&path)
      .await
      .map_err(|source| CacheError::Io {
        path: path.clone(),
        source,
      })
  }

  pub async fn load(&self, id: &ProjectId) -> Result<ResultDocument, CacheError> {
    read_json(&self.result_path(id))
      .await?
      .ok_or_else(|| CacheError::Missing(id.clone()))
  }

  pub async fn save(&self, id: &ProjectId, document: &ResultDocument) -> Result<(), CacheError> {
    let path = self.result_path(id);
    write_json(&path, document).await?;
    info!(
      "项目 {} 结果已缓存: {} ({} 张图像)",
      id,
      path.display(),
      document.images.len()
    );
    Ok(())
  }

  pub async fn load_analytics(
    &self,
    id: &ProjectId,
  ) -> Result<Option<AnalyticsDocument>, CacheError> {
    read_json(&self.analytics_path(id)).await
  }

  pub async fn save_analytics(
    &self,
    id: &ProjectId,
    analytics: &AnalyticsDocument,
  ) -> Result<(), CacheError> {
    write_json(&self.analytics_path(id), analytics).await
  }

  /// 删除项目的结果与统计文档，返回是否存在过结果
  pub async fn invalidate(&self, id: &ProjectId) -> Result<bool, CacheError> {
    let existed = remove_if_exists(&self.result_path(id)).await?;
    remove_if_exists(&self.analytics_path(id)).await?;
    if existed {
      info!("项目 {} 缓存已清除", id);
    }
    Ok(existed)
  }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CacheError> {
  let data = match tokio::fs::read(path).await {
    Ok(data) => data,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(CacheError::Io {
        path: path.to_path_buf(),
        source,
      });
    }
  };
  serde_json::from_slice(&data)
    .map(Some)
    .map_err(|source| CacheError::Json {
      path: path.to_path_buf(),
      source,
    })
}

/// 先写临时文件再改名，读者不会看到写了一半的文档
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
  let io_err = |source| CacheError::Io {
    path: path.to_path_buf(),
    source,
  };

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
  }

  let json = serde_json::to_vec_pretty(value).map_err(|source| CacheError::Json {
    path: path.to_path_buf(),
    source,
  })?;

  let tmp = path.with_extension("json.tmp");
  tokio::fs::write(&tmp, json).await.map_err(io_err)?;
  tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
  debug!("写入 {}", path.display());
  Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<bool, CacheError> {
  match tokio::fs::remove_file(path).await {
    Ok(()) => Ok(true),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
    Err(source) => Err(CacheError::Io {
      path: path.to_path_buf(),
      source,
    }),
  }
}
