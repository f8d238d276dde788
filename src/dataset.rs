// 该文件是 Biaozhu （标注） 项目的一部分。
// src/dataset.rs - 数据集加载
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
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::label::ClassNames;

mod catalog;
mod natural;

pub use self::catalog::ProjectCatalog;
pub use self::natural::{natural_cmp, natural_sort};

/// 项目编号的固定宽度，不足时左侧补零
pub const PROJECT_ID_WIDTH: usize = 3;
/// 数据集清单文件名
pub const MANIFEST_FILE: &str = "data.yaml";
pub const IMAGES_DIR: &str = "images";
pub const LABELS_DIR: &str = "labels";
pub const LABEL_EXTENSION: &str = "txt";
/// 支持渲染的图像格式（不区分大小写）
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum DatasetError {
  #[error("无效的项目编号: {0:?}")]
  InvalidProjectId(String),
  #[error("项目编号未映射: {0}")]
  ProjectNotFound(ProjectId),
  #[error("未找到数据集清单 data.yaml: {0}")]
  ManifestMissing(PathBuf),
  #[error("数据集清单格式错误 {path}: {source}")]
  ManifestInvalid {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },
  #[error("项目配置文件错误 {path}: {source}")]
  CatalogInvalid {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },
  #[error("读取 {path} 时发生 I/O 错误: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl DatasetError {
  fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    DatasetError::Io {
      path: path.into(),
      source,
    }
  }
}

/// 规范化后的项目编号，例如 "1" -> "001"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(String);

impl ProjectId {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl FromStr for ProjectId {
  type Err = DatasetError;

  fn from_str(raw: &str) -> Result<Self, Self::Err> {
    let trimmed = raw.trim();
    // 编号会出现在缓存文件名中
    if trimmed.is_empty()
      || !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
      return Err(DatasetError::InvalidProjectId(raw.to_string()));
    }
    Ok(ProjectId(format!(
      "{:0>width$}",
      trimmed,
      width = PROJECT_ID_WIDTH
    )))
  }
}

impl fmt::Display for ProjectId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl AsRef<str> for ProjectId {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestNames {
  List(Vec<String>),
  Indexed(BTreeMap<u32, String>),
}

#[derive(Deserialize)]
struct Manifest {
  names: ManifestNames,
}

/// 索引映射中允许的最大空缺数，超出视为清单错误
const MAX_INDEX_GAPS: usize = 1024;

impl TryFrom<ManifestNames> for ClassNames {
  type Error = String;

  fn try_from(names: ManifestNames) -> Result<Self, Self::Error> {
    match names {
      ManifestNames::List(list) => Ok(ClassNames::new(list)),
      ManifestNames::Indexed(map) => {
        let len = map.keys().next_back().map(|k| *k as usize + 1).unwrap_or(0);
        if len - map.len() > MAX_INDEX_GAPS {
          return Err(format!(
            "类别索引过于稀疏: 最大索引 {}, 仅有 {} 个类别",
            len - 1,
            map.len()
          ));
        }
        let mut list: Vec<String> = (0..len).map(|i| format!("Unknown({i})")).collect();
        for (idx, name) in map {
          list[idx as usize] = name;
        }
        Ok(ClassNames::new(list))
      }
    }
  }
}

/// 解析清单内容中的类别列表
pub fn parse_manifest(path: &Path, content: &str) -> Result<ClassNames, DatasetError> {
  let invalid = |source: serde_yaml::Error| DatasetError::ManifestInvalid {
    path: path.to_path_buf(),
    source,
  };
  let manifest: Manifest = serde_yaml::from_str(content).map_err(invalid)?;
  ClassNames::try_from(manifest.names)
    .map_err(|msg| invalid(<serde_yaml::Error as serde::de::Error>::custom(msg)))
}

/// 图像目录中的一个条目，`position` 为自然排序后的序号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetEntry {
  pub position: usize,
  pub file_name: String,
  pub path: PathBuf,
}

impl DatasetEntry {
  pub fn is_supported_image(&self) -> bool {
    Path::new(&self.file_name)
      .extension()
      .and_then(|ext| ext.to_str())
      .map(|ext| {
        SUPPORTED_EXTENSIONS
          .iter()
          .any(|s| s.eq_ignore_ascii_case(ext))
      })
      .unwrap_or(false)
  }

  pub fn stem(&self) -> &str {
    Path::new(&self.file_name)
      .file_stem()
      .and_then(|s| s.to_str())
      .unwrap_or(&self.file_name)
  }
}

/// 已加载清单的数据集
#[derive(Debug, Clone)]
pub struct Dataset {
  project_id: ProjectId,
  root: PathBuf,
  class_names: ClassNames,
}

impl Dataset {
  /// 清单位于数据根目录的上一级（与 train/valid/test 并列），其次查找根目录本身
  pub fn manifest_candidates(root: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    if let Some(parent) = root.parent()
      && !parent.as_os_str().is_empty()
    {
      candidates.push(parent.join(MANIFEST_FILE));
    }
    candidates.push(root.join(MANIFEST_FILE));
    candidates
  }

  pub async fn open(project_id: ProjectId, root: impl Into<PathBuf>) -> Result<Self, DatasetError> {
    let root = root.into();
    let candidates = Self::manifest_candidates(&root);

    let mut manifest = None;
    for candidate in &candidates {
      match tokio::fs::read_to_string(candidate).await {
        Ok(content) => {
          manifest = Some((candidate.clone(), content));
          break;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
        Err(e) => return Err(DatasetError::io(candidate, e)),
      }
    }

    let Some((path, content)) = manifest else {
      return Err(DatasetError::ManifestMissing(candidates[0].clone()));
    };
    let class_names = parse_manifest(&path, &content)?;
    info!(
      "项目 {} 加载清单 {}: {} 个类别",
      project_id,
      path.display(),
      class_names.len()
    );

    Ok(Dataset {
      project_id,
      root,
      class_names,
    })
  }

  pub fn project_id(&self) -> &ProjectId {
    &self.project_id
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn class_names(&self) -> &ClassNames {
    &self.class_names
  }

  pub fn images_dir(&self) -> PathBuf {
    self.root.join(IMAGES_DIR)
  }

  pub fn labels_dir(&self) -> PathBuf {
    self.root.join(LABELS_DIR)
  }

  pub fn label_path(&self, entry: &DatasetEntry) -> PathBuf {
    self
      .labels_dir()
      .join(format!("{}.{}", entry.stem(), LABEL_EXTENSION))
  }

  /// 按自然排序列出图像目录中的全部文件
  pub async fn entries(&self) -> Result<Vec<DatasetEntry>, DatasetError> {
    let dir = self.images_dir();
    let mut reader = tokio::fs::read_dir(&dir)
      .await
      .map_err(|e| DatasetError::io(&dir, e))?;

    let mut names = Vec::new();
    while let Some(entry) = reader
      .next_entry()
      .await
      .map_err(|e| DatasetError::io(&dir, e))?
    {
      let file_type = entry
        .file_type()
        .await
        .map_err(|e| DatasetError::io(entry.path(), e))?;
      if file_type.is_dir() {
        continue;
      }
      names.push(entry.file_name().to_string_lossy().into_owned());
    }

    natural_sort(&mut names);
    debug!("项目 {} 图像目录共 {} 个文件", self.project_id, names.len());

    Ok(
      names
        .into_iter()
        .enumerate()
        .map(|(position, file_name)| DatasetEntry {
          position,
          path: dir.join(&file_name),
          file_name,
        })
        .collect(),
    )
  }
}
