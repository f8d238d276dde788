// 该文件是 Biaozhu （标注） 项目的一部分。
// src/dataset/catalog.rs - 项目路径映射
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
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use super::{DatasetError, ProjectId};

/// 内置的数据集，相对于基础目录
const BUILTIN_PROJECTS: [(&str, &str); 3] = [
  ("001", "counting of animals.v1i.yolov12"),
  ("002", "Mining Vehicles.v1i.yolov12"),
  ("003", "Vehicle Detection.v1i.yolov12"),
];

#[derive(Deserialize)]
struct CatalogFile {
  projects: BTreeMap<String, PathBuf>,
}

/// 项目编号到数据根目录（train 目录）的静态映射，进程生命周期内不变
#[derive(Debug, Clone, Default)]
pub struct ProjectCatalog {
  projects: BTreeMap<ProjectId, PathBuf>,
}

impl ProjectCatalog {
  pub fn new() -> Self {
    Self::default()
  }

  /// `<base>/Datasets/<name>/train`
  pub fn builtin(base_dir: impl AsRef<Path>) -> Self {
    let base = base_dir.as_ref().join("Datasets");
    let projects = BUILTIN_PROJECTS
      .iter()
      .map(|(id, name)| (ProjectId(id.to_string()), base.join(name).join("train")))
      .collect();
    Self { projects }
  }

  pub fn with_project(mut self, id: ProjectId, root: impl Into<PathBuf>) -> Self {
    self.insert(id, root);
    self
  }

  pub fn insert(&mut self, id: ProjectId, root: impl Into<PathBuf>) {
    self.projects.insert(id, root.into());
  }

  /// 解析 YAML 配置，相对路径以配置文件所在目录为基准
  pub fn parse_yaml(content: &str, relative_to: &Path) -> Result<Self, DatasetError> {
    let file: CatalogFile =
      serde_yaml::from_str(content).map_err(|source| DatasetError::CatalogInvalid {
        path: relative_to.to_path_buf(),
        source,
      })?;

    let mut catalog = Self::new();
    for (raw, root) in file.projects {
      let id: ProjectId = raw.parse()?;
      let root = if root.is_relative() {
        relative_to.join(root)
      } else {
        root
      };
      catalog.insert(id, root);
    }
    Ok(catalog)
  }

  pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let catalog = Self::parse_yaml(&content, base)?;
    info!("从 {} 加载 {} 个项目映射", path.display(), catalog.len());
    Ok(catalog)
  }

  /// 后者覆盖前者的同名项目
  pub fn merge(mut self, other: ProjectCatalog) -> Self {
    self.projects.extend(other.projects);
    self
  }

  pub fn lookup(&self, id: &ProjectId) -> Result<&Path, DatasetError> {
    self
      .projects
      .get(id)
      .map(PathBuf::as_path)
      .ok_or_else(|| DatasetError::ProjectNotFound(id.clone()))
  }

  pub fn iter(&self) -> impl Iterator<Item = (&ProjectId, &Path)> {
    self.projects.iter().map(|(id, p)| (id, p.as_path()))
  }

  pub fn len(&self) -> usize {
    self.projects.len()
  }

  pub fn is_empty(&self) -> bool {
    self.projects.is_empty()
  }
}
