// 该文件是 Biaozhu （标注） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use url::Url;

use biaozhu::{
  FromUrl,
  dataset::{ProjectCatalog, ProjectId},
  orchestrator::{DEFAULT_FIRST_IMAGE_ID, DEFAULT_LOCATION, DEFAULT_WORKERS, OrchestratorConfig},
  publish::PublisherWrapper,
};

/// Biaozhu 标注渲染工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 内置项目所在的基础目录（其下为 Datasets/...）
  #[arg(long, value_name = "DIR", default_value = ".")]
  pub base_dir: PathBuf,

  /// 项目映射文件（YAML，`projects:` 下为 编号: 路径）
  #[arg(long, value_name = "FILE")]
  pub projects: Option<PathBuf>,

  /// 追加或覆盖单个项目映射，形如 `004=/data/birds/train`
  #[arg(long = "project", value_name = "ID=PATH", value_parser = parse_project)]
  pub project: Vec<(ProjectId, PathBuf)>,

  /// 结果与统计文档目录
  #[arg(long, value_name = "DIR", default_value = "cache")]
  pub cache_dir: PathBuf,

  /// 渲染图像的发布地址
  /// 支持格式:
  /// - 目录: folder:///srv/www/annotated?base=https://cdn.example.com/annotated/
  /// - 内存: memory:///
  /// 未指定时写入 <cache-dir>/annotated
  #[arg(long, value_name = "URL")]
  pub publish: Option<Url>,

  /// 同时处理的项目数
  #[arg(long, value_name = "COUNT", default_value_t = DEFAULT_WORKERS)]
  pub workers: usize,

  /// 第一张图像的编号
  #[arg(long, value_name = "ID", default_value_t = DEFAULT_FIRST_IMAGE_ID)]
  pub first_image_id: u32,

  /// 结果中记录的地点
  #[arg(long, value_name = "TEXT", default_value = DEFAULT_LOCATION)]
  pub location: String,

  /// 结果中记录的日期 (YYYY-MM-DD)，默认当天
  #[arg(long, value_name = "DATE")]
  pub capture_date: Option<NaiveDate>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 处理项目并等待完成；已有缓存时直接返回
  Process {
    /// 项目编号，如 1 或 001
    project: String,
  },
  /// 查询项目状态
  Status { project: String },
  /// 输出项目结果文档
  Result { project: String },
  /// 输出项目统计文档
  Analytics { project: String },
  /// 清除项目缓存
  Invalidate { project: String },
  /// 列出已知项目
  Projects,
}

fn parse_project(raw: &str) -> Result<(ProjectId, PathBuf), String> {
  let (id, path) = raw
    .split_once('=')
    .ok_or_else(|| format!("期望 ID=PATH, 实际为 {raw:?}"))?;
  let id: ProjectId = id.parse().map_err(|e| format!("{e}"))?;
  if path.is_empty() {
    return Err(format!("项目 {id} 缺少路径"));
  }
  Ok((id, PathBuf::from(path)))
}

impl Args {
  /// 内置映射 < 映射文件 < 命令行
  pub fn catalog(&self) -> Result<ProjectCatalog> {
    let mut catalog = ProjectCatalog::builtin(&self.base_dir);
    if let Some(path) = &self.projects {
      catalog = catalog.merge(ProjectCatalog::from_yaml_file(path)?);
    }
    for (id, root) in &self.project {
      catalog.insert(id.clone(), root.clone());
    }
    Ok(catalog)
  }

  pub fn publisher(&self) -> Result<PublisherWrapper> {
    match &self.publish {
      Some(url) => Ok(PublisherWrapper::from_url(url)?),
      #[cfg(feature = "directory_publish")]
      None => Ok(PublisherWrapper::Directory(
        biaozhu::publish::DirectoryPublisher::new(self.cache_dir.join("annotated"), None),
      )),
      #[cfg(not(feature = "directory_publish"))]
      None => Ok(PublisherWrapper::Memory(
        biaozhu::publish::MemoryPublisher::new(),
      )),
    }
  }

  pub fn orchestrator_config(&self) -> OrchestratorConfig {
    OrchestratorConfig::default()
      .cache_dir(&self.cache_dir)
      .workers(self.workers)
      .first_image_id(self.first_image_id)
      .location(&self.location)
      .capture_date(self.capture_date)
  }
}
