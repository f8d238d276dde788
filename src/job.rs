// 该文件是 Biaozhu （标注） 项目的一部分。
// src/job.rs - 任务状态表
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

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::dataset::ProjectId;
use crate::document::ResultDocument;

/// 单个项目的运行状态，仅保存在内存中
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JobStatus {
  #[default]
  Idle,
  Running,
  Completed {
    cached: bool,
    result: Option<Arc<ResultDocument>>,
  },
  Failed {
    error: String,
  },
}

impl JobStatus {
  pub fn is_running(&self) -> bool {
    matches!(self, JobStatus::Running)
  }

  pub fn is_completed(&self) -> bool {
    matches!(self, JobStatus::Completed { .. })
  }

  pub fn is_cached(&self) -> bool {
    matches!(self, JobStatus::Completed { cached: true, .. })
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      JobStatus::Failed { error } => Some(error),
      _ => None,
    }
  }

  pub fn report(&self) -> StatusReport {
    StatusReport {
      running: self.is_running(),
      completed: self.is_completed(),
      cached: self.is_cached(),
      error: self.error().map(str::to_string),
    }
  }
}

/// 对外轮询时返回的扁平状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
  pub running: bool,
  pub completed: bool,
  pub cached: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// 项目编号到状态的并发映射：轮询并发读，后台任务单写
#[derive(Debug, Clone, Default)]
pub struct JobTable {
  inner: Arc<RwLock<HashMap<ProjectId, JobStatus>>>,
}

impl JobTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: &ProjectId) -> JobStatus {
    self.inner.read().get(id).cloned().unwrap_or_default()
  }

  pub fn set(&self, id: &ProjectId, status: JobStatus) {
    self.inner.write().insert(id.clone(), status);
  }

  /// 原子地切换到 Running；已在运行时返回 false
  pub fn try_begin(&self, id: &ProjectId) -> bool {
    let mut jobs = self.inner.write();
    match jobs.get(id) {
      Some(JobStatus::Running) => false,
      _ => {
        jobs.insert(id.clone(), JobStatus::Running);
        true
      }
    }
  }

  pub fn snapshot(&self) -> Vec<(ProjectId, JobStatus)> {
    let mut all: Vec<_> = self
      .inner
      .read()
      .iter()
      .map(|(id, status)| (id.clone(), status.clone()))
      .collect();
    all.sort_by(|a, b| a.0.cmp(&b.0));
    all
  }
}
