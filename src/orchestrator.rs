// 该文件是 Biaozhu （标注） 项目的一部分。
// src/orchestrator.rs - 项目任务编排
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
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cache::{CacheError, ResultCache};
use crate::dataset::{DatasetError, ProjectCatalog, ProjectId};
use crate::document::{AnalyticsDocument, ImageResult, PlaceholderImage, ResultDocument};
use crate::job::{JobStatus, JobTable};
use crate::publish::Publisher;
use crate::render::{Draw, RenderError};

mod pipeline;

pub use self::pipeline::PipelineError;

pub const DEFAULT_FIRST_IMAGE_ID: u32 = 101;
pub const DEFAULT_LOCATION: &str = "Analysis Lab";
pub const DEFAULT_WORKERS: usize = 2;

#[derive(Error, Debug)]
pub enum OrchestratorError {
  #[error("无效的项目编号: {0:?}")]
  InvalidProjectId(String),
  #[error("项目编号未映射: {0}")]
  ProjectNotFound(ProjectId),
  #[error("项目 {0} 正在处理中")]
  Busy(ProjectId),
  #[error("渲染器初始化错误: {0}")]
  Render(#[from] RenderError),
  #[error("缓存错误: {0}")]
  Cache(#[from] CacheError),
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
  pub cache_dir: PathBuf,
  pub workers: usize,
  pub first_image_id: u32,
  pub location: String,
  pub capture_date: Option<NaiveDate>,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      cache_dir: PathBuf::from("."),
      workers: DEFAULT_WORKERS,
      first_image_id: DEFAULT_FIRST_IMAGE_ID,
      location: DEFAULT_LOCATION.to_string(),
      capture_date: None,
    }
  }
}

impl OrchestratorConfig {
  pub fn cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
    self.cache_dir = cache_dir.into();
    self
  }

  // 至少保留一个工作槽
  pub fn workers(mut self, workers: usize) -> Self {
    self.workers = workers.max(1);
    self
  }

  pub fn first_image_id(mut self, first_image_id: u32) -> Self {
    self.first_image_id = first_image_id;
    self
  }

  pub fn location(mut self, location: impl Into<String>) -> Self {
    self.location = location.into();
    self
  }

  pub fn capture_date(mut self, capture_date: Option<NaiveDate>) -> Self {
    self.capture_date = capture_date;
    self
  }
}

/// 发起处理请求后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
  /// 已有缓存结果，不再渲染
  Cached,
  /// 已提交后台任务
  Started,
  /// 同一项目已有任务在运行
  InProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartResponse {
  pub message: String,
  pub cached: bool,
}

pub struct ProcessingTicket {
  pub project_id: ProjectId,
  pub outcome: RequestOutcome,
  handle: Option<JoinHandle<()>>,
}

impl ProcessingTicket {
  pub fn cached(&self) -> bool {
    self.outcome == RequestOutcome::Cached
  }

  pub fn message(&self) -> String {
    match self.outcome {
      RequestOutcome::Cached => format!("Project {} already processed", self.project_id),
      RequestOutcome::Started => format!("Processing started for {}", self.project_id),
      RequestOutcome::InProgress => format!("Project {} is already processing", self.project_id),
    }
  }

  pub fn response(&self) -> StartResponse {
    StartResponse {
      message: self.message(),
      cached: self.cached(),
    }
  }

  /// 等待后台任务结束；不等待也不影响任务运行
  pub async fn wait(self) {
    if let Some(handle) = self.handle
      && let Err(e) = handle.await
    {
      error!("项目 {} 后台任务异常退出: {}", self.project_id, e);
    }
  }
}

/// 结果查询的返回形式
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultView {
  Processing {
    project_id: String,
    images: Vec<PlaceholderImage>,
  },
  Ready(ResultDocument),
  Unavailable {
    images: Vec<ImageResult>,
    message: String,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalyticsView {
  Ready(AnalyticsDocument),
  Unavailable { error: String },
}

struct Shared<P> {
  catalog: ProjectCatalog,
  cache: ResultCache,
  publisher: P,
  draw: Arc<Draw>,
  jobs: JobTable,
  workers: Semaphore,
  config: OrchestratorConfig,
}

/// 持有各项目状态，决定跳过、启动或报告运行中
pub struct Orchestrator<P> {
  shared: Arc<Shared<P>>,
}

impl<P> Clone for Orchestrator<P> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<P: Publisher + 'static> Orchestrator<P> {
  pub fn new(
    catalog: ProjectCatalog,
    publisher: P,
    config: OrchestratorConfig,
  ) -> Result<Self, OrchestratorError> {
    Self::with_jobs(catalog, publisher, config, JobTable::new())
  }

  /// 使用外部注入的状态表
  pub fn with_jobs(
    catalog: ProjectCatalog,
    publisher: P,
    config: OrchestratorConfig,
    jobs: JobTable,
  ) -> Result<Self, OrchestratorError> {
    let draw = Arc::new(Draw::new()?);
    info!(
      "编排器就绪: {} 个项目, 缓存目录 {}, 工作槽 {}",
      catalog.len(),
      config.cache_dir.display(),
      config.workers
    );

    Ok(Self {
      shared: Arc::new(Shared {
        catalog,
        cache: ResultCache::new(&config.cache_dir),
        publisher,
        draw,
        jobs,
        workers: Semaphore::new(config.workers.max(1)),
        config,
      }),
    })
  }

  pub fn catalog(&self) -> &ProjectCatalog {
    &self.shared.catalog
  }

  pub fn cache(&self) -> &ResultCache {
    &self.shared.cache
  }

  pub fn jobs(&self) -> &JobTable {
    &self.shared.jobs
  }

  pub fn publisher(&self) -> &P {
    &self.shared.publisher
  }

  pub fn project_id(&self, raw: &str) -> Result<ProjectId, OrchestratorError> {
    raw.parse::<ProjectId>().map_err(|e| match e {
      DatasetError::InvalidProjectId(raw) => OrchestratorError::InvalidProjectId(raw),
      _ => OrchestratorError::InvalidProjectId(raw.to_string()),
    })
  }

  fn resolve(&self, raw: &str) -> Result<(ProjectId, PathBuf), OrchestratorError> {
    let id = self.project_id(raw)?;
    let root = self
      .shared
      .catalog
      .lookup(&id)
      .map_err(|_| OrchestratorError::ProjectNotFound(id.clone()))?
      .to_path_buf();
    Ok((id, root))
  }

  /// 缓存命中直接完成；否则原子地切换到 Running 并提交后台任务
  pub async fn request_processing(&self, raw: &str) -> Result<ProcessingTicket, OrchestratorError> {
    let (id, root) = self.resolve(raw)?;
    let jobs = &self.shared.jobs;

    if self.shared.cache.exists(&id).await? {
      info!("项目 {} 命中缓存，跳过渲染", id);
      jobs.set(
        &id,
        JobStatus::Completed {
          cached: true,
          result: None,
        },
      );
      return Ok(ProcessingTicket {
        project_id: id,
        outcome: RequestOutcome::Cached,
        handle: None,
      });
    }

    if !jobs.try_begin(&id) {
      warn!("项目 {} 已在处理中", id);
      return Ok(ProcessingTicket {
        project_id: id,
        outcome: RequestOutcome::InProgress,
        handle: None,
      });
    }

    info!("项目 {} 开始处理: {}", id, root.display());
    let shared = Arc::clone(&self.shared);
    let job_id = id.clone();
    let handle = tokio::spawn(async move { run_job(shared, job_id, root).await });

    Ok(ProcessingTicket {
      project_id: id,
      outcome: RequestOutcome::Started,
      handle: Some(handle),
    })
  }

  /// 当前进程没有记录时，以磁盘缓存为准
  pub async fn query_status(&self, id: &ProjectId) -> Result<JobStatus, OrchestratorError> {
    Ok(match self.shared.jobs.get(id) {
      JobStatus::Idle if self.shared.cache.exists(id).await? => JobStatus::Completed {
        cached: true,
        result: None,
      },
      status => status,
    })
  }

  pub async fn query_result(&self, id: &ProjectId) -> Result<ResultView, CacheError> {
    let status = self.shared.jobs.get(id);
    match &status {
      JobStatus::Running => {
        return Ok(ResultView::Processing {
          project_id: id.to_string(),
          images: vec![PlaceholderImage::default()],
        });
      }
      JobStatus::Completed {
        result: Some(document),
        ..
      } => return Ok(ResultView::Ready(document.as_ref().clone())),
      _ => {}
    }

    match self.shared.cache.load(id).await {
      Ok(document) => Ok(ResultView::Ready(document)),
      Err(CacheError::Missing(_)) => {
        let message = match status {
          JobStatus::Idle => "No project started yet".to_string(),
          JobStatus::Failed { error } => format!("Processing failed: {error}"),
          _ => "Result not available yet".to_string(),
        };
        Ok(ResultView::Unavailable {
          images: Vec::new(),
          message,
        })
      }
      Err(e) => Err(e),
    }
  }

  /// 只有结果文档已写入时统计文档才有效
  pub async fn query_analytics(&self, id: &ProjectId) -> Result<AnalyticsView, CacheError> {
    let analytics = if self.shared.cache.exists(id).await? {
      self.shared.cache.load_analytics(id).await?
    } else {
      None
    };
    Ok(match analytics {
      Some(analytics) => AnalyticsView::Ready(analytics),
      None => AnalyticsView::Unavailable {
        error: "Analytics not available yet".to_string(),
      },
    })
  }

  /// 清除缓存，使下一次请求重新处理
  pub async fn invalidate(&self, id: &ProjectId) -> Result<bool, OrchestratorError> {
    if self.shared.jobs.get(id).is_running() {
      return Err(OrchestratorError::Busy(id.clone()));
    }
    let existed = self.shared.cache.invalidate(id).await?;
    self.shared.jobs.set(id, JobStatus::Idle);
    Ok(existed)
  }
}

async fn run_job<P: Publisher + 'static>(shared: Arc<Shared<P>>, id: ProjectId, root: PathBuf) {
  let status = match shared.workers.acquire().await {
    Ok(_permit) => {
      // 流水线在独立任务中运行，panic 也会落到 Failed
      let run = {
        let shared = Arc::clone(&shared);
        let id = id.clone();
        tokio::spawn(async move { pipeline::run(&shared, &id, &root).await })
      };
      match run.await {
        Ok(Ok(document)) => {
          info!("项目 {} 处理完成: {} 张图像", id, document.images.len());
          JobStatus::Completed {
            cached: false,
            result: Some(Arc::new(document)),
          }
        }
        Ok(Err(e)) => {
          error!("项目 {} 处理失败: {}", id, e);
          JobStatus::Failed {
            error: e.to_string(),
          }
        }
        Err(e) => {
          error!("项目 {} 处理任务异常终止: {}", id, e);
          JobStatus::Failed {
            error: PipelineError::Join(e).to_string(),
          }
        }
      }
    }
    Err(e) => JobStatus::Failed {
      error: e.to_string(),
    },
  };
  shared.jobs.set(&id, status);
}
