// 该文件是 Biaozhu （标注） 项目的一部分。
// tests/pipeline.rs - 编排与流水线集成测试
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
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use image::{Rgb, RgbImage};
use tempfile::TempDir;
use tokio::sync::Semaphore;
use url::Url;

use biaozhu::dataset::{ProjectCatalog, ProjectId};
use biaozhu::job::JobStatus;
use biaozhu::orchestrator::{
  AnalyticsView, Orchestrator, OrchestratorConfig, OrchestratorError, RequestOutcome, ResultView,
};
use biaozhu::publish::{MemoryPublisher, PublishError, Publisher};

/// 记录调用次数，可选地在发布前等待放行
#[derive(Clone)]
struct TestPublisher {
  inner: MemoryPublisher,
  calls: Arc<AtomicUsize>,
  gate: Option<Arc<Semaphore>>,
  fail: bool,
  panic: bool,
}

impl TestPublisher {
  fn new() -> Self {
    Self {
      inner: MemoryPublisher::new(),
      calls: Arc::new(AtomicUsize::new(0)),
      gate: None,
      fail: false,
      panic: false,
    }
  }

  fn gated(gate: Arc<Semaphore>) -> Self {
    Self {
      gate: Some(gate),
      ..Self::new()
    }
  }

  fn failing() -> Self {
    Self {
      fail: true,
      ..Self::new()
    }
  }

  fn panicking() -> Self {
    Self {
      panic: true,
      ..Self::new()
    }
  }

  fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Publisher for TestPublisher {
  async fn publish(&self, name: &str, bytes: Vec<u8>) -> Result<Url, PublishError> {
    if let Some(gate) = &self.gate {
      let permit = gate
        .acquire()
        .await
        .map_err(|e| PublishError::Rejected(e.to_string()))?;
      permit.forget();
    }
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.panic {
      panic!("publisher crashed on {name}");
    }
    if self.fail {
      return Err(PublishError::Rejected("storage offline".into()));
    }
    self.inner.publish(name, bytes).await
  }
}

struct Fixture {
  dir: TempDir,
  root: PathBuf,
}

impl Fixture {
  /// <tmp>/ds/data.yaml 与 <tmp>/ds/train/{images,labels}
  fn new(manifest: Option<&str>) -> Self {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("ds").join("train");
    std::fs::create_dir_all(root.join("images")).unwrap();
    std::fs::create_dir_all(root.join("labels")).unwrap();
    if let Some(manifest) = manifest {
      std::fs::write(dir.path().join("ds").join("data.yaml"), manifest).unwrap();
    }
    Fixture { dir, root }
  }

  fn image(&self, name: &str) -> &Self {
    let mut image = RgbImage::from_pixel(64, 48, Rgb([20, 40, 60]));
    image.put_pixel(0, 0, Rgb([200, 200, 200]));
    image.save(self.root.join("images").join(name)).unwrap();
    self
  }

  fn raw(&self, name: &str, bytes: &[u8]) -> &Self {
    std::fs::write(self.root.join("images").join(name), bytes).unwrap();
    self
  }

  fn label(&self, stem: &str, content: &str) -> &Self {
    std::fs::write(
      self.root.join("labels").join(format!("{stem}.txt")),
      content,
    )
    .unwrap();
    self
  }

  fn cache_dir(&self) -> PathBuf {
    self.dir.path().join("cache")
  }

  fn config(&self) -> OrchestratorConfig {
    OrchestratorConfig::default()
      .cache_dir(self.cache_dir())
      .capture_date(NaiveDate::from_ymd_opt(2026, 1, 2))
  }

  fn orchestrator<P: Publisher + 'static>(&self, publisher: P) -> Orchestrator<P> {
    self.orchestrator_with(publisher, self.config())
  }

  fn orchestrator_with<P: Publisher + 'static>(
    &self,
    publisher: P,
    config: OrchestratorConfig,
  ) -> Orchestrator<P> {
    let catalog = ProjectCatalog::new().with_project(id("1"), &self.root);
    Orchestrator::new(catalog, publisher, config).unwrap()
  }
}

fn id(raw: &str) -> ProjectId {
  raw.parse().unwrap()
}

const MANIFEST: &str = "train: ../train/images\nnc: 3\nnames: ['cat', 'dog', 'bird']\n";

async fn process<P: Publisher + 'static>(orchestrator: &Orchestrator<P>) -> JobStatus {
  let ticket = orchestrator.request_processing("1").await.unwrap();
  ticket.wait().await;
  orchestrator.query_status(&id("001")).await.unwrap()
}

fn exists(path: &Path) -> bool {
  path.try_exists().unwrap()
}

#[tokio::test]
async fn renders_project_in_natural_order() {
  let fixture = Fixture::new(Some(MANIFEST));
  fixture
    .image("img10.png")
    .image("img1.png")
    .image("img2.png")
    .label("img1", "0 0.5 0.5 0.5 0.5\n1 0.2 0.2 0.1 0.1\n0 0.7 0.7 0.1 0.1\n")
    .label("img10", "7 0.5 0.5 0.2 0.2\n");

  let publisher = TestPublisher::new();
  let orchestrator = fixture.orchestrator(publisher.clone());
  let status = process(&orchestrator).await;
  assert!(status.is_completed() && !status.is_cached());

  let ResultView::Ready(document) = orchestrator.query_result(&id("1")).await.unwrap() else {
    panic!("结果应已就绪");
  };
  assert_eq!(document.project_id, "001");
  let ids: Vec<u32> = document.images.iter().map(|i| i.id).collect();
  assert_eq!(ids, [101, 102, 103]);

  let first = &document.images[0];
  assert_eq!(first.main_image, "memory:///001_img1.png");
  assert_eq!(first.card_title, "Detection: 001");
  assert_eq!(first.meta.date, "2026-01-02");
  assert_eq!(first.meta.location, "Analysis Lab");
  assert_eq!(first.count(), 3);
  assert_eq!(first.categories(), "cat, dog");

  // 缺少标签文件的图像仍然保留，数量为 0
  assert_eq!(document.images[1].count(), 0);
  assert_eq!(document.images[1].categories(), "None");

  // 越界类别不会导致失败
  assert_eq!(document.images[2].categories(), "Unknown(7)");
  assert_eq!(document.images[2].count(), 1);

  assert_eq!(publisher.calls(), 3);
  assert_eq!(
    publisher.inner.names(),
    ["001_img1.png", "001_img10.png", "001_img2.png"]
  );
  let published = publisher.inner.get("001_img1.png").unwrap();
  let decoded = image::load_from_memory(&published).unwrap().to_rgb8();
  assert_eq!(decoded.dimensions(), (64, 48));
  // 框的左上角 (16, 12) 被画成红色
  assert_eq!(decoded.get_pixel(16, 12), &Rgb([255, 0, 0]));

  let cache = orchestrator.cache();
  assert!(exists(&cache.result_path(&id("1"))));
  let AnalyticsView::Ready(analytics) = orchestrator.query_analytics(&id("1")).await.unwrap() else {
    panic!("统计应已就绪");
  };
  assert_eq!(analytics.gallery.len(), 3);
  assert_eq!(analytics.line_data[0].name, "Observation 1");
  let names: Vec<&str> = analytics.bar_data.iter().map(|b| b.name.as_str()).collect();
  assert_eq!(names, ["cat", "dog", "Unknown(7)"]);
  assert_eq!(analytics.bar_data[0].total, 3);
}

#[tokio::test]
async fn cached_project_is_not_rendered_again() {
  let fixture = Fixture::new(Some(MANIFEST));
  fixture.image("a.png").label("a", "0 0.5 0.5 0.2 0.2\n");

  let publisher = TestPublisher::new();
  let orchestrator = fixture.orchestrator(publisher.clone());
  process(&orchestrator).await;
  assert_eq!(publisher.calls(), 1);

  // 新的编排器模拟重启，状态只能从缓存恢复
  let restarted = fixture.orchestrator(publisher.clone());
  assert!(restarted.query_status(&id("1")).await.unwrap().is_cached());
  let ticket = restarted.request_processing("001").await.unwrap();
  assert_eq!(ticket.outcome, RequestOutcome::Cached);
  assert!(ticket.cached());
  assert_eq!(ticket.message(), "Project 001 already processed");
  ticket.wait().await;
  assert_eq!(publisher.calls(), 1);

  let ResultView::Ready(document) = restarted.query_result(&id("1")).await.unwrap() else {
    panic!("缓存结果应可读取");
  };
  assert_eq!(document.images.len(), 1);
}

#[tokio::test]
async fn invalidate_allows_reprocessing() {
  let fixture = Fixture::new(Some(MANIFEST));
  fixture.image("a.png");

  let publisher = TestPublisher::new();
  let orchestrator = fixture.orchestrator(publisher.clone());
  process(&orchestrator).await;
  assert!(orchestrator.invalidate(&id("1")).await.unwrap());
  assert_eq!(orchestrator.query_status(&id("1")).await.unwrap(), JobStatus::Idle);

  let status = process(&orchestrator).await;
  assert!(status.is_completed() && !status.is_cached());
  assert_eq!(publisher.calls(), 2);
}

#[tokio::test]
async fn missing_manifest_fails_without_documents() {
  let fixture = Fixture::new(None);
  fixture.image("a.png");

  let orchestrator = fixture.orchestrator(TestPublisher::new());
  let status = process(&orchestrator).await;
  let error = status.error().unwrap();
  assert!(error.contains("data.yaml"), "{error}");

  let cache = orchestrator.cache();
  assert!(!exists(&cache.result_path(&id("1"))));
  assert!(!exists(&cache.analytics_path(&id("1"))));

  let ResultView::Unavailable { images, message } = orchestrator.query_result(&id("1")).await.unwrap()
  else {
    panic!("失败后不应有结果");
  };
  assert!(images.is_empty());
  assert!(message.starts_with("Processing failed"));
  assert!(matches!(
    orchestrator.query_analytics(&id("1")).await.unwrap(),
    AnalyticsView::Unavailable { .. }
  ));
}

#[tokio::test]
async fn publish_failure_is_fatal() {
  let fixture = Fixture::new(Some(MANIFEST));
  fixture.image("a.png").image("b.png");

  let publisher = TestPublisher::failing();
  let orchestrator = fixture.orchestrator(publisher.clone());
  let status = process(&orchestrator).await;
  assert!(status.error().unwrap().contains("storage offline"));
  assert_eq!(publisher.calls(), 1);
  assert!(!orchestrator.cache().exists(&id("1")).await.unwrap());
}

#[tokio::test]
async fn undecodable_and_foreign_files_keep_their_positions() {
  let fixture = Fixture::new(Some(MANIFEST));
  fixture
    .image("1.png")
    .raw("2.jpg", b"definitely not a jpeg")
    .raw("3.txt", b"notes")
    .image("4.png");

  let publisher = TestPublisher::new();
  let orchestrator = fixture.orchestrator(publisher.clone());
  assert!(process(&orchestrator).await.is_completed());

  let document = orchestrator.cache().load(&id("1")).await.unwrap();
  let ids: Vec<u32> = document.images.iter().map(|i| i.id).collect();
  assert_eq!(ids, [101, 104]);
  assert_eq!(publisher.calls(), 2);
}

#[tokio::test]
async fn second_request_while_running_is_reported() {
  let fixture = Fixture::new(Some(MANIFEST));
  fixture.image("a.png");

  let gate = Arc::new(Semaphore::new(0));
  let orchestrator = fixture.orchestrator(TestPublisher::gated(gate.clone()));

  let first = orchestrator.request_processing("1").await.unwrap();
  assert_eq!(first.outcome, RequestOutcome::Started);
  assert_eq!(first.response().message, "Processing started for 001");

  let second = orchestrator.request_processing("001").await.unwrap();
  assert_eq!(second.outcome, RequestOutcome::InProgress);
  assert!(!second.cached());

  assert!(orchestrator.query_status(&id("1")).await.unwrap().is_running());
  let view = orchestrator.query_result(&id("1")).await.unwrap();
  let value = serde_json::to_value(&view).unwrap();
  assert_eq!(value["project_id"], "001");
  assert_eq!(value["images"][0]["cardTitle"], "Processing...");
  assert!(matches!(
    orchestrator.invalidate(&id("1")).await,
    Err(OrchestratorError::Busy(_))
  ));

  gate.add_permits(1);
  first.wait().await;
  assert!(orchestrator.query_status(&id("1")).await.unwrap().is_completed());
}

#[tokio::test]
async fn unknown_project_is_rejected() {
  let fixture = Fixture::new(Some(MANIFEST));
  let orchestrator = fixture.orchestrator(TestPublisher::new());
  assert!(matches!(
    orchestrator.request_processing("42").await,
    Err(OrchestratorError::ProjectNotFound(id)) if id.as_str() == "042"
  ));
  assert!(matches!(
    orchestrator.request_processing("../etc").await,
    Err(OrchestratorError::InvalidProjectId(_))
  ));

  let ResultView::Unavailable { message, .. } = orchestrator.query_result(&id("9")).await.unwrap()
  else {
    panic!("未启动的项目没有结果");
  };
  assert_eq!(message, "No project started yet");
}

#[tokio::test]
async fn image_id_overflow_fails_the_run() {
  let fixture = Fixture::new(Some(MANIFEST));
  fixture.image("a.png").image("b.png");

  let publisher = TestPublisher::new();
  let config = fixture.config().first_image_id(u32::MAX);
  let orchestrator = fixture.orchestrator_with(publisher.clone(), config);
  let status = process(&orchestrator).await;
  let error = status.error().unwrap();
  assert!(error.contains("4294967295"), "{error}");
  assert!(!orchestrator.cache().exists(&id("1")).await.unwrap());

  // 失败后可以重新提交
  let ticket = orchestrator.request_processing("1").await.unwrap();
  assert_eq!(ticket.outcome, RequestOutcome::Started);
  ticket.wait().await;
}

#[tokio::test]
async fn panicking_run_is_recorded_as_failed() {
  let fixture = Fixture::new(Some(MANIFEST));
  fixture.image("a.png");

  let orchestrator = fixture.orchestrator(TestPublisher::panicking());
  let status = process(&orchestrator).await;
  assert!(!status.is_running());
  assert!(status.error().is_some());
  assert!(orchestrator.invalidate(&id("1")).await.is_ok());

  let ticket = orchestrator.request_processing("1").await.unwrap();
  assert_ne!(ticket.outcome, RequestOutcome::InProgress);
  ticket.wait().await;
}

#[tokio::test]
async fn unreachable_cache_is_reported_before_rendering() {
  let fixture = Fixture::new(Some(MANIFEST));
  fixture.image("a.png");
  let blocker = fixture.dir.path().join("blocker");
  std::fs::write(&blocker, b"file").unwrap();

  let publisher = TestPublisher::new();
  let config = fixture.config().cache_dir(blocker.join("cache"));
  let orchestrator = fixture.orchestrator_with(publisher.clone(), config);

  assert!(matches!(
    orchestrator.request_processing("1").await,
    Err(OrchestratorError::Cache(_))
  ));
  assert!(matches!(
    orchestrator.query_status(&id("1")).await,
    Err(OrchestratorError::Cache(_))
  ));
  assert_eq!(publisher.calls(), 0);
}

#[tokio::test]
async fn analytics_require_a_result_document() {
  let fixture = Fixture::new(Some(MANIFEST));
  let orchestrator = fixture.orchestrator(TestPublisher::new());

  // 只有统计文档而没有结果文档，视为未完成的运行
  let cache = orchestrator.cache();
  cache
    .save_analytics(&id("1"), &Default::default())
    .await
    .unwrap();
  assert!(matches!(
    orchestrator.query_analytics(&id("1")).await.unwrap(),
    AnalyticsView::Unavailable { .. }
  ));
}
