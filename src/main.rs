// 该文件是 Biaozhu （标注） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use args::{Args, Command};
use biaozhu::orchestrator::Orchestrator;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  // 标准输出只留给 JSON 文档
  tracing_subscriber::fmt().with_writer(std::io::stderr).init();

  let args = Args::parse();
  let catalog = args.catalog()?;

  if let Command::Projects = args.command {
    for (id, root) in catalog.iter() {
      println!("{}\t{}", id, root.display());
    }
    return Ok(());
  }

  info!("缓存目录: {}", args.cache_dir.display());
  if let Some(url) = &args.publish {
    info!("发布地址: {}", url);
  }

  let publisher = args.publisher()?;
  let orchestrator = Orchestrator::new(catalog, publisher, args.orchestrator_config())?;

  match &args.command {
    Command::Process { project } => {
      let ticket = orchestrator.request_processing(project).await?;
      info!("{}", ticket.message());
      let id = ticket.project_id.clone();
      print_json(&ticket.response())?;
      ticket.wait().await;

      let status = orchestrator.query_status(&id).await?;
      print_json(&status.report())?;
      if let Some(error) = status.error() {
        anyhow::bail!("项目 {} 处理失败: {}", id, error);
      }
    }
    Command::Status { project } => {
      let id = orchestrator.project_id(project)?;
      print_json(&orchestrator.query_status(&id).await?.report())?;
    }
    Command::Result { project } => {
      let id = orchestrator.project_id(project)?;
      print_json(&orchestrator.query_result(&id).await?)?;
    }
    Command::Analytics { project } => {
      let id = orchestrator.project_id(project)?;
      print_json(&orchestrator.query_analytics(&id).await?)?;
    }
    Command::Invalidate { project } => {
      let id = orchestrator.project_id(project)?;
      if orchestrator.invalidate(&id).await? {
        info!("项目 {} 缓存已清除", id);
      } else {
        info!("项目 {} 没有缓存", id);
      }
    }
    Command::Projects => {}
  }

  Ok(())
}
