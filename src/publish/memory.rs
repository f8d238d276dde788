// 该文件是 Biaozhu （标注） 项目的一部分。
// src/publish/memory.rs - 内存发布（试运行）
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
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  publish::{PublishError, Publisher, check_name},
};

/// 克隆后共享同一份存储
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
  artifacts: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl FromUrlWithScheme for MemoryPublisher {
  const SCHEME: &'static str = "memory";
}

impl FromUrl for MemoryPublisher {
  type Error = PublishError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(PublishError::SchemeMismatch(uri.scheme().to_string()));
    }
    Ok(MemoryPublisher::new())
  }
}

impl MemoryPublisher {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, name: &str) -> Option<Vec<u8>> {
    self.artifacts.lock().get(name).cloned()
  }

  pub fn names(&self) -> Vec<String> {
    self.artifacts.lock().keys().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.artifacts.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.artifacts.lock().is_empty()
  }
}

#[async_trait]
impl Publisher for MemoryPublisher {
  async fn publish(&self, name: &str, bytes: Vec<u8>) -> Result<Url, PublishError> {
    check_name(name)?;
    let url = Url::parse(&format!(
      "{}:///{}",
      Self::SCHEME,
      urlencoding::encode(name)
    ))?;
    self.artifacts.lock().insert(name.to_string(), bytes);
    Ok(url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn clones_share_storage() {
    let publisher = MemoryPublisher::new();
    let view = publisher.clone();
    let url = publisher.publish("001_a b.png", vec![7]).await.unwrap();
    assert_eq!(url.as_str(), "memory:///001_a%20b.png");
    assert_eq!(view.get("001_a b.png"), Some(vec![7]));
    assert_eq!(view.names(), ["001_a b.png"]);
  }
}
