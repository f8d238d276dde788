// 该文件是 Biaozhu （标注） 项目的一部分。
// src/publish.rs - 渲染结果发布
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

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
use crate::FromUrlWithScheme;

/// 接收渲染后的图像字节，返回可长期访问的地址
#[async_trait]
pub trait Publisher: Send + Sync {
  async fn publish(&self, name: &str, bytes: Vec<u8>) -> Result<Url, PublishError>;
}

#[cfg(feature = "directory_publish")]
mod directory;
#[cfg(feature = "directory_publish")]
pub use self::directory::DirectoryPublisher;

mod memory;
pub use self::memory::MemoryPublisher;

#[derive(Error, Debug)]
pub enum PublishError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无效的发布地址: {0}")]
  InvalidUrl(#[from] url::ParseError),
  #[error("无效的文件名: {0:?}")]
  InvalidName(String),
  #[error("写入 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("发布被拒绝: {0}")]
  Rejected(String),
}

/// 发布名只能是单个文件名
pub(crate) fn check_name(name: &str) -> Result<(), PublishError> {
  if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
    return Err(PublishError::InvalidName(name.to_string()));
  }
  Ok(())
}

pub enum PublisherWrapper {
  #[cfg(feature = "directory_publish")]
  Directory(DirectoryPublisher),
  Memory(MemoryPublisher),
}

impl FromUrl for PublisherWrapper {
  type Error = PublishError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "directory_publish")]
      DirectoryPublisher::SCHEME => Ok(PublisherWrapper::Directory(
        DirectoryPublisher::from_url(url)?,
      )),
      MemoryPublisher::SCHEME => Ok(PublisherWrapper::Memory(MemoryPublisher::from_url(url)?)),
      other => Err(PublishError::SchemeMismatch(other.to_string())),
    }
  }
}

#[async_trait]
impl Publisher for PublisherWrapper {
  async fn publish(&self, name: &str, bytes: Vec<u8>) -> Result<Url, PublishError> {
    match self {
      #[cfg(feature = "directory_publish")]
      PublisherWrapper::Directory(publisher) => publisher.publish(name, bytes).await,
      PublisherWrapper::Memory(publisher) => publisher.publish(name, bytes).await,
    }
  }
}
