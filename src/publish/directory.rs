// 该文件是 Biaozhu （标注） 项目的一部分。
// src/publish/directory.rs - 发布到本地目录
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
use tracing::{debug, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  publish::{PublishError, Publisher, check_name},
};

/// 把图像写入目录，`base` 给出该目录对外的访问前缀；
/// 例如 `folder:///srv/www/annotated?base=https://cdn.example.com/annotated/`
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
  directory: PathBuf,
  base: Option<Url>,
}

impl FromUrlWithScheme for DirectoryPublisher {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryPublisher {
  type Error = PublishError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(PublishError::SchemeMismatch(format!(
        "期望发布方式 '{}', 实际发布方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    let path = urlencoding::decode(uri.path())
      .map(|p| p.into_owned())
      .unwrap_or_else(|_| uri.path().to_string());

    let base = uri
      .query_pairs()
      .find(|(k, _)| k == "base")
      .map(|(_, v)| {
        let v = if v.ends_with('/') {
          v.into_owned()
        } else {
          format!("{v}/")
        };
        Url::parse(&v)
      })
      .transpose()?;

    Ok(DirectoryPublisher::new(path, base))
  }
}

impl DirectoryPublisher {
  pub fn new(directory: impl Into<PathBuf>, base: Option<Url>) -> Self {
    Self {
      directory: directory.into(),
      base,
    }
  }

  fn public_url(&self, path: &std::path::Path, name: &str) -> Result<Url, PublishError> {
    match &self.base {
      Some(base) => Ok(base.join(&urlencoding::encode(name))?),
      None => Url::from_file_path(path).map_err(|_| PublishError::InvalidName(name.to_string())),
    }
  }
}

#[async_trait]
impl Publisher for DirectoryPublisher {
  async fn publish(&self, name: &str, bytes: Vec<u8>) -> Result<Url, PublishError> {
    check_name(name)?;

    tokio::fs::create_dir_all(&self.directory)
      .await
      .map_err(|source| PublishError::Io {
        path: self.directory.clone(),
        source,
      })?;

    let path = self.directory.join(name);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
      warn!("覆盖已存在的文件: {}", path.display());
    }
    tokio::fs::write(&path, bytes)
      .await
      .map_err(|source| PublishError::Io {
        path: path.clone(),
        source,
      })?;
    debug!("保存图像到文件: {}", path.display());

    self.public_url(&path, name)
  }
}
