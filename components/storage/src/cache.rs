// Copyright 2024 kisekifs
//
// JuiceFS, Copyright 2020 Juicedata, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use snafu::ResultExt;
use tracing::{debug, warn};
use zforge_common::{InputKey, ObjectStorage};

use crate::err::{CacheReadSnafu, CacheWriteSnafu, Result};

pub type CacheStoreRef = Arc<dyn CacheStore>;

/// A key/value byte store holding local copies of inputs.
///
/// Entries are replaced wholesale: a reader sees either the previous payload
/// or the new one, never a mix or a prefix.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug + 'static {
    async fn exists(&self, key: &InputKey) -> Result<bool>;

    async fn read(&self, key: &InputKey) -> Result<Bytes>;

    async fn write(&self, key: &InputKey, payload: Bytes) -> Result<()>;
}

/// Where the entry of `key` lives inside the cache.
///
/// Input keys may be urls or nested paths, so the entry name is a crc32 of
/// the full key followed by the sanitized file name.
pub fn cache_path(key: &InputKey) -> String {
    let name: String = key
        .file_name()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let name = if name.is_empty() { "input".to_string() } else { name };
    format!("{:08x}-{}", crc32fast::hash(key.as_str().as_bytes()), name)
}

/// A [CacheStore] on top of an [ObjectStorage], usually a local directory.
#[derive(Debug, Clone)]
pub struct OperatorCacheStore {
    operator: ObjectStorage,
}

impl OperatorCacheStore {
    pub fn new(operator: ObjectStorage) -> Self { Self { operator } }
}

#[async_trait]
impl CacheStore for OperatorCacheStore {
    async fn exists(&self, key: &InputKey) -> Result<bool> {
        let path = cache_path(key);
        self.operator.is_exist(&path).await.context(CacheReadSnafu {
            key: key.clone(),
            path,
        })
    }

    async fn read(&self, key: &InputKey) -> Result<Bytes> {
        let path = cache_path(key);
        let buf = self.operator.read(&path).await.context(CacheReadSnafu {
            key: key.clone(),
            path,
        })?;
        Ok(Bytes::from(buf))
    }

    async fn write(&self, key: &InputKey, payload: Bytes) -> Result<()> {
        let path = cache_path(key);
        let len = payload.len();
        let mut writer = self.operator.writer(&path).await.context(CacheWriteSnafu {
            key: key.clone(),
            path: path.clone(),
        })?;
        let written: opendal::Result<()> = async {
            writer.write(payload).await?;
            writer.close().await
        }
        .await;
        if written.is_err() {
            // nothing is visible before close, abort drops the staged payload.
            if let Err(e) = writer.abort().await {
                warn!("failed to abort the cache writer of {}: {}", key, e);
            }
        }
        written.context(CacheWriteSnafu {
            key: key.clone(),
            path: path.clone(),
        })?;
        debug!("cached {} bytes of {} at {}", len, key, path);
        Ok(())
    }
}
