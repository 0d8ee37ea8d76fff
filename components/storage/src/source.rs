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
use tracing::debug;
use zforge_common::{InputKey, ObjectStorage};

use crate::err::{Result, SourceUnavailableSnafu};

pub type SourceOpenerRef = Arc<dyn SourceOpener>;

/// Reads inputs straight from where they originate.
#[async_trait]
pub trait SourceOpener: Send + Sync + Debug + 'static {
    /// Read the whole payload of `key`, bypassing any cache.
    async fn open_direct(&self, key: &InputKey) -> Result<Bytes>;
}

/// A [SourceOpener] resolving input keys as paths inside an
/// [ObjectStorage].
#[derive(Debug, Clone)]
pub struct OperatorSourceOpener {
    operator: ObjectStorage,
}

impl OperatorSourceOpener {
    pub fn new(operator: ObjectStorage) -> Self { Self { operator } }
}

#[async_trait]
impl SourceOpener for OperatorSourceOpener {
    async fn open_direct(&self, key: &InputKey) -> Result<Bytes> {
        let buf = self
            .operator
            .read(key.as_str())
            .await
            .context(SourceUnavailableSnafu { key: key.clone() })?;
        debug!("read {} bytes of {} from the source", buf.len(), key);
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use zforge_common::dsn::new_mem_object_storage;

    use super::*;

    #[tokio::test]
    async fn open_direct() {
        let operator = new_mem_object_storage("/source").unwrap();
        operator.write("2020/a.json", b"{}".to_vec()).await.unwrap();
        let opener = OperatorSourceOpener::new(operator);

        let bytes = opener.open_direct(&InputKey::from("2020/a.json")).await.unwrap();
        assert_eq!(bytes.as_ref(), b"{}");

        let err = opener.open_direct(&InputKey::from("2020/b.json")).await.unwrap_err();
        assert!(err.is_source_unavailable());
        assert!(err.is_not_found());
    }
}
