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

use std::sync::Arc;

use bytes::Bytes;
use snafu::ensure;
use tracing::{debug, warn};
use zforge_common::InputKey;

use crate::{
    cache::CacheStoreRef,
    err::{CacheMissSnafu, Result},
    source::SourceOpenerRef,
};

/// Copies inputs into a [crate::CacheStore] and redirects later opens to the
/// cached copy.
#[derive(Debug, Clone)]
pub struct InputCache {
    opener:        SourceOpenerRef,
    store:         CacheStoreRef,
    /// When set, opening an input that was never cached fails instead of
    /// reading from the source. Deployments use it to bound the number of
    /// concurrent connections to the origin.
    require_cache: bool,
}

impl InputCache {
    pub fn new(opener: SourceOpenerRef, store: CacheStoreRef, require_cache: bool) -> Self {
        Self {
            opener,
            store,
            require_cache,
        }
    }

    pub fn require_cache(&self) -> bool { self.require_cache }

    /// Copy the whole payload of `key` from the source into the cache.
    ///
    /// Caching an input again overwrites the entry with the same content.
    pub async fn cache_input(&self, key: &InputKey) -> Result<()> {
        let payload = self.opener.open_direct(key).await?;
        let len = payload.len();
        self.store.write(key, payload).await?;
        debug!("cache input {} done, {} bytes", key, len);
        Ok(())
    }

    /// Open `key` from the cache, or from the source when the entry is
    /// missing and the policy permits it.
    pub async fn open(&self, key: &InputKey) -> Result<Bytes> {
        if self.store.exists(key).await? {
            return self.store.read(key).await;
        }
        ensure!(!self.require_cache, CacheMissSnafu { key: key.clone() });
        warn!("input {} is not cached, read it from the source, this may be slow", key);
        self.opener.open_direct(key).await
    }
}

/// How a recipe reaches its inputs.
#[derive(Debug, Clone)]
pub enum InputResolver {
    /// Always read from the source, e.g. when both ends are remote stores.
    Direct(SourceOpenerRef),
    Cached(Arc<InputCache>),
}

impl InputResolver {
    pub async fn open(&self, key: &InputKey) -> Result<Bytes> {
        match self {
            InputResolver::Direct(opener) => opener.open_direct(key).await,
            InputResolver::Cached(cache) => cache.open(key).await,
        }
    }

    pub fn input_cache(&self) -> Option<&InputCache> {
        match self {
            InputResolver::Direct(_) => None,
            InputResolver::Cached(cache) => Some(cache),
        }
    }
}

#[cfg(test)]
mod tests {
    use zforge_common::{dsn::new_mem_object_storage, ObjectStorage};

    use super::*;
    use crate::{
        cache::{CacheStore, OperatorCacheStore},
        source::{OperatorSourceOpener, SourceOpener},
    };

    async fn setup(require_cache: bool) -> (ObjectStorage, Arc<OperatorCacheStore>, InputCache) {
        zforge_utils::logger::install_fmt_log();
        let source = new_mem_object_storage("/source").unwrap();
        for i in 0..4 {
            source
                .write(&format!("in/{i}.json"), format!("payload-{i}").into_bytes())
                .await
                .unwrap();
        }
        let store = Arc::new(OperatorCacheStore::new(new_mem_object_storage("/cache").unwrap()));
        let cache = InputCache::new(
            Arc::new(OperatorSourceOpener::new(source.clone())),
            store.clone(),
            require_cache,
        );
        (source, store, cache)
    }

    #[tokio::test]
    async fn cache_round_trip() {
        let (source, store, cache) = setup(true).await;
        let key = InputKey::from("in/1.json");
        cache.cache_input(&key).await.unwrap();
        assert!(store.exists(&key).await.unwrap());

        let direct = OperatorSourceOpener::new(source).open_direct(&key).await.unwrap();
        assert_eq!(cache.open(&key).await.unwrap(), direct);

        // caching again is harmless.
        cache.cache_input(&key).await.unwrap();
        assert_eq!(cache.open(&key).await.unwrap(), direct);
    }

    #[tokio::test]
    async fn serve_from_cache_after_source_changes() {
        let (source, _store, cache) = setup(true).await;
        let key = InputKey::from("in/2.json");
        cache.cache_input(&key).await.unwrap();
        source.delete("in/2.json").await.unwrap();
        assert_eq!(cache.open(&key).await.unwrap().as_ref(), b"payload-2");
    }

    #[tokio::test]
    async fn require_cache_policy() {
        let (_, _, strict) = setup(true).await;
        let err = strict.open(&InputKey::from("in/0.json")).await.unwrap_err();
        assert!(err.is_cache_miss());

        let (_, store, lenient) = setup(false).await;
        let key = InputKey::from("in/0.json");
        assert_eq!(lenient.open(&key).await.unwrap().as_ref(), b"payload-0");
        // the fallback must not populate the cache.
        assert!(!store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn missing_source() {
        let (_, _, cache) = setup(false).await;
        let key = InputKey::from("in/9.json");
        assert!(cache.cache_input(&key).await.unwrap_err().is_source_unavailable());
        assert!(cache.open(&key).await.unwrap_err().is_source_unavailable());
    }

    #[tokio::test]
    async fn cache_concurrently() {
        let (_, _, cache) = setup(true).await;
        let keys: Vec<InputKey> = (0..4).map(|i| InputKey::from(format!("in/{i}.json"))).collect();
        futures::future::try_join_all(keys.iter().map(|k| cache.cache_input(k)))
            .await
            .unwrap();
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(
                cache.open(key).await.unwrap().as_ref(),
                format!("payload-{i}").as_bytes()
            );
        }
    }

    #[tokio::test]
    async fn resolver() {
        let (source, _, cache) = setup(true).await;
        let key = InputKey::from("in/3.json");
        let direct = InputResolver::Direct(Arc::new(OperatorSourceOpener::new(source)));
        assert!(direct.input_cache().is_none());
        assert_eq!(direct.open(&key).await.unwrap().as_ref(), b"payload-3");

        let cached = InputResolver::Cached(Arc::new(cache));
        assert!(cached.open(&key).await.unwrap_err().is_cache_miss());
        cached.input_cache().unwrap().cache_input(&key).await.unwrap();
        assert_eq!(cached.open(&key).await.unwrap().as_ref(), b"payload-3");
    }
}
