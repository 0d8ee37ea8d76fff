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

//! The zarr v2 store a recipe writes into.

mod array;
mod metadata;

use std::ops::Range;

pub use array::{chunk_path, ArrayStore};
use futures::future::try_join_all;
pub use metadata::{ArrayMetadata, ArraySchema, ConsolidatedMetadata};
use snafu::ResultExt;
use tracing::debug;
use zforge_common::{chunk_marker_path, ChunkKey, ObjectStorage};
use zforge_types::Dataset;

use crate::{
    err::{DatasetSnafu, Result, TargetIoSnafu},
    planner::ChunkPlan,
};

#[derive(Debug, Clone)]
pub struct Target {
    operator: ObjectStorage,
}

impl Target {
    pub fn new(operator: ObjectStorage) -> Self { Self { operator } }

    pub fn operator(&self) -> &ObjectStorage { &self.operator }

    /// Region-indexed access to the arrays of the store.
    pub fn get_mapper(&self) -> ArrayStore { ArrayStore::new(self.operator.clone()) }

    /// Open the store as an existing, schema-complete dataset.
    ///
    /// Fails with a not found error ([crate::Error::is_not_found]) until
    /// the consolidated metadata has been committed, which is the last step
    /// of initialization.
    pub async fn open_existing(&self) -> Result<ConsolidatedMetadata> {
        self.get_mapper().read_consolidated().await
    }

    pub async fn mark_chunk_complete(&self, plan: &ChunkPlan) -> Result<()> {
        self.get_mapper()
            .write_json(&chunk_marker_path(plan.chunk_key), plan)
            .await?;
        debug!("chunk {} marked complete", plan.chunk_key);
        Ok(())
    }

    pub async fn is_chunk_complete(&self, chunk_key: ChunkKey) -> Result<bool> {
        let path = chunk_marker_path(chunk_key);
        self.operator.is_exist(&path).await.context(TargetIoSnafu { path })
    }

    /// Keys in `keys` without a completion marker, in order.
    pub async fn missing_chunks(&self, keys: Range<ChunkKey>) -> Result<Vec<ChunkKey>> {
        let done = try_join_all(keys.clone().map(|k| self.is_chunk_complete(k))).await?;
        Ok(keys.zip(done).filter(|(_, done)| !done).map(|(k, _)| k).collect())
    }

    /// Load every array of the store into memory.
    pub async fn read_dataset(&self) -> Result<Dataset> {
        let meta = self.open_existing().await?;
        let mapper = self.get_mapper();
        let mut ds = Dataset::new();
        ds.attrs = meta.group_attrs();
        for name in meta.array_names() {
            let var = mapper.read_variable(&name).await?;
            ds.insert(name, var).context(DatasetSnafu)?;
        }
        Ok(ds)
    }
}

#[cfg(test)]
mod tests {
    use zforge_common::{dsn::new_mem_object_storage, InputKey};
    use zforge_types::Region;

    use super::*;

    #[tokio::test]
    async fn completion_markers() {
        let target = Target::new(new_mem_object_storage("/target").unwrap());
        assert!(target.open_existing().await.unwrap_err().is_not_found());

        let plan = ChunkPlan {
            chunk_key:    2,
            inputs:       vec![InputKey::from("c.json")],
            item_count:   1,
            write_region: Region::new("time", 6..7),
        };
        assert!(!target.is_chunk_complete(2).await.unwrap());
        target.mark_chunk_complete(&plan).await.unwrap();
        target.mark_chunk_complete(&plan).await.unwrap();
        assert!(target.is_chunk_complete(2).await.unwrap());
        assert_eq!(target.missing_chunks(0..4).await.unwrap(), vec![0, 1, 3]);

        let marker: serde_json::Value = target
            .get_mapper()
            .read_json(&chunk_marker_path(2))
            .await
            .unwrap();
        assert_eq!(marker["item_count"], 1);
    }
}
