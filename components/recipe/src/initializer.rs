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

use futures::future::try_join_all;
use snafu::{ensure, ResultExt};
use tracing::{debug, info};

use crate::{
    err::{InvalidDatasetSnafu, Result, StorageSnafu},
    planner::ChunkPlanner,
    target::{ArraySchema, ConsolidatedMetadata, Target},
    writer::ChunkWriter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// The target was already schema-complete, nothing was written.
    Existing,
    Initialized,
}

/// Brings a target to the schema-complete state.
///
/// A target is schema-complete once its consolidated metadata exists. That
/// document is written last, so an initialization cut short anywhere before
/// it leaves a target that is still seen as missing and gets initialized
/// again from scratch. Concurrent initializers write identical documents.
pub struct TargetInitializer<'a> {
    target:  &'a Target,
    planner: &'a ChunkPlanner,
    writer:  ChunkWriter<'a>,
}

impl<'a> TargetInitializer<'a> {
    pub fn new(target: &'a Target, planner: &'a ChunkPlanner, writer: ChunkWriter<'a>) -> Self {
        Self {
            target,
            planner,
            writer,
        }
    }

    pub async fn prepare(&self) -> Result<PrepareOutcome> {
        match self.target.open_existing().await {
            Ok(meta) => {
                debug!("target is schema-complete with arrays {:?}", meta.array_names());
                Ok(PrepareOutcome::Existing)
            }
            Err(e) if e.is_not_found() => {
                info!("target is not initialized, initialize it from chunk 0");
                self.initialize().await?;
                Ok(PrepareOutcome::Initialized)
            }
            Err(e) => Err(e),
        }
    }

    async fn initialize(&self) -> Result<()> {
        let dim = self.planner.sequence_dim();
        let plan = self.planner.plan(0)?;
        // with require_cache the placeholder inputs could never be opened
        // before the first cache_input, which needs a prepared recipe.
        if let Some(cache) = self.writer.inputs().input_cache().filter(|c| c.require_cache()) {
            try_join_all(plan.inputs.iter().map(|key| cache.cache_input(key)))
                .await
                .context(StorageSnafu)?;
            debug!("cached the {} inputs of chunk 0 for the placeholder", plan.inputs.len());
        }
        let placeholder = self.writer.open_chunk(plan).await?;
        ensure!(
            placeholder.variables().any(|(_, var)| var.axis_of(dim).is_some()),
            InvalidDatasetSnafu {
                reason: format!("no variable of chunk 0 has the growth dimension {dim:?}"),
            }
        );

        let mapper = self.target.get_mapper();
        mapper.write_group(&placeholder.attrs).await?;
        let arrays: Vec<_> = placeholder
            .variables()
            .map(|(name, var)| {
                let schema = ArraySchema::from_variable(name, var, dim, self.planner.sequence_chunk_len());
                (schema, var)
            })
            .collect();
        try_join_all(arrays.iter().map(|(schema, _)| mapper.write_array(schema))).await?;

        let total = self.planner.total_items();
        let mut committed = Vec::with_capacity(arrays.len());
        for (schema, var) in &arrays {
            match schema.axis_of(dim) {
                Some(axis) => committed.push(mapper.resize(&schema.name, axis, total).await?),
                None => {
                    mapper.write_variable(schema, var).await?;
                    committed.push(schema.clone());
                }
            }
        }

        // built from what this initializer wrote, so racing initializers
        // commit the same document.
        let meta = ConsolidatedMetadata::build(&placeholder.attrs, &committed)?;
        mapper.write_consolidated(&meta).await?;
        info!("target initialized, {} arrays, {} {} items", committed.len(), total, dim);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use zforge_common::{dsn::new_mem_object_storage, InputKey};
    use zforge_storage::{InputResolver, OperatorSourceOpener};

    use super::*;
    use crate::{codec::ConcatCombiner, JsonDecoder};

    async fn prepare_with(doc: &str) -> (Target, Result<PrepareOutcome>) {
        let source = new_mem_object_storage("/source").unwrap();
        source.write("a.json", doc.as_bytes().to_vec()).await.unwrap();
        let inputs = InputResolver::Direct(Arc::new(OperatorSourceOpener::new(source)));
        let planner = ChunkPlanner::new(vec![InputKey::from("a.json")], "time", 4, 1).unwrap();
        let target = Target::new(new_mem_object_storage("/target").unwrap());
        let writer = ChunkWriter::new(&inputs, &JsonDecoder, &ConcatCombiner, "time");
        let outcome = TargetInitializer::new(&target, &planner, writer).prepare().await;
        (target, outcome)
    }

    #[tokio::test]
    async fn initialize_then_reuse() {
        let doc = r#"{ "variables": {
            "time": { "dims": ["time"], "dtype": "f64", "values": [7] },
            "mask": { "dims": ["x"], "dtype": "u8", "values": [1, 0, 1] }
        } }"#;
        let (target, outcome) = prepare_with(doc).await;
        assert_eq!(outcome.unwrap(), PrepareOutcome::Initialized);

        let meta = target.open_existing().await.unwrap();
        assert_eq!(meta.array("time").unwrap().meta.chunks, vec![4]);
        // static variables are complete right after initialization.
        let mask = target.get_mapper().read_variable("mask").await.unwrap();
        assert_eq!(mask.to_f64(), vec![1.0, 0.0, 1.0]);
        // nothing of the placeholder data is written.
        assert!(!target.operator().is_exist("time/0").await.unwrap());
    }

    #[tokio::test]
    async fn growth_dimension_required() {
        let doc = r#"{ "variables": { "mask": { "dims": ["x"], "dtype": "u8", "values": [1] } } }"#;
        let (target, outcome) = prepare_with(doc).await;
        assert!(matches!(outcome, Err(crate::Error::InvalidDataset { .. })));
        assert!(target.open_existing().await.unwrap_err().is_not_found());
    }
}
