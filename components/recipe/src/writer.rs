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
use snafu::{ensure, OptionExt, ResultExt};
use tracing::{debug, warn};
use zforge_storage::InputResolver;
use zforge_types::Dataset;

use crate::{
    codec::{Combine, Decode},
    err::{RegionWriteSnafu, Result, StorageSnafu},
    planner::ChunkPlan,
    target::Target,
};

/// Produces the unit of one chunk and writes it at the chunk's region.
#[derive(Debug, Clone, Copy)]
pub struct ChunkWriter<'a> {
    inputs:       &'a InputResolver,
    decoder:      &'a dyn Decode,
    combiner:     &'a dyn Combine,
    sequence_dim: &'a str,
}

impl<'a> ChunkWriter<'a> {
    pub fn new(
        inputs: &'a InputResolver,
        decoder: &'a dyn Decode,
        combiner: &'a dyn Combine,
        sequence_dim: &'a str,
    ) -> Self {
        Self {
            inputs,
            decoder,
            combiner,
            sequence_dim,
        }
    }

    pub fn inputs(&self) -> &'a InputResolver { self.inputs }

    /// Open, decode and combine the inputs of `plan` in order. Nothing is
    /// written.
    pub async fn open_chunk(&self, plan: &ChunkPlan) -> Result<Dataset> {
        let payloads = try_join_all(plan.inputs.iter().map(|key| self.inputs.open(key)))
            .await
            .context(StorageSnafu)?;
        let units = plan
            .inputs
            .iter()
            .zip(payloads)
            .map(|(key, payload)| self.decoder.decode(key, payload))
            .collect::<Result<Vec<_>>>()?;
        self.combiner.combine(self.sequence_dim, units)
    }

    /// Write the unit of `plan` at its region and record the chunk as done.
    ///
    /// Arrays are validated against the committed consolidated metadata, so
    /// the target must have been prepared.
    pub async fn store_chunk(&self, target: &Target, plan: &ChunkPlan) -> Result<()> {
        let arrays = target.open_existing().await?.arrays()?;
        let unit = self.open_chunk(plan).await?;

        let size = unit.size_of(self.sequence_dim);
        ensure!(
            size == Some(plan.item_count),
            RegionWriteSnafu {
                var:    self.sequence_dim,
                reason: format!(
                    "chunk {} holds {:?} items along the growth dimension, expect {}",
                    plan.chunk_key, size, plan.item_count
                ),
            }
        );

        let mapper = target.get_mapper();
        let mut writes = Vec::new();
        for (name, schema) in &arrays {
            if schema.axis_of(self.sequence_dim).is_none() {
                continue;
            }
            let var = unit.get(name).context(RegionWriteSnafu {
                var:    name,
                reason: format!("missing from the unit of chunk {}", plan.chunk_key),
            })?;
            writes.push(mapper.write_region(schema, var, &plan.write_region));
        }
        for name in unit.names().filter(|name| !arrays.contains_key(*name)) {
            warn!("variable {} of chunk {} is not in the target, skip it", name, plan.chunk_key);
        }
        let written: usize = try_join_all(writes).await?.into_iter().sum();

        target.mark_chunk_complete(plan).await?;
        debug!(
            "chunk {} stored at {}, {} store chunks written",
            plan.chunk_key, plan.write_region, written
        );
        Ok(())
    }
}
