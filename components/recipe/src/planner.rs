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

//! Chunk planning: which inputs a chunk reads and where it writes.
//!
//! Chunk `k` owns inputs `[k * inputs_per_chunk, (k + 1) * inputs_per_chunk)`,
//! the last chunk being clipped to the end of the sequence. Each input holds
//! `items_per_input` items along the growth dimension, so every chunk but the
//! last spans exactly [ChunkPlanner::sequence_chunk_len] items and the region
//! of chunk `k` starts at `k * sequence_chunk_len`, which is the sum of the
//! item counts of all chunks before it.

use std::ops::Range;

use once_cell::sync::OnceCell;
use serde::Serialize;
use snafu::{ensure, OptionExt};
use zforge_common::{ChunkKey, InputKey};
use zforge_types::Region;

use crate::err::{InvalidConfigSnafu, Result, UnknownChunkSnafu};

/// Everything needed to produce and place one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkPlan {
    pub chunk_key:    ChunkKey,
    pub inputs:       Vec<InputKey>,
    pub item_count:   usize,
    pub write_region: Region,
}

#[derive(Debug)]
pub struct ChunkPlanner {
    inputs:           Vec<InputKey>,
    sequence_dim:     String,
    inputs_per_chunk: usize,
    items_per_input:  usize,
    // filled lazily, a slot is never replaced once set.
    plans:            Vec<OnceCell<ChunkPlan>>,
}

impl ChunkPlanner {
    pub fn new(
        inputs: Vec<InputKey>,
        sequence_dim: impl Into<String>,
        inputs_per_chunk: usize,
        items_per_input: usize,
    ) -> Result<ChunkPlanner> {
        ensure!(
            inputs_per_chunk >= 1,
            InvalidConfigSnafu {
                reason: "inputs_per_chunk must be at least 1",
            }
        );
        ensure!(
            items_per_input >= 1,
            InvalidConfigSnafu {
                reason: "items_per_input must be at least 1",
            }
        );
        let sequence_dim = sequence_dim.into();
        ensure!(
            !sequence_dim.is_empty(),
            InvalidConfigSnafu {
                reason: "sequence_dim must not be empty",
            }
        );
        let num_chunks = inputs.len().div_ceil(inputs_per_chunk);
        Ok(ChunkPlanner {
            inputs,
            sequence_dim,
            inputs_per_chunk,
            items_per_input,
            plans: (0..num_chunks).map(|_| OnceCell::new()).collect(),
        })
    }

    pub fn inputs(&self) -> &[InputKey] { &self.inputs }

    pub fn sequence_dim(&self) -> &str { &self.sequence_dim }

    pub fn inputs_per_chunk(&self) -> usize { self.inputs_per_chunk }

    pub fn items_per_input(&self) -> usize { self.items_per_input }

    pub fn num_chunks(&self) -> usize { self.plans.len() }

    /// All chunk keys in write order.
    pub fn all_chunk_keys(&self) -> Range<ChunkKey> { 0..self.num_chunks() }

    /// Length of a full chunk along the growth dimension, which is also the
    /// chunk length of the stored arrays.
    pub fn sequence_chunk_len(&self) -> usize { self.inputs_per_chunk * self.items_per_input }

    /// Final size of the growth dimension.
    pub fn total_items(&self) -> usize { self.inputs.len() * self.items_per_input }

    pub fn inputs_for_chunk(&self, chunk_key: ChunkKey) -> Result<&[InputKey]> {
        Ok(&self.plan(chunk_key)?.inputs)
    }

    pub fn nitems_for_chunk(&self, chunk_key: ChunkKey) -> Result<usize> {
        Ok(self.plan(chunk_key)?.item_count)
    }

    pub fn region_for_chunk(&self, chunk_key: ChunkKey) -> Result<&Region> {
        Ok(&self.plan(chunk_key)?.write_region)
    }

    pub fn plan(&self, chunk_key: ChunkKey) -> Result<&ChunkPlan> {
        let slot = self.plans.get(chunk_key).context(UnknownChunkSnafu {
            key:        chunk_key,
            num_chunks: self.num_chunks(),
        })?;
        Ok(slot.get_or_init(|| self.compute_plan(chunk_key)))
    }

    fn compute_plan(&self, chunk_key: ChunkKey) -> ChunkPlan {
        let first = chunk_key * self.inputs_per_chunk;
        let last = (first + self.inputs_per_chunk).min(self.inputs.len());
        let inputs = self.inputs[first..last].to_vec();
        let item_count = self.items_per_input * inputs.len();
        let start = chunk_key * self.sequence_chunk_len();
        ChunkPlan {
            chunk_key,
            inputs,
            item_count,
            write_region: Region::new(self.sequence_dim.clone(), start..start + item_count),
        }
    }
}
