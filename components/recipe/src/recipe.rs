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

use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};

use async_trait::async_trait;
use crossbeam::atomic::AtomicCell;
use futures::future::try_join_all;
use snafu::{ensure, ResultExt};
use tracing::{debug, info, instrument};
use zforge_common::{ChunkKey, InputKey, ObjectStorage};
use zforge_storage::{InputCache, InputResolver, SourceOpenerRef};

use crate::{
    codec::{Combine, ConcatCombiner, Decode, JsonDecoder},
    err::{
        IncompleteWriteSnafu, InvalidConfigSnafu, InvalidStateSnafu, NotSupportedSnafu, Result,
        StorageSnafu, TargetSizeMismatchSnafu,
    },
    initializer::{PrepareOutcome, TargetInitializer},
    planner::ChunkPlanner,
    target::Target,
    writer::ChunkWriter,
};

/// Lifecycle of a recipe. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecipeStage {
    Uninitialized,
    Prepared,
    Caching,
    Writing,
    Finalized,
}

impl Display for RecipeStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecipeStage::Uninitialized => "uninitialized",
            RecipeStage::Prepared => "prepared",
            RecipeStage::Caching => "caching",
            RecipeStage::Writing => "writing",
            RecipeStage::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// A dataset build an external scheduler drives:
///
/// 1. [DatasetRecipe::prepare] once, from any worker.
/// 2. [DatasetRecipe::cache_input] for every key of
///    [DatasetRecipe::iter_inputs], in any order and concurrently.
/// 3. [DatasetRecipe::store_chunk] for every key of
///    [DatasetRecipe::iter_chunks], in any order and concurrently.
/// 4. [DatasetRecipe::finalize] once.
///
/// Every step is idempotent and safe to retry after a failure.
#[async_trait]
pub trait DatasetRecipe: Send + Sync {
    fn stage(&self) -> RecipeStage;

    async fn prepare(&self) -> Result<()>;

    /// Inputs to cache before writing, empty for recipes without a cache.
    fn iter_inputs(&self) -> Box<dyn Iterator<Item = InputKey> + Send + '_> {
        Box::new(std::iter::empty())
    }

    async fn cache_input(&self, key: &InputKey) -> Result<()> {
        NotSupportedSnafu {
            operation: format!("cache_input({key})"),
        }
        .fail()
    }

    fn iter_chunks(&self) -> Result<Box<dyn Iterator<Item = ChunkKey> + Send + '_>>;

    async fn store_chunk(&self, chunk_key: ChunkKey) -> Result<()>;

    async fn finalize(&self) -> Result<()>;
}

/// Builds one dataset out of an ordered sequence of input files, each
/// contributing `items_per_input` items along the growth dimension.
#[derive(Debug)]
pub struct FileSequenceRecipe {
    target:   Target,
    planner:  ChunkPlanner,
    inputs:   InputResolver,
    decoder:  Arc<dyn Decode>,
    combiner: Arc<dyn Combine>,
    stage:    AtomicCell<RecipeStage>,
}

impl FileSequenceRecipe {
    pub fn planner(&self) -> &ChunkPlanner { &self.planner }

    pub fn target(&self) -> &Target { &self.target }

    pub fn input_resolver(&self) -> &InputResolver { &self.inputs }

    fn writer(&self) -> ChunkWriter<'_> {
        ChunkWriter::new(
            &self.inputs,
            self.decoder.as_ref(),
            self.combiner.as_ref(),
            self.planner.sequence_dim(),
        )
    }

    fn ensure_stage(&self, operation: &str, allowed: &[RecipeStage]) -> Result<()> {
        let stage = self.stage.load();
        ensure!(
            allowed.contains(&stage),
            InvalidStateSnafu {
                operation,
                state: stage.to_string(),
            }
        );
        Ok(())
    }

    // concurrent callers race to the furthest stage.
    fn advance(&self, to: RecipeStage) {
        if let Ok(from) = self.stage.fetch_update(|cur| (cur < to).then_some(to)) {
            debug!("recipe stage {} -> {}", from, to);
        }
    }
}

#[async_trait]
impl DatasetRecipe for FileSequenceRecipe {
    fn stage(&self) -> RecipeStage { self.stage.load() }

    #[instrument(skip(self))]
    async fn prepare(&self) -> Result<()> {
        let outcome = TargetInitializer::new(&self.target, &self.planner, self.writer())
            .prepare()
            .await?;
        if outcome == PrepareOutcome::Initialized {
            info!(
                "prepared target for {} inputs in {} chunks",
                self.planner.inputs().len(),
                self.planner.num_chunks()
            );
        }
        self.advance(RecipeStage::Prepared);
        Ok(())
    }

    fn iter_inputs(&self) -> Box<dyn Iterator<Item = InputKey> + Send + '_> {
        match self.inputs.input_cache() {
            Some(_) => Box::new(self.planner.inputs().iter().cloned()),
            None => Box::new(std::iter::empty()),
        }
    }

    #[instrument(skip(self))]
    async fn cache_input(&self, key: &InputKey) -> Result<()> {
        let Some(cache) = self.inputs.input_cache() else {
            return NotSupportedSnafu {
                operation: format!("cache_input({key}) without an input cache"),
            }
            .fail();
        };
        self.ensure_stage("cache_input", &[RecipeStage::Prepared, RecipeStage::Caching])?;
        self.advance(RecipeStage::Caching);
        cache.cache_input(key).await.context(StorageSnafu)
    }

    fn iter_chunks(&self) -> Result<Box<dyn Iterator<Item = ChunkKey> + Send + '_>> {
        self.ensure_stage("iter_chunks", &[
            RecipeStage::Prepared,
            RecipeStage::Caching,
            RecipeStage::Writing,
        ])?;
        Ok(Box::new(self.planner.all_chunk_keys()))
    }

    #[instrument(skip(self))]
    async fn store_chunk(&self, chunk_key: ChunkKey) -> Result<()> {
        self.ensure_stage("store_chunk", &[
            RecipeStage::Prepared,
            RecipeStage::Caching,
            RecipeStage::Writing,
        ])?;
        let plan = self.planner.plan(chunk_key)?;
        self.writer().store_chunk(&self.target, plan).await?;
        self.advance(RecipeStage::Writing);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn finalize(&self) -> Result<()> {
        self.ensure_stage("finalize", &[
            RecipeStage::Prepared,
            RecipeStage::Caching,
            RecipeStage::Writing,
            RecipeStage::Finalized,
        ])?;
        let dim = self.planner.sequence_dim();
        let expected = self.planner.total_items();
        let mapper = self.target.get_mapper();
        let names = self.target.open_existing().await?.array_names();

        let arrays = try_join_all(names.iter().map(|name| mapper.read_array(name))).await?;
        for schema in &arrays {
            if let Some(axis) = schema.axis_of(dim) {
                let actual = schema.meta.shape[axis];
                ensure!(
                    actual == expected,
                    TargetSizeMismatchSnafu {
                        var: &schema.name,
                        expected,
                        actual,
                    }
                );
            }
        }

        let missing = self.target.missing_chunks(self.planner.all_chunk_keys()).await?;
        ensure!(missing.is_empty(), IncompleteWriteSnafu { missing });

        mapper.consolidate(&names).await?;
        self.advance(RecipeStage::Finalized);
        info!("recipe finalized, {} {} items in {} arrays", expected, dim, names.len());
        Ok(())
    }
}

/// Assembles a [FileSequenceRecipe]. Inputs are decoded with [JsonDecoder]
/// and joined with [ConcatCombiner] unless configured otherwise.
#[derive(Debug)]
pub struct RecipeBuilder {
    inputs:           Vec<InputKey>,
    sequence_dim:     String,
    inputs_per_chunk: usize,
    items_per_input:  usize,
    target:           Option<ObjectStorage>,
    resolver:         Option<InputResolver>,
    decoder:          Arc<dyn Decode>,
    combiner:         Arc<dyn Combine>,
}

impl RecipeBuilder {
    pub fn new(inputs: Vec<InputKey>, sequence_dim: impl Into<String>) -> Self {
        Self {
            inputs,
            sequence_dim: sequence_dim.into(),
            inputs_per_chunk: 1,
            items_per_input: 1,
            target: None,
            resolver: None,
            decoder: Arc::new(JsonDecoder),
            combiner: Arc::new(ConcatCombiner),
        }
    }

    pub fn inputs_per_chunk(mut self, n: usize) -> Self {
        self.inputs_per_chunk = n;
        self
    }

    pub fn items_per_input(mut self, n: usize) -> Self {
        self.items_per_input = n;
        self
    }

    pub fn target(mut self, operator: ObjectStorage) -> Self {
        self.target = Some(operator);
        self
    }

    /// Read inputs straight from `opener`.
    pub fn source(mut self, opener: SourceOpenerRef) -> Self {
        self.resolver = Some(InputResolver::Direct(opener));
        self
    }

    /// Read inputs through `cache`.
    pub fn input_cache(mut self, cache: InputCache) -> Self {
        self.resolver = Some(InputResolver::Cached(Arc::new(cache)));
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn Decode>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn combiner(mut self, combiner: Arc<dyn Combine>) -> Self {
        self.combiner = combiner;
        self
    }

    pub fn build(self) -> Result<FileSequenceRecipe> {
        ensure!(
            !self.inputs.is_empty(),
            InvalidConfigSnafu {
                reason: "the recipe has no inputs",
            }
        );
        let target = self.target.ok_or_else(|| {
            InvalidConfigSnafu {
                reason: "no target store",
            }
            .build()
        })?;
        let inputs = self.resolver.ok_or_else(|| {
            InvalidConfigSnafu {
                reason: "no input source",
            }
            .build()
        })?;
        let planner = ChunkPlanner::new(
            self.inputs,
            self.sequence_dim,
            self.inputs_per_chunk,
            self.items_per_input,
        )?;
        Ok(FileSequenceRecipe {
            target: Target::new(target),
            planner,
            inputs,
            decoder: self.decoder,
            combiner: self.combiner,
            stage: AtomicCell::new(RecipeStage::Uninitialized),
        })
    }
}
