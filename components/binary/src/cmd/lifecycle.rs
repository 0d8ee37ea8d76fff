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

use std::{fmt::Display, future::Future, sync::Arc};

use clap::Args;
use futures::{stream, StreamExt};
use snafu::{ensure_whatever, ResultExt, Whatever};
use tracing::{error, info};
use zforge_recipe::{DatasetRecipe, FileSequenceRecipe};

use super::RecipeArgs;

const DEFAULT_CONCURRENCY: &str = "8";

#[derive(Debug, Clone, Args)]
pub struct CacheArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    #[arg(long, value_name = "KEY", help = "Cache only these inputs, all inputs when omitted")]
    pub input: Vec<String>,

    #[arg(long, help = "Number of inputs cached at the same time", default_value = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    #[arg(long, value_name = "K", help = "Store only these chunks, all chunks when omitted")]
    pub chunk: Vec<usize>,

    #[arg(long, help = "Number of chunks written at the same time", default_value = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    #[arg(long, help = "Number of inputs or chunks processed at the same time", default_value = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,
}

pub fn prepare(args: &RecipeArgs) -> Result<(), Whatever> {
    let recipe = args.recipe()?;
    zforge_utils::runtime::block_on(prepare_recipe(&recipe))
}

pub fn finalize(args: &RecipeArgs) -> Result<(), Whatever> {
    let recipe = args.recipe()?;
    zforge_utils::runtime::block_on(async {
        prepare_recipe(&recipe).await?;
        recipe.finalize().await.with_whatever_context(|e| format!("finalize failed: {e}"))
    })
}

impl CacheArgs {
    pub fn run(&self) -> Result<(), Whatever> {
        let recipe = Arc::new(self.recipe.recipe()?);
        zforge_utils::runtime::block_on(async {
            prepare_recipe(&recipe).await?;
            let keys = if self.input.is_empty() {
                recipe.iter_inputs().collect()
            } else {
                self.input.iter().map(|k| k.as_str().into()).collect()
            };
            cache_inputs(&recipe, keys, self.concurrency).await
        })
    }
}

impl StoreArgs {
    pub fn run(&self) -> Result<(), Whatever> {
        let recipe = Arc::new(self.recipe.recipe()?);
        zforge_utils::runtime::block_on(async {
            prepare_recipe(&recipe).await?;
            let keys = if self.chunk.is_empty() {
                all_chunks(&recipe)?
            } else {
                self.chunk.clone()
            };
            store_chunks(&recipe, keys, self.concurrency).await
        })
    }
}

impl RunArgs {
    pub fn run(&self) -> Result<(), Whatever> {
        let recipe = Arc::new(self.recipe.recipe()?);
        zforge_utils::runtime::block_on(async {
            prepare_recipe(&recipe).await?;
            let inputs = recipe.iter_inputs().collect();
            cache_inputs(&recipe, inputs, self.concurrency).await?;
            store_chunks(&recipe, all_chunks(&recipe)?, self.concurrency).await?;
            recipe.finalize().await.with_whatever_context(|e| format!("finalize failed: {e}"))?;
            info!("recipe done");
            Ok(())
        })
    }
}

async fn prepare_recipe(recipe: &FileSequenceRecipe) -> Result<(), Whatever> {
    recipe.prepare().await.with_whatever_context(|e| format!("prepare failed: {e}"))
}

fn all_chunks(recipe: &FileSequenceRecipe) -> Result<Vec<usize>, Whatever> {
    Ok(recipe
        .iter_chunks()
        .with_whatever_context(|e| format!("{e}"))?
        .collect())
}

async fn cache_inputs(
    recipe: &Arc<FileSequenceRecipe>,
    keys: Vec<zforge_common::InputKey>,
    concurrency: usize,
) -> Result<(), Whatever> {
    info!("cache {} inputs", keys.len());
    dispatch(keys, concurrency, |key| {
        let recipe = recipe.clone();
        async move { recipe.cache_input(&key).await }
    })
    .await
}

async fn store_chunks(
    recipe: &Arc<FileSequenceRecipe>,
    keys: Vec<usize>,
    concurrency: usize,
) -> Result<(), Whatever> {
    info!("store {} chunks", keys.len());
    dispatch(keys, concurrency, |key| {
        let recipe = recipe.clone();
        async move { recipe.store_chunk(key).await }
    })
    .await
}

/// Run `task` for every key on the global runtime, at most `concurrency` at
/// a time. Every key is attempted; failures are logged and counted.
async fn dispatch<K, F, Fut>(keys: Vec<K>, concurrency: usize, task: F) -> Result<(), Whatever>
where
    K: Display,
    F: Fn(K) -> Fut,
    Fut: Future<Output = zforge_recipe::Result<()>> + Send + 'static,
{
    let total = keys.len();
    let mut results = stream::iter(keys)
        .map(|key| {
            let label = key.to_string();
            let handle = zforge_utils::runtime::spawn(task(key));
            async move { (label, handle.await) }
        })
        .buffer_unordered(concurrency.max(1));

    let mut failed = 0;
    while let Some((label, result)) = results.next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("{} failed: {}", label, e);
                failed += 1;
            }
            Err(e) => {
                error!("{} aborted: {}", label, e);
                failed += 1;
            }
        }
    }
    ensure_whatever!(failed == 0, "{failed} of {total} tasks failed");
    Ok(())
}
