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

use clap::Args;
use snafu::{ResultExt, Whatever};

use zforge_recipe::{ChunkPlan, ChunkPlanner};

use super::RecipeArgs;

#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub recipe: RecipeArgs,

    #[arg(long, help = "Only print the plan of this chunk")]
    pub chunk: Option<usize>,
}

impl PlanArgs {
    pub fn run(&self) -> Result<(), Whatever> {
        let recipe = self.recipe.recipe()?;
        let planner = recipe.planner();
        let plans = select_plans(planner, self.chunk).with_whatever_context(|e| format!("{e}"))?;
        let out = serde_json::to_string_pretty(&plans).whatever_context("failed to encode plans")?;
        println!("{out}");
        Ok(())
    }
}

fn select_plans(planner: &ChunkPlanner, chunk: Option<usize>) -> zforge_recipe::Result<Vec<&ChunkPlan>> {
    match chunk {
        Some(k) => planner.plan(k).map(|plan| vec![plan]),
        None => planner.all_chunk_keys().map(|k| planner.plan(k)).collect(),
    }
}
