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

pub mod lifecycle;
pub mod plan;

use std::path::PathBuf;

use clap::Args;
use snafu::{ResultExt, Whatever};
use zforge_recipe::{FileSequenceRecipe, RecipeConfig};

#[derive(Debug, Clone, Args)]
pub struct RecipeArgs {
    #[arg(
        long,
        short,
        value_name = "FILE",
        help = "Recipe config file, DSNs may be overridden by ZFORGE_SOURCE_DSN, ZFORGE_CACHE_DSN and ZFORGE_TARGET_DSN",
        default_value = "zforge.toml"
    )]
    pub config: PathBuf,
}

impl RecipeArgs {
    pub fn load(&self) -> Result<RecipeConfig, Whatever> {
        RecipeConfig::load(&self.config)
            .with_whatever_context(|e| format!("failed to load {}: {e}", self.config.display()))
    }

    pub fn recipe(&self) -> Result<FileSequenceRecipe, Whatever> {
        self.load()?
            .build_recipe()
            .with_whatever_context(|e| format!("failed to build the recipe: {e}"))
    }
}
