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

use std::{path::Path, sync::Arc};

use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt};
use tracing::debug;
use zforge_common::{dsn::open_dsn, InputKey};
use zforge_storage::{CacheStoreRef, InputCache, OperatorCacheStore, OperatorSourceOpener, SourceOpenerRef};

use crate::{
    err::{DsnSnafu, EnvSnafu, Error, InvalidConfigSnafu, ParseConfigSnafu, ReadConfigSnafu, Result},
    recipe::{FileSequenceRecipe, RecipeBuilder},
};

pub const ZFORGE_SOURCE_DSN_ENV: &str = "ZFORGE_SOURCE_DSN";
pub const ZFORGE_CACHE_DSN_ENV: &str = "ZFORGE_CACHE_DSN";
pub const ZFORGE_TARGET_DSN_ENV: &str = "ZFORGE_TARGET_DSN";

const PATTERN_PLACEHOLDER: &str = "{n}";

/// The numbers substituted into [RecipeConfig::input_pattern].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputRange {
    pub start: usize,
    /// Exclusive.
    pub end:   usize,
    /// Zero pad the number to this many digits.
    #[serde(default)]
    pub width: usize,
}

/// A recipe as written in a TOML file.
///
/// ```toml
/// input_pattern = "sst/day_{n}.json"
/// input_range = { start = 1, end = 366, width = 3 }
/// sequence_dim = "time"
/// inputs_per_chunk = 10
/// source_dsn = "fs:///data/raw"
/// cache_dsn = "fs:///data/cache"
/// target_dsn = "fs:///data/sst.zarr"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeConfig {
    /// Explicit input keys, in sequence order.
    #[serde(default)]
    pub inputs:        Vec<String>,
    #[serde(default)]
    pub input_pattern: Option<String>,
    #[serde(default)]
    pub input_range:   Option<InputRange>,

    pub sequence_dim:     String,
    #[serde(default = "default_factor")]
    pub inputs_per_chunk: usize,
    #[serde(default = "default_factor")]
    pub items_per_input:  usize,

    /// Fail chunk writes whose inputs were not cached instead of reading
    /// them from the source.
    #[serde(default)]
    pub require_cache: bool,
    pub source_dsn:    String,
    #[serde(default)]
    pub cache_dsn:     Option<String>,
    pub target_dsn:    String,
}

fn default_factor() -> usize { 1 }

impl RecipeConfig {
    pub fn from_toml_str(s: &str) -> Result<RecipeConfig> { toml::from_str(s).context(ParseConfigSnafu) }

    /// Read the TOML file at `path` and apply the environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<RecipeConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(ReadConfigSnafu {
            path: path.display().to_string(),
        })?;
        let mut config = RecipeConfig::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Replace the DSNs with `ZFORGE_*_DSN` variables, read from the process
    /// environment or a `.env` file.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if zforge_utils::env::override_from(ZFORGE_SOURCE_DSN_ENV, &mut self.source_dsn).map_err(env_error)? {
            debug!("source dsn overridden by {}", ZFORGE_SOURCE_DSN_ENV);
        }
        if zforge_utils::env::override_from(ZFORGE_TARGET_DSN_ENV, &mut self.target_dsn).map_err(env_error)? {
            debug!("target dsn overridden by {}", ZFORGE_TARGET_DSN_ENV);
        }
        if let Some(dsn) = zforge_utils::env::var(ZFORGE_CACHE_DSN_ENV).map_err(env_error)? {
            debug!("cache dsn overridden by {}", ZFORGE_CACHE_DSN_ENV);
            self.cache_dsn = Some(dsn);
        }
        Ok(())
    }

    /// The ordered input keys, either listed or expanded from the pattern.
    pub fn input_keys(&self) -> Result<Vec<InputKey>> {
        match (&self.input_pattern, &self.input_range) {
            (None, None) => {
                ensure!(
                    !self.inputs.is_empty(),
                    InvalidConfigSnafu {
                        reason: "neither inputs nor input_pattern is set",
                    }
                );
                Ok(self.inputs.iter().map(|s| InputKey::from(s.as_str())).collect())
            }
            (Some(pattern), Some(range)) => {
                ensure!(
                    self.inputs.is_empty(),
                    InvalidConfigSnafu {
                        reason: "inputs and input_pattern are mutually exclusive",
                    }
                );
                ensure!(
                    pattern.contains(PATTERN_PLACEHOLDER),
                    InvalidConfigSnafu {
                        reason: format!("input_pattern {pattern:?} has no {PATTERN_PLACEHOLDER} placeholder"),
                    }
                );
                ensure!(
                    range.start < range.end,
                    InvalidConfigSnafu {
                        reason: format!("empty input_range {}..{}", range.start, range.end),
                    }
                );
                let width = range.width;
                Ok((range.start..range.end)
                    .map(|n| InputKey::new(pattern.replace(PATTERN_PLACEHOLDER, &format!("{n:0width$}"))))
                    .collect())
            }
            _ => InvalidConfigSnafu {
                reason: "input_pattern and input_range must be set together",
            }
            .fail(),
        }
    }

    /// Open the configured stores and assemble the recipe.
    pub fn build_recipe(&self) -> Result<FileSequenceRecipe> {
        let opener: SourceOpenerRef =
            Arc::new(OperatorSourceOpener::new(open_dsn(&self.source_dsn).context(DsnSnafu)?));
        let builder = RecipeBuilder::new(self.input_keys()?, self.sequence_dim.clone())
            .inputs_per_chunk(self.inputs_per_chunk)
            .items_per_input(self.items_per_input)
            .target(open_dsn(&self.target_dsn).context(DsnSnafu)?);
        let builder = match &self.cache_dsn {
            Some(dsn) => {
                let store: CacheStoreRef = Arc::new(OperatorCacheStore::new(open_dsn(dsn).context(DsnSnafu)?));
                builder.input_cache(InputCache::new(opener, store, self.require_cache))
            }
            None => {
                ensure!(
                    !self.require_cache,
                    InvalidConfigSnafu {
                        reason: "require_cache needs a cache_dsn",
                    }
                );
                builder.source(opener)
            }
        };
        builder.build()
    }
}

fn env_error(e: snafu::Whatever) -> Error {
    EnvSnafu {
        message: e.to_string(),
    }
    .build()
}
