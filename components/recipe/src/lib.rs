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

//! Builds a chunked zarr dataset out of an ordered sequence of input files.
//!
//! The work is split into independent, idempotent steps (prepare the
//! target, cache each input, store each chunk, finalize) so that an external
//! scheduler can spread them over many workers.

pub mod codec;
pub mod config;
pub mod err;
pub mod initializer;
pub mod planner;
pub mod recipe;
pub mod target;
pub mod writer;

pub use codec::{Combine, ConcatCombiner, Decode, JsonDecoder};
pub use config::RecipeConfig;
pub use err::{Error, Result};
pub use initializer::{PrepareOutcome, TargetInitializer};
pub use planner::{ChunkPlan, ChunkPlanner};
pub use recipe::{DatasetRecipe, FileSequenceRecipe, RecipeBuilder, RecipeStage};
pub use target::{ArrayStore, Target};
pub use writer::ChunkWriter;
