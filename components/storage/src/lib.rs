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

//! Access to the source files of a recipe.
//!
//! A [SourceOpener] reads an input straight from its origin. An [InputCache]
//! copies inputs into a [CacheStore] once and serves later reads from there,
//! falling back to the origin only when its policy allows it.

pub mod cache;
pub mod err;
pub mod input_cache;
pub mod source;

pub use cache::{CacheStore, CacheStoreRef, OperatorCacheStore};
pub use err::{Error, Result};
pub use input_cache::{InputCache, InputResolver};
pub use source::{OperatorSourceOpener, SourceOpener, SourceOpenerRef};
