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

pub mod dsn;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub const ZFORGE_LOG_ENV: &str = "ZFORGE_LOG";
pub const DEFAULT_LOG_DIRECTIVE: &str = "info";

// ========zarr v2 layout ===>
pub const ZARR_FORMAT: u8 = 2;
pub const ZGROUP_KEY: &str = ".zgroup";
pub const ZATTRS_KEY: &str = ".zattrs";
pub const ZARRAY_KEY: &str = ".zarray";
pub const ZMETADATA_KEY: &str = ".zmetadata";
pub const ARRAY_DIMENSIONS_ATTR: &str = "_ARRAY_DIMENSIONS";
pub const CHUNK_KEY_SEPARATOR: &str = ".";

// Pipeline bookkeeping lives beside the arrays; zarr readers ignore it.
pub const ZFORGE_META_DIR: &str = ".zforge";

pub fn chunk_marker_path(chunk_key: ChunkKey) -> String {
    format!("{ZFORGE_META_DIR}/chunks/{chunk_key}")
}

/// Index of one unit of write work.
pub type ChunkKey = usize;

/// Identity of one source file in the configured input sequence.
///
/// The key is opaque to the pipeline: it is handed to the source opener as is
/// and only ever compared, hashed and printed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputKey(String);

impl InputKey {
    pub fn new(key: impl Into<String>) -> Self { InputKey(key.into()) }

    pub fn as_str(&self) -> &str { &self.0 }

    /// The last path segment of the key, used to keep cache entries readable.
    pub fn file_name(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.0)
    }
}

impl Display for InputKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

impl AsRef<str> for InputKey {
    fn as_ref(&self) -> &str { &self.0 }
}

impl From<&str> for InputKey {
    fn from(s: &str) -> Self { InputKey(s.to_string()) }
}

impl From<String> for InputKey {
    fn from(s: String) -> Self { InputKey(s) }
}

pub type ObjectStorage = opendal::Operator;
