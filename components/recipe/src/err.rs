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

use snafu::{Location, Snafu};
use zforge_common::{ChunkKey, InputKey};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    // ========Planning ===>
    #[snafu(display("unknown chunk {key}, the recipe has {num_chunks} chunks"))]
    UnknownChunk {
        key:        ChunkKey,
        num_chunks: usize,
        #[snafu(implicit)]
        location:   Location,
    },

    #[snafu(display("region write of {var:?} rejected: {reason}"))]
    RegionWrite {
        var:      String,
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("chunks {missing:?} have not been written"))]
    IncompleteWrite {
        missing:  Vec<ChunkKey>,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("{var:?} has {actual} items along the growth dimension, expect {expected}"))]
    TargetSizeMismatch {
        var:      String,
        expected: usize,
        actual:   usize,
        #[snafu(implicit)]
        location: Location,
    },

    // ========Lifecycle ===>
    #[snafu(display("{operation} is not supported by this recipe"))]
    NotSupported {
        operation: String,
        #[snafu(implicit)]
        location:  Location,
    },

    #[snafu(display("{operation} is not allowed while the recipe is {state}"))]
    InvalidState {
        operation: String,
        state:     String,
        #[snafu(implicit)]
        location:  Location,
    },

    #[snafu(display("invalid recipe config: {reason}"))]
    InvalidConfig {
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    // ========Data ===>
    #[snafu(display("invalid dataset: {reason}"))]
    InvalidDataset {
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to decode input {key}"))]
    Decode {
        key:      InputKey,
        #[snafu(implicit)]
        location: Location,
        source:   serde_json::Error,
    },

    #[snafu(display("dataset error: {source}"))]
    Dataset {
        #[snafu(implicit)]
        location: Location,
        source:   zforge_types::Error,
    },

    #[snafu(display("input error: {source}"))]
    Storage {
        #[snafu(implicit)]
        location: Location,
        source:   zforge_storage::Error,
    },

    // ========Target store ===>
    #[snafu(display("target store operation on {path:?} failed"))]
    TargetIo {
        path:     String,
        #[snafu(implicit)]
        location: Location,
        source:   opendal::Error,
    },

    #[snafu(display("invalid metadata document {path:?}"))]
    InvalidMetadata {
        path:     String,
        #[snafu(implicit)]
        location: Location,
        source:   serde_json::Error,
    },

    #[snafu(display("malformed metadata {path:?}: {reason}"))]
    MalformedMetadata {
        path:     String,
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("chunk object {path:?} holds {actual} bytes, expect {expected}"))]
    CorruptChunk {
        path:     String,
        expected: usize,
        actual:   usize,
        #[snafu(implicit)]
        location: Location,
    },

    // ========Config ===>
    #[snafu(display("failed to read config file {path:?}"))]
    ReadConfig {
        path:     String,
        #[snafu(implicit)]
        location: Location,
        source:   std::io::Error,
    },

    #[snafu(display("failed to parse recipe config"))]
    ParseConfig {
        #[snafu(implicit)]
        location: Location,
        source:   toml::de::Error,
    },

    #[snafu(display("failed to open storage"))]
    Dsn {
        #[snafu(implicit)]
        location: Location,
        source:   zforge_common::dsn::Error,
    },

    #[snafu(display("environment error: {message}"))]
    Env {
        message:  String,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Error {
    /// The target store, or the object at hand, does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::TargetIo { source, .. } if source.kind() == opendal::ErrorKind::NotFound)
    }

    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Error::Storage { source, .. } if source.is_cache_miss())
    }

    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, Error::Storage { source, .. } if source.is_source_unavailable())
    }

    pub fn is_unknown_chunk(&self) -> bool { matches!(self, Error::UnknownChunk { .. }) }

    /// Chunks [Error::IncompleteWrite] reports as missing.
    pub fn missing_chunks(&self) -> Option<&[ChunkKey]> {
        match self {
            Error::IncompleteWrite { missing, .. } => Some(missing),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
