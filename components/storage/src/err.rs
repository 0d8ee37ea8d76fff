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
use zforge_common::InputKey;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("input {key} is unavailable at the source"))]
    SourceUnavailable {
        key:      InputKey,
        #[snafu(implicit)]
        location: Location,
        source:   opendal::Error,
    },

    #[snafu(display("input {key} can only be opened from cache; call cache_input first"))]
    CacheMiss {
        key:      InputKey,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to read cache entry {path:?} of {key}"))]
    CacheRead {
        key:      InputKey,
        path:     String,
        #[snafu(implicit)]
        location: Location,
        source:   opendal::Error,
    },

    #[snafu(display("failed to write cache entry {path:?} of {key}"))]
    CacheWrite {
        key:      InputKey,
        path:     String,
        #[snafu(implicit)]
        location: Location,
        source:   opendal::Error,
    },
}

impl Error {
    pub fn is_cache_miss(&self) -> bool { matches!(self, Error::CacheMiss { .. }) }

    pub fn is_source_unavailable(&self) -> bool { matches!(self, Error::SourceUnavailable { .. }) }

    /// The input itself does not exist at the source, as opposed to the
    /// source being unreachable.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::SourceUnavailable { source, .. } if source.kind() == opendal::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
