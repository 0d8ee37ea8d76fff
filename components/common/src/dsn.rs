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

//! Storage locations are configured as DSN strings, `<scheme>://<root>`.
//!
//! Supported schemes:
//! - `memory://<root>`: process local, used by tests and dry runs.
//! - `fs://<path>`: a directory on the local file system.

use snafu::{ResultExt, Snafu};

use crate::ObjectStorage;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("unsupported storage dsn {dsn:?}, expect memory:// or fs://"))]
    UnsupportedDsn { dsn: String },

    #[snafu(display("failed to build operator for {dsn:?}"))]
    BuildOperator { dsn: String, source: opendal::Error },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Build the [ObjectStorage] described by `dsn`.
pub fn open_dsn(dsn: &str) -> Result<ObjectStorage> {
    let (scheme, root) = dsn
        .split_once("://")
        .ok_or_else(|| UnsupportedDsnSnafu { dsn }.build())?;
    match scheme {
        "memory" => new_mem_object_storage(root).context(BuildOperatorSnafu { dsn }),
        "fs" => {
            if root.is_empty() {
                return UnsupportedDsnSnafu { dsn }.fail();
            }
            new_fs_object_storage(root).context(BuildOperatorSnafu { dsn })
        }
        _ => UnsupportedDsnSnafu { dsn }.fail(),
    }
}

pub fn new_mem_object_storage(root: &str) -> opendal::Result<ObjectStorage> {
    let mut builder = opendal::services::Memory::default();
    builder.root(if root.is_empty() { "/" } else { root });
    Ok(opendal::Operator::new(builder)?.finish())
}

/// File system storage rooted at `root`. Writes land in a sibling staging
/// directory first and are renamed into place, so readers only ever see
/// complete objects.
pub fn new_fs_object_storage(root: &str) -> opendal::Result<ObjectStorage> {
    let mut builder = opendal::services::Fs::default();
    builder.root(root);
    let staging = format!("{}.staging", root.trim_end_matches('/'));
    builder.atomic_write_dir(&staging);
    Ok(opendal::Operator::new(builder)?.finish())
}
