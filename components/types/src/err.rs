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

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{dims} dimension names for a shape of rank {rank}"))]
    RankMismatch {
        dims:     usize,
        rank:     usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("shape {shape:?} of {dtype} elements does not fit in memory"))]
    ShapeOverflow {
        shape:    Vec<usize>,
        dtype:    crate::DataType,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("expect {expected} bytes of data, got {actual}"))]
    DataLength {
        expected: usize,
        actual:   usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "dimension {dim:?} has size {existing} in the dataset but {found} in variable {name:?}"
    ))]
    DimensionConflict {
        dim:      String,
        name:     String,
        existing: usize,
        found:    usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("nothing to concatenate"))]
    EmptyConcat {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("variable {name:?} cannot be combined: {reason}"))]
    Incompatible {
        name:     String,
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
