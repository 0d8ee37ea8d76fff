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

use std::{
    fmt::{Display, Formatter},
    ops::Range,
};

use serde::{Deserialize, Serialize};

/// The half-open interval `[start, end)` a chunk owns along the growth
/// dimension `dim`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub dim:   String,
    pub start: usize,
    pub end:   usize,
}

impl Region {
    pub fn new(dim: impl Into<String>, range: Range<usize>) -> Region {
        debug_assert!(range.start <= range.end);
        Region {
            dim:   dim.into(),
            start: range.start,
            end:   range.end,
        }
    }

    pub fn len(&self) -> usize { self.end - self.start }

    pub fn is_empty(&self) -> bool { self.start == self.end }

    pub fn range(&self) -> Range<usize> { self.start..self.end }

    pub fn overlaps(&self, other: &Region) -> bool {
        self.dim == other.dim && self.start < other.end && other.start < self.end
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}..{})", self.dim, self.start, self.end)
    }
}
