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

//! The in-memory model of the datasets flowing through a recipe.

pub mod dataset;
pub mod dtype;
pub mod err;
pub mod layout;
pub mod region;
pub mod variable;

pub use dataset::Dataset;
pub use dtype::DataType;
pub use err::{Error, Result};
pub use region::Region;
pub use variable::{Attributes, Variable, VariableEncoding};
