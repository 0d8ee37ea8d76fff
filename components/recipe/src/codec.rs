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

//! Turning input payloads into datasets and joining them.

use std::{collections::BTreeMap, fmt::Debug};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use snafu::{ensure, OptionExt, ResultExt};
use zforge_common::InputKey;
use zforge_types::{layout, Attributes, DataType, Dataset, Variable, VariableEncoding};

use crate::err::{DatasetSnafu, DecodeSnafu, InvalidDatasetSnafu, Result};

/// Parses the payload of one input into an in-memory unit.
pub trait Decode: Send + Sync + Debug {
    fn decode(&self, key: &InputKey, payload: Bytes) -> Result<Dataset>;
}

/// Joins the units of one chunk along the growth dimension.
pub trait Combine: Send + Sync + Debug {
    fn combine(&self, dim: &str, units: Vec<Dataset>) -> Result<Dataset>;
}

/// Concatenates units in the order given.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcatCombiner;

impl Combine for ConcatCombiner {
    fn combine(&self, dim: &str, units: Vec<Dataset>) -> Result<Dataset> {
        if units.len() == 1 {
            return Ok(units.into_iter().next().unwrap_or_default());
        }
        Dataset::concat(dim, &units).context(DatasetSnafu)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DatasetDoc {
    #[serde(default)]
    attrs:     Attributes,
    variables: BTreeMap<String, VariableDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct VariableDoc {
    dims:     Vec<String>,
    // may be left out for 0-d and 1-d variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shape:    Option<Vec<usize>>,
    dtype:    DataType,
    values:   Vec<Number>,
    #[serde(default)]
    attrs:    Attributes,
    #[serde(default)]
    encoding: VariableEncoding,
}

/// Reads units stored as JSON documents:
///
/// ```json
/// {
///   "attrs": { "title": "sst" },
///   "variables": {
///     "time": { "dims": ["time"], "dtype": "f64", "values": [0] },
///     "sst": { "dims": ["time", "lat"], "shape": [1, 2], "dtype": "f32",
///              "values": [12.5, 13.0], "encoding": { "fill_value": -999 } }
///   }
/// }
/// ```
///
/// Values are listed in C order. Integer variables only take whole numbers
/// their dtype can hold.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl JsonDecoder {
    /// The document [JsonDecoder] decodes back into `ds`.
    pub fn encode(ds: &Dataset) -> Result<Vec<u8>> {
        let mut variables = BTreeMap::new();
        for (name, var) in ds.variables() {
            let dtype = var.dtype();
            let values = var
                .data()
                .chunks_exact(dtype.size())
                .map(|b| dtype.decode_number(b))
                .collect::<Option<Vec<_>>>()
                .context(InvalidDatasetSnafu {
                    reason: format!("variable {name:?} holds values JSON cannot represent"),
                })?;
            let doc = VariableDoc {
                dims:     var.dims().to_vec(),
                shape:    Some(var.shape().to_vec()),
                dtype,
                values,
                attrs:    var.attrs.clone(),
                encoding: var.encoding.clone(),
            };
            variables.insert(name.clone(), doc);
        }
        let doc = DatasetDoc {
            attrs:     ds.attrs.clone(),
            variables,
        };
        serde_json::to_vec(&doc).context(DecodeSnafu {
            key: InputKey::from("<memory>"),
        })
    }
}

impl Decode for JsonDecoder {
    fn decode(&self, key: &InputKey, payload: Bytes) -> Result<Dataset> {
        let doc: DatasetDoc = serde_json::from_slice(&payload).context(DecodeSnafu { key: key.clone() })?;
        ensure!(
            !doc.variables.is_empty(),
            InvalidDatasetSnafu {
                reason: format!("input {key} holds no variables"),
            }
        );
        let mut ds = Dataset::new();
        ds.attrs = doc.attrs;
        for (name, v) in doc.variables {
            let shape = match (v.shape, v.dims.len()) {
                (Some(shape), _) => shape,
                (None, 0) => Vec::new(),
                (None, 1) => vec![v.values.len()],
                (None, _) => {
                    return InvalidDatasetSnafu {
                        reason: format!("variable {name:?} of input {key} needs a shape"),
                    }
                    .fail()
                }
            };
            let expected = layout::byte_len(&shape, 1).context(InvalidDatasetSnafu {
                reason: format!("variable {name:?} of input {key} has an oversized shape {shape:?}"),
            })?;
            ensure!(
                expected == v.values.len(),
                InvalidDatasetSnafu {
                    reason: format!(
                        "variable {name:?} of input {key} has {} values for shape {shape:?}",
                        v.values.len()
                    ),
                }
            );
            let mut data = Vec::with_capacity(expected * v.dtype.size());
            for n in &v.values {
                ensure!(
                    v.dtype.encode_number(n, &mut data),
                    InvalidDatasetSnafu {
                        reason: format!("variable {name:?} of input {key} cannot hold {n} as {}", v.dtype),
                    }
                );
            }
            let var = Variable::new(v.dims, shape, v.dtype, data)
                .context(DatasetSnafu)?
                .with_attrs(v.attrs)
                .with_encoding(v.encoding);
            ds.insert(name, var).context(DatasetSnafu)?;
        }
        Ok(ds)
    }
}
