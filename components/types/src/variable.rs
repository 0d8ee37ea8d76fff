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

use std::ops::Range;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt};

use crate::{
    err::{DataLengthSnafu, IncompatibleSnafu, RankMismatchSnafu, Result, ShapeOverflowSnafu},
    layout, DataType,
};

pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Storage hints a source unit carries for one variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableEncoding {
    /// Value written into the padded tail of partial chunks and reported to
    /// readers for chunks never written. Zero when unset.
    #[serde(default)]
    pub fill_value: Option<f64>,
}

/// A named-dimension n-d array held in memory as C order little-endian
/// bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    dims:         Vec<String>,
    shape:        Vec<usize>,
    dtype:        DataType,
    data:         Bytes,
    pub attrs:    Attributes,
    pub encoding: VariableEncoding,
}

impl Variable {
    pub fn new(
        dims: Vec<String>,
        shape: Vec<usize>,
        dtype: DataType,
        data: impl Into<Bytes>,
    ) -> Result<Variable> {
        let data = data.into();
        ensure!(
            dims.len() == shape.len(),
            RankMismatchSnafu {
                dims: dims.len(),
                rank: shape.len(),
            }
        );
        let expected = layout::byte_len(&shape, dtype.size()).context(ShapeOverflowSnafu {
            shape: shape.clone(),
            dtype,
        })?;
        ensure!(
            data.len() == expected,
            DataLengthSnafu {
                expected,
                actual: data.len(),
            }
        );
        Ok(Variable {
            dims,
            shape,
            dtype,
            data,
            attrs: Attributes::new(),
            encoding: VariableEncoding::default(),
        })
    }

    pub fn from_f64(
        dims: Vec<String>,
        shape: Vec<usize>,
        dtype: DataType,
        values: &[f64],
    ) -> Result<Variable> {
        let mut data = Vec::with_capacity(values.len() * dtype.size());
        for v in values {
            dtype.encode_f64(*v, &mut data);
        }
        Variable::new(dims, shape, dtype, data)
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_encoding(mut self, encoding: VariableEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn to_f64(&self) -> Vec<f64> {
        self.data
            .chunks_exact(self.dtype.size())
            .map(|b| self.dtype.decode_f64(b))
            .collect()
    }

    pub fn dims(&self) -> &[String] { &self.dims }

    pub fn shape(&self) -> &[usize] { &self.shape }

    pub fn dtype(&self) -> DataType { self.dtype }

    pub fn data(&self) -> &Bytes { &self.data }

    pub fn num_elements(&self) -> usize { self.shape.iter().product() }

    pub fn axis_of(&self, dim: &str) -> Option<usize> { self.dims.iter().position(|d| d == dim) }

    pub fn len_along(&self, dim: &str) -> Option<usize> { self.axis_of(dim).map(|a| self.shape[a]) }

    pub fn fill_value(&self) -> f64 { self.encoding.fill_value.unwrap_or(0.0) }

    /// The sub-array covering `range` along `axis`.
    pub fn slice_axis(&self, axis: usize, range: Range<usize>) -> Variable {
        let data = layout::slice_along(&self.data, &self.shape, axis, self.dtype.size(), range.clone());
        let mut shape = self.shape.clone();
        shape[axis] = range.len();
        Variable {
            dims: self.dims.clone(),
            shape,
            dtype: self.dtype,
            data: Bytes::from(data),
            attrs: self.attrs.clone(),
            encoding: self.encoding.clone(),
        }
    }

    /// Join `parts` in order along `dim`. Attributes and encoding come from
    /// the first part; every part must agree on dims, dtype and the extent of
    /// all other axes.
    pub fn concat(name: &str, dim: &str, parts: &[&Variable]) -> Result<Variable> {
        let first = parts.first().context(IncompatibleSnafu {
            name,
            reason: "no parts",
        })?;
        let axis = first.axis_of(dim).context(IncompatibleSnafu {
            name,
            reason: format!("dimension {dim:?} not in {:?}", first.dims),
        })?;
        for part in &parts[1..] {
            ensure!(
                part.dims == first.dims,
                IncompatibleSnafu {
                    name,
                    reason: format!("dims {:?} differ from {:?}", part.dims, first.dims),
                }
            );
            ensure!(
                part.dtype == first.dtype,
                IncompatibleSnafu {
                    name,
                    reason: format!("dtype {} differs from {}", part.dtype, first.dtype),
                }
            );
            let same_extent = part
                .shape
                .iter()
                .zip(first.shape.iter())
                .enumerate()
                .all(|(a, (l, r))| a == axis || l == r);
            ensure!(
                same_extent,
                IncompatibleSnafu {
                    name,
                    reason: format!("shape {:?} differs from {:?}", part.shape, first.shape),
                }
            );
        }

        let (outer, inner) = layout::axis_strides(&first.shape, axis, first.dtype.size());
        let pieces: Vec<(&[u8], usize)> =
            parts.iter().map(|p| (p.data.as_ref(), p.shape[axis])).collect();
        let data = layout::concat_along(&pieces, outer, inner);
        let mut shape = first.shape.clone();
        shape[axis] = pieces.iter().map(|(_, len)| len).sum();

        Ok(Variable {
            dims: first.dims.clone(),
            shape,
            dtype: first.dtype,
            data: Bytes::from(data),
            attrs: first.attrs.clone(),
            encoding: first.encoding.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn dims(names: &[&str]) -> Vec<String> { names.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn new_checks_shape() {
        let r = Variable::new(dims(&["time"]), vec![2, 2], DataType::U8, vec![0u8; 4]);
        assert!(matches!(r, Err(Error::RankMismatch { .. })));
        let r = Variable::new(dims(&["time", "x"]), vec![2, 2], DataType::U16, vec![0u8; 4]);
        assert!(matches!(r, Err(Error::DataLength { expected: 8, actual: 4, .. })));
        let r = Variable::new(dims(&["time", "x"]), vec![1 << 32, 1 << 32], DataType::U8, Vec::new());
        assert!(matches!(r, Err(Error::ShapeOverflow { .. })));
    }

    #[test]
    fn concat_along_second_axis() {
        let a = Variable::from_f64(dims(&["x", "time"]), vec![2, 1], DataType::F64, &[1.0, 2.0])
            .unwrap();
        let b = Variable::from_f64(
            dims(&["x", "time"]),
            vec![2, 2],
            DataType::F64,
            &[3.0, 4.0, 5.0, 6.0],
        )
        .unwrap();
        let c = Variable::concat("t", "time", &[&a, &b]).unwrap();
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.to_f64(), vec![1.0, 3.0, 4.0, 2.0, 5.0, 6.0]);

        let back = c.slice_axis(1, 1..3);
        assert_eq!(back, b);
    }

    #[test]
    fn concat_rejects_mismatch() {
        let a = Variable::from_f64(dims(&["time"]), vec![1], DataType::F64, &[1.0]).unwrap();
        let b = Variable::from_f64(dims(&["time"]), vec![1], DataType::F32, &[1.0]).unwrap();
        assert!(matches!(
            Variable::concat("t", "time", &[&a, &b]),
            Err(Error::Incompatible { .. })
        ));
        assert!(matches!(
            Variable::concat("t", "depth", &[&a]),
            Err(Error::Incompatible { .. })
        ));
    }
}
