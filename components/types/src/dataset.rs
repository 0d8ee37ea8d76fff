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

use std::collections::BTreeMap;

use snafu::ensure;

use crate::{
    err::{DimensionConflictSnafu, EmptyConcatSnafu, IncompatibleSnafu, Result},
    variable::{Attributes, Variable},
};

/// An in-memory unit of named variables sharing dimension sizes.
///
/// Variables are kept sorted by name so that everything derived from a
/// dataset (store layout, combine order, logs) is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    variables: BTreeMap<String, Variable>,
    pub attrs: Attributes,
}

impl Dataset {
    pub fn new() -> Dataset { Dataset::default() }

    /// Add or replace a variable. Its dimension sizes must agree with the
    /// variables already present.
    pub fn insert(&mut self, name: impl Into<String>, var: Variable) -> Result<()> {
        let name = name.into();
        let sizes = self.sizes_without(Some(&name));
        for (dim, len) in var.dims().iter().zip(var.shape()) {
            if let Some(existing) = sizes.get(dim) {
                ensure!(
                    existing == len,
                    DimensionConflictSnafu {
                        dim: dim.clone(),
                        name: name.clone(),
                        existing: *existing,
                        found: *len,
                    }
                );
            }
        }
        self.variables.insert(name, var);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Variable> { self.variables.get(name) }

    pub fn variables(&self) -> impl Iterator<Item = (&String, &Variable)> { self.variables.iter() }

    pub fn names(&self) -> impl Iterator<Item = &String> { self.variables.keys() }

    pub fn is_empty(&self) -> bool { self.variables.is_empty() }

    /// Size of every dimension used by any variable.
    pub fn sizes(&self) -> BTreeMap<String, usize> { self.sizes_without(None) }

    pub fn size_of(&self, dim: &str) -> Option<usize> {
        self.variables.values().find_map(|v| v.len_along(dim))
    }

    fn sizes_without(&self, skip: Option<&str>) -> BTreeMap<String, usize> {
        let mut sizes = BTreeMap::new();
        for (name, var) in &self.variables {
            if Some(name.as_str()) == skip {
                continue;
            }
            for (dim, len) in var.dims().iter().zip(var.shape()) {
                sizes.entry(dim.clone()).or_insert(*len);
            }
        }
        sizes
    }

    /// Concatenate `units` in order along `dim`.
    ///
    /// Variables carrying `dim` are joined; every other variable is taken
    /// from the first unit and must be identical in the rest. All units must
    /// hold the same set of variables.
    pub fn concat(dim: &str, units: &[Dataset]) -> Result<Dataset> {
        let first = units.first().ok_or_else(|| EmptyConcatSnafu.build())?;
        for unit in &units[1..] {
            let missing = first
                .variables
                .keys()
                .chain(unit.variables.keys())
                .find(|k| !(first.variables.contains_key(*k) && unit.variables.contains_key(*k)));
            if let Some(name) = missing {
                return IncompatibleSnafu {
                    name: name.clone(),
                    reason: "not present in every unit",
                }
                .fail();
            }
        }

        let mut combined = Dataset {
            variables: BTreeMap::new(),
            attrs: first.attrs.clone(),
        };
        for (name, var) in &first.variables {
            let parts: Vec<&Variable> = units.iter().map(|u| &u.variables[name]).collect();
            let joined = if var.axis_of(dim).is_some() {
                Variable::concat(name, dim, &parts)?
            } else {
                for part in &parts[1..] {
                    ensure!(
                        *part == var,
                        IncompatibleSnafu {
                            name: name.clone(),
                            reason: format!("does not vary along {dim:?} but differs between units"),
                        }
                    );
                }
                var.clone()
            };
            combined.insert(name.clone(), joined)?;
        }
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataType, Error};

    fn unit(times: &[f64]) -> Dataset {
        let mut ds = Dataset::new();
        let n = times.len();
        ds.insert(
            "time",
            Variable::from_f64(vec!["time".into()], vec![n], DataType::F64, times).unwrap(),
        )
        .unwrap();
        let values: Vec<f64> = times.iter().flat_map(|t| [t * 10.0, t * 10.0 + 1.0]).collect();
        ds.insert(
            "sst",
            Variable::from_f64(vec!["time".into(), "lat".into()], vec![n, 2], DataType::F32, &values)
                .unwrap(),
        )
        .unwrap();
        ds.insert(
            "lat",
            Variable::from_f64(vec!["lat".into()], vec![2], DataType::F64, &[-45.0, 45.0]).unwrap(),
        )
        .unwrap();
        ds
    }

    #[test]
    fn insert_checks_dimension_sizes() {
        let mut ds = unit(&[0.0]);
        let bad = Variable::from_f64(vec!["lat".into()], vec![3], DataType::F64, &[0.0; 3]).unwrap();
        assert!(matches!(ds.insert("lat2", bad.clone()), Err(Error::DimensionConflict { .. })));
        // replacing the only variable with a dimension is fine.
        let mut single = Dataset::new();
        single.insert("lat", bad.clone()).unwrap();
        let other =
            Variable::from_f64(vec!["lat".into()], vec![5], DataType::F64, &[0.0; 5]).unwrap();
        single.insert("lat", other).unwrap();
        assert_eq!(single.size_of("lat"), Some(5));
    }

    #[test]
    fn concat_in_order() {
        let ds = Dataset::concat("time", &[unit(&[0.0, 1.0]), unit(&[2.0])]).unwrap();
        assert_eq!(ds.size_of("time"), Some(3));
        assert_eq!(ds.get("time").unwrap().to_f64(), vec![0.0, 1.0, 2.0]);
        assert_eq!(
            ds.get("sst").unwrap().to_f64(),
            vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0]
        );
        assert_eq!(ds.get("lat").unwrap().to_f64(), vec![-45.0, 45.0]);
        assert_eq!(ds.sizes().get("lat"), Some(&2));
    }

    #[test]
    fn concat_rejects_diverging_static_variables() {
        let mut other = unit(&[1.0]);
        other
            .insert(
                "lat",
                Variable::from_f64(vec!["lat".into()], vec![2], DataType::F64, &[0.0, 1.0]).unwrap(),
            )
            .unwrap();
        assert!(matches!(
            Dataset::concat("time", &[unit(&[0.0]), other]),
            Err(Error::Incompatible { .. })
        ));
        assert!(matches!(Dataset::concat("time", &[]), Err(Error::EmptyConcat { .. })));
    }
}
