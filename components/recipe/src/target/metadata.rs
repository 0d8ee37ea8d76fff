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

//! zarr v2 metadata documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use zforge_common::{ARRAY_DIMENSIONS_ATTR, ZARRAY_KEY, ZARR_FORMAT, ZATTRS_KEY, ZGROUP_KEY};
use zforge_types::{Attributes, DataType, Variable};

use crate::err::{InvalidMetadataSnafu, MalformedMetadataSnafu, Result};

/// The `.zarray` document of one array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMetadata {
    pub zarr_format: u8,
    pub shape:       Vec<usize>,
    pub chunks:      Vec<usize>,
    pub dtype:       String,
    pub fill_value:  Option<f64>,
    pub order:       String,
    // chunks are stored raw.
    pub compressor:  Option<Value>,
    pub filters:     Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_separator: Option<String>,
}

/// An array as the target sees it: its metadata, dimension names and user
/// attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct ArraySchema {
    pub name:  String,
    pub meta:  ArrayMetadata,
    pub dims:  Vec<String>,
    pub attrs: Attributes,
}

impl ArraySchema {
    /// The schema a variable of the placeholder unit gets in the target.
    ///
    /// Along `sequence_dim` arrays are chunked every `sequence_chunk_len`
    /// items so that chunk regions map onto whole store chunks; every other
    /// axis is a single chunk.
    pub fn from_variable(
        name: &str,
        var: &Variable,
        sequence_dim: &str,
        sequence_chunk_len: usize,
    ) -> ArraySchema {
        let chunks = var
            .dims()
            .iter()
            .zip(var.shape())
            .map(|(dim, len)| if dim == sequence_dim { sequence_chunk_len } else { (*len).max(1) })
            .collect();
        ArraySchema {
            name:  name.to_string(),
            meta:  ArrayMetadata {
                zarr_format: ZARR_FORMAT,
                shape: var.shape().to_vec(),
                chunks,
                dtype: var.dtype().zarr_dtype().to_string(),
                fill_value: Some(var.fill_value()),
                order: "C".to_string(),
                compressor: None,
                filters: None,
                dimension_separator: Some(zforge_common::CHUNK_KEY_SEPARATOR.to_string()),
            },
            dims:  var.dims().to_vec(),
            attrs: var.attrs.clone(),
        }
    }

    pub fn data_type(&self) -> Result<DataType> {
        DataType::from_zarr_dtype(&self.meta.dtype).context(MalformedMetadataSnafu {
            path:   self.zarray_path(),
            reason: format!("unsupported dtype {:?}", self.meta.dtype),
        })
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> { self.dims.iter().position(|d| d == dim) }

    pub fn fill_value(&self) -> f64 { self.meta.fill_value.unwrap_or(0.0) }

    pub fn zarray_path(&self) -> String { format!("{}/{}", self.name, ZARRAY_KEY) }

    pub fn zattrs_path(&self) -> String { format!("{}/{}", self.name, ZATTRS_KEY) }

    /// User attributes plus the xarray `_ARRAY_DIMENSIONS` convention.
    pub fn zattrs(&self) -> Attributes {
        let mut attrs = self.attrs.clone();
        attrs.insert(
            ARRAY_DIMENSIONS_ATTR.to_string(),
            Value::Array(self.dims.iter().cloned().map(Value::String).collect()),
        );
        attrs
    }

    pub fn from_documents(name: &str, zarray: Value, zattrs: Value) -> Result<ArraySchema> {
        let zarray_path = format!("{name}/{ZARRAY_KEY}");
        let zattrs_path = format!("{name}/{ZATTRS_KEY}");
        let meta: ArrayMetadata =
            serde_json::from_value(zarray).context(InvalidMetadataSnafu { path: &zarray_path })?;
        let mut attrs: Attributes =
            serde_json::from_value(zattrs).context(InvalidMetadataSnafu { path: &zattrs_path })?;
        let dims: Vec<String> = attrs
            .remove(ARRAY_DIMENSIONS_ATTR)
            .map(serde_json::from_value::<Vec<String>>)
            .transpose()
            .context(InvalidMetadataSnafu { path: &zattrs_path })?
            .context(MalformedMetadataSnafu {
                path:   &zattrs_path,
                reason: format!("missing {ARRAY_DIMENSIONS_ATTR}"),
            })?;
        snafu::ensure!(
            dims.len() == meta.shape.len() && meta.chunks.len() == meta.shape.len(),
            MalformedMetadataSnafu {
                path:   zarray_path,
                reason: format!(
                    "dims {:?}, shape {:?} and chunks {:?} disagree",
                    dims, meta.shape, meta.chunks
                ),
            }
        );
        Ok(ArraySchema {
            name: name.to_string(),
            meta,
            dims,
            attrs,
        })
    }
}

/// The `.zmetadata` document: every metadata document of the store in one
/// object. The target writes it last, so its presence marks a store whose
/// schema is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedMetadata {
    pub metadata:                 BTreeMap<String, Value>,
    pub zarr_consolidated_format: u8,
}

impl ConsolidatedMetadata {
    pub fn build(group_attrs: &Attributes, arrays: &[ArraySchema]) -> Result<ConsolidatedMetadata> {
        let mut metadata = BTreeMap::new();
        metadata.insert(ZGROUP_KEY.to_string(), serde_json::json!({ "zarr_format": ZARR_FORMAT }));
        metadata.insert(ZATTRS_KEY.to_string(), Value::Object(group_attrs.clone()));
        for schema in arrays {
            let zarray = serde_json::to_value(&schema.meta)
                .context(InvalidMetadataSnafu { path: schema.zarray_path() })?;
            metadata.insert(schema.zarray_path(), zarray);
            metadata.insert(schema.zattrs_path(), Value::Object(schema.zattrs()));
        }
        Ok(ConsolidatedMetadata {
            metadata,
            zarr_consolidated_format: 1,
        })
    }

    pub fn group_attrs(&self) -> Attributes {
        match self.metadata.get(ZATTRS_KEY) {
            Some(Value::Object(attrs)) => attrs.clone(),
            _ => Attributes::new(),
        }
    }

    pub fn array_names(&self) -> Vec<String> {
        let suffix = format!("/{ZARRAY_KEY}");
        self.metadata
            .keys()
            .filter_map(|k| k.strip_suffix(&suffix))
            .map(|s| s.to_string())
            .collect()
    }

    pub fn array(&self, name: &str) -> Result<ArraySchema> {
        let zarray_path = format!("{name}/{ZARRAY_KEY}");
        let zarray = self.metadata.get(&zarray_path).cloned().context(MalformedMetadataSnafu {
            path:   zarray_path,
            reason: "not in the consolidated metadata",
        })?;
        let zattrs = self
            .metadata
            .get(&format!("{name}/{ZATTRS_KEY}"))
            .cloned()
            .unwrap_or_else(|| Value::Object(Attributes::new()));
        ArraySchema::from_documents(name, zarray, zattrs)
    }

    pub fn arrays(&self) -> Result<BTreeMap<String, ArraySchema>> {
        self.array_names()
            .into_iter()
            .map(|name| self.array(&name).map(|schema| (name, schema)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sst() -> Variable {
        Variable::from_f64(
            vec!["time".into(), "lat".into()],
            vec![3, 2],
            DataType::F32,
            &[0.0; 6],
        )
        .unwrap()
    }

    #[test]
    fn schema_from_variable() {
        let schema = ArraySchema::from_variable("sst", &sst(), "time", 4);
        assert_eq!(schema.meta.shape, vec![3, 2]);
        assert_eq!(schema.meta.chunks, vec![4, 2]);
        assert_eq!(schema.meta.dtype, "<f4");
        assert_eq!(schema.axis_of("time"), Some(0));
        assert_eq!(schema.data_type().unwrap(), DataType::F32);

        let zarray = serde_json::to_value(&schema.meta).unwrap();
        assert_eq!(zarray["compressor"], Value::Null);
        assert_eq!(zarray["zarr_format"], 2);
    }

    #[test]
    fn consolidated_round_trip() {
        let mut attrs = Attributes::new();
        attrs.insert("title".into(), "sst".into());
        let schema = ArraySchema::from_variable("sst", &sst(), "time", 4);
        let meta = ConsolidatedMetadata::build(&attrs, &[schema.clone()]).unwrap();
        assert_eq!(meta.array_names(), vec!["sst".to_string()]);
        assert_eq!(meta.array("sst").unwrap(), schema);
        assert_eq!(meta.group_attrs(), attrs);
        assert!(meta.metadata["sst/.zattrs"][ARRAY_DIMENSIONS_ATTR].is_array());

        let text = serde_json::to_string(&meta).unwrap();
        let parsed: ConsolidatedMetadata = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.arrays().unwrap().len(), 1);
    }

    #[test]
    fn missing_dimensions_is_malformed() {
        let schema = ArraySchema::from_variable("sst", &sst(), "time", 4);
        let zarray = serde_json::to_value(&schema.meta).unwrap();
        let err = ArraySchema::from_documents("sst", zarray, serde_json::json!({})).unwrap_err();
        assert!(matches!(err, crate::Error::MalformedMetadata { .. }));
    }
}
