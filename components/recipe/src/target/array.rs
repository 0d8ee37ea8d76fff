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

//! Region-indexed access to the arrays of a zarr v2 store.
//!
//! Arrays written here are chunked along at most one axis, the growth
//! dimension; every other axis is a single chunk. A region along the growth
//! axis therefore maps onto a contiguous run of whole chunk objects, which is
//! what lets chunk writers work without coordinating with each other.

use bytes::Bytes;
use futures::future::try_join_all;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use snafu::{ensure, OptionExt, ResultExt};
use tracing::debug;
use zforge_common::{
    ObjectStorage, CHUNK_KEY_SEPARATOR, ZARRAY_KEY, ZARR_FORMAT, ZATTRS_KEY, ZGROUP_KEY,
    ZMETADATA_KEY,
};
use zforge_types::{layout, Attributes, Region, Variable, VariableEncoding};

use super::metadata::{ArraySchema, ConsolidatedMetadata};
use crate::err::{
    CorruptChunkSnafu, DatasetSnafu, InvalidMetadataSnafu, MalformedMetadataSnafu,
    RegionWriteSnafu, Result, TargetIoSnafu,
};

/// Key of the chunk object at grid position `idx`.
pub fn chunk_path(name: &str, idx: &[usize]) -> String {
    if idx.is_empty() {
        return format!("{name}/0");
    }
    let idx: Vec<String> = idx.iter().map(|i| i.to_string()).collect();
    format!("{name}/{}", idx.join(CHUNK_KEY_SEPARATOR))
}

/// The mapper chunk writers and the initializer go through.
#[derive(Debug, Clone)]
pub struct ArrayStore {
    operator: ObjectStorage,
}

impl ArrayStore {
    pub fn new(operator: ObjectStorage) -> Self { Self { operator } }

    pub(crate) fn operator(&self) -> &ObjectStorage { &self.operator }

    pub(crate) async fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let buf = self.operator.read(path).await.context(TargetIoSnafu { path })?;
        serde_json::from_slice(&buf).context(InvalidMetadataSnafu { path })
    }

    pub(crate) async fn write_json<T: Serialize>(&self, path: &str, value: &T) -> Result<()> {
        let buf = serde_json::to_vec_pretty(value).context(InvalidMetadataSnafu { path })?;
        self.operator.write(path, buf).await.context(TargetIoSnafu { path })
    }

    pub async fn write_group(&self, attrs: &Attributes) -> Result<()> {
        self.write_json(ZGROUP_KEY, &serde_json::json!({ "zarr_format": ZARR_FORMAT }))
            .await?;
        self.write_json(ZATTRS_KEY, attrs).await
    }

    pub async fn read_group_attrs(&self) -> Result<Attributes> { self.read_json(ZATTRS_KEY).await }

    pub async fn write_array(&self, schema: &ArraySchema) -> Result<()> {
        self.write_json(&schema.zarray_path(), &schema.meta).await?;
        self.write_json(&schema.zattrs_path(), &schema.zattrs()).await
    }

    pub async fn read_array(&self, name: &str) -> Result<ArraySchema> {
        let zarray: Value = self.read_json(&format!("{name}/{ZARRAY_KEY}")).await?;
        let zattrs: Value = self.read_json(&format!("{name}/{ZATTRS_KEY}")).await?;
        ArraySchema::from_documents(name, zarray, zattrs)
    }

    /// Set the extent of `axis` to `len`. Only the metadata changes.
    pub async fn resize(&self, name: &str, axis: usize, len: usize) -> Result<ArraySchema> {
        let mut schema = self.read_array(name).await?;
        ensure!(
            axis < schema.meta.shape.len(),
            MalformedMetadataSnafu {
                path:   schema.zarray_path(),
                reason: format!("no axis {axis} to resize"),
            }
        );
        let from = schema.meta.shape[axis];
        schema.meta.shape[axis] = len;
        self.write_json(&schema.zarray_path(), &schema.meta).await?;
        debug!("resize {} axis {} from {} to {}", name, axis, from, len);
        Ok(schema)
    }

    /// Write a whole variable that does not vary along the growth dimension.
    pub async fn write_variable(&self, schema: &ArraySchema, var: &Variable) -> Result<()> {
        check_compatible(schema, var, None)?;
        if var.num_elements() == 0 {
            return Ok(());
        }
        let path = chunk_path(&schema.name, &vec![0; var.shape().len()]);
        self.operator
            .write(&path, var.data().clone())
            .await
            .context(TargetIoSnafu { path: &path })
    }

    /// Write `var` at `region` of the array, returning the number of chunk
    /// objects written.
    ///
    /// The region must cover whole store chunks, except that it may end at
    /// the end of the array; the tail of a partial chunk is padded with the
    /// fill value. Nothing outside the region is touched.
    pub async fn write_region(
        &self,
        schema: &ArraySchema,
        var: &Variable,
        region: &Region,
    ) -> Result<usize> {
        let axis = schema.axis_of(&region.dim).context(RegionWriteSnafu {
            var:    &schema.name,
            reason: format!("array has no dimension {:?}", region.dim),
        })?;
        check_compatible(schema, var, Some(axis))?;

        let extent = schema.meta.shape[axis];
        let chunk = schema.meta.chunks[axis];
        ensure!(
            var.shape()[axis] == region.len(),
            RegionWriteSnafu {
                var:    &schema.name,
                reason: format!(
                    "holds {} items along {:?} but the region {} spans {}",
                    var.shape()[axis],
                    region.dim,
                    region,
                    region.len()
                ),
            }
        );
        ensure!(
            region.end <= extent,
            RegionWriteSnafu {
                var:    &schema.name,
                reason: format!("region {region} exceeds the array extent {extent}"),
            }
        );
        ensure!(
            chunk > 0 && region.start % chunk == 0 && (region.end % chunk == 0 || region.end == extent),
            RegionWriteSnafu {
                var:    &schema.name,
                reason: format!("region {region} does not align with store chunks of {chunk}"),
            }
        );
        if region.is_empty() || var.num_elements() == 0 {
            return Ok(0);
        }

        let dtype = var.dtype();
        let item = dtype.size();
        let fill = dtype.fill_bytes(schema.fill_value());
        let first = region.start / chunk;
        let last = region.end.div_ceil(chunk);
        let writes = (first..last).map(|j| {
            let local = j * chunk - region.start..((j + 1) * chunk).min(region.end) - region.start;
            let mut slab_shape = var.shape().to_vec();
            slab_shape[axis] = local.len();
            let slab = layout::slice_along(var.data(), var.shape(), axis, item, local);
            let payload = if slab_shape[axis] < chunk {
                layout::pad_along(&slab, &slab_shape, axis, item, chunk, &fill)
            } else {
                slab
            };
            let mut idx = vec![0; slab_shape.len()];
            idx[axis] = j;
            let path = chunk_path(&schema.name, &idx);
            async move {
                self.operator
                    .write(&path, payload)
                    .await
                    .context(TargetIoSnafu { path: &path })
            }
        });
        try_join_all(writes).await?;
        debug!("write {} region {}, chunks {}..{}", schema.name, region, first, last);
        Ok(last - first)
    }

    /// Read a whole array back. Chunks never written read as the fill value.
    pub async fn read_variable(&self, name: &str) -> Result<Variable> {
        let schema = self.read_array(name).await?;
        let dtype = schema.data_type()?;
        let item = dtype.size();
        let shape = schema.meta.shape.clone();
        let chunks = schema.meta.chunks.clone();
        let fill = dtype.fill_bytes(schema.fill_value());

        let data = if shape.iter().any(|len| *len == 0) {
            Vec::new()
        } else {
            let chunked: Vec<usize> = (0..shape.len()).filter(|a| chunks[*a] != shape[*a]).collect();
            let chunk_bytes = layout::byte_len(&chunks, item).context(MalformedMetadataSnafu {
                path:   schema.zarray_path(),
                reason: format!("chunk shape {chunks:?} overflows"),
            })?;
            layout::byte_len(&shape, item).context(MalformedMetadataSnafu {
                path:   schema.zarray_path(),
                reason: format!("shape {shape:?} overflows"),
            })?;
            match chunked.as_slice() {
                [] => self.read_chunk(&schema, &vec![0; shape.len()], chunk_bytes, &fill).await?,
                [axis] => {
                    let axis = *axis;
                    let c = chunks[axis];
                    let mut slabs = Vec::new();
                    for j in 0..shape[axis].div_ceil(c) {
                        let mut idx = vec![0; shape.len()];
                        idx[axis] = j;
                        let raw = self.read_chunk(&schema, &idx, chunk_bytes, &fill).await?;
                        let keep = c.min(shape[axis] - j * c);
                        slabs.push((layout::slice_along(&raw, &chunks, axis, item, 0..keep), keep));
                    }
                    let (outer, inner) = layout::axis_strides(&shape, axis, item);
                    let parts: Vec<(&[u8], usize)> =
                        slabs.iter().map(|(d, len)| (d.as_slice(), *len)).collect();
                    layout::concat_along(&parts, outer, inner)
                }
                _ => {
                    return MalformedMetadataSnafu {
                        path:   schema.zarray_path(),
                        reason: format!("chunked along more than one axis: {chunks:?}"),
                    }
                    .fail()
                }
            }
        };

        let var = Variable::new(schema.dims.clone(), shape, dtype, Bytes::from(data))
            .context(DatasetSnafu)?
            .with_attrs(schema.attrs.clone())
            .with_encoding(VariableEncoding {
                fill_value: schema.meta.fill_value,
            });
        Ok(var)
    }

    async fn read_chunk(
        &self,
        schema: &ArraySchema,
        idx: &[usize],
        expected: usize,
        fill: &[u8],
    ) -> Result<Vec<u8>> {
        let path = chunk_path(&schema.name, idx);
        match self.operator.read(&path).await {
            Ok(buf) => {
                ensure!(
                    buf.len() == expected,
                    CorruptChunkSnafu {
                        path,
                        expected,
                        actual: buf.len(),
                    }
                );
                Ok(buf)
            }
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(fill.repeat(expected / fill.len())),
            Err(e) => Err(e).context(TargetIoSnafu { path }),
        }
    }

    pub async fn write_consolidated(&self, meta: &ConsolidatedMetadata) -> Result<()> {
        self.write_json(ZMETADATA_KEY, meta).await
    }

    pub async fn read_consolidated(&self) -> Result<ConsolidatedMetadata> {
        self.read_json(ZMETADATA_KEY).await
    }

    /// Rebuild `.zmetadata` from the group and per-array documents.
    pub async fn consolidate(&self, names: &[String]) -> Result<ConsolidatedMetadata> {
        let attrs = self.read_group_attrs().await?;
        let arrays = try_join_all(names.iter().map(|name| self.read_array(name))).await?;
        let meta = ConsolidatedMetadata::build(&attrs, &arrays)?;
        self.write_consolidated(&meta).await?;
        Ok(meta)
    }
}

fn check_compatible(schema: &ArraySchema, var: &Variable, growth_axis: Option<usize>) -> Result<()> {
    ensure!(
        var.dims() == schema.dims.as_slice(),
        RegionWriteSnafu {
            var:    &schema.name,
            reason: format!("dims {:?} differ from the stored {:?}", var.dims(), schema.dims),
        }
    );
    let dtype = schema.data_type()?;
    ensure!(
        var.dtype() == dtype,
        RegionWriteSnafu {
            var:    &schema.name,
            reason: format!("dtype {} differs from the stored {}", var.dtype(), dtype),
        }
    );
    for (a, (len, stored)) in var.shape().iter().zip(&schema.meta.shape).enumerate() {
        if Some(a) == growth_axis {
            continue;
        }
        ensure!(
            len == stored,
            RegionWriteSnafu {
                var:    &schema.name,
                reason: format!("axis {a} holds {len} items, the store has {stored}"),
            }
        );
        ensure!(
            schema.meta.chunks[a] >= *stored,
            RegionWriteSnafu {
                var:    &schema.name,
                reason: format!("axis {a} is split into several chunks"),
            }
        );
    }
    Ok(())
}
