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

//! Byte level helpers over row-major (C order) n-dimensional buffers.
//!
//! Seen along one axis, a C order buffer is `outer` repetitions of a run of
//! `shape[axis]` blocks, each block being `inner` bytes long. Every helper
//! here walks that `outer x axis x inner` view.

use std::ops::Range;

/// Bytes held by an array of `shape`, `None` when that overflows `usize`.
pub fn byte_len(shape: &[usize], item_size: usize) -> Option<usize> {
    shape.iter().try_fold(item_size, |acc, len| acc.checked_mul(*len))
}

/// `(outer, inner)` for `axis`: the number of repeated runs before the axis
/// and the byte length of one step along it.
pub fn axis_strides(shape: &[usize], axis: usize, item_size: usize) -> (usize, usize) {
    let outer = shape[..axis].iter().product();
    let inner = shape[axis + 1..].iter().product::<usize>() * item_size;
    (outer, inner)
}

/// Copy out `range` along `axis`.
pub fn slice_along(
    data: &[u8],
    shape: &[usize],
    axis: usize,
    item_size: usize,
    range: Range<usize>,
) -> Vec<u8> {
    let (outer, inner) = axis_strides(shape, axis, item_size);
    let len = shape[axis];
    debug_assert!(range.end <= len);
    let mut out = Vec::with_capacity(outer * range.len() * inner);
    for o in 0..outer {
        let base = o * len * inner;
        out.extend_from_slice(&data[base + range.start * inner..base + range.end * inner]);
    }
    out
}

/// Join buffers along an axis. Each part is `(data, len_along_axis)` and all
/// parts must agree on `outer` and `inner`.
pub fn concat_along(parts: &[(&[u8], usize)], outer: usize, inner: usize) -> Vec<u8> {
    let total: usize = parts.iter().map(|(d, _)| d.len()).sum();
    let mut out = Vec::with_capacity(total);
    for o in 0..outer {
        for (data, len) in parts {
            let run = len * inner;
            out.extend_from_slice(&data[o * run..(o + 1) * run]);
        }
    }
    out
}

/// Grow `axis` to `target_len`, filling the new tail with copies of `fill`
/// (one element).
pub fn pad_along(
    data: &[u8],
    shape: &[usize],
    axis: usize,
    item_size: usize,
    target_len: usize,
    fill: &[u8],
) -> Vec<u8> {
    let (outer, inner) = axis_strides(shape, axis, item_size);
    let len = shape[axis];
    debug_assert!(target_len >= len);
    debug_assert_eq!(fill.len(), item_size);
    let tail_items = (target_len - len) * inner / item_size.max(1);
    let mut out = Vec::with_capacity(outer * target_len * inner);
    for o in 0..outer {
        let run = len * inner;
        out.extend_from_slice(&data[o * run..(o + 1) * run]);
        for _ in 0..tail_items {
            out.extend_from_slice(fill);
        }
    }
    out
}
