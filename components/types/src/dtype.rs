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

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Number;

// Largest magnitude below which every integer has an exact f64.
const EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// Element type of a [crate::Variable]. Values are always stored
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl DataType {
    pub const fn size(self) -> usize {
        match self {
            DataType::I8 | DataType::U8 => 1,
            DataType::I16 | DataType::U16 => 2,
            DataType::I32 | DataType::U32 | DataType::F32 => 4,
            DataType::I64 | DataType::U64 | DataType::F64 => 8,
        }
    }

    /// The numpy style type string zarr v2 puts in `.zarray`.
    pub const fn zarr_dtype(self) -> &'static str {
        match self {
            DataType::I8 => "|i1",
            DataType::I16 => "<i2",
            DataType::I32 => "<i4",
            DataType::I64 => "<i8",
            DataType::U8 => "|u1",
            DataType::U16 => "<u2",
            DataType::U32 => "<u4",
            DataType::U64 => "<u8",
            DataType::F32 => "<f4",
            DataType::F64 => "<f8",
        }
    }

    pub fn from_zarr_dtype(s: &str) -> Option<DataType> {
        let dt = match s {
            "|i1" | "<i1" => DataType::I8,
            "<i2" => DataType::I16,
            "<i4" => DataType::I32,
            "<i8" => DataType::I64,
            "|u1" | "<u1" => DataType::U8,
            "<u2" => DataType::U16,
            "<u4" => DataType::U32,
            "<u8" => DataType::U64,
            "<f4" => DataType::F32,
            "<f8" => DataType::F64,
            _ => return None,
        };
        Some(dt)
    }

    /// Append `v` converted to this type. Integer conversions saturate.
    pub fn encode_f64(self, v: f64, out: &mut Vec<u8>) {
        match self {
            DataType::I8 => out.extend_from_slice(&(v as i8).to_le_bytes()),
            DataType::I16 => out.extend_from_slice(&(v as i16).to_le_bytes()),
            DataType::I32 => out.extend_from_slice(&(v as i32).to_le_bytes()),
            DataType::I64 => out.extend_from_slice(&(v as i64).to_le_bytes()),
            DataType::U8 => out.extend_from_slice(&(v as u8).to_le_bytes()),
            DataType::U16 => out.extend_from_slice(&(v as u16).to_le_bytes()),
            DataType::U32 => out.extend_from_slice(&(v as u32).to_le_bytes()),
            DataType::U64 => out.extend_from_slice(&(v as u64).to_le_bytes()),
            DataType::F32 => out.extend_from_slice(&(v as f32).to_le_bytes()),
            DataType::F64 => out.extend_from_slice(&v.to_le_bytes()),
        }
    }

    pub const fn is_integer(self) -> bool { !matches!(self, DataType::F32 | DataType::F64) }

    /// Append `n` as one element of this type. Integer types take whole
    /// numbers inside their range only and return `false` otherwise, leaving
    /// `out` untouched.
    pub fn encode_number(self, n: &Number, out: &mut Vec<u8>) -> bool {
        if !self.is_integer() {
            return match n.as_f64() {
                Some(v) => {
                    self.encode_f64(v, out);
                    true
                }
                None => false,
            };
        }
        let Some(v) = whole_number(n) else {
            return false;
        };
        let encoded = match self {
            DataType::I8 => i8::try_from(v).map(|v| out.extend_from_slice(&v.to_le_bytes())),
            DataType::I16 => i16::try_from(v).map(|v| out.extend_from_slice(&v.to_le_bytes())),
            DataType::I32 => i32::try_from(v).map(|v| out.extend_from_slice(&v.to_le_bytes())),
            DataType::I64 => i64::try_from(v).map(|v| out.extend_from_slice(&v.to_le_bytes())),
            DataType::U8 => u8::try_from(v).map(|v| out.extend_from_slice(&v.to_le_bytes())),
            DataType::U16 => u16::try_from(v).map(|v| out.extend_from_slice(&v.to_le_bytes())),
            DataType::U32 => u32::try_from(v).map(|v| out.extend_from_slice(&v.to_le_bytes())),
            DataType::U64 => u64::try_from(v).map(|v| out.extend_from_slice(&v.to_le_bytes())),
            DataType::F32 | DataType::F64 => return false,
        };
        encoded.is_ok()
    }

    /// Decode one element as a JSON number without going through `f64` for
    /// integer types. `None` for non-finite floats.
    pub fn decode_number(self, bytes: &[u8]) -> Option<Number> {
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        let n = match self {
            DataType::I64 => Number::from(i64::from_le_bytes(buf)),
            DataType::U64 => Number::from(u64::from_le_bytes(buf)),
            DataType::F32 | DataType::F64 => return Number::from_f64(self.decode_f64(bytes)),
            // narrower integers are exact in f64
            _ => Number::from(self.decode_f64(bytes) as i64),
        };
        Some(n)
    }

    /// Decode one element. `bytes` must be exactly [DataType::size] long.
    pub fn decode_f64(self, bytes: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        match self {
            DataType::I8 => i8::from_le_bytes([buf[0]]) as f64,
            DataType::I16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            DataType::I32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            DataType::I64 => i64::from_le_bytes(buf) as f64,
            DataType::U8 => buf[0] as f64,
            DataType::U16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            DataType::U32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            DataType::U64 => u64::from_le_bytes(buf) as f64,
            DataType::F32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            DataType::F64 => f64::from_le_bytes(buf),
        }
    }

    /// One element holding `fill`, the unit used to pad partial chunks.
    pub fn fill_bytes(self, fill: f64) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.size());
        self.encode_f64(fill, &mut out);
        out
    }
}

fn whole_number(n: &Number) -> Option<i128> {
    if let Some(v) = n.as_i64() {
        return Some(v.into());
    }
    if let Some(v) = n.as_u64() {
        return Some(v.into());
    }
    let v = n.as_f64()?;
    (v.fract() == 0.0 && v.abs() <= EXACT_F64_INT).then_some(v as i128)
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(self.zarr_dtype()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zarr_dtype_names() {
        for dt in [
            DataType::I8,
            DataType::I16,
            DataType::I32,
            DataType::I64,
            DataType::U8,
            DataType::U16,
            DataType::U32,
            DataType::U64,
            DataType::F32,
            DataType::F64,
        ] {
            assert_eq!(DataType::from_zarr_dtype(dt.zarr_dtype()), Some(dt));
            assert_eq!(dt.fill_bytes(0.0).len(), dt.size());
        }
        assert_eq!(DataType::from_zarr_dtype(">f8"), None);
    }

    #[test]
    fn encode_values() {
        let mut out = Vec::new();
        DataType::I16.encode_f64(-2.0, &mut out);
        assert_eq!(out, (-2i16).to_le_bytes());
        assert_eq!(DataType::I16.decode_f64(&out), -2.0);

        // saturating casts
        assert_eq!(DataType::U8.fill_bytes(300.0), vec![255]);
        assert_eq!(DataType::U8.fill_bytes(-1.0), vec![0]);
        assert_eq!(DataType::F32.decode_f64(&DataType::F32.fill_bytes(1.5)), 1.5);
    }

    fn number(s: &str) -> Number { serde_json::from_str(s).unwrap() }

    #[test]
    fn encode_numbers_exactly() {
        let mut out = Vec::new();
        assert!(DataType::U8.encode_number(&number("255"), &mut out));
        assert!(DataType::U8.encode_number(&number("7.0"), &mut out));
        assert_eq!(out, vec![255, 7]);

        for bad in ["3.7", "300", "-5", "1e300"] {
            assert!(!DataType::U8.encode_number(&number(bad), &mut out), "{bad}");
        }
        assert_eq!(out.len(), 2);

        // integers past 2^53 keep every bit
        let mut out = Vec::new();
        assert!(DataType::I64.encode_number(&number("9007199254740993"), &mut out));
        assert_eq!(out, 9_007_199_254_740_993i64.to_le_bytes());
        assert_eq!(DataType::I64.decode_number(&out), Some(Number::from(9_007_199_254_740_993i64)));

        let mut out = Vec::new();
        assert!(DataType::U64.encode_number(&number("18446744073709551615"), &mut out));
        assert_eq!(DataType::U64.decode_number(&out), Some(Number::from(u64::MAX)));
        assert!(!DataType::I64.encode_number(&number("18446744073709551615"), &mut out));
        // a float this large may already have been rounded
        assert!(!DataType::I64.encode_number(&number("9007199254740994.0"), &mut out));

        let mut out = Vec::new();
        assert!(DataType::F32.encode_number(&number("12.5"), &mut out));
        assert_eq!(DataType::F32.decode_number(&out), Number::from_f64(12.5));
        assert_eq!(DataType::F64.decode_number(&f64::NAN.to_le_bytes()), None);
    }
}
