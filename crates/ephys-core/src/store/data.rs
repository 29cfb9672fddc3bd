//! Typed array payloads and attribute values.

use crate::{Error, Result};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Element type of an array node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    /// Complex pair of f32.
    C64,
}

impl Dtype {
    /// Size of one element in bytes.
    pub fn item_size(&self) -> usize {
        match self {
            Dtype::I8 => 1,
            Dtype::I16 => 2,
            Dtype::F32 | Dtype::I32 => 4,
            Dtype::F64 | Dtype::I64 | Dtype::C64 => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dtype::F32 => "f32",
            Dtype::F64 => "f64",
            Dtype::I8 => "i8",
            Dtype::I16 => "i16",
            Dtype::I32 => "i32",
            Dtype::I64 => "i64",
            Dtype::C64 => "c64",
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flat array payload of a single dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    C64(Vec<Complex32>),
}

macro_rules! each_variant {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            ArrayData::F32($v) => $body,
            ArrayData::F64($v) => $body,
            ArrayData::I8($v) => $body,
            ArrayData::I16($v) => $body,
            ArrayData::I32($v) => $body,
            ArrayData::I64($v) => $body,
            ArrayData::C64($v) => $body,
        }
    };
}

macro_rules! map_variant {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            ArrayData::F32($v) => ArrayData::F32($body),
            ArrayData::F64($v) => ArrayData::F64($body),
            ArrayData::I8($v) => ArrayData::I8($body),
            ArrayData::I16($v) => ArrayData::I16($body),
            ArrayData::I32($v) => ArrayData::I32($body),
            ArrayData::I64($v) => ArrayData::I64($body),
            ArrayData::C64($v) => ArrayData::C64($body),
        }
    };
}

macro_rules! zip_variant {
    ($left:expr, $right:expr, $a:ident, $b:ident => $body:expr) => {
        match ($left, $right) {
            (ArrayData::F32($a), ArrayData::F32($b)) => Some($body),
            (ArrayData::F64($a), ArrayData::F64($b)) => Some($body),
            (ArrayData::I8($a), ArrayData::I8($b)) => Some($body),
            (ArrayData::I16($a), ArrayData::I16($b)) => Some($body),
            (ArrayData::I32($a), ArrayData::I32($b)) => Some($body),
            (ArrayData::I64($a), ArrayData::I64($b)) => Some($body),
            (ArrayData::C64($a), ArrayData::C64($b)) => Some($body),
            _ => None,
        }
    };
}

pub(crate) use map_variant;
pub(crate) use zip_variant;

impl ArrayData {
    pub fn zeros(dtype: Dtype, len: usize) -> Self {
        match dtype {
            Dtype::F32 => ArrayData::F32(vec![0.0; len]),
            Dtype::F64 => ArrayData::F64(vec![0.0; len]),
            Dtype::I8 => ArrayData::I8(vec![0; len]),
            Dtype::I16 => ArrayData::I16(vec![0; len]),
            Dtype::I32 => ArrayData::I32(vec![0; len]),
            Dtype::I64 => ArrayData::I64(vec![0; len]),
            Dtype::C64 => ArrayData::C64(vec![Complex32::new(0.0, 0.0); len]),
        }
    }

    pub fn dtype(&self) -> Dtype {
        match self {
            ArrayData::F32(_) => Dtype::F32,
            ArrayData::F64(_) => Dtype::F64,
            ArrayData::I8(_) => Dtype::I8,
            ArrayData::I16(_) => Dtype::I16,
            ArrayData::I32(_) => Dtype::I32,
            ArrayData::I64(_) => Dtype::I64,
            ArrayData::C64(_) => Dtype::C64,
        }
    }

    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the elements in `range`.
    pub fn slice(&self, range: Range<usize>) -> ArrayData {
        map_variant!(self, v => v[range].to_vec())
    }

    /// Append `other`, which must share this dtype.
    pub fn extend_from(&mut self, other: &ArrayData, path: &str) -> Result<()> {
        let found = other.dtype();
        let expected = self.dtype();
        zip_variant!(self, other, a, b => a.extend_from_slice(b))
            .ok_or_else(|| mismatch(path, expected, found))
    }

    /// Overwrite elements starting at `offset` with `other`.
    pub fn write_at(&mut self, offset: usize, other: &ArrayData, path: &str) -> Result<()> {
        let found = other.dtype();
        let expected = self.dtype();
        if offset + other.len() > self.len() {
            return Err(Error::shape(
                path,
                format!(
                    "write of {} elements at {} exceeds length {}",
                    other.len(),
                    offset,
                    self.len()
                ),
            ));
        }
        zip_variant!(self, other, a, b => a[offset..offset + b.len()].copy_from_slice(b))
            .ok_or_else(|| mismatch(path, expected, found))
    }

    /// Shorten to `len` elements.
    pub fn truncate(&mut self, len: usize) {
        each_variant!(self, v => v.truncate(len))
    }

    /// Little-endian byte encoding.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.dtype().item_size());
        match self {
            ArrayData::F32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ArrayData::F64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ArrayData::I8(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ArrayData::I16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ArrayData::I32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ArrayData::I64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            ArrayData::C64(v) => v.iter().for_each(|x| {
                out.extend_from_slice(&x.re.to_le_bytes());
                out.extend_from_slice(&x.im.to_le_bytes());
            }),
        }
        out
    }

    /// Decode little-endian bytes; trailing partial elements are ignored.
    pub fn from_le_bytes(dtype: Dtype, bytes: &[u8]) -> ArrayData {
        fn decode<T, const N: usize>(bytes: &[u8], f: fn([u8; N]) -> T) -> Vec<T> {
            bytes
                .chunks_exact(N)
                .map(|c| {
                    let mut raw = [0u8; N];
                    raw.copy_from_slice(c);
                    f(raw)
                })
                .collect()
        }
        match dtype {
            Dtype::F32 => ArrayData::F32(decode(bytes, f32::from_le_bytes)),
            Dtype::F64 => ArrayData::F64(decode(bytes, f64::from_le_bytes)),
            Dtype::I8 => ArrayData::I8(decode(bytes, i8::from_le_bytes)),
            Dtype::I16 => ArrayData::I16(decode(bytes, i16::from_le_bytes)),
            Dtype::I32 => ArrayData::I32(decode(bytes, i32::from_le_bytes)),
            Dtype::I64 => ArrayData::I64(decode(bytes, i64::from_le_bytes)),
            Dtype::C64 => ArrayData::C64(
                decode(bytes, |raw: [u8; 8]| {
                    let [a, b, c, d, e, f, g, h] = raw;
                    Complex32::new(
                        f32::from_le_bytes([a, b, c, d]),
                        f32::from_le_bytes([e, f, g, h]),
                    )
                }),
            ),
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            ArrayData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            ArrayData::F64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<&[i8]> {
        match self {
            ArrayData::I8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<&[i16]> {
        match self {
            ArrayData::I16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            ArrayData::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_c64(&self) -> Option<&[Complex32]> {
        match self {
            ArrayData::C64(v) => Some(v),
            _ => None,
        }
    }

    /// Take the f32 payload or report the dtype found.
    pub fn into_f32(self, path: &str) -> Result<Vec<f32>> {
        match self {
            ArrayData::F32(v) => Ok(v),
            other => Err(mismatch(path, Dtype::F32, other.dtype())),
        }
    }

    pub fn into_i64(self, path: &str) -> Result<Vec<i64>> {
        match self {
            ArrayData::I64(v) => Ok(v),
            other => Err(mismatch(path, Dtype::I64, other.dtype())),
        }
    }
}

pub(crate) fn mismatch(path: &str, expected: Dtype, found: Dtype) -> Error {
    Error::DtypeMismatch {
        path: path.to_string(),
        expected,
        found,
    }
}

/// Attribute value attached to a node.
///
/// Numeric arrays stay arrays so coefficients round-trip exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
}

impl AttrValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value as f64; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            AttrValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[i64]> {
        match self {
            AttrValue::IntArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_float_array(&self) -> Option<&[f64]> {
        match self {
            AttrValue::FloatArray(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<Vec<f64>> for AttrValue {
    fn from(v: Vec<f64>) -> Self {
        AttrValue::FloatArray(v)
    }
}

impl From<&[f64]> for AttrValue {
    fn from(v: &[f64]) -> Self {
        AttrValue::FloatArray(v.to_vec())
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(v: Vec<i64>) -> Self {
        AttrValue::IntArray(v)
    }
}

impl From<&[usize]> for AttrValue {
    fn from(v: &[usize]) -> Self {
        AttrValue::IntArray(v.iter().map(|&x| x as i64).collect())
    }
}
