//! Numeric representation of stored vectors and queries.
//!
//! Vectors can be stored in full precision (`f32`) or in IEEE half precision
//! (`half::f16`), halving memory footprint and bandwidth. Distances are always
//! accumulated in `f32`: every stored component is widened before it enters
//! the sum, so the error does not grow with the storage width over `d`
//! dimensions.
//!
//! The representation is chosen once, when the [`VectorStore`](crate::VectorStore)
//! is created, and never changes for the lifetime of the index. Queries must
//! arrive in the same representation; mismatches are rejected, never coerced.

use half::f16;
use half::slice::HalfFloatSliceExt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage representation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericType {
    /// 32-bit IEEE float.
    Float32,
    /// 16-bit IEEE float.
    Float16,
}

impl NumericType {
    /// Bytes per stored component.
    pub fn size_of(self) -> usize {
        match self {
            NumericType::Float32 => 4,
            NumericType::Float16 => 2,
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            NumericType::Float32 => 0,
            NumericType::Float16 => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(NumericType::Float32),
            1 => Some(NumericType::Float16),
            _ => None,
        }
    }
}

impl fmt::Display for NumericType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericType::Float32 => write!(f, "f32"),
            NumericType::Float16 => write!(f, "f16"),
        }
    }
}

/// A scalar type vectors can be stored in.
///
/// Implemented for `f32` and `half::f16`. Hot loops are generic over this
/// trait, so the representation is resolved once per call rather than per
/// distance evaluation.
pub trait Element: Copy + Send + Sync + PartialEq + fmt::Debug + 'static {
    /// Representation tag of this element type.
    const NUMERIC: NumericType;

    /// Widen to `f32`.
    fn to_f32(self) -> f32;

    /// Narrow from `f32` (round to nearest).
    fn from_f32(value: f32) -> Self;

    /// Little-endian encoding width in bytes.
    const BYTES: usize;

    /// Append little-endian bytes.
    fn write_le(self, out: &mut Vec<u8>);

    /// Decode from exactly `Self::BYTES` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Borrow a row as `f32` when no widening is needed.
    fn as_f32_slice(row: &[Self]) -> Option<&[f32]>;

    /// Widen `src` into `dst`; both have the same length.
    fn widen_into(src: &[Self], dst: &mut [f32]);
}

impl Element for f32 {
    const NUMERIC: NumericType = NumericType::Float32;
    const BYTES: usize = 4;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline(always)]
    fn from_f32(value: f32) -> Self {
        value
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    #[inline(always)]
    fn as_f32_slice(row: &[Self]) -> Option<&[f32]> {
        Some(row)
    }

    #[inline]
    fn widen_into(src: &[Self], dst: &mut [f32]) {
        dst.copy_from_slice(src);
    }
}

impl Element for f16 {
    const NUMERIC: NumericType = NumericType::Float16;
    const BYTES: usize = 2;

    #[inline(always)]
    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline(always)]
    fn from_f32(value: f32) -> Self {
        f16::from_f32(value)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Self {
        f16::from_bits(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    #[inline(always)]
    fn as_f32_slice(_row: &[Self]) -> Option<&[f32]> {
        None
    }

    #[inline]
    fn widen_into(src: &[Self], dst: &mut [f32]) {
        src.convert_to_f32_slice(dst);
    }
}

/// Narrow a full-precision buffer to half precision.
pub fn to_f16(values: &[f32]) -> Vec<f16> {
    values.iter().map(|&v| f16::from_f32(v)).collect()
}

/// Widen any element buffer to `f32`.
pub fn widen<E: Element>(values: &[E]) -> Vec<f32> {
    values.iter().map(|v| v.to_f32()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f16_roundtrip_is_close() {
        let src = [0.1_f32, -3.5, 1000.0, 1e-3];
        let narrowed = to_f16(&src);
        for (a, b) in src.iter().zip(widen(&narrowed)) {
            assert!((a - b).abs() <= a.abs() * 1e-3 + 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn le_bytes_roundtrip() {
        let mut out = Vec::new();
        f16::from_f32(1.5).write_le(&mut out);
        2.25_f32.write_le(&mut out);
        assert_eq!(out.len(), 6);
        assert_eq!(<f16 as Element>::read_le(&out[..2]).to_f32(), 1.5);
        assert_eq!(<f32 as Element>::read_le(&out[2..]), 2.25);
    }

    #[test]
    fn tags_roundtrip() {
        for t in [NumericType::Float32, NumericType::Float16] {
            assert_eq!(NumericType::from_tag(t.tag()), Some(t));
        }
        assert_eq!(NumericType::from_tag(9), None);
    }
}
