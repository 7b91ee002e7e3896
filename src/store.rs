//! Immutable row-major vector storage.

use crate::error::{CagraError, Result};
use crate::precision::{Element, NumericType};
use half::f16;

/// Typed, row-major storage of `n` vectors of dimension `d`.
///
/// The variant is the numeric representation chosen at build time. Row order
/// is the dataset's canonical order and is preserved through build, search
/// and serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorStore {
    /// Full precision rows.
    F32(Rows<f32>),
    /// Half precision rows.
    F16(Rows<f16>),
}

/// Row-major buffer of one element type.
#[derive(Debug, Clone, PartialEq)]
pub struct Rows<E> {
    data: Vec<E>,
    dimension: usize,
}

impl<E: Element> Rows<E> {
    fn new(data: Vec<E>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(CagraError::config("dimension must be greater than 0"));
        }
        if data.len() % dimension != 0 {
            return Err(CagraError::DimensionMismatch {
                expected: dimension,
                actual: data.len() % dimension,
            });
        }
        Ok(Self { data, dimension })
    }

    /// Vector dimension.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    /// Whether there are no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[E] {
        let start = i * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// Flat row-major buffer.
    #[inline]
    pub fn as_slice(&self) -> &[E] {
        &self.data
    }
}

impl VectorStore {
    /// Full precision store from a flat row-major buffer.
    pub fn from_f32(data: Vec<f32>, dimension: usize) -> Result<Self> {
        Ok(VectorStore::F32(Rows::new(data, dimension)?))
    }

    /// Half precision store from a flat row-major buffer.
    pub fn from_f16(data: Vec<f16>, dimension: usize) -> Result<Self> {
        Ok(VectorStore::F16(Rows::new(data, dimension)?))
    }

    /// Half precision store, narrowing a full precision buffer.
    pub fn from_f32_as_f16(data: &[f32], dimension: usize) -> Result<Self> {
        Self::from_f16(crate::precision::to_f16(data), dimension)
    }

    /// Store from a list of equally sized rows.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self> {
        let dimension = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * dimension);
        for row in rows {
            if row.len() != dimension {
                return Err(CagraError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Self::from_f32(data, dimension)
    }

    /// Vector dimension `d`.
    pub fn dimension(&self) -> usize {
        match self {
            VectorStore::F32(r) => r.dimension(),
            VectorStore::F16(r) => r.dimension(),
        }
    }

    /// Number of vectors `n`.
    pub fn len(&self) -> usize {
        match self {
            VectorStore::F32(r) => r.len(),
            VectorStore::F16(r) => r.len(),
        }
    }

    /// Whether the store holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage representation.
    pub fn numeric_type(&self) -> NumericType {
        match self {
            VectorStore::F32(_) => NumericType::Float32,
            VectorStore::F16(_) => NumericType::Float16,
        }
    }

    /// Payload size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.len() * self.dimension() * self.numeric_type().size_of()
    }

    /// Row `i` widened to full precision.
    pub fn row_f32(&self, i: usize) -> Vec<f32> {
        match self {
            VectorStore::F32(r) => r.row(i).to_vec(),
            VectorStore::F16(r) => crate::precision::widen(r.row(i)),
        }
    }

    /// All rows widened to full precision, row-major.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match self {
            VectorStore::F32(r) => r.as_slice().to_vec(),
            VectorStore::F16(r) => crate::precision::widen(r.as_slice()),
        }
    }
}

/// A batch of query vectors in one numeric representation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBatch {
    store: VectorStore,
}

impl QueryBatch {
    /// Full precision queries from a flat row-major buffer.
    pub fn from_f32(data: Vec<f32>, dimension: usize) -> Result<Self> {
        Ok(Self {
            store: VectorStore::from_f32(data, dimension)?,
        })
    }

    /// Half precision queries from a flat row-major buffer.
    pub fn from_f16(data: Vec<f16>, dimension: usize) -> Result<Self> {
        Ok(Self {
            store: VectorStore::from_f16(data, dimension)?,
        })
    }

    /// Half precision queries, narrowing a full precision buffer.
    pub fn from_f32_as_f16(data: &[f32], dimension: usize) -> Result<Self> {
        Ok(Self {
            store: VectorStore::from_f32_as_f16(data, dimension)?,
        })
    }

    /// Query dimension.
    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    /// Number of queries.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Representation of the queries.
    pub fn numeric_type(&self) -> NumericType {
        self.store.numeric_type()
    }

    /// Query `i` promoted to full precision.
    pub fn query_f32(&self, i: usize) -> Vec<f32> {
        self.store.row_f32(i)
    }
}
