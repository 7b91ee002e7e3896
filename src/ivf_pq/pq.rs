//! Product Quantization (PQ) implementation.

use crate::distance::Metric;
use crate::error::{CagraError, Result};
use crate::partitioning::KMeans;
use crate::simd;

/// Product Quantizer.
///
/// Decomposes vectors into `num_codebooks` sub-vectors and quantizes each
/// sub-vector independently against a small learned codebook.
#[derive(Debug, Clone)]
pub struct ProductQuantizer {
    dimension: usize,
    num_codebooks: usize,
    codebook_size: usize,
    subvector_dim: usize,
    /// [codebook][codeword * subvector_dim + j]
    codebooks: Vec<Vec<f32>>,
}

impl ProductQuantizer {
    /// Create new product quantizer.
    pub fn new(dimension: usize, num_codebooks: usize, codebook_size: usize) -> Result<Self> {
        if dimension == 0 || num_codebooks == 0 || codebook_size == 0 {
            return Err(CagraError::config("all PQ parameters must be greater than 0"));
        }
        if codebook_size > 256 {
            return Err(CagraError::config("PQ codes are at most 8 bits"));
        }
        if dimension % num_codebooks != 0 {
            return Err(CagraError::config(
                "dimension must be divisible by the number of PQ sub-spaces",
            ));
        }

        Ok(Self {
            dimension,
            num_codebooks,
            codebook_size,
            subvector_dim: dimension / num_codebooks,
            codebooks: Vec::new(),
        })
    }

    /// Train one codebook per sub-space on `num_vectors` rows of `vectors`.
    ///
    /// The codebook size shrinks to `num_vectors` when fewer training rows
    /// than code words are available.
    pub fn fit(&mut self, vectors: &[f32], num_vectors: usize, seed: u64, iters: usize) -> Result<()> {
        self.codebook_size = self.codebook_size.min(num_vectors);
        self.codebooks = Vec::with_capacity(self.num_codebooks);

        for codebook_idx in 0..self.num_codebooks {
            let start_dim = codebook_idx * self.subvector_dim;
            let end_dim = start_dim + self.subvector_dim;

            // Extract sub-vectors, row-major.
            let mut flat = Vec::with_capacity(num_vectors * self.subvector_dim);
            for i in 0..num_vectors {
                let vec = get_vector(vectors, self.dimension, i);
                flat.extend_from_slice(&vec[start_dim..end_dim]);
            }

            let mut kmeans = KMeans::new(self.subvector_dim, self.codebook_size)?
                .with_seed(seed.wrapping_add(codebook_idx as u64))
                .with_max_iters(iters);
            kmeans.fit(&flat, num_vectors)?;

            self.codebooks.push(kmeans.centroids().to_vec());
        }

        Ok(())
    }

    /// Quantize a vector into one code per sub-space.
    pub fn quantize(&self, vector: &[f32]) -> Vec<u8> {
        let mut codes = Vec::with_capacity(self.num_codebooks);
        self.quantize_into(vector, &mut codes);
        codes
    }

    /// Quantize a vector, appending codes to `out`.
    pub fn quantize_into(&self, vector: &[f32], out: &mut Vec<u8>) {
        for codebook_idx in 0..self.num_codebooks {
            let start_dim = codebook_idx * self.subvector_dim;
            let subvector = &vector[start_dim..start_dim + self.subvector_dim];

            let mut best_code = 0u8;
            let mut best_dist = f32::INFINITY;
            for code in 0..self.codebook_size {
                let dist = simd::l2_distance_squared(subvector, self.codeword(codebook_idx, code));
                if dist < best_dist {
                    best_dist = dist;
                    best_code = code as u8;
                }
            }

            out.push(best_code);
        }
    }

    /// Reconstruct a vector from its codes.
    pub fn decode(&self, codes: &[u8]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dimension);
        for (codebook_idx, &code) in codes.iter().enumerate() {
            out.extend_from_slice(self.codeword(codebook_idx, code as usize));
        }
        out
    }

    /// ADC (Asymmetric Distance Computation) lookup table.
    ///
    /// Precomputes, per sub-space, the metric's contribution of every code
    /// word for `query`: squared L2 distance, or negated dot product.
    /// Table layout: `[codebook_0_codeword_0, codebook_0_codeword_1, ..., codebook_1_codeword_0, ...]`.
    pub fn compute_adc_table(&self, query: &[f32], metric: Metric) -> Result<Vec<f32>> {
        if query.len() != self.dimension {
            return Err(CagraError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut table = Vec::with_capacity(self.num_codebooks * self.codebook_size);
        for codebook_idx in 0..self.num_codebooks {
            let start_dim = codebook_idx * self.subvector_dim;
            let query_subvector = &query[start_dim..start_dim + self.subvector_dim];
            for code in 0..self.codebook_size {
                table.push(metric.distance(query_subvector, self.codeword(codebook_idx, code)));
            }
        }
        Ok(table)
    }

    /// Distance estimate using an ADC table: table lookups and additions only.
    #[inline(always)]
    pub fn distance_with_table(&self, table: &[f32], codes: &[u8]) -> f32 {
        let mut total_dist = 0.0;
        for (codebook_idx, &code) in codes.iter().enumerate() {
            total_dist += table[codebook_idx * self.codebook_size + code as usize];
        }
        total_dist
    }

    #[inline]
    fn codeword(&self, codebook_idx: usize, code: usize) -> &[f32] {
        let start = code * self.subvector_dim;
        &self.codebooks[codebook_idx][start..start + self.subvector_dim]
    }

    /// Codes per vector.
    pub fn code_len(&self) -> usize {
        self.num_codebooks
    }

    /// Code words per sub-space after training.
    pub fn codebook_size(&self) -> usize {
        self.codebook_size
    }
}

/// Get vector from row-major storage.
fn get_vector(vectors: &[f32], dimension: usize, idx: usize) -> &[f32] {
    let start = idx * dimension;
    &vectors[start..start + dimension]
}
