//! Exact brute-force search on the host.
//!
//! [`FlatIndex`] consumes the vectors of a [`PortableGraph`] (or any
//! [`VectorStore`]) and answers queries by scanning every row. It follows the
//! same conventions as the graph search (metric, output values, tie order),
//! so its results are the ground truth approximate results are measured
//! against.

use crate::distance::{cmp_candidates, Metric};
use crate::error::{CagraError, Result};
use crate::portable::PortableGraph;
use crate::precision::{Element, NumericType};
use crate::search::SearchResult;
use crate::store::{QueryBatch, Rows, VectorStore};
use rayon::prelude::*;
use std::collections::HashSet;

/// Exhaustive index over a vector store.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    store: VectorStore,
    metric: Metric,
}

impl FlatIndex {
    /// Index `store` under `metric`.
    pub fn new(store: VectorStore, metric: Metric) -> Result<Self> {
        if store.is_empty() {
            return Err(CagraError::config("cannot index an empty store"));
        }
        Ok(Self { store, metric })
    }

    /// Index the vectors carried by a portable graph, under its metric.
    pub fn from_portable(portable: &PortableGraph) -> Result<Self> {
        let store = portable
            .vectors()
            .cloned()
            .ok_or_else(|| CagraError::config("portable graph has no vectors"))?;
        Self::new(store, portable.config().metric)
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the index is empty. Never true for a constructed index.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    /// Distance metric.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Storage representation.
    pub fn numeric_type(&self) -> NumericType {
        self.store.numeric_type()
    }

    /// Exact `k` nearest neighbors of every query, in batch order.
    pub fn search(&self, queries: &QueryBatch, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || k > self.len() {
            return Err(CagraError::InvalidArgument(format!(
                "k = {k} must be in [1, {}]",
                self.len()
            )));
        }
        if queries.dimension() != self.dimension() {
            return Err(CagraError::DimensionMismatch {
                expected: self.dimension(),
                actual: queries.dimension(),
            });
        }
        if queries.numeric_type() != self.numeric_type() {
            return Err(CagraError::NumericMismatch {
                expected: self.numeric_type(),
                actual: queries.numeric_type(),
            });
        }
        Ok((0..queries.len())
            .into_par_iter()
            .map(|qi| {
                let query = queries.query_f32(qi);
                match &self.store {
                    VectorStore::F32(rows) => scan(rows, self.metric, &query, k),
                    VectorStore::F16(rows) => scan(rows, self.metric, &query, k),
                }
            })
            .collect())
    }

    /// Mean recall@k of `results` against this index, for the same batch.
    pub fn recall(&self, queries: &QueryBatch, results: &[SearchResult], k: usize) -> Result<f32> {
        let truth = self.search(queries, k)?;
        if truth.is_empty() {
            return Ok(1.0);
        }
        let total: f32 = truth
            .iter()
            .zip(results)
            .map(|(t, r)| {
                let t: Vec<u32> = t.iter().map(|&(id, _)| id).collect();
                let r: Vec<u32> = r.iter().map(|&(id, _)| id).collect();
                recall_at_k(&t, &r, k)
            })
            .sum();
        Ok(total / truth.len() as f32)
    }
}

fn scan<E: Element>(rows: &Rows<E>, metric: Metric, query: &[f32], k: usize) -> SearchResult {
    let mut all: Vec<(u32, f32)> = (0..rows.len())
        .map(|i| (i as u32, metric.distance(query, rows.row(i))))
        .collect();
    if all.len() > k {
        all.select_nth_unstable_by(k, |a, b| cmp_candidates(*a, *b));
        all.truncate(k);
    }
    all.sort_by(|a, b| cmp_candidates(*a, *b));
    all.into_iter()
        .map(|(id, d)| (id, metric.to_output(d)))
        .collect()
}

/// Recall@k: fraction of the true top-k found among the first k retrieved.
///
/// recall@k = |retrieved ∩ ground_truth| / k
pub fn recall_at_k(ground_truth: &[u32], retrieved: &[u32], k: usize) -> f32 {
    if k == 0 || ground_truth.is_empty() {
        return 0.0;
    }
    let truth: HashSet<u32> = ground_truth.iter().take(k).copied().collect();
    let hits = retrieved.iter().take(k).filter(|&&id| truth.contains(&id)).count();
    hits as f32 / k as f32
}
