//! IVF-PQ index used to generate kNN candidates during graph construction.

use super::pq::ProductQuantizer;
use crate::config::IvfPqBuildParams;
use crate::distance::{cmp_candidates, Metric};
use crate::error::Result;
use crate::partitioning::KMeans;
use crate::store::VectorStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

/// IVF-PQ index over a [`VectorStore`].
///
/// Vectors are grouped by nearest coarse centroid; each vector's residual
/// against its centroid is stored as PQ codes. Full-precision rows are not
/// copied: the index only answers approximate queries.
pub struct IvfPqIndex {
    dimension: usize,
    metric: Metric,
    coarse: KMeans,
    lists: Vec<Vec<u32>>,
    pq: ProductQuantizer,
    /// Flattened codes: stride = `pq.code_len()`.
    codes: Vec<u8>,
}

impl IvfPqIndex {
    /// Train the coarse quantizer and the PQ codebooks on a sample of `store`,
    /// then encode every row.
    ///
    /// Must run inside the owning context's thread pool.
    pub fn train(
        store: &VectorStore,
        metric: Metric,
        params: &IvfPqBuildParams,
        seed: u64,
    ) -> Result<Self> {
        let n = store.len();
        let dimension = store.dimension();

        let train_rows = trainset_rows(n, params, seed);
        let mut trainset = Vec::with_capacity(train_rows.len() * dimension);
        for &i in &train_rows {
            trainset.extend_from_slice(&store.row_f32(i));
        }
        tracing::debug!(
            n_lists = params.n_lists,
            trainset = train_rows.len(),
            "training coarse quantizer"
        );

        let mut coarse = KMeans::new(dimension, params.n_lists)?
            .with_seed(seed)
            .with_max_iters(params.kmeans_n_iters);
        coarse.fit(&trainset, train_rows.len())?;

        // Residuals of the training sample against their coarse centroids.
        let train_assign = coarse.assign_clusters(&trainset, train_rows.len());
        let mut residuals = trainset;
        for (i, &c) in train_assign.iter().enumerate() {
            let centroid = coarse.centroid(c);
            for (r, &cv) in residuals[i * dimension..(i + 1) * dimension]
                .iter_mut()
                .zip(centroid)
            {
                *r -= cv;
            }
        }

        let pq_dim = params.effective_pq_dim(dimension);
        let mut pq = ProductQuantizer::new(dimension, pq_dim, 1 << params.pq_bits)?;
        pq.fit(
            &residuals,
            train_rows.len(),
            seed.wrapping_add(1),
            params.kmeans_n_iters,
        )?;
        tracing::debug!(pq_dim, codebook = pq.codebook_size(), "trained product quantizer");

        // Encode every row.
        let encoded: Vec<(usize, Vec<u8>)> = (0..n)
            .into_par_iter()
            .map(|i| {
                let mut row = store.row_f32(i);
                let (c, _) = coarse.nearest(&row);
                for (r, &cv) in row.iter_mut().zip(coarse.centroid(c)) {
                    *r -= cv;
                }
                (c, pq.quantize(&row))
            })
            .collect();

        let mut lists = vec![Vec::new(); params.n_lists];
        let mut codes = Vec::with_capacity(n * pq.code_len());
        for (i, (c, row_codes)) in encoded.into_iter().enumerate() {
            lists[c].push(i as u32);
            codes.extend_from_slice(&row_codes);
        }

        Ok(Self {
            dimension,
            metric,
            coarse,
            lists,
            pq,
            codes,
        })
    }

    /// Approximate top-`top` candidates for `query`, probing `n_probes` lists.
    ///
    /// Returned as (index, approximate distance), ascending.
    pub fn search(&self, query: &[f32], n_probes: usize, top: usize) -> Result<Vec<(u32, f32)>> {
        let mut probes: Vec<(u32, f32)> = (0..self.coarse.k())
            .map(|c| (c as u32, self.metric.distance(query, self.coarse.centroid(c))))
            .collect();
        probes.sort_by(|a, b| cmp_candidates(*a, *b));
        probes.truncate(n_probes.min(self.coarse.k()));

        let code_len = self.pq.code_len();
        let mut out: Vec<(u32, f32)> = Vec::new();

        // Inner product: q·(c + r) = q·c + q·r, one table serves every list.
        let shared_table = match self.metric {
            Metric::InnerProduct => Some(self.pq.compute_adc_table(query, Metric::InnerProduct)?),
            Metric::L2 => None,
        };

        let mut residual = vec![0.0f32; self.dimension];
        for &(list, coarse_dist) in &probes {
            let members = &self.lists[list as usize];
            if members.is_empty() {
                continue;
            }
            let (table, offset) = match &shared_table {
                Some(table) => (std::borrow::Cow::Borrowed(table), coarse_dist),
                None => {
                    let centroid = self.coarse.centroid(list as usize);
                    for ((r, &q), &c) in residual.iter_mut().zip(query).zip(centroid) {
                        *r = q - c;
                    }
                    (
                        std::borrow::Cow::Owned(self.pq.compute_adc_table(&residual, Metric::L2)?),
                        0.0,
                    )
                }
            };
            for &id in members {
                let codes = &self.codes[id as usize * code_len..(id as usize + 1) * code_len];
                out.push((id, offset + self.pq.distance_with_table(&table, codes)));
            }
        }

        if out.len() > top {
            out.select_nth_unstable_by(top, |a, b| cmp_candidates(*a, *b));
            out.truncate(top);
        }
        out.sort_by(|a, b| cmp_candidates(*a, *b));
        Ok(out)
    }

    /// Encoded size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.codes.len()
            + self.lists.iter().map(|l| l.len() * 4).sum::<usize>()
            + self.coarse.centroids().len() * 4
    }

    /// Sizes of the inverted lists.
    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(Vec::len).collect()
    }
}

/// Training sample: `max(n_lists, ceil(n * fraction))` distinct rows, ascending.
pub(crate) fn trainset_rows(n: usize, params: &IvfPqBuildParams, seed: u64) -> Vec<usize> {
    let wanted = ((n as f64) * params.kmeans_trainset_fraction).ceil() as usize;
    let m = wanted.max(params.n_lists).min(n);
    if m == n {
        return (0..n).collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = rand::seq::index::sample(&mut rng, n, m).into_vec();
    rows.sort_unstable();
    rows
}
