//! kNN graph construction: the exhaustive path and the IVF-PQ path.
//!
//! Both produce, for every row, up to `k` other rows ordered by ascending
//! distance (ties by index). Rows are processed in parallel; each worker
//! writes only its own row, so the output does not depend on scheduling.

use crate::config::IvfPqParams;
use crate::context::ExecutionContext;
use crate::distance::{cmp_candidates, Metric};
use crate::error::Result;
use crate::ivf_pq::IvfPqIndex;
use crate::precision::Element;
use crate::store::{Rows, VectorStore};
use rayon::prelude::*;

/// kNN lists, one per row, rank-ordered.
pub(crate) type KnnLists = Vec<Vec<u32>>;

/// Exact kNN graph.
pub(crate) fn brute_force(
    ctx: &ExecutionContext,
    store: &VectorStore,
    metric: Metric,
    k: usize,
) -> Result<KnnLists> {
    match store {
        VectorStore::F32(rows) => brute_force_rows(ctx, rows, metric, k),
        VectorStore::F16(rows) => brute_force_rows(ctx, rows, metric, k),
    }
}

fn brute_force_rows<E: Element>(
    ctx: &ExecutionContext,
    rows: &Rows<E>,
    metric: Metric,
    k: usize,
) -> Result<KnnLists> {
    let n = rows.len();
    ctx.install(|| {
        (0..n)
            .into_par_iter()
            .map(|i| {
                ctx.check()?;
                let query = crate::precision::widen(rows.row(i));
                let mut cands: Vec<(u32, f32)> = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| (j as u32, metric.distance(&query, rows.row(j))))
                    .collect();
                Ok(top_k(&mut cands, k))
            })
            .collect()
    })
}

/// Approximate kNN graph via IVF-PQ candidates refined with exact distances.
pub(crate) fn ivf_pq(
    ctx: &ExecutionContext,
    store: &VectorStore,
    metric: Metric,
    k: usize,
    params: &IvfPqParams,
    seed: u64,
) -> Result<KnnLists> {
    let index = ctx.install(|| IvfPqIndex::train(store, metric, &params.build, seed))?;
    ctx.check()?;
    tracing::debug!(
        code_bytes = index.size_bytes(),
        n_probes = params.search.n_probes,
        "IVF-PQ index trained, gathering candidates"
    );

    // +1: the row itself is usually its own best candidate.
    let pool = ((k as f64) * params.search.refine_rate as f64).ceil() as usize + 1;
    let n = store.len();
    ctx.install(|| {
        (0..n)
            .into_par_iter()
            .map(|i| {
                ctx.check()?;
                let query = store.row_f32(i);
                let approx = index.search(&query, params.search.n_probes, pool)?;
                let mut refined: Vec<(u32, f32)> = approx
                    .into_iter()
                    .filter(|&(j, _)| j as usize != i)
                    .map(|(j, _)| (j, exact_distance(store, metric, &query, j as usize)))
                    .collect();
                Ok(top_k(&mut refined, k))
            })
            .collect()
    })
}

fn exact_distance(store: &VectorStore, metric: Metric, query: &[f32], row: usize) -> f32 {
    match store {
        VectorStore::F32(rows) => metric.distance(query, rows.row(row)),
        VectorStore::F16(rows) => metric.distance(query, rows.row(row)),
    }
}

/// Best `k` ids of `cands`, ascending by (distance, id).
fn top_k(cands: &mut Vec<(u32, f32)>, k: usize) -> Vec<u32> {
    if cands.len() > k {
        cands.select_nth_unstable_by(k, |a, b| cmp_candidates(*a, *b));
        cands.truncate(k);
    }
    cands.sort_by(|a, b| cmp_candidates(*a, *b));
    cands.iter().map(|&(id, _)| id).collect()
}
