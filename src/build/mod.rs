//! Graph construction.
//!
//! Two stages, both running on the context's workers:
//!
//! 1. **kNN graph** of degree K (`intermediate_graph_degree`), either exact
//!    ([`BuildAlgo::BruteForceKnn`]) or from IVF-PQ candidates refined with
//!    exact distances ([`BuildAlgo::IvfPq`]).
//! 2. **Pruning** down to degree R (`graph_degree`), see [`prune`].
//!
//! For tiny datasets both degrees are clamped to `n - 1`.

pub(crate) mod knn;
pub(crate) mod prune;

use crate::config::{BuildAlgo, BuildConfig, IvfPqBuildParams};
use crate::context::{ExecutionContext, Reservation};
use crate::error::Result;
use crate::graph::{resident_bytes, Graph};
use crate::store::VectorStore;
use std::time::Instant;

/// Build a graph over `store` resident in `ctx`.
///
/// The returned reservation accounts for the resident graph; intermediate
/// kNN lists are reserved for the duration of the build only.
pub(crate) fn build_graph(
    ctx: &ExecutionContext,
    store: VectorStore,
    config: &BuildConfig,
) -> Result<(Graph, Reservation)> {
    ctx.check()?;
    let n = store.len();
    config.validate(n, store.dimension())?;

    let k = config.intermediate_graph_degree.min(n - 1);
    let r = config.graph_degree.min(k);

    let resident = ctx.memory().reserve(resident_bytes(&store, r)?)?;
    let scratch = ctx
        .memory()
        .reserve(n * k * std::mem::size_of::<u32>())?;
    let codes = match &config.build_algo {
        BuildAlgo::IvfPq(params) if k > 0 => Some(
            ctx.memory()
                .reserve(ivf_pq_bytes(n, store.dimension(), &params.build))?,
        ),
        _ => None,
    };

    let start = Instant::now();
    tracing::info!(
        n,
        dimension = store.dimension(),
        metric = ?config.metric,
        algo = config.build_algo.name(),
        graph_degree = r,
        intermediate_degree = k,
        residency = %ctx.residency(),
        "building graph"
    );

    let knn = if k == 0 {
        vec![Vec::new(); n]
    } else {
        match &config.build_algo {
            BuildAlgo::BruteForceKnn => knn::brute_force(ctx, &store, config.metric, k)?,
            BuildAlgo::IvfPq(params) => {
                knn::ivf_pq(ctx, &store, config.metric, k, params, config.seed)?
            }
        }
    };
    drop(codes);
    ctx.check()?;
    tracing::debug!(elapsed = ?start.elapsed(), "kNN graph ready");

    let lists = prune::prune(ctx, &knn, r, &config.prune)?;
    drop(knn);
    drop(scratch);

    let graph = Graph::from_lists(store, config.clone(), r, &lists)?;
    tracing::info!(
        elapsed = ?start.elapsed(),
        bytes = graph.size_bytes(),
        "graph built"
    );
    Ok((graph, resident))
}

/// Bytes of the IVF-PQ candidate index: codes, list ids, coarse centroids.
fn ivf_pq_bytes(n: usize, d: usize, params: &IvfPqBuildParams) -> usize {
    n * params.effective_pq_dim(d) + n * std::mem::size_of::<u32>() + params.n_lists * d * 4
}
