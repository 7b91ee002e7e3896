//! Batched beam search over a [`Graph`].
//!
//! # Algorithm
//!
//! Every query keeps an *itopk buffer*: the best `itopk` nodes evaluated so
//! far, sorted by (distance, index), each flagged once it has been expanded.
//!
//! ```text
//! seed buffer with random entry points
//! loop:
//!     parents  = best `search_width` unexpanded buffer entries
//!     if none: stop                      (nothing closer is reachable)
//!     evaluate unvisited neighbors of the parents
//!     merge into buffer, sort, truncate to itopk
//! ```
//!
//! `max_iterations` and `max_visitations` optionally bound the work per
//! query. Entry points come from a per-query RNG seeded with `seed` mixed
//! with a CRC32 of the query's bits, so a query's traversal depends only on
//! the graph, the parameters and the query itself: it gets the same results
//! in any batch, at any position, in every context.
//!
//! Queries are independent and run in parallel on the context's workers.
//! Distance reductions do not depend on the worker thread, so results are
//! reproducible bit for bit.

use crate::config::SearchParams;
use crate::context::ExecutionContext;
use crate::distance::{cmp_candidates, Metric};
use crate::error::{CagraError, Result};
use crate::graph::Graph;
use crate::precision::Element;
use crate::store::{QueryBatch, Rows, VectorStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::HashSet;

/// Neighbors of one query: `(index, distance)` pairs, best first.
///
/// Distances are squared L2 distances (ascending) or inner-product scores
/// (descending). Ties are broken by ascending index.
pub type SearchResult = Vec<(u32, f32)>;

/// Check the call arguments against `graph`.
pub(crate) fn validate(
    graph: &Graph,
    queries: &QueryBatch,
    k: usize,
    params: &SearchParams,
) -> Result<()> {
    if k == 0 {
        return Err(CagraError::InvalidArgument("k must be greater than 0".to_string()));
    }
    if k > graph.len() {
        return Err(CagraError::InvalidArgument(format!(
            "k = {k} exceeds the {} indexed vectors",
            graph.len()
        )));
    }
    if queries.dimension() != graph.dimension() {
        return Err(CagraError::DimensionMismatch {
            expected: graph.dimension(),
            actual: queries.dimension(),
        });
    }
    if queries.numeric_type() != graph.numeric_type() {
        return Err(CagraError::NumericMismatch {
            expected: graph.numeric_type(),
            actual: queries.numeric_type(),
        });
    }
    params.validate()
}

/// Search every query of `queries`; results come back in batch order.
pub(crate) fn search(
    ctx: &ExecutionContext,
    graph: &Graph,
    queries: &QueryBatch,
    k: usize,
    params: &SearchParams,
) -> Result<Vec<SearchResult>> {
    ctx.check()?;
    validate(graph, queries, k, params)?;
    if queries.is_empty() {
        return Ok(Vec::new());
    }

    let results = ctx.install(|| {
        (0..queries.len())
            .into_par_iter()
            .map(|qi| {
                ctx.check()?;
                let query = queries.query_f32(qi);
                let seed = query_seed(params.seed, &query);
                Ok(match graph.store() {
                    VectorStore::F32(rows) => search_one(graph, rows, &query, k, params, seed),
                    VectorStore::F16(rows) => search_one(graph, rows, &query, k, params, seed),
                })
            })
            .collect::<Result<Vec<_>>>()
    })?;
    // A cancel racing the last query must not hand back a batch as complete.
    ctx.check()?;

    tracing::trace!(queries = queries.len(), k, "search batch done");
    Ok(results)
}

/// Entry point seed for `query`, independent of its batch position.
fn query_seed(base: u64, query: &[f32]) -> u64 {
    let mut hasher = crc32fast::Hasher::new();
    for v in query {
        hasher.update(&v.to_bits().to_le_bytes());
    }
    base ^ u64::from(hasher.finalize()).wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

#[derive(Clone, Copy)]
struct Entry {
    id: u32,
    dist: f32,
    expanded: bool,
}

fn search_one<E: Element>(
    graph: &Graph,
    rows: &Rows<E>,
    query: &[f32],
    k: usize,
    params: &SearchParams,
    seed: u64,
) -> SearchResult {
    let metric = graph.metric();
    let n = graph.len();
    let itopk = params.itopk_size.max(k);
    let budget = match params.max_visitations {
        0 => usize::MAX,
        v => v,
    };

    let mut visited: HashSet<u32> = HashSet::with_capacity(itopk * 4);
    let mut buffer: Vec<Entry> = Vec::with_capacity(itopk + params.search_width * graph.degree());

    let mut rng = StdRng::seed_from_u64(seed);
    let entry_count = params.entry_point_count.min(n).min(budget);
    for id in rand::seq::index::sample(&mut rng, n, entry_count) {
        let id = id as u32;
        visited.insert(id);
        buffer.push(Entry {
            id,
            dist: metric.distance(query, rows.row(id as usize)),
            expanded: false,
        });
    }
    sort_and_truncate(&mut buffer, itopk);

    let mut iterations = 0usize;
    let mut parents: Vec<u32> = Vec::with_capacity(params.search_width);
    'search: loop {
        if params.max_iterations > 0 && iterations >= params.max_iterations {
            break;
        }
        parents.clear();
        for entry in buffer.iter_mut().filter(|e| !e.expanded) {
            entry.expanded = true;
            parents.push(entry.id);
            if parents.len() == params.search_width {
                break;
            }
        }
        if parents.is_empty() {
            break;
        }
        iterations += 1;

        for &parent in &parents {
            for &nb in graph.neighbors(parent) {
                if visited.len() >= budget {
                    sort_and_truncate(&mut buffer, itopk);
                    break 'search;
                }
                if !visited.insert(nb) {
                    continue;
                }
                buffer.push(Entry {
                    id: nb,
                    dist: metric.distance(query, rows.row(nb as usize)),
                    expanded: false,
                });
            }
        }
        sort_and_truncate(&mut buffer, itopk);
    }

    let mut found: Vec<(u32, f32)> = buffer.iter().map(|e| (e.id, e.dist)).collect();
    if found.len() < k {
        top_up(&mut found, rows, metric, query, &visited, k);
    }
    found.truncate(k);
    found
        .into_iter()
        .map(|(id, d)| (id, metric.to_output(d)))
        .collect()
}

fn sort_and_truncate(buffer: &mut Vec<Entry>, itopk: usize) {
    buffer.sort_by(|a, b| cmp_candidates((a.id, a.dist), (b.id, b.dist)));
    buffer.truncate(itopk);
}

/// Fill `found` to `k` entries with an exact scan of the rows never evaluated.
fn top_up<E: Element>(
    found: &mut Vec<(u32, f32)>,
    rows: &Rows<E>,
    metric: Metric,
    query: &[f32],
    visited: &HashSet<u32>,
    k: usize,
) {
    let missing = k - found.len();
    let mut rest: Vec<(u32, f32)> = (0..rows.len() as u32)
        .filter(|id| !visited.contains(id))
        .map(|id| (id, metric.distance(query, rows.row(id as usize))))
        .collect();
    if rest.len() > missing {
        rest.select_nth_unstable_by(missing, |a, b| cmp_candidates(*a, *b));
        rest.truncate(missing);
    }
    found.extend(rest);
    found.sort_by(|a, b| cmp_candidates(*a, *b));
}
