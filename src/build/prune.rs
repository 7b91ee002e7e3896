//! Rank-based detour pruning and reverse-edge merging.
//!
//! Turns the intermediate kNN graph (degree K, rank-ordered) into the final
//! fixed-degree graph (degree R).
//!
//! # Algorithm
//!
//! An edge A→C at rank `j` of A's list is *detourable* through B at rank `i`
//! when C also sits at rank `r` of B's list and `max(i, r) < j`: the two-hop
//! path A→B→C uses only edges that rank better than A→C itself. Edges with
//! many detours are redundant for navigation. Only ranks are compared, no
//! distances are evaluated.
//!
//! 1. Count detours of every edge.
//! 2. Order each node's candidates by `(detours, rank)` and keep R.
//! 3. Add reverse edges: a slice of every final list is given to nodes that
//!    point *at* this node.
//!
//! ## References
//!
//! - Ootomo et al. (2023). "CAGRA: Highly Parallel Graph Construction and
//!   Approximate Nearest Neighbor Search for GPUs."

use crate::config::PruneParams;
use crate::context::ExecutionContext;
use crate::error::Result;
use rayon::prelude::*;
use std::collections::HashMap;

/// Prune `knn` (per-node lists, ascending distance) to out-degree `degree`.
pub(crate) fn prune(
    ctx: &ExecutionContext,
    knn: &[Vec<u32>],
    degree: usize,
    params: &PruneParams,
) -> Result<Vec<Vec<u32>>> {
    let forward: Vec<Vec<u32>> = ctx.install(|| {
        knn.par_iter()
            .enumerate()
            .map(|(node, list)| {
                ctx.check()?;
                Ok(prune_node(node as u32, list, knn, degree, params.detour_tolerance))
            })
            .collect::<Result<_>>()
    })?;
    ctx.check()?;

    let dropped: usize = knn
        .iter()
        .zip(&forward)
        .map(|(k, f)| k.len().min(degree) - f.len())
        .sum();
    tracing::debug!(degree, dropped, "detour pruning done, merging reverse edges");

    Ok(ctx.install(|| merge_reverse(&forward, degree, params.reverse_edge_ratio)))
}

/// Detour count of every edge in `list`, indexed by rank.
fn detour_counts(node: u32, list: &[u32], knn: &[Vec<u32>]) -> Vec<u32> {
    let rank: HashMap<u32, usize> = list.iter().enumerate().map(|(j, &c)| (c, j)).collect();
    let mut detours = vec![0u32; list.len()];
    for (i, &b) in list.iter().enumerate() {
        for (r, &c) in knn[b as usize].iter().enumerate() {
            if c == node {
                continue;
            }
            if let Some(&j) = rank.get(&c) {
                if i.max(r) < j {
                    detours[j] += 1;
                }
            }
        }
    }
    detours
}

fn prune_node(
    node: u32,
    list: &[u32],
    knn: &[Vec<u32>],
    degree: usize,
    tolerance: Option<u32>,
) -> Vec<u32> {
    let detours = detour_counts(node, list, knn);
    let mut order: Vec<usize> = (0..list.len())
        .filter(|&j| list[j] != node)
        .filter(|&j| tolerance.map_or(true, |t| detours[j] <= t))
        .collect();
    order.sort_by_key(|&j| (detours[j], j));
    order.truncate(degree);
    order.into_iter().map(|j| list[j]).collect()
}

/// Interleave forward and reverse edges into final lists of at most `degree`.
///
/// Reverse lists are ordered by the position the edge held in its source's
/// pruned list, then by source id, so the best-ranked incoming edges win.
fn merge_reverse(forward: &[Vec<u32>], degree: usize, ratio: f32) -> Vec<Vec<u32>> {
    let n = forward.len();
    let mut reverse: Vec<Vec<(usize, u32)>> = vec![Vec::new(); n];
    for (src, list) in forward.iter().enumerate() {
        for (pos, &dst) in list.iter().enumerate() {
            reverse[dst as usize].push((pos, src as u32));
        }
    }

    let reverse_slots = ((degree as f64) * ratio as f64).floor() as usize;
    let forward_slots = degree - reverse_slots.min(degree);

    forward
        .par_iter()
        .zip(reverse.par_iter_mut())
        .enumerate()
        .map(|(node, (fwd, rev))| {
            rev.sort_unstable();
            let mut out: Vec<u32> = Vec::with_capacity(degree);
            out.extend(fwd.iter().take(forward_slots).copied());
            for &(_, src) in rev.iter() {
                if out.len() >= degree {
                    break;
                }
                if src as usize != node && !out.contains(&src) {
                    out.push(src);
                }
            }
            for &dst in fwd.iter().skip(forward_slots) {
                if out.len() >= degree {
                    break;
                }
                if !out.contains(&dst) {
                    out.push(dst);
                }
            }
            out
        })
        .collect()
}
