//! Canonical graph representation.

use crate::config::BuildConfig;
use crate::distance::Metric;
use crate::error::{CagraError, Result};
use crate::precision::NumericType;
use crate::store::VectorStore;

/// Padding value of unused adjacency slots.
pub const INVALID_NODE: u32 = u32::MAX;

/// A built proximity graph together with the vectors it indexes.
///
/// Adjacency is a fixed-stride table (`n × degree`), the layout a resident
/// index traverses. Slots past a node's out-degree hold [`INVALID_NODE`].
///
/// Invariants (checked by [`Graph::validate`]): every neighbor is in
/// `[0, n)`, no node links to itself, no neighbor repeats within a node, and
/// every out-degree is at most `degree`.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    store: VectorStore,
    config: BuildConfig,
    degree: usize,
    adjacency: Vec<u32>,
    lengths: Vec<u32>,
}

impl Graph {
    /// Assemble from per-node neighbor lists.
    pub(crate) fn from_lists<L: AsRef<[u32]>>(
        store: VectorStore,
        config: BuildConfig,
        degree: usize,
        lists: &[L],
    ) -> Result<Self> {
        let n = store.len();
        if lists.len() != n {
            return Err(CagraError::malformed(format!(
                "{} neighbor lists for {n} vectors",
                lists.len()
            )));
        }
        let slots = n
            .checked_mul(degree)
            .ok_or_else(|| CagraError::malformed(format!("{n} x {degree} adjacency overflows")))?;
        let mut adjacency = vec![INVALID_NODE; slots];
        let mut lengths = Vec::with_capacity(n);
        for (node, list) in lists.iter().enumerate() {
            let list = list.as_ref();
            if list.len() > degree {
                return Err(CagraError::malformed(format!(
                    "node {node} has {} neighbors, degree is {degree}",
                    list.len()
                )));
            }
            adjacency[node * degree..node * degree + list.len()].copy_from_slice(list);
            lengths.push(list.len() as u32);
        }
        let graph = Self {
            store,
            config,
            degree,
            adjacency,
            lengths,
        };
        graph.validate()?;
        Ok(graph)
    }

    /// Check the structural invariants.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        let mut seen = Vec::with_capacity(self.degree);
        for node in 0..n {
            seen.clear();
            for &nb in self.neighbors(node as u32) {
                if nb as usize >= n {
                    return Err(CagraError::malformed(format!(
                        "node {node} links to {nb}, out of range for {n} vectors"
                    )));
                }
                if nb as usize == node {
                    return Err(CagraError::malformed(format!("node {node} links to itself")));
                }
                if seen.contains(&nb) {
                    return Err(CagraError::malformed(format!(
                        "node {node} links to {nb} twice"
                    )));
                }
                seen.push(nb);
            }
        }
        Ok(())
    }

    /// Out-neighbors of `node`.
    #[inline]
    pub fn neighbors(&self, node: u32) -> &[u32] {
        let start = node as usize * self.degree;
        &self.adjacency[start..start + self.lengths[node as usize] as usize]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.store.dimension()
    }

    /// Maximum out-degree R.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Distance metric.
    pub fn metric(&self) -> Metric {
        self.config.metric
    }

    /// Build configuration the graph was produced with.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Storage representation of the vectors.
    pub fn numeric_type(&self) -> NumericType {
        self.store.numeric_type()
    }

    /// The indexed vectors.
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Per-node neighbor lists.
    pub fn to_lists(&self) -> Vec<Vec<u32>> {
        (0..self.len() as u32)
            .map(|node| self.neighbors(node).to_vec())
            .collect()
    }

    /// Bytes a resident copy occupies: vectors + adjacency table + lengths.
    pub fn size_bytes(&self) -> usize {
        // The table is already allocated, so this cannot overflow.
        resident_bytes(&self.store, self.degree).unwrap_or(usize::MAX)
    }
}

/// Bytes a resident graph over `store` with out-degree `degree` occupies.
///
/// `InsufficientMemory` when the size does not fit in `usize`.
pub(crate) fn resident_bytes(store: &VectorStore, degree: usize) -> Result<usize> {
    degree
        .checked_add(1)
        .and_then(|slots| slots.checked_mul(store.len()))
        .and_then(|words| words.checked_mul(std::mem::size_of::<u32>()))
        .and_then(|table| table.checked_add(store.size_bytes()))
        .ok_or(CagraError::InsufficientMemory {
            requested: usize::MAX,
            available: 0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(n: usize) -> VectorStore {
        VectorStore::from_f32((0..n * 2).map(|i| i as f32).collect(), 2).unwrap()
    }

    #[test]
    fn neighbors_skip_padding() {
        let lists = vec![vec![1, 2], vec![0], vec![]];
        let g = Graph::from_lists(store(3), BuildConfig::default(), 2, &lists).unwrap();
        assert_eq!(g.neighbors(0), &[1, 2]);
        assert_eq!(g.neighbors(1), &[0]);
        assert!(g.neighbors(2).is_empty());
        assert_eq!(g.to_lists(), lists);
    }

    #[test]
    fn rejects_self_loops_and_out_of_range() {
        let cfg = BuildConfig::default();
        assert!(Graph::from_lists(store(2), cfg.clone(), 1, &[vec![0], vec![0]]).is_err());
        assert!(Graph::from_lists(store(2), cfg.clone(), 1, &[vec![5], vec![0]]).is_err());
        assert!(Graph::from_lists(store(3), cfg.clone(), 2, &[vec![1, 1], vec![0], vec![0]]).is_err());
        assert!(Graph::from_lists(store(2), cfg, 1, &[vec![1, 0], vec![0]]).is_err());
    }

    #[test]
    fn oversized_degree_is_an_error_not_an_abort() {
        let err = Graph::from_lists(store(2), BuildConfig::default(), usize::MAX, &[vec![1], vec![0]])
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedIndex);
        let err = resident_bytes(&store(2), 1 << 62).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InsufficientMemory);
    }
}
