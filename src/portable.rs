//! Host-side, context-independent form of a graph.

use crate::config::BuildConfig;
use crate::error::{CagraError, Result};
use crate::graph::Graph;
use crate::persistence::format;
use crate::precision::NumericType;
use crate::store::VectorStore;
use smallvec::SmallVec;
use std::io::{Read, Write};
use std::path::Path;

/// Neighbor list of one node.
pub type NeighborList = SmallVec<[u32; 32]>;

/// A graph in portable form: per-node neighbor lists plus everything needed
/// to make it resident again.
///
/// Produced by [`CagraIndex::to_host_form`](crate::CagraIndex::to_host_form)
/// in any context and consumed by
/// [`CagraIndex::from_host_form`](crate::CagraIndex::from_host_form) in any
/// other. [`to_bytes`](Self::to_bytes) gives its stable binary encoding.
///
/// The vectors may be detached ([`without_vectors`](Self::without_vectors))
/// to ship the graph alone; they must be re-attached before the graph can be
/// made resident.
#[derive(Debug, Clone, PartialEq)]
pub struct PortableGraph {
    pub(crate) dimension: usize,
    pub(crate) config: BuildConfig,
    pub(crate) degree: usize,
    pub(crate) neighbors: Vec<NeighborList>,
    pub(crate) numeric: NumericType,
    pub(crate) vectors: Option<VectorStore>,
}

impl PortableGraph {
    /// Assemble from parts, checking structural validity.
    ///
    /// Fails with `MalformedIndex` when a neighbor is out of range, a node
    /// links to itself or repeats a neighbor, a list exceeds `degree`,
    /// `degree` exceeds `n - 1` or the configured `graph_degree`, or the
    /// config holds out-of-range values;
    /// with `DimensionMismatch`/`NumericMismatch` when `vectors` disagree
    /// with the declared shape.
    pub fn from_parts(
        dimension: usize,
        config: BuildConfig,
        degree: usize,
        neighbors: Vec<NeighborList>,
        numeric: NumericType,
        vectors: Option<VectorStore>,
    ) -> Result<Self> {
        let graph = Self {
            dimension,
            config,
            degree,
            neighbors,
            numeric,
            vectors: None,
        };
        graph.validate()?;
        match vectors {
            Some(store) => graph.with_vectors(store),
            None => Ok(graph),
        }
    }

    pub(crate) fn from_graph(graph: &Graph) -> Self {
        Self {
            dimension: graph.dimension(),
            config: graph.config().clone(),
            degree: graph.degree(),
            neighbors: (0..graph.len() as u32)
                .map(|node| NeighborList::from_slice(graph.neighbors(node)))
                .collect(),
            numeric: graph.numeric_type(),
            vectors: Some(graph.store().clone()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(CagraError::malformed("dimension is 0"));
        }
        let n = self.neighbors.len();
        if n == 0 {
            return Err(CagraError::malformed("graph has no nodes"));
        }
        if self.degree > n - 1 {
            return Err(CagraError::malformed(format!(
                "degree {} exceeds {} for {n} nodes",
                self.degree,
                n - 1
            )));
        }
        if self.degree > self.config.graph_degree {
            return Err(CagraError::malformed(format!(
                "degree {} exceeds configured graph_degree {}",
                self.degree, self.config.graph_degree
            )));
        }
        self.config
            .validate_values()
            .map_err(|err| CagraError::malformed(format!("stored config: {err}")))?;
        let mut seen: Vec<u32> = Vec::with_capacity(self.degree.min(n));
        for (node, list) in self.neighbors.iter().enumerate() {
            if list.len() > self.degree {
                return Err(CagraError::malformed(format!(
                    "node {node} has {} neighbors, degree is {}",
                    list.len(),
                    self.degree
                )));
            }
            seen.clear();
            seen.extend_from_slice(list);
            seen.sort_unstable();
            if seen.windows(2).any(|w| w[0] == w[1]) {
                return Err(CagraError::malformed(format!("node {node} repeats a neighbor")));
            }
            for &nb in list.iter() {
                if nb as usize >= n {
                    return Err(CagraError::malformed(format!(
                        "node {node} links to {nb}, out of range for {n} vectors"
                    )));
                }
                if nb as usize == node {
                    return Err(CagraError::malformed(format!("node {node} links to itself")));
                }
            }
        }
        Ok(())
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Maximum out-degree R.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Build configuration the graph was produced with.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Storage representation of the vectors.
    pub fn numeric_type(&self) -> NumericType {
        self.numeric
    }

    /// Neighbor list of every node, in node order.
    pub fn neighbors(&self) -> &[NeighborList] {
        &self.neighbors
    }

    /// The vectors, unless detached.
    pub fn vectors(&self) -> Option<&VectorStore> {
        self.vectors.as_ref()
    }

    /// Whether the vectors are attached.
    pub fn has_vectors(&self) -> bool {
        self.vectors.is_some()
    }

    /// The same graph with the vectors detached.
    #[must_use]
    pub fn without_vectors(mut self) -> Self {
        self.vectors = None;
        self
    }

    /// Attach `vectors`, which must match the graph's count, dimension and
    /// representation.
    pub fn with_vectors(mut self, vectors: VectorStore) -> Result<Self> {
        if vectors.dimension() != self.dimension {
            return Err(CagraError::DimensionMismatch {
                expected: self.dimension,
                actual: vectors.dimension(),
            });
        }
        if vectors.numeric_type() != self.numeric {
            return Err(CagraError::NumericMismatch {
                expected: self.numeric,
                actual: vectors.numeric_type(),
            });
        }
        if vectors.len() != self.len() {
            return Err(CagraError::InvalidArgument(format!(
                "{} vectors for a graph of {} nodes",
                vectors.len(),
                self.len()
            )));
        }
        self.vectors = Some(vectors);
        Ok(self)
    }

    /// Binary encoding (see [`persistence::format`](crate::persistence::format)).
    pub fn to_bytes(&self) -> Vec<u8> {
        format::encode(self)
    }

    /// Decode [`to_bytes`](Self::to_bytes) output.
    ///
    /// Every malformed input (truncated, corrupted, foreign version) fails
    /// with `MalformedIndex`; nothing partial is returned.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        format::decode(bytes)
    }

    /// Write the binary encoding to `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Read a graph written by [`write_to`](Self::write_to).
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Save to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_to(std::io::BufWriter::new(file))
    }

    /// Load from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::read_from(std::io::BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::Metric;
    use crate::error::ErrorKind;

    fn sample() -> PortableGraph {
        let store = VectorStore::from_f32(vec![0.0, 1.0, 2.0], 1).unwrap();
        PortableGraph::from_parts(
            1,
            BuildConfig::brute_force(Metric::L2),
            2,
            vec![
                NeighborList::from_slice(&[1, 2]),
                NeighborList::from_slice(&[0]),
                NeighborList::from_slice(&[1]),
            ],
            NumericType::Float32,
            Some(store),
        )
        .unwrap()
    }

    #[test]
    fn rejects_structural_violations() {
        let cfg = BuildConfig::brute_force(Metric::L2);
        let lists = |l: Vec<Vec<u32>>| -> Vec<NeighborList> {
            l.into_iter().map(NeighborList::from_vec).collect()
        };
        for bad in [
            vec![vec![0], vec![0]],
            vec![vec![1, 1], vec![0]],
            vec![vec![7], vec![0]],
            vec![vec![1], vec![0], vec![0, 1, 0]],
        ] {
            let n = bad.len();
            let err =
                PortableGraph::from_parts(1, cfg.clone(), 2, lists(bad), NumericType::Float32, None)
                    .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedIndex, "n = {n}");
        }
    }

    #[test]
    fn rejects_degree_beyond_node_count() {
        let cfg = BuildConfig::brute_force(Metric::L2);
        let lists = vec![NeighborList::new(), NeighborList::new()];
        let err = PortableGraph::from_parts(1, cfg, 1 << 60, lists, NumericType::Float32, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedIndex);
        assert!(err.to_string().contains("degree"), "{err}");
    }

    #[test]
    fn rejects_out_of_range_config_values() {
        let mut cfg = BuildConfig::brute_force(Metric::L2);
        cfg.prune.reverse_edge_ratio = f32::NAN;
        let lists = vec![NeighborList::from_slice(&[1]), NeighborList::from_slice(&[0])];
        let err = PortableGraph::from_parts(1, cfg, 1, lists, NumericType::Float32, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedIndex);
    }

    #[test]
    fn vectors_detach_and_reattach() {
        let g = sample();
        let store = g.vectors().unwrap().clone();
        let bare = g.clone().without_vectors();
        assert!(!bare.has_vectors());
        assert_eq!(bare.with_vectors(store).unwrap(), g);
    }

    #[test]
    fn reattach_checks_shape() {
        let bare = sample().without_vectors();
        let wrong_dim = VectorStore::from_f32(vec![0.0; 6], 2).unwrap();
        assert_eq!(
            bare.clone().with_vectors(wrong_dim).unwrap_err().kind(),
            ErrorKind::DimensionMismatch
        );
        let wrong_type = VectorStore::from_f32_as_f16(&[0.0, 1.0, 2.0], 1).unwrap();
        assert!(matches!(
            bare.clone().with_vectors(wrong_type),
            Err(CagraError::NumericMismatch { .. })
        ));
        let wrong_len = VectorStore::from_f32(vec![0.0; 2], 1).unwrap();
        assert_eq!(
            bare.with_vectors(wrong_len).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.cagra");
        let g = sample();
        g.save(&path).unwrap();
        assert_eq!(PortableGraph::load(&path).unwrap(), g);
    }
}
