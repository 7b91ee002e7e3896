//! Build, pruning and search configuration.

use crate::distance::Metric;
use crate::error::{CagraError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for graph construction.
///
/// Immutable once handed to [`CagraIndex::build`](crate::CagraIndex::build).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Distance metric.
    pub metric: Metric,
    /// Final out-degree (R) of every node.
    pub graph_degree: usize,
    /// Neighbors per node in the kNN graph fed to the pruning pass.
    pub intermediate_graph_degree: usize,
    /// How the kNN graph is produced.
    pub build_algo: BuildAlgo,
    /// Pruning pass tunables.
    pub prune: PruneParams,
    /// Seed for every sampling/clustering step.
    pub seed: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            metric: Metric::L2,
            graph_degree: 64,
            intermediate_graph_degree: 128,
            build_algo: BuildAlgo::IvfPq(IvfPqParams::default()),
            prune: PruneParams::default(),
            seed: 0x5eed_ca62,
        }
    }
}

impl BuildConfig {
    /// Default config for `metric`.
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            ..Self::default()
        }
    }

    /// Exact kNN graph construction.
    pub fn brute_force(metric: Metric) -> Self {
        Self {
            metric,
            build_algo: BuildAlgo::BruteForceKnn,
            ..Self::default()
        }
    }

    /// IVF-PQ assisted construction.
    pub fn ivf_pq(metric: Metric, params: IvfPqParams) -> Self {
        Self {
            metric,
            build_algo: BuildAlgo::IvfPq(params),
            ..Self::default()
        }
    }

    /// Set R and the intermediate degree together.
    #[must_use]
    pub fn with_degrees(mut self, graph_degree: usize, intermediate_graph_degree: usize) -> Self {
        self.graph_degree = graph_degree;
        self.intermediate_graph_degree = intermediate_graph_degree;
        self
    }

    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check internal consistency against a dataset of `n` vectors of dimension `d`.
    pub fn validate(&self, n: usize, d: usize) -> Result<()> {
        if n == 0 {
            return Err(CagraError::config("cannot build a graph over an empty dataset"));
        }
        if d == 0 {
            return Err(CagraError::config("dimension must be greater than 0"));
        }
        if n > u32::MAX as usize {
            return Err(CagraError::config("more than u32::MAX vectors"));
        }
        self.validate_values()?;
        if let BuildAlgo::IvfPq(params) = &self.build_algo {
            params.validate_shape(n, d)?;
        }
        Ok(())
    }

    /// The checks of [`validate`](Self::validate) that do not depend on the
    /// dataset: degrees, finite ranges of every float, parameter bounds.
    pub fn validate_values(&self) -> Result<()> {
        if self.graph_degree == 0 {
            return Err(CagraError::config("graph_degree must be greater than 0"));
        }
        if self.intermediate_graph_degree < self.graph_degree {
            return Err(CagraError::config(format!(
                "intermediate_graph_degree ({}) must be >= graph_degree ({})",
                self.intermediate_graph_degree, self.graph_degree
            )));
        }
        self.prune.validate()?;
        if let BuildAlgo::IvfPq(params) = &self.build_algo {
            params.validate_values()?;
        }
        Ok(())
    }
}

/// Graph construction strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BuildAlgo {
    /// Exact kNN graph by exhaustive distance computation.
    BruteForceKnn,
    /// Candidate neighbors from an IVF-PQ index, refined with exact distances.
    IvfPq(IvfPqParams),
}

impl BuildAlgo {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            BuildAlgo::BruteForceKnn => 0,
            BuildAlgo::IvfPq(_) => 1,
        }
    }

    /// Human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            BuildAlgo::BruteForceKnn => "brute_force_knn",
            BuildAlgo::IvfPq(_) => "ivf_pq",
        }
    }
}

/// IVF-PQ construction parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IvfPqParams {
    /// Index-side parameters.
    pub build: IvfPqBuildParams,
    /// Candidate search parameters.
    pub search: IvfPqSearchParams,
}

impl IvfPqParams {
    fn validate_values(&self) -> Result<()> {
        let b = &self.build;
        if b.n_lists == 0 {
            return Err(CagraError::config("n_lists must be greater than 0"));
        }
        if !(b.kmeans_trainset_fraction > 0.0 && b.kmeans_trainset_fraction <= 1.0) {
            return Err(CagraError::config(format!(
                "kmeans_trainset_fraction must be in (0, 1], got {}",
                b.kmeans_trainset_fraction
            )));
        }
        if b.kmeans_n_iters == 0 {
            return Err(CagraError::config("kmeans_n_iters must be greater than 0"));
        }
        if !(4..=8).contains(&b.pq_bits) {
            return Err(CagraError::config(format!(
                "pq_bits must be in 4..=8, got {}",
                b.pq_bits
            )));
        }
        let s = &self.search;
        if s.n_probes == 0 {
            return Err(CagraError::config("n_probes must be greater than 0"));
        }
        if !(s.refine_rate >= 1.0 && s.refine_rate.is_finite()) {
            return Err(CagraError::config(format!(
                "refine_rate must be a finite value >= 1, got {}",
                s.refine_rate
            )));
        }
        Ok(())
    }

    fn validate_shape(&self, n: usize, d: usize) -> Result<()> {
        let b = &self.build;
        if b.n_lists > n {
            return Err(CagraError::config(format!(
                "n_lists ({}) exceeds dataset size ({n})",
                b.n_lists
            )));
        }
        let pq_dim = b.effective_pq_dim(d);
        if pq_dim == 0 || d % pq_dim != 0 {
            return Err(CagraError::config(format!(
                "pq_dim ({pq_dim}) must divide the dimension ({d})"
            )));
        }
        Ok(())
    }
}

/// Coarse clustering and quantizer parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IvfPqBuildParams {
    /// Number of coarse clusters (inverted lists).
    pub n_lists: usize,
    /// Lloyd iterations for the coarse k-means.
    pub kmeans_n_iters: usize,
    /// Fraction of the dataset used to train k-means and the quantizer.
    pub kmeans_trainset_fraction: f64,
    /// Bits per PQ code (4..=8).
    pub pq_bits: usize,
    /// Number of PQ sub-spaces; 0 picks a divisor of `d` automatically.
    pub pq_dim: usize,
}

impl Default for IvfPqBuildParams {
    fn default() -> Self {
        Self {
            n_lists: 1024,
            kmeans_n_iters: 20,
            kmeans_trainset_fraction: 0.5,
            pq_bits: 8,
            pq_dim: 0,
        }
    }
}

impl IvfPqBuildParams {
    /// `pq_dim`, resolving 0 to the largest divisor of `d` that is at most `d / 2`
    /// (or `d` itself for `d == 1`).
    pub fn effective_pq_dim(&self, d: usize) -> usize {
        if self.pq_dim != 0 {
            return self.pq_dim;
        }
        if d <= 1 {
            return d;
        }
        (1..=d / 2).rev().find(|m| d % m == 0).unwrap_or(1)
    }
}

/// Candidate search parameters for the IVF-PQ path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IvfPqSearchParams {
    /// Inverted lists probed per vector.
    pub n_probes: usize,
    /// Candidates kept per vector before exact refinement, as a multiple of
    /// the intermediate degree.
    pub refine_rate: f32,
}

impl Default for IvfPqSearchParams {
    fn default() -> Self {
        Self {
            n_probes: 20,
            refine_rate: 2.0,
        }
    }
}

/// Pruning pass tunables.
///
/// The pass orders each node's kNN candidates by how many two-hop detours
/// make them redundant, keeps the R least redundant, then merges in reverse
/// edges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PruneParams {
    /// Drop edges with more than this many detours even if the node ends up
    /// below R. `None` (default) only reorders and truncates.
    pub detour_tolerance: Option<u32>,
    /// Fraction of R reserved for reverse edges (default 0.5).
    pub reverse_edge_ratio: f32,
}

impl Default for PruneParams {
    fn default() -> Self {
        Self {
            detour_tolerance: None,
            reverse_edge_ratio: 0.5,
        }
    }
}

impl PruneParams {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.reverse_edge_ratio) {
            return Err(CagraError::config(format!(
                "reverse_edge_ratio must be in [0, 1], got {}",
                self.reverse_edge_ratio
            )));
        }
        Ok(())
    }
}

/// Search parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Width of the internal top-k buffer (raised to `k` when smaller).
    pub itopk_size: usize,
    /// Parents expanded per iteration.
    pub search_width: usize,
    /// Iteration cap; 0 runs until the buffer converges.
    pub max_iterations: usize,
    /// Distance evaluation budget per query; 0 is unbounded.
    pub max_visitations: usize,
    /// Random entry points sampled per query.
    pub entry_point_count: usize,
    /// Seed for entry point sampling, mixed with a hash of each query.
    pub seed: u64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            itopk_size: 64,
            search_width: 1,
            max_iterations: 0,
            max_visitations: 0,
            entry_point_count: 32,
            seed: 0x1234_5678,
        }
    }
}

impl SearchParams {
    /// Lower latency, lower recall.
    pub fn fast() -> Self {
        Self {
            itopk_size: 32,
            entry_point_count: 16,
            ..Self::default()
        }
    }

    /// Higher recall.
    pub fn high_recall() -> Self {
        Self {
            itopk_size: 256,
            search_width: 4,
            entry_point_count: 64,
            ..Self::default()
        }
    }

    /// Set `itopk_size`.
    #[must_use]
    pub fn with_itopk(mut self, itopk_size: usize) -> Self {
        self.itopk_size = itopk_size;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.search_width == 0 {
            return Err(CagraError::InvalidArgument(
                "search_width must be greater than 0".to_string(),
            ));
        }
        if self.entry_point_count == 0 {
            return Err(CagraError::InvalidArgument(
                "entry_point_count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
