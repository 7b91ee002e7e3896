//! Context-resident CAGRA index.

use crate::build;
use crate::config::{BuildConfig, SearchParams};
use crate::context::{ExecutionContext, Reservation, Residency};
use crate::distance::Metric;
use crate::error::{CagraError, Result};
use crate::graph::{resident_bytes, Graph};
use crate::portable::PortableGraph;
use crate::precision::NumericType;
use crate::search::{self, SearchResult};
use crate::store::{QueryBatch, VectorStore};
use std::sync::Arc;

/// A graph resident in an [`ExecutionContext`].
///
/// Cloning is cheap: clones share the graph and its memory reservation,
/// which returns to the context's pool when the last clone is dropped.
/// Searches take `&self` and may run concurrently from many threads.
///
/// # Example
///
/// ```
/// use cagra::{BuildConfig, CagraIndex, ExecutionContext, Metric, QueryBatch, SearchParams, VectorStore};
///
/// let data: Vec<f32> = (0..200 * 4).map(|i| (i % 97) as f32).collect();
/// let store = VectorStore::from_f32(data.clone(), 4)?;
/// let ctx = ExecutionContext::host()?;
/// let config = BuildConfig::brute_force(Metric::L2).with_degrees(8, 16);
/// let index = CagraIndex::build(&ctx, store, &config)?;
///
/// let queries = QueryBatch::from_f32(data[..4].to_vec(), 4)?;
/// let results = index.search(&queries, 5, &SearchParams::default())?;
/// assert_eq!(results[0].len(), 5);
/// assert_eq!(results[0][0].1, 0.0);
/// # Ok::<(), cagra::CagraError>(())
/// ```
#[derive(Clone)]
pub struct CagraIndex {
    ctx: ExecutionContext,
    resident: Arc<Resident>,
}

struct Resident {
    graph: Graph,
    _reservation: Reservation,
}

impl std::fmt::Debug for CagraIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CagraIndex")
            .field("residency", &self.residency())
            .field("len", &self.len())
            .field("dimension", &self.dimension())
            .field("degree", &self.degree())
            .field("metric", &self.metric())
            .field("numeric", &self.numeric_type())
            .finish()
    }
}

impl CagraIndex {
    /// Build a graph over `store` in `ctx`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for inconsistent parameters (R > K, `n_lists > n`,
    /// empty store, ...), `InsufficientMemory` when the context's pool cannot
    /// hold the graph, `Cancelled` when the context is cancelled mid-build.
    pub fn build(ctx: &ExecutionContext, store: VectorStore, config: &BuildConfig) -> Result<Self> {
        let (graph, reservation) = build::build_graph(ctx, store, config)?;
        Ok(Self::resident(ctx, graph, reservation))
    }

    fn resident(ctx: &ExecutionContext, graph: Graph, reservation: Reservation) -> Self {
        Self {
            ctx: ctx.clone(),
            resident: Arc::new(Resident {
                graph,
                _reservation: reservation,
            }),
        }
    }

    /// Approximate `k` nearest neighbors of every query, in batch order.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `k == 0`, `k > n` or `params` are inconsistent;
    /// `DimensionMismatch`/`NumericMismatch` if the batch does not match the
    /// stored vectors; `Cancelled` if the context is cancelled.
    pub fn search(
        &self,
        queries: &QueryBatch,
        k: usize,
        params: &SearchParams,
    ) -> Result<Vec<SearchResult>> {
        search::search(&self.ctx, &self.resident.graph, queries, k, params)
    }

    /// Copy the graph out of its context.
    pub fn to_host_form(&self) -> PortableGraph {
        let portable = PortableGraph::from_graph(&self.resident.graph);
        tracing::debug!(
            from = %self.residency(),
            nodes = portable.len(),
            "graph converted to host form"
        );
        portable
    }

    /// Make a portable graph resident in `ctx`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the vectors were detached, `InsufficientMemory` if
    /// `ctx` cannot hold the graph, `Cancelled` if `ctx` is cancelled.
    pub fn from_host_form(portable: &PortableGraph, ctx: &ExecutionContext) -> Result<Self> {
        ctx.check()?;
        let store = portable.vectors.clone().ok_or_else(|| {
            CagraError::config("portable graph has no vectors; attach them with with_vectors")
        })?;
        let reservation = ctx.memory().reserve(resident_bytes(&store, portable.degree)?)?;
        let graph = Graph::from_lists(
            store,
            portable.config.clone(),
            portable.degree,
            &portable.neighbors,
        )?;
        tracing::debug!(
            to = %ctx.residency(),
            nodes = graph.len(),
            bytes = reservation.bytes(),
            "graph made resident"
        );
        Ok(Self::resident(ctx, graph, reservation))
    }

    /// Copy this index into `ctx` through its host form.
    pub fn migrate(&self, ctx: &ExecutionContext) -> Result<Self> {
        Self::from_host_form(&self.to_host_form(), ctx)
    }

    /// The resident graph.
    pub fn graph(&self) -> &Graph {
        &self.resident.graph
    }

    /// The owning context.
    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    /// Where the graph lives.
    pub fn residency(&self) -> Residency {
        self.ctx.residency()
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.resident.graph.len()
    }

    /// Whether the index is empty. Built indexes never are.
    pub fn is_empty(&self) -> bool {
        self.resident.graph.is_empty()
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.resident.graph.dimension()
    }

    /// Distance metric.
    pub fn metric(&self) -> Metric {
        self.resident.graph.metric()
    }

    /// Out-degree R.
    pub fn degree(&self) -> usize {
        self.resident.graph.degree()
    }

    /// Storage representation of the vectors.
    pub fn numeric_type(&self) -> NumericType {
        self.resident.graph.numeric_type()
    }

    /// Bytes reserved in the context.
    pub fn size_bytes(&self) -> usize {
        self.resident.graph.size_bytes()
    }
}
