//! cagra: graph-based approximate nearest neighbor search.
//!
//! A CAGRA-style index: a proximity graph where every node keeps a fixed
//! number of out-edges, searched with a wide, parallel beam.
//!
//! - `build`: kNN graph (exact, or IVF-PQ assisted) followed by rank-based
//!   detour pruning and reverse-edge merging.
//! - `search`: batched itopk beam search from random entry points.
//! - `context`: execution contexts (thread pool + memory pool) an index is
//!   resident in; `index` ties a graph to one.
//! - `portable` / `persistence`: context-independent host form and its
//!   binary encoding.
//! - `precision`: `f32` or `f16` storage, always accumulated in `f32`.
//!
//! ```
//! use cagra::{BuildConfig, CagraIndex, ExecutionContext, Metric, QueryBatch, SearchParams, VectorStore};
//!
//! let dim = 8;
//! let data: Vec<f32> = (0..500 * dim).map(|i| ((i * 31) % 101) as f32 / 101.0).collect();
//! let ctx = ExecutionContext::host()?;
//! let index = CagraIndex::build(
//!     &ctx,
//!     VectorStore::from_f32(data.clone(), dim)?,
//!     &BuildConfig::brute_force(Metric::L2).with_degrees(16, 32),
//! )?;
//!
//! // Move the graph to another context through its portable form.
//! let bytes = index.to_host_form().to_bytes();
//! let device = ExecutionContext::device(0)?;
//! let copy = CagraIndex::from_host_form(&cagra::PortableGraph::from_bytes(&bytes)?, &device)?;
//!
//! let queries = QueryBatch::from_f32(data[..2 * dim].to_vec(), dim)?;
//! let params = SearchParams::default();
//! assert_eq!(index.search(&queries, 10, &params)?, copy.search(&queries, 10, &params)?);
//! # Ok::<(), cagra::CagraError>(())
//! ```
//!
//! # Critical Nuances
//!
//! ## Distances
//!
//! L2 results are *squared* Euclidean distances, ascending. Inner product
//! results are scores, descending. Internally both are distances where
//! smaller is better; see [`distance`].
//!
//! ## Fixed degree
//!
//! Every node has at most R out-edges, and in practice exactly R. A resident
//! graph is an `n × R` table plus per-node lengths: `n·(R + 1)·4` bytes on
//! top of the vectors, known before the build starts.
//!
//! ## Approximate
//!
//! Search can miss true neighbors the graph does not expose a path to from
//! the entry points. Raise `itopk_size` or `search_width` to trade latency
//! for recall; [`FlatIndex`] gives exact results for measuring it.

mod build;
pub mod config;
pub mod context;
pub mod distance;
pub mod error;
pub mod flat;
pub mod graph;
pub mod index;
pub mod ivf_pq;
pub mod partitioning;
pub mod persistence;
pub mod portable;
pub mod precision;
pub mod search;
pub mod simd;
pub mod store;

pub use config::{
    BuildAlgo, BuildConfig, IvfPqBuildParams, IvfPqParams, IvfPqSearchParams, PruneParams,
    SearchParams,
};
pub use context::{ContextConfig, ExecutionContext, MemoryPool, Reservation, Residency};
pub use distance::Metric;
pub use error::{CagraError, ErrorKind, Result};
pub use flat::{recall_at_k, FlatIndex};
pub use graph::{Graph, INVALID_NODE};
pub use index::CagraIndex;
pub use portable::{NeighborList, PortableGraph};
pub use precision::{Element, NumericType};
pub use search::SearchResult;
pub use store::{QueryBatch, Rows, VectorStore};
