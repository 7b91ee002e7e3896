//! IVF-PQ: Inverted File with Product Quantization.
//!
//! Used by the clustering-assisted graph build path to find candidate
//! neighbors without an O(n²) scan:
//!
//! 1. **IVF (Inverted File)**: partition the dataset into `n_lists` Voronoi
//!    cells with k-means trained on a sample; each row joins its nearest cell.
//! 2. **PQ (Product Quantization)**: compress each row's residual against its
//!    cell centroid into `pq_dim` codes of `pq_bits` bits.
//!
//! ```text
//!           Row v
//!             |
//!     +-------+-------+
//!     |               |
//!   Cell A          Cell B      (probe n_probes cells)
//!   |__|__|         |__|__|
//!   v  v  v         v  v  v
//!  [PQ codes]      [PQ codes]   (ADC lookups, approximate)
//!             |
//!      exact refinement of the best candidates
//! ```
//!
//! With `n_lists ≈ √n` and a constant number of probes, every row is compared
//! against `O(√n)` compressed rows, so the candidate phase costs roughly
//! `O(n·√n)` instead of `O(n²)`. The approximate ranking loses some true
//! neighbors; the exact refinement over `refine_rate × intermediate_degree`
//! candidates recovers most of them.
//!
//! ## Asymmetric Distance Computation (ADC)
//!
//! The probing row is kept exact; only database rows are compressed. Per
//! probed cell, the distances from the row's residual sub-vectors to every
//! code word are tabulated once, after which each member costs `pq_dim`
//! table lookups.
//!
//! ## References
//!
//! - Jégou, Douze, Schmid (2011). "Product Quantization for Nearest Neighbor Search."
//! - Ootomo et al. (2023). "CAGRA: Highly Parallel Graph Construction and
//!   Approximate Nearest Neighbor Search for GPUs."

pub mod pq;
pub mod search;

pub use pq::ProductQuantizer;
pub use search::IvfPqIndex;
