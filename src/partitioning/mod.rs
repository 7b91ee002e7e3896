//! Space partitioning used by the IVF-PQ build path.

pub mod kmeans;

pub use kmeans::KMeans;
