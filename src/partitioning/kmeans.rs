//! k-means clustering.
//!
//! Lloyd's algorithm with k-means++ initialization under squared L2. Used to
//! train the coarse quantizer of the IVF-PQ build path and the product
//! quantizer's sub-space codebooks.

use crate::error::{CagraError, Result};
use crate::simd;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// k-means clustering over flat row-major `f32` data.
pub struct KMeans {
    /// Centroids, row-major (k x dimension)
    centroids: Vec<f32>,
    dimension: usize,
    k: usize,
    max_iters: usize,
    seed: u64,
}

impl KMeans {
    /// Create new k-means with k clusters.
    pub fn new(dimension: usize, k: usize) -> Result<Self> {
        if dimension == 0 || k == 0 {
            return Err(CagraError::config("dimension and k must be greater than 0"));
        }

        Ok(Self {
            centroids: Vec::new(),
            dimension,
            k,
            max_iters: 20,
            seed: 0,
        })
    }

    /// Seed for k-means++ initialization.
    ///
    /// Repeated `fit(...)` calls on the same inputs with the same seed produce
    /// identical centroids.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Cap on Lloyd iterations.
    #[must_use]
    pub fn with_max_iters(mut self, iters: usize) -> Self {
        self.max_iters = iters.max(1);
        self
    }

    /// Train on `num_vectors` rows of `vectors`.
    pub fn fit(&mut self, vectors: &[f32], num_vectors: usize) -> Result<()> {
        if vectors.len() < num_vectors * self.dimension {
            return Err(CagraError::config("insufficient training vectors"));
        }
        if num_vectors < self.k {
            return Err(CagraError::config(format!(
                "cannot train {} clusters on {num_vectors} vectors",
                self.k
            )));
        }

        self.centroids = self.kmeans_plus_plus(vectors, num_vectors);

        for iteration in 0..self.max_iters {
            let assignments = self.assign_clusters(vectors, num_vectors);
            let new_centroids = self.update_centroids(vectors, &assignments);

            let shift = self
                .centroids
                .chunks_exact(self.dimension)
                .zip(new_centroids.chunks_exact(self.dimension))
                .map(|(old, new)| simd::l2_distance_squared(old, new))
                .fold(0.0f32, f32::max);

            self.centroids = new_centroids;
            if shift <= 1e-10 {
                tracing::trace!(iteration, "k-means converged");
                break;
            }
        }

        Ok(())
    }

    /// k-means++ initialization.
    fn kmeans_plus_plus(&self, vectors: &[f32], num_vectors: usize) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = Vec::with_capacity(self.k * self.dimension);

        // First centroid: random vector
        let first_idx = rng.random_range(0..num_vectors);
        centroids.extend_from_slice(self.get_vector(vectors, first_idx));

        // Squared distance of every point to its nearest chosen centroid.
        let mut min_dist: Vec<f32> = (0..num_vectors)
            .map(|i| simd::l2_distance_squared(self.get_vector(vectors, i), &centroids[..]))
            .collect();

        for _ in 1..self.k {
            let total: f64 = min_dist.iter().map(|&d| d as f64).sum();
            let chosen = if total <= 0.0 {
                // All remaining points coincide with a centroid.
                rng.random_range(0..num_vectors)
            } else {
                let threshold = rng.random::<f64>() * total;
                let mut cumulative = 0.0;
                let mut pick = num_vectors - 1;
                for (i, &dist) in min_dist.iter().enumerate() {
                    cumulative += dist as f64;
                    if cumulative >= threshold && dist > 0.0 {
                        pick = i;
                        break;
                    }
                }
                pick
            };

            let start = centroids.len();
            centroids.extend_from_slice(self.get_vector(vectors, chosen));
            let newest = &centroids[start..];
            for (i, d) in min_dist.iter_mut().enumerate() {
                let nd = simd::l2_distance_squared(self.get_vector(vectors, i), newest);
                if nd < *d {
                    *d = nd;
                }
            }
        }

        centroids
    }

    /// Assign vectors to nearest clusters.
    pub fn assign_clusters(&self, vectors: &[f32], num_vectors: usize) -> Vec<usize> {
        (0..num_vectors)
            .into_par_iter()
            .map(|i| self.nearest(self.get_vector(vectors, i)).0)
            .collect()
    }

    /// Nearest centroid of `v` and its squared distance.
    pub fn nearest(&self, v: &[f32]) -> (usize, f32) {
        let mut best = (0, f32::INFINITY);
        for (c, centroid) in self.centroids.chunks_exact(self.dimension).enumerate() {
            let dist = simd::l2_distance_squared(v, centroid);
            if dist < best.1 {
                best = (c, dist);
            }
        }
        best
    }

    /// Update centroids based on assignments.
    fn update_centroids(&self, vectors: &[f32], assignments: &[usize]) -> Vec<f32> {
        let mut sums = vec![0.0f64; self.k * self.dimension];
        let mut counts = vec![0usize; self.k];

        for (i, &cluster) in assignments.iter().enumerate() {
            counts[cluster] += 1;
            let vec = self.get_vector(vectors, i);
            let dst = &mut sums[cluster * self.dimension..(cluster + 1) * self.dimension];
            for (s, &v) in dst.iter_mut().zip(vec) {
                *s += v as f64;
            }
        }

        let mut new_centroids = self.centroids.clone();
        for (c, &count) in counts.iter().enumerate() {
            // Empty cluster: keep old centroid
            if count == 0 {
                continue;
            }
            let src = &sums[c * self.dimension..(c + 1) * self.dimension];
            let dst = &mut new_centroids[c * self.dimension..(c + 1) * self.dimension];
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = (s / count as f64) as f32;
            }
        }

        new_centroids
    }

    /// Get vector from row-major storage.
    fn get_vector<'a>(&self, vectors: &'a [f32], idx: usize) -> &'a [f32] {
        let start = idx * self.dimension;
        &vectors[start..start + self.dimension]
    }

    /// Centroids, row-major.
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    /// Centroid `c`.
    pub fn centroid(&self, c: usize) -> &[f32] {
        &self.centroids[c * self.dimension..(c + 1) * self.dimension]
    }

    /// Number of clusters.
    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn separates_obvious_clusters() {
        let mut data = Vec::new();
        for i in 0..20 {
            let jitter = i as f32 * 0.001;
            data.extend_from_slice(&[0.0 + jitter, 0.0]);
            data.extend_from_slice(&[10.0 + jitter, 10.0]);
        }
        let mut km = KMeans::new(2, 2).unwrap().with_seed(7);
        km.fit(&data, 40).unwrap();
        let a = km.assign_clusters(&data, 40);
        for pair in a.chunks(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert!(a.iter().step_by(2).all(|&c| c == a[0]));
    }

    #[test]
    fn too_few_vectors_is_rejected() {
        let mut km = KMeans::new(2, 8).unwrap();
        assert!(km.fit(&[0.0; 8], 4).is_err());
    }

    proptest! {
        #[test]
        fn prop_kmeans_fit_is_deterministic_given_seed(
            seed in any::<u64>(),
            dimension in 1usize..8,
            num_vectors in 2usize..48,
            k in 1usize..8,
            raw in proptest::collection::vec(-1.0f32..1.0f32, 8*48),
        ) {
            prop_assume!(k <= num_vectors);
            let vectors = raw[..num_vectors * dimension].to_vec();

            let mut km1 = KMeans::new(dimension, k).unwrap().with_seed(seed);
            let mut km2 = KMeans::new(dimension, k).unwrap().with_seed(seed);

            km1.fit(&vectors, num_vectors).unwrap();
            km2.fit(&vectors, num_vectors).unwrap();

            prop_assert_eq!(km1.centroids(), km2.centroids());
            let a1 = km1.assign_clusters(&vectors, num_vectors);
            let a2 = km2.assign_clusters(&vectors, num_vectors);
            prop_assert_eq!(a1, a2);
        }
    }
}
