//! Boundary conditions and error paths.

use cagra::{
    BuildConfig, CagraError, CagraIndex, ContextConfig, ErrorKind, ExecutionContext, IvfPqParams,
    Metric, PruneParams, QueryBatch, Residency, SearchParams, VectorStore,
};

fn grid(n: usize, dim: usize) -> Vec<f32> {
    (0..n * dim).map(|i| ((i * 37) % 101) as f32 * 0.1).collect()
}

fn small_index(metric: Metric) -> CagraIndex {
    let store = VectorStore::from_f32(grid(100, 4), 4).unwrap();
    let config = BuildConfig::brute_force(metric).with_degrees(8, 16);
    CagraIndex::build(&ExecutionContext::host().unwrap(), store, &config).unwrap()
}

// =============================================================================
// Search arguments
// =============================================================================

#[test]
fn k_out_of_range() {
    let index = small_index(Metric::L2);
    let q = QueryBatch::from_f32(grid(1, 4), 4).unwrap();
    let p = SearchParams::default();
    assert_eq!(index.search(&q, 0, &p).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(index.search(&q, 101, &p).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(index.search(&q, 100, &p).unwrap()[0].len(), 100);
}

#[test]
fn query_dimension_mismatch() {
    let index = small_index(Metric::L2);
    let q = QueryBatch::from_f32(grid(2, 5), 5).unwrap();
    match index.search(&q, 1, &SearchParams::default()) {
        Err(CagraError::DimensionMismatch { expected, actual }) => {
            assert_eq!((expected, actual), (4, 5));
        }
        other => panic!("expected DimensionMismatch, got {other:?}"),
    }
}

#[test]
fn query_numeric_mismatch_is_a_dimension_mismatch() {
    let index = small_index(Metric::InnerProduct);
    let q = QueryBatch::from_f32_as_f16(&grid(1, 4), 4).unwrap();
    let err = index.search(&q, 1, &SearchParams::default()).unwrap_err();
    assert!(matches!(err, CagraError::NumericMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}

#[test]
fn inconsistent_search_params() {
    let index = small_index(Metric::L2);
    let q = QueryBatch::from_f32(grid(1, 4), 4).unwrap();
    for params in [
        SearchParams {
            search_width: 0,
            ..SearchParams::default()
        },
        SearchParams {
            entry_point_count: 0,
            ..SearchParams::default()
        },
    ] {
        assert_eq!(index.search(&q, 1, &params).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }
}

#[test]
fn iteration_cap_still_returns_k() {
    let index = small_index(Metric::L2);
    let q = QueryBatch::from_f32(grid(3, 4), 4).unwrap();
    let params = SearchParams {
        max_iterations: 1,
        entry_point_count: 1,
        ..SearchParams::default()
    };
    for res in index.search(&q, 20, &params).unwrap() {
        assert_eq!(res.len(), 20);
    }
}

// =============================================================================
// Build configuration
// =============================================================================

#[test]
fn invalid_build_configs() {
    let ctx = ExecutionContext::host().unwrap();
    let store = || VectorStore::from_f32(grid(50, 4), 4).unwrap();

    let mut too_many_lists = IvfPqParams::default();
    too_many_lists.build.n_lists = 51;
    let mut bad_pq_dim = IvfPqParams::default();
    bad_pq_dim.build.n_lists = 4;
    bad_pq_dim.build.pq_dim = 3;
    let mut bad_bits = IvfPqParams::default();
    bad_bits.build.n_lists = 4;
    bad_bits.build.pq_bits = 9;

    let configs = [
        BuildConfig::brute_force(Metric::L2).with_degrees(0, 8),
        BuildConfig::brute_force(Metric::L2).with_degrees(16, 8),
        BuildConfig::ivf_pq(Metric::L2, too_many_lists),
        BuildConfig::ivf_pq(Metric::L2, bad_pq_dim),
        BuildConfig::ivf_pq(Metric::L2, bad_bits),
        BuildConfig {
            prune: PruneParams {
                detour_tolerance: None,
                reverse_edge_ratio: 1.5,
            },
            ..BuildConfig::brute_force(Metric::L2)
        },
    ];
    for config in configs {
        let err = CagraIndex::build(&ctx, store(), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig, "{config:?}");
    }
}

#[test]
fn empty_store_is_invalid() {
    let ctx = ExecutionContext::host().unwrap();
    let store = VectorStore::from_f32(Vec::new(), 4).unwrap();
    let err = CagraIndex::build(&ctx, store, &BuildConfig::brute_force(Metric::L2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

#[test]
fn zero_threads_is_invalid() {
    let err = ExecutionContext::new(Residency::Host, ContextConfig::default().with_threads(0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
}

// =============================================================================
// Degenerate data
// =============================================================================

#[test]
fn single_vector_index() {
    let ctx = ExecutionContext::host().unwrap();
    let store = VectorStore::from_f32(vec![1.0, 2.0, 3.0], 3).unwrap();
    let index = CagraIndex::build(&ctx, store, &BuildConfig::brute_force(Metric::L2)).unwrap();
    let q = QueryBatch::from_f32(vec![0.0, 0.0, 0.0], 3).unwrap();
    assert_eq!(index.search(&q, 1, &SearchParams::default()).unwrap(), vec![vec![(0, 14.0)]]);
}

#[test]
fn identical_vectors() {
    let ctx = ExecutionContext::host().unwrap();
    let store = VectorStore::from_f32(vec![0.5; 40 * 4], 4).unwrap();
    let config = BuildConfig::brute_force(Metric::L2).with_degrees(4, 8);
    let index = CagraIndex::build(&ctx, store, &config).unwrap();
    index.graph().validate().unwrap();
    let q = QueryBatch::from_f32(vec![0.5; 4], 4).unwrap();
    let res = index.search(&q, 5, &SearchParams::default()).unwrap();
    assert_eq!(res[0].len(), 5);
    // All distances tie; order falls back to ascending index.
    assert!(res[0].windows(2).all(|w| w[0].0 < w[1].0));
}

#[test]
fn degree_larger_than_dataset_is_clamped() {
    let ctx = ExecutionContext::host().unwrap();
    let store = VectorStore::from_f32(grid(5, 2), 2).unwrap();
    let index = CagraIndex::build(&ctx, store, &BuildConfig::brute_force(Metric::L2)).unwrap();
    assert_eq!(index.degree(), 4);
}
