//! Moving graphs between execution contexts.
//!
//! A graph built in one context, converted to host form, serialized,
//! deserialized and made resident in another context must return exactly the
//! same results for the same queries.

use cagra::{
    BuildConfig, CagraIndex, ContextConfig, ErrorKind, ExecutionContext, FlatIndex, Metric,
    PortableGraph, QueryBatch, Residency, SearchParams, VectorStore,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * dim).map(|_| rng.random_range(-1.0..1.0)).collect()
}

fn interop(metric: Metric, half: bool, n: usize, dim: usize, k: usize) {
    let data = random_data(n, dim, 1);
    let query_data = random_data(100, dim, 2);
    let (store, queries) = if half {
        (
            VectorStore::from_f32_as_f16(&data, dim).unwrap(),
            QueryBatch::from_f32_as_f16(&query_data, dim).unwrap(),
        )
    } else {
        (
            VectorStore::from_f32(data, dim).unwrap(),
            QueryBatch::from_f32(query_data, dim).unwrap(),
        )
    };

    let device = ExecutionContext::device(0).unwrap();
    let config = BuildConfig::brute_force(metric).with_degrees(16, 32);
    let index = CagraIndex::build(&device, store, &config).unwrap();
    let params = SearchParams::default();
    let on_device = index.search(&queries, k, &params).unwrap();

    // device -> host
    let host = ExecutionContext::host().unwrap();
    let portable = index.to_host_form();
    let on_host = CagraIndex::from_host_form(&portable, &host).unwrap();
    assert_eq!(on_host.search(&queries, k, &params).unwrap(), on_device);

    // host -> bytes -> another device
    let bytes = portable.to_bytes();
    let restored = PortableGraph::from_bytes(&bytes).unwrap();
    assert_eq!(restored, portable);
    let other = ExecutionContext::device(1).unwrap();
    let again = CagraIndex::from_host_form(&restored, &other).unwrap();
    assert_eq!(again.residency(), Residency::Device(1));
    assert_eq!(again.search(&queries, k, &params).unwrap(), on_device);
}

#[test]
fn interop_l2() {
    interop(Metric::L2, false, 1500, 16, 12);
}

#[test]
fn interop_ip() {
    interop(Metric::InnerProduct, false, 1500, 16, 12);
}

#[test]
fn interop_l2_half() {
    interop(Metric::L2, true, 1500, 16, 12);
}

#[test]
fn interop_ip_half() {
    interop(Metric::InnerProduct, true, 1500, 16, 12);
}

/// Full-size round trip: 10 000 × 64 vectors, 100 queries, k = 12.
#[test]
#[ignore = "slow without optimizations; run with --ignored --release"]
fn interop_full_size() {
    for metric in [Metric::L2, Metric::InnerProduct] {
        for half in [false, true] {
            interop(metric, half, 10_000, 64, 12);
        }
    }
}

#[test]
fn thread_count_does_not_change_results() {
    let data = random_data(800, 8, 3);
    let queries = QueryBatch::from_f32(random_data(30, 8, 4), 8).unwrap();
    let config = BuildConfig::brute_force(Metric::L2).with_degrees(8, 16);

    let one = ExecutionContext::new(Residency::Host, ContextConfig::default().with_threads(1)).unwrap();
    let four = ExecutionContext::new(Residency::Device(0), ContextConfig::default().with_threads(4)).unwrap();
    let a = CagraIndex::build(&one, VectorStore::from_f32(data.clone(), 8).unwrap(), &config).unwrap();
    let b = CagraIndex::build(&four, VectorStore::from_f32(data, 8).unwrap(), &config).unwrap();
    assert_eq!(a.graph(), b.graph());
    let params = SearchParams::default();
    assert_eq!(
        a.search(&queries, 5, &params).unwrap(),
        b.search(&queries, 5, &params).unwrap()
    );
}

#[test]
fn flat_index_consumes_portable_vectors() {
    let data = random_data(300, 8, 5);
    let ctx = ExecutionContext::device(2).unwrap();
    let config = BuildConfig::brute_force(Metric::InnerProduct).with_degrees(8, 16);
    let index = CagraIndex::build(&ctx, VectorStore::from_f32(data.clone(), 8).unwrap(), &config).unwrap();
    let flat = FlatIndex::from_portable(&index.to_host_form()).unwrap();
    assert_eq!(flat.metric(), Metric::InnerProduct);
    assert_eq!(flat.len(), 300);

    let queries = QueryBatch::from_f32(data[..8].to_vec(), 8).unwrap();
    let exact = flat.search(&queries, 1).unwrap();
    let scores: Vec<f32> = (0..300)
        .map(|i| (0..8).map(|j| data[j] * data[i * 8 + j]).sum::<f32>())
        .collect();
    let best = scores
        .iter()
        .enumerate()
        .fold((0usize, f32::MIN), |acc, (i, &s)| if s > acc.1 { (i, s) } else { acc });
    assert_eq!(exact[0][0].0 as usize, best.0);

    let bare = index.to_host_form().without_vectors();
    assert_eq!(FlatIndex::from_portable(&bare).unwrap_err().kind(), ErrorKind::InvalidConfig);
}

#[test]
fn memory_is_released_with_the_last_handle() {
    let ctx = ExecutionContext::new(
        Residency::Device(0),
        ContextConfig::default().with_memory_limit(1 << 20),
    )
    .unwrap();
    let config = BuildConfig::brute_force(Metric::L2).with_degrees(8, 16);
    let data = random_data(500, 16, 6);

    let index = CagraIndex::build(&ctx, VectorStore::from_f32(data.clone(), 16).unwrap(), &config).unwrap();
    assert!(ctx.memory().used() > 0);
    assert!(ctx.memory().peak() >= ctx.memory().used());
    let portable = index.to_host_form();
    drop(index);
    assert_eq!(ctx.memory().used(), 0);

    let back = CagraIndex::from_host_form(&portable, &ctx).unwrap();
    assert_eq!(ctx.memory().used(), back.size_bytes());
}

#[test]
fn insufficient_memory_is_reported() {
    let ctx = ExecutionContext::new(
        Residency::Device(0),
        ContextConfig::default().with_memory_limit(4096),
    )
    .unwrap();
    let config = BuildConfig::brute_force(Metric::L2).with_degrees(8, 16);
    let store = VectorStore::from_f32(random_data(500, 16, 7), 16).unwrap();
    let err = CagraIndex::build(&ctx, store, &config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientMemory);
    assert_eq!(ctx.memory().used(), 0);
}

#[test]
fn cancelled_context_rejects_work() {
    let ctx = ExecutionContext::device(0).unwrap();
    let config = BuildConfig::brute_force(Metric::L2).with_degrees(8, 16);
    let data = random_data(200, 8, 8);
    let index = CagraIndex::build(&ctx, VectorStore::from_f32(data.clone(), 8).unwrap(), &config).unwrap();
    let portable = index.to_host_form();

    ctx.cancel();
    assert!(ctx.is_cancelled());
    let queries = QueryBatch::from_f32(data[..8].to_vec(), 8).unwrap();
    assert_eq!(
        index.search(&queries, 3, &SearchParams::default()).unwrap_err().kind(),
        ErrorKind::Cancelled
    );
    assert_eq!(
        CagraIndex::build(&ctx, VectorStore::from_f32(data, 8).unwrap(), &config)
            .unwrap_err()
            .kind(),
        ErrorKind::Cancelled
    );
    assert_eq!(
        CagraIndex::from_host_form(&portable, &ctx).unwrap_err().kind(),
        ErrorKind::Cancelled
    );

    // Other contexts are unaffected.
    let fresh = ExecutionContext::device(1).unwrap();
    let moved = CagraIndex::from_host_form(&portable, &fresh).unwrap();
    assert_eq!(moved.search(&queries, 3, &SearchParams::default()).unwrap().len(), 1);
}
