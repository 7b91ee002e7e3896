//! Binary format of a [`PortableGraph`].
//!
//! # Layout
//!
//! Little endian throughout.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Magic (4B): "CGRA"                           │
//! │ Version (u32): 1                             │
//! ├──────────────────────────────────────────────┤
//! │ Header:                                      │
//! │   dimension u64, vector count u64            │
//! │   metric u8, build algo u8                   │
//! │   graph_degree u64, intermediate degree u64  │
//! │   [IVF-PQ only] n_lists u64, kmeans iters    │
//! │     u64, trainset fraction f64, pq_bits u64, │
//! │     pq_dim u64, n_probes u64, refine f32     │
//! │   detour flag u8, tolerance u32, ratio f32   │
//! │   seed u64, degree R u64                     │
//! ├──────────────────────────────────────────────┤
//! │ Graph: n × (count u32, count × u32)          │
//! ├──────────────────────────────────────────────┤
//! │ Vectors: numeric u8, present u8,             │
//! │   n·d elements (f32, or f16 bits) if present │
//! ├──────────────────────────────────────────────┤
//! │ Footer: CRC32 of all preceding bytes         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Compatibility
//!
//! Any other version is rejected. Decoding is all or nothing: a truncated,
//! corrupted or trailing-garbage stream yields `MalformedIndex`.

use crate::config::{
    BuildAlgo, BuildConfig, IvfPqBuildParams, IvfPqParams, IvfPqSearchParams, PruneParams,
};
use crate::distance::Metric;
use crate::error::{CagraError, Result};
use crate::portable::{NeighborList, PortableGraph};
use crate::precision::{Element, NumericType};
use crate::store::VectorStore;
use half::f16;

/// Magic bytes.
pub const MAGIC: &[u8; 4] = b"CGRA";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

const FOOTER_LEN: usize = 4;

pub(crate) fn encode(graph: &PortableGraph) -> Vec<u8> {
    let n = graph.len();
    let payload = graph.vectors.as_ref().map_or(0, VectorStore::size_bytes);
    let edges: usize = graph.neighbors.iter().map(|l| l.len()).sum();
    let mut out = Vec::with_capacity(128 + 4 * (n + edges) + payload);

    out.extend_from_slice(MAGIC);
    put_u32(&mut out, FORMAT_VERSION);

    let config = &graph.config;
    put_u64(&mut out, graph.dimension as u64);
    put_u64(&mut out, n as u64);
    out.push(config.metric.tag());
    out.push(config.build_algo.tag());
    put_u64(&mut out, config.graph_degree as u64);
    put_u64(&mut out, config.intermediate_graph_degree as u64);
    if let BuildAlgo::IvfPq(params) = &config.build_algo {
        put_u64(&mut out, params.build.n_lists as u64);
        put_u64(&mut out, params.build.kmeans_n_iters as u64);
        out.extend_from_slice(&params.build.kmeans_trainset_fraction.to_le_bytes());
        put_u64(&mut out, params.build.pq_bits as u64);
        put_u64(&mut out, params.build.pq_dim as u64);
        put_u64(&mut out, params.search.n_probes as u64);
        out.extend_from_slice(&params.search.refine_rate.to_le_bytes());
    }
    match config.prune.detour_tolerance {
        Some(t) => {
            out.push(1);
            put_u32(&mut out, t);
        }
        None => {
            out.push(0);
            put_u32(&mut out, 0);
        }
    }
    out.extend_from_slice(&config.prune.reverse_edge_ratio.to_le_bytes());
    put_u64(&mut out, config.seed);
    put_u64(&mut out, graph.degree as u64);

    for list in &graph.neighbors {
        put_u32(&mut out, list.len() as u32);
        for &nb in list.iter() {
            put_u32(&mut out, nb);
        }
    }

    out.push(graph.numeric.tag());
    match &graph.vectors {
        None => out.push(0),
        Some(store) => {
            out.push(1);
            match store {
                VectorStore::F32(rows) => put_elements(&mut out, rows.as_slice()),
                VectorStore::F16(rows) => put_elements(&mut out, rows.as_slice()),
            }
        }
    }

    let crc = crc32fast::hash(&out);
    put_u32(&mut out, crc);
    out
}

pub(crate) fn decode(bytes: &[u8]) -> Result<PortableGraph> {
    if bytes.len() < MAGIC.len() + 4 + FOOTER_LEN {
        return Err(CagraError::malformed(format!(
            "{} bytes is too short for an index",
            bytes.len()
        )));
    }
    if &bytes[..4] != MAGIC {
        return Err(CagraError::malformed("bad magic bytes"));
    }
    let (body, footer) = bytes.split_at(bytes.len() - FOOTER_LEN);
    let stored = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(CagraError::malformed(format!(
            "checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
        )));
    }

    let mut r = ByteReader::new(&body[4..]);
    let version = r.u32()?;
    if version != FORMAT_VERSION {
        return Err(CagraError::malformed(format!(
            "unsupported format version {version} (expected {FORMAT_VERSION})"
        )));
    }

    let dimension = r.usize()?;
    if dimension == 0 {
        return Err(CagraError::malformed("dimension is 0"));
    }
    let n = r.usize()?;
    let metric_tag = r.u8()?;
    let metric = Metric::from_tag(metric_tag)
        .ok_or_else(|| CagraError::malformed(format!("unknown metric tag {metric_tag}")))?;
    let algo_tag = r.u8()?;
    let graph_degree = r.usize()?;
    let intermediate_graph_degree = r.usize()?;
    let build_algo = match algo_tag {
        0 => BuildAlgo::BruteForceKnn,
        1 => BuildAlgo::IvfPq(IvfPqParams {
            build: IvfPqBuildParams {
                n_lists: r.usize()?,
                kmeans_n_iters: r.usize()?,
                kmeans_trainset_fraction: r.f64()?,
                pq_bits: r.usize()?,
                pq_dim: r.usize()?,
            },
            search: IvfPqSearchParams {
                n_probes: r.usize()?,
                refine_rate: r.f32()?,
            },
        }),
        other => return Err(CagraError::malformed(format!("unknown build algo tag {other}"))),
    };
    let detour_tolerance = match (r.u8()?, r.u32()?) {
        (0, _) => None,
        (1, t) => Some(t),
        (flag, _) => return Err(CagraError::malformed(format!("bad tolerance flag {flag}"))),
    };
    let reverse_edge_ratio = r.f32()?;
    let seed = r.u64()?;
    let degree = r.usize()?;

    let config = BuildConfig {
        metric,
        graph_degree,
        intermediate_graph_degree,
        build_algo,
        prune: PruneParams {
            detour_tolerance,
            reverse_edge_ratio,
        },
        seed,
    };

    // Each node needs at least its count word.
    r.ensure(n, 4)?;
    let mut neighbors = Vec::with_capacity(n);
    for node in 0..n {
        let count = r.u32()? as usize;
        if count > degree {
            return Err(CagraError::malformed(format!(
                "node {node} has {count} neighbors, degree is {degree}"
            )));
        }
        r.ensure(count, 4)?;
        let mut list = NeighborList::with_capacity(count);
        for _ in 0..count {
            list.push(r.u32()?);
        }
        neighbors.push(list);
    }

    let numeric_tag = r.u8()?;
    let numeric = NumericType::from_tag(numeric_tag)
        .ok_or_else(|| CagraError::malformed(format!("unknown numeric tag {numeric_tag}")))?;
    let vectors = match r.u8()? {
        0 => None,
        1 => {
            let count = n
                .checked_mul(dimension)
                .ok_or_else(|| CagraError::malformed("vector payload size overflows"))?;
            let store = match numeric {
                NumericType::Float32 => {
                    VectorStore::from_f32(r.elements::<f32>(count)?, dimension)
                }
                NumericType::Float16 => {
                    VectorStore::from_f16(r.elements::<f16>(count)?, dimension)
                }
            };
            Some(store.map_err(as_malformed)?)
        }
        flag => return Err(CagraError::malformed(format!("bad payload flag {flag}"))),
    };

    if r.remaining() != 0 {
        return Err(CagraError::malformed(format!(
            "{} trailing bytes after the vector payload",
            r.remaining()
        )));
    }

    PortableGraph::from_parts(dimension, config, degree, neighbors, numeric, vectors)
        .map_err(as_malformed)
}

fn as_malformed(err: CagraError) -> CagraError {
    match err {
        CagraError::MalformedIndex(_) => err,
        other => CagraError::malformed(other.to_string()),
    }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_elements<E: Element>(out: &mut Vec<u8>, values: &[E]) {
    out.reserve(values.len() * E::BYTES);
    for &v in values {
        v.write_le(out);
    }
}

/// Cursor over a byte slice; running past the end is `MalformedIndex`.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Fail unless `count` items of `width` bytes are left.
    fn ensure(&self, count: usize, width: usize) -> Result<()> {
        match count.checked_mul(width) {
            Some(needed) if needed <= self.remaining() => Ok(()),
            _ => Err(CagraError::malformed("truncated index")),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(CagraError::malformed("truncated index"));
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn usize(&mut self) -> Result<usize> {
        let v = self.u64()?;
        usize::try_from(v).map_err(|_| CagraError::malformed(format!("{v} overflows usize")))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn elements<E: Element>(&mut self, count: usize) -> Result<Vec<E>> {
        self.ensure(count, E::BYTES)?;
        let bytes = self.take(count * E::BYTES)?;
        Ok(bytes.chunks_exact(E::BYTES).map(E::read_le).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn graph(numeric: NumericType, algo: BuildAlgo) -> PortableGraph {
        let data: Vec<f32> = (0..12).map(|i| i as f32 * 0.5).collect();
        let store = match numeric {
            NumericType::Float32 => VectorStore::from_f32(data, 3).unwrap(),
            NumericType::Float16 => VectorStore::from_f32_as_f16(&data, 3).unwrap(),
        };
        let config = BuildConfig {
            build_algo: algo,
            prune: PruneParams {
                detour_tolerance: Some(3),
                reverse_edge_ratio: 0.25,
            },
            ..BuildConfig::new(Metric::InnerProduct)
        };
        PortableGraph::from_parts(
            3,
            config,
            2,
            vec![
                NeighborList::from_slice(&[1, 2]),
                NeighborList::from_slice(&[3]),
                NeighborList::from_slice(&[]),
                NeighborList::from_slice(&[0, 1]),
            ],
            numeric,
            Some(store),
        )
        .unwrap()
    }

    /// Replace the footer after tampering with the body.
    fn reseal(mut bytes: Vec<u8>) -> Vec<u8> {
        bytes.truncate(bytes.len() - FOOTER_LEN);
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes
    }

    #[test]
    fn round_trips_every_variant() {
        for numeric in [NumericType::Float32, NumericType::Float16] {
            for algo in [BuildAlgo::BruteForceKnn, BuildAlgo::IvfPq(IvfPqParams::default())] {
                let g = graph(numeric, algo);
                assert_eq!(decode(&encode(&g)).unwrap(), g);
                let bare = g.without_vectors();
                assert_eq!(decode(&encode(&bare)).unwrap(), bare);
            }
        }
    }

    #[test]
    fn every_truncation_is_rejected() {
        let bytes = encode(&graph(NumericType::Float16, BuildAlgo::BruteForceKnn));
        for len in 0..bytes.len() {
            let err = decode(&bytes[..len]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedIndex, "len {len}");
        }
    }

    #[test]
    fn bit_flips_are_detected() {
        let bytes = encode(&graph(NumericType::Float32, BuildAlgo::BruteForceKnn));
        for pos in [5, 20, bytes.len() / 2, bytes.len() - 1] {
            let mut corrupt = bytes.clone();
            corrupt[pos] ^= 0x40;
            assert_eq!(decode(&corrupt).unwrap_err().kind(), ErrorKind::MalformedIndex);
        }
    }

    #[test]
    fn rejects_foreign_versions_and_magic() {
        let bytes = encode(&graph(NumericType::Float32, BuildAlgo::BruteForceKnn));
        let mut v2 = bytes.clone();
        v2[4..8].copy_from_slice(&2u32.to_le_bytes());
        let err = decode(&reseal(v2)).unwrap_err();
        assert!(err.to_string().contains("version"), "{err}");

        let mut magic = bytes;
        magic[0] = b'X';
        assert_eq!(decode(&magic).unwrap_err().kind(), ErrorKind::MalformedIndex);
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode(&graph(NumericType::Float32, BuildAlgo::BruteForceKnn));
        bytes.truncate(bytes.len() - FOOTER_LEN);
        bytes.extend_from_slice(&[0, 0, 0]);
        bytes.extend_from_slice(&[0; FOOTER_LEN]);
        let err = decode(&reseal(bytes)).unwrap_err();
        assert!(err.to_string().contains("trailing"), "{err}");
    }

    #[test]
    fn rejects_out_of_range_neighbor() {
        let g = graph(NumericType::Float32, BuildAlgo::BruteForceKnn);
        let mut bytes = encode(&g);
        // Node 0's record: count 2, neighbors [1, 2].
        let needle: Vec<u8> = [2u32, 1, 2].iter().flat_map(|v| v.to_le_bytes()).collect();
        let at = bytes
            .windows(needle.len())
            .position(|w| w == needle.as_slice())
            .unwrap();
        bytes[at + 4..at + 8].copy_from_slice(&9u32.to_le_bytes());
        let err = decode(&reseal(bytes)).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn huge_counts_do_not_allocate() {
        let mut bytes = encode(&graph(NumericType::Float32, BuildAlgo::BruteForceKnn));
        // Vector count lives after magic, version and dimension.
        bytes[16..24].copy_from_slice(&u64::MAX.to_le_bytes());
        let err = decode(&reseal(bytes)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedIndex);
    }

    /// Offset of a header field in a brute-force encoding, by preceding widths.
    fn brute_force_offset(field: &str) -> usize {
        // magic, version, dimension, n, metric, algo, graph_degree, intermediate
        let prune = 4 + 4 + 8 + 8 + 1 + 1 + 8 + 8;
        match field {
            "ratio" => prune + 1 + 4,
            "degree" => prune + 1 + 4 + 4 + 8,
            other => panic!("unknown field {other}"),
        }
    }

    #[test]
    fn huge_degree_is_malformed() {
        let g = graph(NumericType::Float32, BuildAlgo::BruteForceKnn);
        let mut bytes = encode(&g);
        let at = brute_force_offset("degree");
        assert_eq!(bytes[at..at + 8], 2u64.to_le_bytes());
        bytes[at..at + 8].copy_from_slice(&(1u64 << 60).to_le_bytes());
        let err = decode(&reseal(bytes)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedIndex);
        assert!(err.to_string().contains("degree"), "{err}");
    }

    #[test]
    fn nan_prune_ratio_is_malformed() {
        let g = graph(NumericType::Float32, BuildAlgo::BruteForceKnn);
        let mut bytes = encode(&g);
        let at = brute_force_offset("ratio");
        assert_eq!(bytes[at..at + 4], 0.25f32.to_le_bytes());
        bytes[at..at + 4].copy_from_slice(&f32::NAN.to_le_bytes());
        let err = decode(&reseal(bytes)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedIndex);
    }
}
