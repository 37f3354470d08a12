//! Converter throughput benchmarks.
//!
//! Benchmarks the two hot paths on synthetic GraphML:
//! - **chunk_size_sweep**: dense property values over a range of chunk
//!   sizes — measures builder/flush overhead.
//! - **sparse_backfill**: one value at the tail of an otherwise-empty
//!   column — measures shared-constant null padding.
//! - **edge_permute**: shuffled edges over many sources — measures the CSR
//!   permutation and column rearrangement.
//!
//! # Running
//!
//! ```sh
//! cargo bench --bench convert_throughput
//! ```

use criterion::{BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use confluence::convert_graphml_str;

// ============================================================================
// Synthetic GraphML generators
// ============================================================================

/// A graph where every node carries a long and a string property — worst
/// case for builder appends, no null padding at all.
fn generate_dense_graph(nodes: usize) -> String {
    let mut xml = String::with_capacity(nodes * 96);
    xml.push_str("<graphml>");
    xml.push_str(r#"<key id="rank" for="node" attr.name="rank" attr.type="long"/>"#);
    xml.push_str(r#"<key id="name" for="node" attr.name="name" attr.type="string"/>"#);
    xml.push_str("<graph>");
    for i in 0..nodes {
        xml.push_str(&format!(
            "<node id=\"n{i}\"><data key=\"rank\">{i}</data><data key=\"name\">node {i}</data></node>"
        ));
    }
    xml.push_str("</graph></graphml>");
    xml
}

/// A graph where a property appears only on the last node — the column is
/// back-filled almost entirely from the shared null constant.
fn generate_sparse_graph(nodes: usize) -> String {
    let mut xml = String::with_capacity(nodes * 24);
    xml.push_str("<graphml><graph>");
    for i in 0..nodes - 1 {
        xml.push_str(&format!("<node id=\"n{i}\"/>"));
    }
    xml.push_str(&format!(
        "<node id=\"n{}\"><data key=\"late\">x</data></node>",
        nodes - 1
    ));
    xml.push_str("</graph></graphml>");
    xml
}

/// A graph whose edges arrive in shuffled order with a property per edge, so
/// the whole edge table has to move during CSR rearrangement.
fn generate_shuffled_edges(nodes: usize, edges: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pairs: Vec<(usize, usize)> = (0..edges)
        .map(|_| (rng.gen_range(0..nodes), rng.gen_range(0..nodes)))
        .collect();
    pairs.shuffle(&mut rng);

    let mut xml = String::with_capacity(nodes * 16 + edges * 80);
    xml.push_str("<graphml>");
    xml.push_str(r#"<key id="w" for="edge" attr.name="w" attr.type="double"/>"#);
    xml.push_str("<graph>");
    for i in 0..nodes {
        xml.push_str(&format!("<node id=\"n{i}\"/>"));
    }
    for (e, (s, t)) in pairs.iter().enumerate() {
        xml.push_str(&format!(
            "<edge source=\"n{s}\" target=\"n{t}\"><data key=\"w\">{e}.5</data></edge>"
        ));
    }
    xml.push_str("</graph></graphml>");
    xml
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_chunk_size_sweep(c: &mut Criterion) {
    let nodes = 50_000;
    let xml = generate_dense_graph(nodes);

    let mut group = c.benchmark_group("chunk_size_sweep");
    group.sample_size(20);
    group.noise_threshold(0.05);
    group.throughput(Throughput::Elements(nodes as u64));

    for chunk_size in [1_000, 5_000, 25_000, 100_000] {
        group.bench_with_input(
            BenchmarkId::new("convert_dense", chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| convert_graphml_str(&xml, chunk_size).unwrap());
            },
        );
    }
    group.finish();
}

fn bench_sparse_backfill(c: &mut Criterion) {
    let nodes = 200_000;
    let xml = generate_sparse_graph(nodes);

    let mut group = c.benchmark_group("sparse_backfill");
    group.sample_size(20);
    group.noise_threshold(0.05);
    group.throughput(Throughput::Elements(nodes as u64));

    group.bench_function("convert_sparse", |b| {
        b.iter(|| convert_graphml_str(&xml, 25_000).unwrap());
    });
    group.finish();
}

fn bench_edge_permute(c: &mut Criterion) {
    let nodes = 10_000;
    let edges = 100_000;
    let xml = generate_shuffled_edges(nodes, edges, 42);

    let mut group = c.benchmark_group("edge_permute");
    group.sample_size(10);
    group.noise_threshold(0.05);
    group.throughput(Throughput::Elements(edges as u64));

    group.bench_function("convert_shuffled", |b| {
        b.iter(|| convert_graphml_str(&xml, 25_000).unwrap());
    });
    group.finish();
}

// ============================================================================
// Criterion main
// ============================================================================

fn main() {
    let mut criterion = Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(3))
        .measurement_time(std::time::Duration::from_secs(10))
        .configure_from_args();

    bench_chunk_size_sweep(&mut criterion);
    bench_sparse_backfill(&mut criterion);
    bench_edge_permute(&mut criterion);

    criterion.final_summary();
}
