// Copyright 2025 the Imperial Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use imperial_link::{CacheNode, LinkGraph, Links, NodeId, TraversalScratch, path};

#[derive(Clone)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u32(&mut self) -> u32 {
        // Numerical Recipes LCG parameters.
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.0 >> 32) as u32
    }

    fn gen_range_usize(&mut self, upper_exclusive: usize) -> usize {
        if upper_exclusive == 0 {
            return 0;
        }
        (self.next_u32() as usize) % upper_exclusive
    }
}

/// A DAG where node `i` feeds up to `edges_per_node` earlier nodes, all
/// holding a valid value.
fn build_dag(n: u32, edges_per_node: u32, seed: u64) -> (LinkGraph<u64, u32>, Vec<NodeId>) {
    let mut graph = LinkGraph::new();
    let mut rng = Lcg::new(seed);
    let ids: Vec<NodeId> = (0..n)
        .map(|i| graph.insert(CacheNode::with_value(u64::from(i), i)))
        .collect();
    for from in 1..n as usize {
        for _ in 0..(edges_per_node as usize).min(from) {
            let to = rng.gen_range_usize(from);
            graph.add_link(ids[to], ids[from]);
        }
    }
    (graph, ids)
}

fn bench_invalidate(c: &mut Criterion) {
    let mut group = c.benchmark_group("imperial_link/invalidate");
    group.sample_size(50);

    for &(n, edges_per_node) in &[
        (256_u32, 1_u32),
        (256_u32, 4_u32),
        (4_096_u32, 1_u32),
        (4_096_u32, 4_u32),
    ] {
        group.bench_function(format!("from_root(n={n},e={edges_per_node})"), |b| {
            b.iter_batched(
                || build_dag(n, edges_per_node, 0x1A7E_0000_0000_0001),
                |(mut graph, ids)| {
                    black_box(graph.invalidate(ids[0]));
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_function(
            format!("from_root_with_scratch(n={n},e={edges_per_node})"),
            |b| {
                b.iter_batched(
                    || build_dag(n, edges_per_node, 0x1A7E_0000_0000_0002),
                    |(mut graph, ids)| {
                        let mut scratch = TraversalScratch::with_capacity(n as usize / 2);
                        black_box(graph.invalidate_with(ids[0], &mut scratch));
                    },
                    BatchSize::LargeInput,
                );
            },
        );

        group.bench_function(format!("set_unchanged(n={n},e={edges_per_node})"), |b| {
            b.iter_batched(
                || build_dag(n, edges_per_node, 0x1A7E_0000_0000_0003),
                |(mut graph, ids)| {
                    black_box(graph.set(ids[0], 0));
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_links(c: &mut Criterion) {
    let mut group = c.benchmark_group("imperial_link/links");

    group.bench_function("stage_then_register(n=1024)", |b| {
        b.iter_batched(
            || {
                let mut links = Links::<u64, u32>::new();
                let scope = links.new_map(None);
                let readers: Vec<NodeId> = (0..1024)
                    .map(|i| links.graph_mut().insert(CacheNode::new(i)))
                    .collect();
                (links, scope, readers)
            },
            |(mut links, scope, readers)| {
                let name = path::key("Root", "count");
                for reader in &readers {
                    links.add_reference(scope, *reader, &name);
                }
                let count = links.graph_mut().insert(CacheNode::with_value(1, 0));
                links.register(scope, name, count);
                black_box(links.graph_mut().invalidate(count));
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("lookup_depth_16", |b| {
        let mut links = Links::<u64, u32>::new();
        let root = links.new_map(None);
        let node = links.graph_mut().insert(CacheNode::new(0));
        links.register(root, path::key("Root", "count"), node);
        let mut leaf = root;
        for _ in 0..16 {
            leaf = links.new_map(Some(leaf));
        }
        let name = path::key("Root", "count");
        b.iter(|| black_box(links.lookup(leaf, &name)));
    });

    group.finish();
}

criterion_group!(benches, bench_invalidate, bench_links);
criterion_main!(benches);
