//! Benchmarks for directed graph operations
//!
//! Run with: cargo bench -p fluentcore-task-graph

#![allow(clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use fluentcore_task_graph::{DirectedGraph, GraphEntry};
use std::hint::black_box;
use std::sync::Arc;

type Graph = DirectedGraph<(), ()>;

fn node(key: impl Into<String>) -> Graph {
    DirectedGraph::new(Arc::new(GraphEntry::new(key, ())))
}

/// Generate a wide graph: a sink depending on many leaves
fn generate_wide_graph(node_count: usize) -> Graph {
    let mut sink = node("sink");
    for i in 0..node_count {
        sink.add_dependency_graph(&node(format!("node_{i}"))).unwrap();
    }
    sink
}

/// Generate a deep graph with linear dependency chain
fn generate_deep_graph(depth: usize) -> Graph {
    let mut previous = node("node_0");
    for i in 1..depth {
        let mut current = node(format!("node_{i}"));
        current.add_dependency_graph(&previous).unwrap();
        previous = current;
    }
    previous
}

/// Generate a diamond graph (fan-out then fan-in)
fn generate_diamond_graph(width: usize, depth: usize) -> Graph {
    let mut previous_level = vec![node("source")];

    for level in 0..depth {
        let mut current_level = Vec::with_capacity(width);
        for w in 0..width {
            let mut current = node(format!("level_{level}_node_{w}"));
            for dep in &previous_level {
                current.add_dependency_graph(dep).unwrap();
            }
            current_level.push(current);
        }
        previous_level = current_level;
    }

    let mut sink = node("sink");
    for dep in &previous_level {
        sink.add_dependency_graph(dep).unwrap();
    }
    sink
}

/// Drain the graph wave by wave, completing every released node.
fn enumerate(graph: &mut Graph) -> usize {
    graph.prepare_for_enumeration().unwrap();
    let mut released = 0;
    loop {
        let mut wave = Vec::new();
        while let Some(entry) = graph.next() {
            wave.push(entry.key().to_string());
        }
        if wave.is_empty() {
            return released;
        }
        released += wave.len();
        for key in &wave {
            graph.report_completion(key);
        }
    }
}

fn benchmark_wide_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("wide_enumeration");

    for count in [50, 100, 200, 500] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let graph = generate_wide_graph(count);
            b.iter(|| black_box(enumerate(&mut graph.clone())));
        });
    }

    group.finish();
}

fn benchmark_deep_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_chain_enumeration");

    for depth in [10, 20, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let graph = generate_deep_graph(depth);
            b.iter(|| black_box(enumerate(&mut graph.clone())));
        });
    }

    group.finish();
}

fn benchmark_diamond_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("diamond_graph");

    for (width, depth) in [(5, 5), (10, 5), (5, 10), (10, 10)] {
        let label = format!("w{width}_d{depth}");
        group.bench_with_input(
            BenchmarkId::from_parameter(&label),
            &(width, depth),
            |b, &(width, depth)| {
                let graph = generate_diamond_graph(width, depth);
                b.iter(|| black_box(enumerate(&mut graph.clone())));
            },
        );
    }

    group.finish();
}

fn benchmark_cycle_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("cycle_detection");

    for count in [100, 500, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut graph = generate_wide_graph(count);
            graph.refresh().unwrap();
            b.iter(|| black_box(graph.has_cycles()));
        });
    }

    group.finish();
}

fn benchmark_graph_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_construction");

    for count in [100, 500, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let graph = generate_wide_graph(count);
                black_box(graph)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_wide_enumeration,
    benchmark_deep_chain,
    benchmark_diamond_graph,
    benchmark_cycle_detection,
    benchmark_graph_construction,
);

criterion_main!(benches);
