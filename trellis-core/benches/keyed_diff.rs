//! Benchmarks for the keyed child diff and the LIS helper.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trellis_core::host::MemoryHost;
use trellis_core::renderer::{longest_increasing_subsequence, Renderer};
use trellis_core::vnode::VNode;
use trellis_core::Runtime;

fn list(keys: &[i64]) -> VNode {
    VNode::element("ul").children(
        keys.iter()
            .map(|k| VNode::element("li").key(*k).children(k.to_string()))
            .collect::<Vec<_>>(),
    )
}

/// Benchmark reversing a keyed list, the worst case for moves
fn bench_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_reverse");

    for n in [10i64, 100, 1000] {
        let forward: Vec<i64> = (0..n).collect();
        let backward: Vec<i64> = forward.iter().rev().copied().collect();

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let runtime = Runtime::new();
            let mut host = MemoryHost::new();
            let root = host.create_root();
            let renderer = Renderer::new(&runtime, host);
            renderer.mount(list(&forward), root).unwrap();

            let mut flip = false;
            b.iter(|| {
                flip = !flip;
                let keys = if flip { &backward } else { &forward };
                renderer.mount(list(keys), root).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark moving one item from the end to the front
fn bench_single_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_single_move");

    for n in [100i64, 1000] {
        let base: Vec<i64> = (0..n).collect();
        let mut moved = base.clone();
        moved.rotate_right(1);

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let runtime = Runtime::new();
            let mut host = MemoryHost::new();
            let root = host.create_root();
            let renderer = Renderer::new(&runtime, host);
            renderer.mount(list(&base), root).unwrap();

            let mut flip = false;
            b.iter(|| {
                flip = !flip;
                let keys = if flip { &moved } else { &base };
                renderer.mount(list(keys), root).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_lis(c: &mut Criterion) {
    let seq: Vec<usize> = (1..=1000).map(|i| (i * 7919) % 1000 + 1).collect();
    c.bench_function("lis_1000", |b| {
        b.iter(|| longest_increasing_subsequence(black_box(&seq)))
    });
}

criterion_group!(benches, bench_reverse, bench_single_move, bench_lis);
criterion_main!(benches);
