//! Compile and render micro-benchmark.
//!
//! Measures the two per-call stages of a one-shot read:
//! - compiling a nested description into a request batch
//! - rendering a filled result buffer as a JSON array

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use cobridge::batch::{pair, render};
use cobridge::compiler::compile;
use cobridge_common::xchg::{ValueKind, ValueSlot};
use serde_json::{Value, json};

const SIZES: [usize; 3] = [10, 100, 1000];

/// One branch per slave, one leaf per register.
fn description(registers: usize) -> Value {
    let slaves: Vec<Value> = (0..registers.div_ceil(10))
        .map(|slave| {
            let items: Vec<Value> = (0..10)
                .map(|reg| json!({ "reg": format!("0x{:04x}", 0x6000 + reg) }))
                .collect();
            json!({ "id": slave + 1, "items": items })
        })
        .collect();
    json!({ "itf": 0, "subreg": 0, "type": "i32", "items": slaves })
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for size in SIZES {
        let tree = description(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &tree, |b, tree| {
            b.iter(|| compile(black_box(tree)).expect("compiles"));
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    for size in SIZES {
        let mut buffers = pair(compile(&description(size)).expect("compiles")).expect("pairs");
        for (i, slot) in buffers.results.iter_mut().enumerate() {
            *slot = ValueSlot::from_i128(ValueKind::I32, -(i as i128) * 1_000_003)
                .unwrap_or_default();
        }
        group.bench_with_input(BenchmarkId::from_parameter(size), &buffers, |b, buffers| {
            b.iter(|| render(black_box(&buffers.requests), black_box(&buffers.results)).expect("renders"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_render);
criterion_main!(benches);
