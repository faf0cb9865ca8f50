//! Param Expansion Benchmarks
//!
//! Benchmarks for param-space expansion, case-key serialization and query
//! parsing.
//!
//! Run with: `cargo bench --bench param_expansion`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use conformo::{parse_query, ParamSpace, ParamsBuilder};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn grid(width: u64) -> ParamSpace {
    ParamsBuilder::new()
        .combine("format", ["r8", "rg8", "rgba8", "rgba16f", "rgba32f"])
        .combine("width", 1..=width)
        .pbool("mipmapped")
        .unless(|p| Ok(p.bool("mipmapped")? && p.u64("width")? % 2 == 1))
        .begin_subcases()
        .expand("level", |p| {
            let levels = if p.bool("mipmapped")? { 3u64 } else { 1 };
            Ok(0..levels)
        })
        .build()
        .unwrap()
}

fn bench_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("param_expansion");

    for width in [4u64, 16, 64] {
        let space = grid(width);
        group.bench_with_input(BenchmarkId::new("cases", width), &space, |bench, space| {
            bench.iter(|| {
                let count = space.cases().filter(Result::is_ok).count();
                black_box(count);
            });
        });
        group.bench_with_input(BenchmarkId::new("subcases", width), &space, |bench, space| {
            bench.iter(|| {
                let mut total = 0usize;
                for case in space.cases().flatten() {
                    total += case.subcases().count();
                }
                black_box(total);
            });
        });
    }

    group.finish();
}

fn bench_case_keys(c: &mut Criterion) {
    let space = grid(16);
    let cases: Vec<_> = space.cases().flatten().collect();

    c.bench_function("case_keys", |bench| {
        bench.iter(|| {
            for case in &cases {
                black_box(case.key());
            }
        });
    });
}

fn bench_query_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_parsing");

    let queries = vec![
        ("multi_file", "webgpu:api,operation,*"),
        ("multi_test", "webgpu:api,operation,buffers:*"),
        ("multi_case", r#"webgpu:api,operation,buffers:map:{"size":16},*"#),
        (
            "single_case",
            r#"webgpu:api,operation,buffers:map:{"size":16,"mapped":true,"format":"rgba8"}"#,
        ),
    ];

    for (name, query) in queries {
        group.bench_with_input(BenchmarkId::from_parameter(name), &query, |bench, q| {
            bench.iter(|| {
                let parsed = parse_query(black_box(q)).unwrap();
                black_box(parsed.to_string());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_expansion, bench_case_keys, bench_query_parsing);
criterion_main!(benches);
