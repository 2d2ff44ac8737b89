use criterion::*;
use screener_spider::{derived, extract};

const PAGE: &str = include_str!("../tests/files/suzlon.html");

// parse a company page
// ----------------------------------------------------------
fn benchmark_parse(c: &mut Criterion) {
    c.bench_function("parse company page", |b| {
        b.iter(|| extract::parse(black_box(PAGE)).expect("fixture parses"))
    });

    c.bench_function("has annual data", |b| {
        b.iter(|| extract::has_annual_data(black_box(PAGE)))
    });
}

// derived metrics over parsed sections
// ----------------------------------------------------------
fn benchmark_derived(c: &mut Criterion) {
    let sections = extract::parse(PAGE).expect("fixture parses");

    c.bench_function("derive metrics", |b| {
        b.iter(|| derived::compute(black_box(&sections)))
    });
}

criterion_group!(benches, benchmark_parse, benchmark_derived);
criterion_main!(benches);
