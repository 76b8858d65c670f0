//! Classifier hot-path benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use opp_common::{ipv4_frame, FlowKey};
use opp_xfsm::{
    evaluate, provision, token_bucket_rules, Classifier, CondOp, Consistency, FlowStateMap,
    TokenBucket, XfsmTable,
};
use std::net::Ipv4Addr;
use std::sync::Arc;

fn classifier(consistency: Consistency) -> Classifier<FlowStateMap, XfsmTable> {
    let table = Arc::new(XfsmTable::default());
    provision(table.as_ref(), &token_bucket_rules()).expect("provision");
    Classifier::new(Arc::new(FlowStateMap::default()), table, TokenBucket::default())
        .expect("default bucket")
        .with_consistency(consistency)
}

fn bench_parse(c: &mut Criterion) {
    let frame = ipv4_frame(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(10, 0, 0, 1));

    c.bench_function("flow_key_parse", |b| {
        b.iter(|| FlowKey::parse(black_box(&frame)))
    });
}

fn bench_evaluate(c: &mut Criterion) {
    c.bench_function("evaluate_ge", |b| {
        b.iter(|| evaluate(CondOp::Ge.code(), black_box(7u64), black_box(3u64)))
    });
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(1));

    for consistency in [Consistency::Relaxed, Consistency::Atomic] {
        let classifier = classifier(consistency);
        let frame = ipv4_frame(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(10, 0, 0, 1));
        let mut now = 0u64;

        group.bench_with_input(
            BenchmarkId::new("single_flow", format!("{consistency:?}")),
            &frame,
            |b, frame| {
                b.iter(|| {
                    now += 1_000;
                    classifier.verdict(black_box(frame), now)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_evaluate, bench_classify);
criterion_main!(benches);
