//! 변환 파이프라인/엔진 벤치마크

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::json;
use tokio::runtime::Runtime;

use logroute_core::record::Record;
use logroute_router::rule::{RoutingRule, RuleLoader};
use logroute_router::transform::{TransformContext, TransformPipeline};
use logroute_router::{BuiltinOptions, FnSink, RoutingEngine, TransformerRegistry};

fn create_record(id: usize) -> Record {
    json!({
        "id": id,
        "timestamp": "2024-01-15 12:00:00",
        "user": {"ssn": "123-45-6789", "email": "someone@example.com"},
        "client_ip": "192.168.1.123",
        "message": "order=A-1234 status=failed amount=12.50"
    })
    .as_object()
    .cloned()
    .unwrap()
}

fn pii_rule() -> serde_json::Value {
    json!({
        "name": "pii",
        "transformations": [
            {"type": "mask", "field": "user.ssn", "pattern": r"\d{3}-\d{2}"},
            {"type": "rename", "from": "user.email", "to": "contact"},
            {"type": "extract", "field": "message", "pattern": r"order=(\S+)", "target_field": "order_id"},
            {"type": "timestamp_normalize", "field": "timestamp"},
            {"type": "ip_anonymize", "field": "client_ip"}
        ],
        "destination": {"type": "out"}
    })
}

fn bench_transform_pipeline(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let pipeline = TransformPipeline::new(Arc::new(TransformerRegistry::with_builtins(
        BuiltinOptions::default(),
    )));
    let rule: Arc<RoutingRule> = Arc::new(serde_json::from_value(pii_rule()).unwrap());
    let record = create_record(0);

    let mut group = c.benchmark_group("transform_pipeline");
    group.throughput(Throughput::Elements(1));
    group.bench_function("five_steps", |b| {
        b.iter(|| {
            let ctx = TransformContext::new(black_box(record.clone()), Arc::clone(&rule));
            rt.block_on(pipeline.apply(ctx)).unwrap()
        })
    });
    group.finish();
}

fn bench_route_batch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let report = RuleLoader::load(vec![pii_rule()]);
    let engine = RoutingEngine::builder()
        .rules(report.rule_set)
        .sink("out", FnSink::new(|_records: &[Record]| Ok(())))
        .build()
        .unwrap();

    let mut group = c.benchmark_group("route_batch");
    for size in [10usize, 100, 1000] {
        let batch: Vec<Record> = (0..size).map(create_record).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &batch, |b, batch| {
            b.iter(|| rt.block_on(engine.route_batch(black_box(batch.clone()))).delivered_count())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_transform_pipeline, bench_route_batch);
criterion_main!(benches);
