use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use daq_settings::device::{Device, MockSynthesizer};
use daq_settings::parameter::{Parameter, Value, ValueKind, ValueMap};
use daq_settings::units::{UnitRegistry, UnitSystem};

fn frequency_parameter(cache_size: usize) -> Parameter {
    let units = UnitRegistry::shared();
    Parameter::builder("frequency", units.quantity(2.85e9, "Hz").unwrap())
        .valid_values(ValueKind::Float)
        .range(9e3, 6e9)
        .build()
        .unwrap()
        .with_cache_max_size(cache_size)
}

fn wide_tree(keys: usize) -> Parameter {
    Parameter::from_values((0..keys).map(|i| (format!("k{}", i), Value::Float(i as f64)))).unwrap()
}

fn benchmark_unit_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_value_in_units");
    for cache_size in [0usize, 100] {
        let p = frequency_parameter(cache_size);
        group.bench_with_input(BenchmarkId::from_parameter(cache_size), &p, |b, p| {
            b.iter(|| black_box(p.get_value_in_units("GHz", "frequency").unwrap()));
        });
    }
    group.finish();
}

fn benchmark_validated_set(c: &mut Criterion) {
    let mut p = frequency_parameter(100);
    let mut magnitude = 1e9;
    c.bench_function("set_quantity_magnitude", |b| {
        b.iter(|| {
            magnitude = if magnitude > 5e9 { 1e9 } else { magnitude + 1e3 };
            p.set("frequency", black_box(magnitude)).unwrap();
        });
    });
}

fn benchmark_json_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("json_roundtrip");
    for keys in [10usize, 100] {
        let p = wide_tree(keys);
        group.bench_with_input(BenchmarkId::from_parameter(keys), &p, |b, p| {
            b.iter(|| black_box(Parameter::from_json(&p.to_json()).unwrap()));
        });
    }
    group.finish();
}

fn benchmark_feedback(c: &mut Criterion) {
    let units = UnitRegistry::shared();
    let request = ValueMap::from([
        ("frequency".to_string(), Value::from(units.quantity(2.0, "GHz").unwrap())),
        ("power".to_string(), Value::Float(-5.0)),
    ]);
    c.bench_function("synthesizer_update_with_feedback", |b| {
        b.iter_batched(
            || MockSynthesizer::new().unwrap().with_frequency_offset(10.0),
            |mut synth| black_box(synth.update_and_get_with_feedback(&request).unwrap()),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    benchmark_unit_conversion,
    benchmark_validated_set,
    benchmark_json_roundtrip,
    benchmark_feedback
);
criterion_main!(benches);
