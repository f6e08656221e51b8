//! Benchmarks for the sensor pipeline and a full facility tick

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use verdant_core::prelude::*;

fn full_room() -> Facility {
    let config = FacilityConfig {
        seed: 3,
        climate: vec![ClimateConfig::default()],
        ventilation: vec![VentilationConfig::default()],
        irrigation: vec![IrrigationConfig::default()],
        lighting: vec![LightingConfig::default()],
        sensors: SensorType::ALL
            .iter()
            .map(|kind| SensorConfig {
                name: format!("{:?}", kind).to_lowercase(),
                kind: *kind,
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };
    Facility::from_config(&config)
}

fn bench_sensor_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("sensor");
    let env = EnvironmentSnapshot::default();
    let mut sensor = Sensor::new("bench", SensorType::Temperature, SensorSource::Ambient);

    group.throughput(Throughput::Elements(1000));
    group.bench_function("sample_1000", |b| {
        b.iter(|| {
            for i in 0..1000 {
                black_box(sensor.sample(&env, i as f64));
            }
        })
    });
    group.bench_function("analytics_600", |b| {
        b.iter(|| black_box(sensor.analytics()))
    });

    group.finish();
}

fn bench_facility_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("facility");
    let mut facility = full_room();

    group.bench_function("advance_1s", |b| b.iter(|| facility.advance(black_box(1.0))));
    group.bench_function("status_all", |b| b.iter(|| black_box(facility.status_all())));

    group.finish();
}

criterion_group!(benches, bench_sensor_sample, bench_facility_tick);
criterion_main!(benches);
