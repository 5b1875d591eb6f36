//! Benchmarks for the render side and the control path
//!
//! Run with: cargo bench --bench render_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geodrone::audio_node::BLOCK_SIZE;
use geodrone::backend::OfflineBackendFactory;
use geodrone::config::{EngineConfig, ReverbConfig};
use geodrone::engine::EnvironmentalAudioEngine;
use geodrone::mapper::{MappingStrategy, ParameterMapper};
use geodrone::scheduler::PulseProfile;
use geodrone::snapshot::EnvironmentalSnapshot;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn bench_config(reverb: bool) -> EngineConfig {
    EngineConfig {
        seed: Some(1),
        pulse: PulseProfile::drone(),
        reverb: ReverbConfig {
            enabled: reverb,
            ..ReverbConfig::default()
        },
        ..EngineConfig::default()
    }
}

/// One 512-frame block of the full drone graph
fn bench_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_block");

    for reverb in [false, true] {
        let offline = OfflineBackendFactory::new(44100.0);
        let handle = offline.render_handle();
        let mut engine = EnvironmentalAudioEngine::new(bench_config(reverb), offline).unwrap();
        engine.start().unwrap();
        let mut buffer = vec![0.0f32; BLOCK_SIZE * 2];

        let label = if reverb { "with_reverb" } else { "dry" };
        group.bench_with_input(BenchmarkId::from_parameter(label), &reverb, |b, _| {
            b.iter(|| {
                handle.render(&mut buffer);
                black_box(&buffer);
            })
        });
    }

    group.finish();
}

/// Snapshot to targets, both strategies
fn bench_mapping(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_snapshot");
    let snapshot = EnvironmentalSnapshot::new(52.5, 13.4, 8.0, 9.0, 0.35)
        .with_humidity(70.0)
        .with_heading(210.0);

    for strategy in [MappingStrategy::IndependentDrift, MappingStrategy::SolarHarmonic] {
        let mapper = ParameterMapper::new(strategy, 8);
        let mut rng = StdRng::seed_from_u64(0);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", strategy)),
            &snapshot,
            |b, snapshot| b.iter(|| black_box(mapper.map(black_box(snapshot), &mut rng))),
        );
    }

    group.finish();
}

/// A full recomputation: mapping plus every ramp it schedules
fn bench_snapshot_update(c: &mut Criterion) {
    let mut engine =
        EnvironmentalAudioEngine::new(bench_config(true), OfflineBackendFactory::new(44100.0))
            .unwrap();
    engine.start().unwrap();
    let mut heading = 0.0f32;

    c.bench_function("snapshot_update", |b| {
        b.iter(|| {
            heading = (heading + 7.0) % 360.0;
            let snapshot = EnvironmentalSnapshot::default().with_heading(heading);
            engine.set_environmental_data(black_box(snapshot)).unwrap();
        })
    });
}

criterion_group!(benches, bench_block, bench_mapping, bench_snapshot_update);
criterion_main!(benches);
