//! # Layer State Benchmarks
//!
//! Measures per-frame state computation, visibility predicates, and frame
//! composition.
//!
//! Run: `cargo bench --bench layer_state`

use cartolayer_core::{
    in_view, sort_by_z_index, visible_at_resolution, Layer, LayerOptions, LayerProperties, Map,
    Source, SourceState, ViewState,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn build_layers(count: usize) -> Vec<Layer> {
    (0..count)
        .map(|i| {
            Layer::new(
                LayerOptions::new()
                    .with_source(Source::new(SourceState::Ready))
                    .with_properties(
                        LayerProperties::new()
                            .with_opacity(0.5)
                            .with_z_index((count - i) as f64)
                            .with_resolution_range(0.0, (i + 1) as f64),
                    ),
            )
        })
        .collect()
}

fn bench_layer_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("layer_state");
    let layers = build_layers(1);
    let layer = &layers[0];

    group.bench_function("managed", |b| b.iter(|| black_box(layer.layer_state(true))));
    group.bench_function("unmanaged", |b| {
        b.iter(|| black_box(layer.layer_state(false)))
    });

    group.finish();
}

fn bench_visibility(c: &mut Criterion) {
    let mut group = c.benchmark_group("visibility");
    let state = build_layers(1)[0].layer_state(true);
    let view = ViewState::new([0.0, 0.0], 0.5, 3.0);

    group.bench_function("visible_at_resolution", |b| {
        b.iter(|| black_box(visible_at_resolution(black_box(&state), black_box(0.5))))
    });
    group.bench_function("in_view", |b| {
        b.iter(|| black_box(in_view(black_box(&state), black_box(&view))))
    });

    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");

    for count in [8, 64, 256] {
        let layers = build_layers(count);
        let states: Vec<_> = layers.iter().map(|layer| layer.layer_state(true)).collect();
        group.bench_with_input(BenchmarkId::new("sort_by_z_index", count), &states, |b, states| {
            b.iter(|| {
                let mut states = states.clone();
                sort_by_z_index(&mut states);
                black_box(states)
            })
        });

        let map = Map::new();
        for layer in &layers {
            map.add_layer(layer);
        }
        let view = ViewState::new([0.0, 0.0], 4.0, 3.0);
        group.bench_with_input(BenchmarkId::new("render_frame", count), &view, |b, view| {
            b.iter(|| black_box(map.render_frame(*view, [256, 256])))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_layer_state, bench_visibility, bench_frame);
criterion_main!(benches);
