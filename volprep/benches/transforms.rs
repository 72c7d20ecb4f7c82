use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use volprep::normalize::{center_scale, clip_normalize, ClipNormalizeConfig, DegeneratePolicy};
use volprep::resize::{resize, ResizeFactor};
use volprep::volume::{Volume, VolumeShape};

fn stack() -> Volume {
    let shape = VolumeShape::new(32, 256, 256);
    Volume::from_fn(shape, |z, y, x| ((z * 131 + y * 17 + x * 7) % 4096) as f32)
}

fn bench_resize(c: &mut Criterion) {
    let volume = stack();
    c.bench_function("resize_half", |b| {
        b.iter(|| resize(black_box(&volume), ResizeFactor::isotropic(0.5)))
    });
    c.bench_function("resize_anisotropic", |b| {
        b.iter(|| resize(black_box(&volume), ResizeFactor::new(2.0, 0.75, 0.75)))
    });
}

fn bench_normalize(c: &mut Criterion) {
    let volume = stack();
    c.bench_function("center_scale", |b| {
        b.iter(|| center_scale(black_box(&volume), DegeneratePolicy::Skip))
    });
    let config = ClipNormalizeConfig::fluorescence();
    c.bench_function("clip_normalize_u16", |b| {
        b.iter(|| clip_normalize(black_box(&volume), &config))
    });
}

criterion_group!(benches, bench_resize, bench_normalize);
criterion_main!(benches);
