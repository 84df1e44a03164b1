use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wegent_control_plane::services::response_processor::ThrottleGate;

fn bench_allow_content_always_open(c: &mut Criterion) {
    c.bench_function("throttle_gate_allow_content_open_window", |b| {
        b.iter(|| {
            let mut gate = ThrottleGate::new();
            let start = Instant::now();
            black_box(gate.allow_content(start));
            black_box(gate.allow_content(start + Duration::from_millis(600)));
        });
    });
}

fn bench_allow_content_saturated(c: &mut Criterion) {
    c.bench_function("throttle_gate_allow_content_saturated", |b| {
        let mut gate = ThrottleGate::new();
        let start = Instant::now();
        gate.allow_content(start);
        b.iter(|| {
            black_box(gate.allow_content(start + Duration::from_millis(10)));
        });
    });
}

criterion_group!(benches, bench_allow_content_always_open, bench_allow_content_saturated);
criterion_main!(benches);
