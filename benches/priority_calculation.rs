//! There is no literal "priority" field in this domain (§9 redesign); the
//! closest analogue is the retry back-off calculation that determines a
//! rescheduled task's place in the delayed tier's ordering (§4.6, §7.1).
//! Retargeted from a priority-queue benchmark to that computation.
//!
//! Run with: cargo bench --bench priority_calculation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use abathur::domain::models::RetryPolicy;

fn bench_backoff_duration(c: &mut Criterion) {
    let policy = RetryPolicy { max_attempts: 8, backoff_sec: 5 };

    let mut group = c.benchmark_group("backoff_duration");
    for retry_count in [0u32, 1, 3, 5, 8] {
        group.bench_with_input(BenchmarkId::new("retry_count", retry_count), &retry_count, |b, &retry_count| {
            b.iter(|| {
                let duration = policy.backoff_duration(black_box(retry_count), black_box(0.42));
                black_box(duration)
            });
        });
    }
    group.finish();
}

/// A delayed-queue promotion pass orders strictly by `execute_time`; this
/// sweeps across jitter values to confirm the computation itself (not just
/// one fixed input) stays cheap at the batch sizes `Scheduler::tick` uses.
fn bench_backoff_jitter_sweep(c: &mut Criterion) {
    let policy = RetryPolicy { max_attempts: 8, backoff_sec: 5 };

    c.bench_function("backoff_duration_jitter_sweep_100", |b| {
        b.iter(|| {
            for i in 0..100u32 {
                let jitter = (i as f64) / 100.0;
                let duration = policy.backoff_duration(black_box(i % 8), black_box(jitter));
                black_box(duration);
            }
        });
    });
}

criterion_group!(benches, bench_backoff_duration, bench_backoff_jitter_sweep);
criterion_main!(benches);
