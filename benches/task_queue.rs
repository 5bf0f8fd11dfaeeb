//! Benchmarks for the ready/delayed queue tiers against an in-memory
//! SQLite pool (§6 Persisted state, C2).
//!
//! Run with: cargo bench --bench task_queue

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use abathur::adapters::sqlite::create_migrated_test_pool;
use abathur::adapters::sqlite::SqliteQueueRepository;
use abathur::domain::models::{Task, TaskType};
use abathur::domain::ports::QueueRepository;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().expect("tokio runtime")
}

fn bench_push_ready(c: &mut Criterion) {
    let rt = runtime();
    let repo = rt.block_on(async {
        let pool = create_migrated_test_pool().await.expect("migrated pool");
        SqliteQueueRepository::new(pool)
    });

    let mut group = c.benchmark_group("queue_push_ready");
    for batch in [10usize, 100, 500] {
        group.bench_with_input(BenchmarkId::new("tasks", batch), &batch, |b, &batch| {
            b.to_async(&rt).iter(|| async {
                for _ in 0..batch {
                    let task = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
                    repo.push_ready(black_box(&task)).await.unwrap();
                }
            });
        });
    }
    group.finish();
}

fn bench_pop_ready_drain(c: &mut Criterion) {
    let rt = runtime();

    let mut group = c.benchmark_group("queue_pop_ready_drain");
    for batch in [10usize, 100] {
        group.bench_with_input(BenchmarkId::new("tasks", batch), &batch, |b, &batch| {
            b.to_async(&rt).iter_batched(
                || {
                    rt.block_on(async {
                        let pool = create_migrated_test_pool().await.expect("migrated pool");
                        let repo = SqliteQueueRepository::new(pool);
                        for _ in 0..batch {
                            let task = Task::new(TaskType::RestartPedestal, serde_json::json!({}));
                            repo.push_ready(&task).await.unwrap();
                        }
                        repo
                    })
                },
                |repo| async move {
                    for _ in 0..batch {
                        let popped = repo.block_pop_ready(std::time::Duration::from_millis(50)).await.unwrap();
                        black_box(popped);
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_push_ready, bench_pop_ready_drain);
criterion_main!(benches);
