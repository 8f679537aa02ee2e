use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pullup_mastery::{
    ManualClock, MemoryRecordStore, RecordStore, SetProgress, SqliteRecordStore, WorkoutRecord,
    WorkoutSession, WorkoutType,
};
use std::sync::Arc;

/// Benchmark the per-frame progress projection
fn bench_progress_projection(c: &mut Criterion) {
    let mut group = c.benchmark_group("progress_projection");

    for total_sets in [3usize, 10, 50].iter() {
        let completed: Vec<u32> = (0..*total_sets as u32 - 1).map(|i| 20 - i % 20).collect();
        group.throughput(Throughput::Elements(*total_sets as u64));
        group.bench_with_input(
            BenchmarkId::new("project", total_sets),
            total_sets,
            |b, &total_sets| {
                b.iter(|| SetProgress::project(black_box(total_sets), black_box(&completed), Some(7)))
            },
        );
    }

    group.finish();
}

/// Benchmark a full Sub-Max session driven by a manual clock
fn bench_sub_max_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("sub_max_session");
    let start = Utc.with_ymd_and_hms(2025, 11, 3, 6, 30, 0).unwrap();

    group.bench_function("ten_sets_in_memory", |b| {
        b.iter(|| {
            let clock = ManualClock::new(start);
            let record = WorkoutRecord::with_date(WorkoutType::SubMaxVolume, start);
            let (mut session, _events) = WorkoutSession::sub_max(
                record,
                6,
                MemoryRecordStore::new(),
                Arc::new(clock.clone()),
            )
            .unwrap();

            for _ in 0..9 {
                session.complete_set().unwrap();
                clock.advance_secs(60);
                session.tick();
            }
            session.complete_set().unwrap();
            session.complete_workout().unwrap();
            black_box(session.total_reps())
        })
    });

    group.finish();
}

/// Benchmark history queries against SQLite
fn bench_history_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_queries");

    for size in [10usize, 100, 1000].iter() {
        let mut store = SqliteRecordStore::in_memory().unwrap();
        for i in 0..*size {
            let date = Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap() + chrono::Duration::hours(i as i64);
            let record = WorkoutRecord::manual(WorkoutType::MaxDay, date, vec![12, 10, 9]).unwrap();
            store.insert(&record).unwrap();
        }

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("list", size), &store, |b, store| {
            b.iter(|| black_box(store.list().unwrap()))
        });
        group.bench_with_input(
            BenchmarkId::new("latest_completed", size),
            &store,
            |b, store| b.iter(|| black_box(store.latest_completed(WorkoutType::MaxDay).unwrap())),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_progress_projection,
    bench_sub_max_session,
    bench_history_queries
);
criterion_main!(benches);
