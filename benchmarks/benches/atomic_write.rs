//! Benchmarks for atomic generation writes and reads

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use storage::{LocalStorage, StorageBackend};
use tempfile::TempDir;

fn atomic_write_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(temp_dir.path());

    let mut group = c.benchmark_group("atomic_write");

    for size in [1_000_000, 10_000_000, 100_000_000].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        let data = Bytes::from(vec![0u8; *size]);

        group.bench_function(format!("{}MB", size / 1_000_000), |b| {
            b.to_async(&rt).iter(|| async {
                storage.write("bench.0.100", data.clone()).await.unwrap();
            });
        });
    }

    group.finish();
}

fn read_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("generation_read");

    for size in [1_000_000, 10_000_000, 100_000_000].iter() {
        group.throughput(Throughput::Bytes(*size as u64));

        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());
        rt.block_on(async {
            storage
                .write("bench.0.100", Bytes::from(vec![0u8; *size]))
                .await
                .unwrap();
        });

        group.bench_function(format!("{}MB", size / 1_000_000), |b| {
            b.to_async(&rt).iter(|| async {
                storage.read("bench.0.100").await.unwrap();
            });
        });
    }

    group.finish();
}

fn concurrent_rank_writes(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("concurrent_rank_writes");

    for ranks in [1u32, 4, 8, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(ranks), ranks, |b, &ranks| {
            b.to_async(&rt).iter(|| async move {
                let temp_dir = TempDir::new().unwrap();
                let storage = Arc::new(LocalStorage::new(temp_dir.path()));

                let handles: Vec<_> = (0..ranks)
                    .map(|rank| {
                        let storage = storage.clone();
                        tokio::spawn(async move {
                            storage
                                .write(&format!("bench.{}.100", rank), Bytes::from(vec![0u8; 1_000_000]))
                                .await
                                .unwrap();
                        })
                    })
                    .collect();

                for handle in handles {
                    handle.await.unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    atomic_write_benchmark,
    read_benchmark,
    concurrent_rank_writes,
);
criterion_main!(benches);
