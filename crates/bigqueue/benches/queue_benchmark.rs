// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Benchmarks for the persistent queue.
//!
//! Measures:
//! - Enqueue throughput at different message sizes
//! - Enqueue followed by peek and dequeue
//! - Cost of the operation-count flush

use std::hint::black_box;

use bigqueue::{Queue, QueueBuilder};
use bytes::Bytes;
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tempfile::TempDir;

/// Message sizes to benchmark (bytes)
const MESSAGE_SIZES: &[usize] = &[64, 256, 1024, 4096, 16384];

/// Number of messages for batch tests
const BATCH_SIZE: usize = 10_000;

const ARENA_SIZE: u64 = 64 * 1024 * 1024;

fn create_queue(temp_dir: &TempDir, flush_ops: Option<u64>) -> Queue {
    let builder = QueueBuilder::new(temp_dir.path()).arena_size(ARENA_SIZE);
    let builder = match flush_ops {
        Some(ops) => builder.periodic_flush_ops(ops),
        None => builder,
    };
    builder.build().expect("Failed to create queue")
}

fn generate_message(size: usize) -> Bytes { Bytes::from(vec![0xABu8; size]) }

fn bench_enqueue_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_throughput");

    for &size in MESSAGE_SIZES {
        group.throughput(Throughput::Bytes((size * BATCH_SIZE) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let msg = generate_message(size);
            b.iter_batched(
                || {
                    let temp_dir = TempDir::new().unwrap();
                    let queue = create_queue(&temp_dir, None);
                    (temp_dir, queue)
                },
                |(_temp_dir, queue)| {
                    for _ in 0..BATCH_SIZE {
                        queue.enqueue(black_box(&msg)).unwrap();
                    }
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

fn bench_enqueue_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_dequeue");

    for &size in MESSAGE_SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir, None);
            let msg = generate_message(size);

            b.iter(|| {
                queue.enqueue(&msg).unwrap();
                black_box(queue.peek().unwrap());
                queue.dequeue().unwrap();
            });
        });
    }

    group.finish();
}

fn bench_flush_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_flush_ops");
    let msg = generate_message(256);

    for ops in [1u64, 100, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(ops), &ops, |b, &ops| {
            let temp_dir = TempDir::new().unwrap();
            let queue = create_queue(&temp_dir, Some(ops));

            b.iter(|| queue.enqueue(black_box(&msg)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_enqueue_throughput,
    bench_enqueue_dequeue,
    bench_flush_ops
);
criterion_main!(benches);
