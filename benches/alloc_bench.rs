//! Allocator benchmarks: fcmalloc vs the system allocator.
//!
//! fcmalloc is benchmarked through its public API; the system allocator
//! through `GlobalAlloc` with a matching layout.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::alloc::{GlobalAlloc, Layout, System};
use std::hint::black_box;

const SIZES: &[usize] = &[16, 64, 256, 1024, 4096, 16384];
const BATCH: usize = 128;

fn bench_alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_free");
    for &size in SIZES {
        group.throughput(Throughput::Elements(1));

        group.bench_with_input(BenchmarkId::new("fcmalloc", size), &size, |b, &size| {
            b.iter(|| {
                let ptr = fcmalloc::allocate(black_box(size));
                assert!(!ptr.is_null());
                fcmalloc::free(black_box(ptr));
            })
        });

        group.bench_with_input(BenchmarkId::new("system", size), &size, |b, &size| {
            let layout = Layout::from_size_align(size, 8).unwrap();
            b.iter(|| unsafe {
                let ptr = System.alloc(layout);
                assert!(!ptr.is_null());
                System.dealloc(black_box(ptr), layout);
            })
        });
    }
    group.finish();
}

fn bench_alloc_batch_then_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_batch_then_free");
    for &size in SIZES {
        group.throughput(Throughput::Elements(BATCH as u64));

        group.bench_with_input(BenchmarkId::new("fcmalloc", size), &size, |b, &size| {
            let mut ptrs = Vec::with_capacity(BATCH);
            b.iter(|| {
                for _ in 0..BATCH {
                    let ptr = fcmalloc::allocate(black_box(size));
                    assert!(!ptr.is_null());
                    ptrs.push(ptr);
                }
                for ptr in ptrs.drain(..).rev() {
                    fcmalloc::free(ptr);
                }
            })
        });

        group.bench_with_input(BenchmarkId::new("system", size), &size, |b, &size| {
            let layout = Layout::from_size_align(size, 8).unwrap();
            let mut ptrs = Vec::with_capacity(BATCH);
            b.iter(|| unsafe {
                for _ in 0..BATCH {
                    let ptr = System.alloc(layout);
                    assert!(!ptr.is_null());
                    ptrs.push(ptr);
                }
                for ptr in ptrs.drain(..).rev() {
                    System.dealloc(ptr, layout);
                }
            })
        });
    }
    group.finish();
}

fn bench_cross_thread_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_thread_free");
    group.throughput(Throughput::Elements(BATCH as u64));
    group.bench_function("fcmalloc_producer_consumer", |b| {
        b.iter(|| {
            let (tx, rx) = std::sync::mpsc::channel::<usize>();
            let consumer = std::thread::spawn(move || {
                for addr in rx {
                    fcmalloc::free(addr as *mut u8);
                }
            });
            for _ in 0..BATCH {
                let ptr = fcmalloc::allocate(64);
                assert!(!ptr.is_null());
                tx.send(ptr as usize).unwrap();
            }
            drop(tx);
            consumer.join().unwrap();
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_alloc_free,
    bench_alloc_batch_then_free,
    bench_cross_thread_free
);
criterion_main!(benches);
