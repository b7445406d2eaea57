use std::sync::Arc;
use std::thread;

use criterion::{criterion_group, criterion_main, Criterion};
use membound::prelude::FixedSize;
use membound::{CancellationToken, MemoryBoundedQueue};

fn bench_uncontended(c: &mut Criterion) {
    let queue = MemoryBoundedQueue::with_limit(1024 * 1024, FixedSize(64)).unwrap();
    c.bench_function("enqueue_dequeue_uncontended", |b| {
        b.iter(|| {
            queue.try_enqueue(7u64).unwrap();
            let _ = queue.try_dequeue().unwrap();
        })
    });
}

fn bench_contended(c: &mut Criterion) {
    c.bench_function("spsc_4k_items_tight_budget", |b| {
        b.iter(|| {
            let queue: Arc<MemoryBoundedQueue<u64>> =
                Arc::new(MemoryBoundedQueue::with_limit(64 * 32, FixedSize(64)).unwrap());
            let producer = {
                let q = Arc::clone(&queue);
                thread::spawn(move || {
                    let never = CancellationToken::never();
                    for i in 0..4096u64 {
                        q.enqueue(i, &never).unwrap();
                    }
                })
            };
            let never = CancellationToken::never();
            for _ in 0..4096 {
                let _ = queue.dequeue(&never).unwrap();
            }
            producer.join().unwrap();
        })
    });
}

criterion_group!(queues, bench_uncontended, bench_contended);
criterion_main!(queues);
