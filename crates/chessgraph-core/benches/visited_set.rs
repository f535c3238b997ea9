use chessgraph_core::position_key::PositionKey;
use chessgraph_core::visited::VisitedSet;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

fn keys(n: usize) -> Vec<PositionKey> {
    (0..n)
        .map(|i| PositionKey::new(format!("8/8/8/8/8/8/8/{i} w - -")))
        .collect()
}

fn bench_claim_unique(c: &mut Criterion) {
    let keys = keys(10_000);

    c.bench_function("visited_claim_unique", |b| {
        b.iter_batched(
            VisitedSet::new,
            |visited| {
                for key in &keys {
                    black_box(visited.claim(key));
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_claim_contended(c: &mut Criterion) {
    let keys = Arc::new(keys(2_000));

    c.bench_function("visited_claim_contended_4_threads", |b| {
        b.iter(|| {
            let visited = Arc::new(VisitedSet::new());
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let visited = Arc::clone(&visited);
                    let keys = Arc::clone(&keys);
                    thread::spawn(move || keys.iter().filter(|k| visited.claim(k)).count())
                })
                .collect();
            let won: usize = handles.into_iter().map(|h| h.join().unwrap_or(0)).sum();
            black_box(won)
        })
    });
}

criterion_group!(benches, bench_claim_unique, bench_claim_contended);
criterion_main!(benches);
