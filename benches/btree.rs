use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use pagetree::BTree;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::TempDir;

fn shuffled_keys(n: i32) -> Vec<i32> {
    let mut keys: Vec<i32> = (0..n).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(7));
    keys
}

fn bench_put(c: &mut Criterion) {
    let keys = shuffled_keys(10_000);

    c.bench_function("put_10000_random", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let tree = BTree::create(dir.path().join("bench.tree"), 100).unwrap();
                (dir, tree)
            },
            |(_dir, mut tree)| {
                for &key in &keys {
                    tree.put(key).unwrap();
                }
            },
            BatchSize::PerIteration,
        );
    });
}

fn bench_contains(c: &mut Criterion) {
    let keys = shuffled_keys(10_000);
    let dir = TempDir::new().unwrap();
    let mut tree = BTree::create(dir.path().join("bench.tree"), 100).unwrap();
    for &key in &keys {
        tree.put(key).unwrap();
    }

    c.bench_function("contains_10000_random", |b| {
        b.iter(|| {
            for &key in &keys {
                assert!(tree.contains(key).unwrap());
            }
        });
    });
}

fn bench_iterate(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut tree = BTree::create(dir.path().join("bench.tree"), 100).unwrap();
    for key in 0..10_000 {
        tree.put(key).unwrap();
    }

    c.bench_function("iterate_10000", |b| {
        b.iter(|| {
            let count = tree.iter().unwrap().count();
            assert_eq!(count, 10_000);
        });
    });
}

criterion_group!(benches, bench_put, bench_contains, bench_iterate);
criterion_main!(benches);
