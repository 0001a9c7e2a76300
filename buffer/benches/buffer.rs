use conduit_buffer::{impl_codec, Buffer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeMap;

#[derive(Clone)]
struct Entity {
    id: u64,
    name: String,
    position: (f32, f32, f32),
    stats: BTreeMap<u16, i32>,
}

impl_codec!(Entity {
    id,
    name,
    position,
    stats
});

fn entity(i: u64) -> Entity {
    Entity {
        id: i,
        name: format!("entity-{i}"),
        position: (i as f32, 0.5, -1.0),
        stats: (0..8).map(|k| (k, k as i32 * 3)).collect(),
    }
}

fn bench_scalars(c: &mut Criterion) {
    let mut group = c.benchmark_group("scalars");
    for &count in &[64usize, 1024] {
        group.throughput(Throughput::Bytes((count * 8) as u64));
        group.bench_with_input(BenchmarkId::new("plain", count), &count, |b, &count| {
            let mut buf = Buffer::new(count * 8);
            b.iter(|| {
                buf.clear();
                for i in 0..count as u64 {
                    buf.write(&i).unwrap();
                }
                for _ in 0..count {
                    black_box(buf.read::<u64>().unwrap());
                }
            });
        });
        group.bench_with_input(BenchmarkId::new("circular", count), &count, |b, &count| {
            // Odd capacity so values straddle the end of storage
            let mut ring = Buffer::circular(count * 8 + 3);
            b.iter(|| {
                for i in 0..count as u64 {
                    ring.write(&i).unwrap();
                }
                for _ in 0..count {
                    black_box(ring.read::<u64>().unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_structs(c: &mut Criterion) {
    let entities: Vec<Entity> = (0..256).map(entity).collect();
    let size: usize = entities.iter().map(|e| Buffer::encoded_size(e)).sum();

    let mut group = c.benchmark_group("structs");
    group.throughput(Throughput::Bytes(size as u64));
    group.bench_function("encode", |b| {
        let mut buf = Buffer::new(size);
        b.iter(|| {
            buf.clear();
            for e in &entities {
                buf.write(e).unwrap();
            }
        });
    });
    group.bench_function("decode", |b| {
        let mut buf = Buffer::new(size);
        for e in &entities {
            buf.write(e).unwrap();
        }
        b.iter(|| {
            buf.set_rpos(0).unwrap();
            for _ in 0..entities.len() {
                black_box(buf.read::<Entity>().unwrap());
            }
        });
    });
    group.bench_function("encoded_size", |b| {
        b.iter(|| {
            black_box(entities.iter().map(|e| Buffer::encoded_size(e)).sum::<usize>());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_scalars, bench_structs);
criterion_main!(benches);
