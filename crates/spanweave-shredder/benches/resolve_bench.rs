//! Benchmark: resolve path of the sequence shredder.
//!
//! Measures registering and resolving a whole partition in order, in
//! reverse order, and with long delimiter-free runs.

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use spanweave_shredder::{SequenceShredder, ShredderConfig};
use spanweave_types::{BufferHandle, SequenceNumber, StagedBuffer};

const BUFFERS: u64 = 4096;

fn stream(delimiter_every: u64) -> Vec<StagedBuffer> {
    (0..BUFFERS)
        .map(|raw| {
            let sequence = SequenceNumber::new(raw);
            let handle = BufferHandle::new(raw);
            if raw % delimiter_every == 0 {
                StagedBuffer::with_delimiters(sequence, handle, 4096, 17, 4000)
            } else {
                StagedBuffer::without_delimiter(sequence, handle, 4096)
            }
        })
        .collect()
}

fn resolve_all(buffers: &[StagedBuffer]) -> usize {
    let shredder = SequenceShredder::with_config(ShredderConfig::default().fixed_capacity(8192))
        .expect("config");
    let mut records = 0;
    for buffer in buffers {
        let leading = shredder.resolve_leading(*buffer).expect("leading");
        let trailing = shredder
            .resolve_trailing(buffer.sequence())
            .expect("trailing");
        records += usize::from(leading.owns_spanning_record());
        records += usize::from(trailing.owns_spanning_record());
    }
    records
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    group.throughput(Throughput::Elements(BUFFERS));

    let in_order = stream(1);
    group.bench_function("in_order", |b| {
        b.iter(|| resolve_all(&in_order));
    });

    let mut reversed = stream(1);
    reversed.reverse();
    group.bench_function("reversed", |b| {
        b.iter(|| resolve_all(&reversed));
    });

    let sparse = stream(16);
    group.bench_function("interior_runs", |b| {
        b.iter_batched(|| sparse.clone(), |buffers| resolve_all(&buffers), BatchSize::SmallInput);
    });

    group.finish();
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
