use criterion::*;
use std::hint::black_box;

use numflow::{Backend, BufferRef, ElementType, InputJoiner, Shape, Unit};

fn filled_f32(rows: usize, cols: usize) -> BufferRef {
    let buf = BufferRef::new();
    {
        let mut b = buf.borrow_mut();
        b.allocate(Shape::new([rows, cols]), ElementType::F32).unwrap();
        b.map_invalidate();
        for (i, v) in b.host_mut_as::<f32>().iter_mut().enumerate() {
            *v = i as f32;
        }
    }
    buf
}

fn ready_joiner(shapes: &[(usize, usize)]) -> InputJoiner {
    let inputs = shapes
        .iter()
        .map(|&(rows, cols)| filled_f32(rows, cols))
        .collect();

    let mut joiner = InputJoiner::new(1, inputs).unwrap();
    joiner.initialize(&Backend::Host).unwrap();
    joiner
}

fn join_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("join");

    group.bench_function("join_2_inputs_4096x64", |b| {
        b.iter_batched(
            || ready_joiner(&[(4096, 32), (4096, 32)]),
            |mut joiner| {
                joiner.run(&Backend::Host).unwrap();
                black_box(joiner);
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("join_8_inputs_1024x8", |b| {
        b.iter_batched(
            || ready_joiner(&[(1024, 8); 8]),
            |mut joiner| {
                joiner.run(&Backend::Host).unwrap();
                black_box(joiner);
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, join_benchmark);
criterion_main!(benches);
