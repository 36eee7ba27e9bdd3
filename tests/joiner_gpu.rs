// Run with the accelerator backend enabled:
//   cargo test --features gpu --test joiner_gpu
//
// These tests require a working GPU adapter. The primary contract checked
// here is cross-backend equivalence: the accelerator path must produce
// byte-identical output to the host path for the same inputs.

#![cfg(feature = "gpu")]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use numflow::{Backend, BufferRef, ElementType, InputJoiner, Shape, Unit, UnitState};

fn random_f32(rng: &mut StdRng, rows: usize, cols: usize) -> Vec<f32> {
    (0..rows * cols).map(|_| rng.gen::<f32>()).collect()
}

fn buffer_from(rows: usize, cols: usize, data: &[f32]) -> BufferRef {
    let buf = BufferRef::new();
    {
        let mut b = buf.borrow_mut();
        b.allocate(Shape::new([rows, cols]), ElementType::F32).unwrap();
        b.map_invalidate();
        b.host_mut_as::<f32>().copy_from_slice(data);
    }
    buf
}

/// Builds a joiner over fresh copies of the given inputs, initializes and
/// runs it on `backend`, and returns the output bytes.
fn join_on(backend: &Backend, inputs: &[(usize, usize, &[f32])]) -> Vec<u8> {
    let buffers: Vec<BufferRef> = inputs
        .iter()
        .map(|&(rows, cols, data)| buffer_from(rows, cols, data))
        .collect();

    let mut joiner = InputJoiner::new(1, buffers).unwrap();
    joiner.initialize(backend).unwrap();
    joiner.run(backend).unwrap();
    assert_eq!(joiner.state(), UnitState::Ready);

    let out = joiner.output();
    let mut guard = out.borrow_mut();
    guard.map_read().unwrap();
    guard.host().to_vec()
}

#[test]
fn host_and_accelerator_outputs_are_byte_identical() {
    let mut rng = StdRng::seed_from_u64(0x6A6F696E);
    let a = random_f32(&mut rng, 10, 3);
    let b = random_f32(&mut rng, 8, 5);

    let inputs: Vec<(usize, usize, &[f32])> = vec![(10, 3, &a[..]), (8, 5, &b[..])];

    let accelerator = Backend::accelerator().unwrap();
    let host_bytes = join_on(&Backend::Host, &inputs);
    let accel_bytes = join_on(&accelerator, &inputs);

    assert_eq!(host_bytes, accel_bytes);
}

#[test]
fn accelerator_preserves_the_zero_width_stop() {
    // The zero-width first input ends the join on both paths: the output
    // keeps its computed width and stays zero, and the second input is
    // never read. Pinned on the accelerator path as well, so the two
    // backends cannot drift apart on this edge case.
    let mut rng = StdRng::seed_from_u64(0x7A65726F);
    let a: Vec<f32> = Vec::new();
    let b = random_f32(&mut rng, 5, 4);

    let inputs: Vec<(usize, usize, &[f32])> = vec![(5, 0, &a[..]), (5, 4, &b[..])];

    let accelerator = Backend::accelerator().unwrap();
    let host_bytes = join_on(&Backend::Host, &inputs);
    let accel_bytes = join_on(&accelerator, &inputs);

    assert_eq!(host_bytes, accel_bytes);
    assert!(accel_bytes.iter().all(|&byte| byte == 0));
}

#[test]
fn one_program_is_compiled_per_signature() {
    let mut rng = StdRng::seed_from_u64(0x63616368);
    let a = random_f32(&mut rng, 6, 2);
    let b = random_f32(&mut rng, 6, 3);

    let accelerator = Backend::accelerator().unwrap();

    let mut joiner = InputJoiner::new(1, vec![
        buffer_from(6, 2, &a),
        buffer_from(6, 3, &b),
    ])
    .unwrap();

    joiner.initialize(&accelerator).unwrap();
    joiner.run(&accelerator).unwrap();
    joiner.run(&accelerator).unwrap();

    // Re-initializing with an unchanged shape must reuse the program.
    joiner.initialize(&accelerator).unwrap();
    joiner.run(&accelerator).unwrap();

    assert_eq!(joiner.compiled_programs(), 1);
}
