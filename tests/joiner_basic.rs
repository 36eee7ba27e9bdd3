// Run:
//   cargo test --test joiner_basic
//
// GPU-path coverage lives in tests/joiner_gpu.rs (requires --features gpu).

use numflow::{
    Backend, BufferRef, ConfigurationError, ElementType, InitStatus, InputJoiner, Shape, Unit,
    UnitError, UnitState,
};

/// Allocates a buffer of the given shape and fills it with a ramp starting
/// at `start`, going through the host-write mark like any producer would.
fn filled_f32(rows: usize, cols: usize, start: f32) -> BufferRef {
    let buf = BufferRef::new();
    {
        let mut b = buf.borrow_mut();
        b.allocate(Shape::new([rows, cols]), ElementType::F32).unwrap();
        b.map_invalidate();
        for (i, v) in b.host_mut_as::<f32>().iter_mut().enumerate() {
            *v = start + i as f32;
        }
    }
    buf
}

fn read_output(joiner: &InputJoiner) -> Vec<f32> {
    let out = joiner.output();
    let mut guard = out.borrow_mut();
    guard.map_read().unwrap();
    guard.host_as::<f32>().to_vec()
}

#[test]
fn joins_two_inputs_with_truncation() {
    let a = filled_f32(10, 3, 0.0);
    let b = filled_f32(8, 5, 1000.0);

    let mut joiner = InputJoiner::new(1, vec![a.clone(), b.clone()]).unwrap();
    let status = joiner.initialize(&Backend::Host).unwrap();
    assert_eq!(status, InitStatus::Ready);

    let out = joiner.output();
    assert_eq!(out.borrow().shape(), Some(&Shape::new([8, 8])));

    joiner.run(&Backend::Host).unwrap();
    assert_eq!(joiner.state(), UnitState::Ready);

    let result = read_output(&joiner);
    let a_data = a.borrow().host_as::<f32>().to_vec();
    let b_data = b.borrow().host_as::<f32>().to_vec();

    for row in 0..8 {
        for col in 0..3 {
            assert_eq!(result[row * 8 + col], a_data[row * 3 + col]);
        }
        for col in 0..5 {
            assert_eq!(result[row * 8 + 3 + col], b_data[row * 5 + col]);
        }
    }
}

#[test]
fn shape_law_holds_for_many_inputs() {
    // batches 6, 9, 7 and widths 2, 4, 1: output must be (6, 7).
    let inputs = vec![
        filled_f32(6, 2, 0.0),
        filled_f32(9, 4, 100.0),
        filled_f32(7, 1, 200.0),
    ];

    let mut joiner = InputJoiner::new(2, inputs).unwrap();
    joiner.initialize(&Backend::Host).unwrap();

    assert_eq!(
        joiner.output().borrow().shape(),
        Some(&Shape::new([6, 7]))
    );
}

#[test]
fn rows_beyond_the_minibatch_are_never_copied() {
    let a = filled_f32(4, 2, 0.0);
    let b = filled_f32(6, 2, 50.0);

    let mut joiner = InputJoiner::new(3, vec![a, b.clone()]).unwrap();
    joiner.initialize(&Backend::Host).unwrap();
    joiner.run(&Backend::Host).unwrap();

    let result = read_output(&joiner);
    assert_eq!(result.len(), 4 * 4);

    // b's rows 4 and 5 must not appear anywhere in the output.
    let b_data = b.borrow().host_as::<f32>().to_vec();
    for &excess in &b_data[4 * 2..] {
        assert!(!result.contains(&excess));
    }
}

// A zero-width input ends the join at its position: later inputs are never
// copied even though the output was allocated wide enough to hold them, so
// the remaining columns stay zero. This is long-standing observed behavior
// of the join; these two tests pin it so any change is a conscious decision
// rather than an accidental "fix".
#[test]
fn zero_width_first_input_stops_the_join() {
    let a = filled_f32(5, 0, 0.0);
    let b = filled_f32(5, 4, 1.0);

    let mut joiner = InputJoiner::new(4, vec![a, b]).unwrap();
    joiner.initialize(&Backend::Host).unwrap();

    // Width is still the sum over all inputs.
    assert_eq!(
        joiner.output().borrow().shape(),
        Some(&Shape::new([5, 4]))
    );

    joiner.run(&Backend::Host).unwrap();

    let result = read_output(&joiner);
    assert!(result.iter().all(|&v| v == 0.0), "no input may be copied");
}

#[test]
fn zero_width_middle_input_truncates_later_inputs() {
    let a = filled_f32(5, 2, 1.0);
    let b = filled_f32(5, 0, 0.0);
    let c = filled_f32(5, 3, 100.0);

    let mut joiner = InputJoiner::new(5, vec![a.clone(), b, c]).unwrap();
    joiner.initialize(&Backend::Host).unwrap();
    assert_eq!(
        joiner.output().borrow().shape(),
        Some(&Shape::new([5, 5]))
    );

    joiner.run(&Backend::Host).unwrap();

    let result = read_output(&joiner);
    let a_data = a.borrow().host_as::<f32>().to_vec();
    for row in 0..5 {
        for col in 0..2 {
            assert_eq!(result[row * 5 + col], a_data[row * 2 + col]);
        }
        // c is never copied; its columns stay zero.
        for col in 2..5 {
            assert_eq!(result[row * 5 + col], 0.0);
        }
    }
}

#[test]
fn initialize_is_idempotent_once_ready() {
    let inputs = vec![filled_f32(3, 2, 0.0), filled_f32(3, 2, 10.0)];
    let mut joiner = InputJoiner::new(6, inputs).unwrap();

    assert_eq!(
        joiner.initialize(&Backend::Host).unwrap(),
        InitStatus::Ready
    );
    assert_eq!(
        joiner.initialize(&Backend::Host).unwrap(),
        InitStatus::Ready
    );
    assert_eq!(joiner.state(), UnitState::Ready);
    assert_eq!(
        joiner.output().borrow().shape(),
        Some(&Shape::new([3, 4]))
    );
}

#[test]
fn unallocated_input_yields_not_ready_without_allocating_output() {
    let pending = BufferRef::new();
    let ready = filled_f32(4, 2, 0.0);

    let mut joiner = InputJoiner::new(7, vec![ready, pending.clone()]).unwrap();

    assert_eq!(
        joiner.initialize(&Backend::Host).unwrap(),
        InitStatus::NotReady
    );
    assert_eq!(joiner.state(), UnitState::Initializing);
    assert!(!joiner.output().is_allocated());

    // Once the upstream buffer appears, the same unit becomes ready.
    pending
        .borrow_mut()
        .allocate(Shape::new([4, 3]), ElementType::F32)
        .unwrap();
    assert_eq!(
        joiner.initialize(&Backend::Host).unwrap(),
        InitStatus::Ready
    );
    assert_eq!(
        joiner.output().borrow().shape(),
        Some(&Shape::new([4, 5]))
    );
}

#[test]
fn empty_inputs_are_a_configuration_error() {
    let result = InputJoiner::new(8, Vec::new());
    assert!(matches!(result, Err(ConfigurationError::EmptyInputs)));
}

#[test]
fn mismatched_element_types_fail_initialize() {
    let a = filled_f32(3, 2, 0.0);
    let b = BufferRef::new();
    b.borrow_mut()
        .allocate(Shape::new([3, 2]), ElementType::I32)
        .unwrap();

    let mut joiner = InputJoiner::new(9, vec![a, b]).unwrap();
    let err = joiner.initialize(&Backend::Host).unwrap_err();
    assert!(matches!(err, UnitError::Element(_)));
    assert_eq!(joiner.state(), UnitState::Failed);
}

#[test]
fn explicit_width_override_sizes_the_output() {
    let inputs = vec![filled_f32(4, 3, 0.0), filled_f32(4, 5, 100.0)];
    let mut joiner = InputJoiner::new(10, inputs)
        .unwrap()
        .with_output_sample_width(10);

    joiner.initialize(&Backend::Host).unwrap();
    assert_eq!(
        joiner.output().borrow().shape(),
        Some(&Shape::new([4, 10]))
    );

    joiner.run(&Backend::Host).unwrap();
    let result = read_output(&joiner);
    for row in 0..4 {
        // Columns past the joined widths stay zero.
        assert_eq!(result[row * 10 + 8], 0.0);
        assert_eq!(result[row * 10 + 9], 0.0);
    }
}

#[test]
fn pre_allocated_output_with_wrong_shape_is_fatal() {
    let inputs = vec![filled_f32(4, 2, 0.0)];
    let mut joiner = InputJoiner::new(11, inputs).unwrap();

    joiner
        .output()
        .borrow_mut()
        .allocate(Shape::new([2, 2]), ElementType::F32)
        .unwrap();

    let err = joiner.initialize(&Backend::Host).unwrap_err();
    assert!(matches!(err, UnitError::Shape(_)));
    assert_eq!(joiner.state(), UnitState::Failed);
}

#[test]
fn running_before_ready_is_a_state_error() {
    let inputs = vec![filled_f32(2, 2, 0.0)];
    let mut joiner = InputJoiner::new(12, inputs).unwrap();

    let err = joiner.run(&Backend::Host).unwrap_err();
    assert!(matches!(err, UnitError::State(_)));
}

#[test]
fn repeated_runs_return_to_ready() {
    let inputs = vec![filled_f32(2, 2, 0.0), filled_f32(2, 1, 10.0)];
    let mut joiner = InputJoiner::new(13, inputs).unwrap();
    joiner.initialize(&Backend::Host).unwrap();

    joiner.run(&Backend::Host).unwrap();
    assert_eq!(joiner.state(), UnitState::Ready);
    joiner.run(&Backend::Host).unwrap();
    assert_eq!(joiner.state(), UnitState::Ready);
}
