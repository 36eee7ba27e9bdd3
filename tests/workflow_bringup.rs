// Run:
//   cargo test --test workflow_bringup

use numflow::{
    Backend, BufferRef, ElementType, InputJoiner, Shape, Unit, UnitState, Workflow, WorkflowError,
};

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

#[test]
fn bring_up_resolves_consumers_declared_before_producers() {
    let x = filled_f32(4, 2, 0.0);
    let y = filled_f32(4, 3, 100.0);

    let producer = InputJoiner::new(1, vec![x, y]).unwrap();
    // The consumer sees the producer's output before that output exists.
    let consumer = InputJoiner::new(2, vec![producer.output()]).unwrap();

    let mut workflow = Workflow::new();
    workflow.add_unit(consumer);
    workflow.add_unit(producer);

    // Round one leaves the consumer waiting; round two resolves it.
    workflow.bring_up(&Backend::Host).unwrap();

    assert_eq!(workflow.unit(0).unwrap().state(), UnitState::Ready);
    assert_eq!(workflow.unit(1).unwrap().state(), UnitState::Ready);
}

#[test]
fn chained_join_produces_expected_columns() {
    let x = filled_f32(4, 2, 0.0);
    let y = filled_f32(4, 3, 100.0);
    let z = filled_f32(4, 1, 500.0);

    let stage_one = InputJoiner::new(1, vec![x.clone(), y.clone()]).unwrap();
    let stage_two = InputJoiner::new(2, vec![stage_one.output(), z.clone()]).unwrap();
    let final_output = stage_two.output();

    let mut workflow = Workflow::new();
    workflow.add_unit(stage_one);
    workflow.add_unit(stage_two);

    workflow.bring_up(&Backend::Host).unwrap();
    workflow.run_pass(&Backend::Host).unwrap();

    let mut out = final_output.borrow_mut();
    out.map_read().unwrap();
    assert_eq!(out.shape(), Some(&Shape::new([4, 6])));

    let result = out.host_as::<f32>().to_vec();
    let x_data = x.borrow().host_as::<f32>().to_vec();
    let y_data = y.borrow().host_as::<f32>().to_vec();
    let z_data = z.borrow().host_as::<f32>().to_vec();

    for row in 0..4 {
        assert_eq!(result[row * 6], x_data[row * 2]);
        assert_eq!(result[row * 6 + 1], x_data[row * 2 + 1]);
        assert_eq!(result[row * 6 + 2], y_data[row * 3]);
        assert_eq!(result[row * 6 + 3], y_data[row * 3 + 1]);
        assert_eq!(result[row * 6 + 4], y_data[row * 3 + 2]);
        assert_eq!(result[row * 6 + 5], z_data[row]);
    }
}

#[test]
fn bring_up_stalls_on_a_missing_producer() {
    // Nothing ever allocates this buffer.
    let orphan = BufferRef::new();
    let joiner = InputJoiner::new(1, vec![orphan]).unwrap();

    let mut workflow = Workflow::new();
    workflow.add_unit(joiner);

    let err = workflow.bring_up(&Backend::Host).unwrap_err();
    match err {
        WorkflowError::Stalled { pending } => {
            assert_eq!(pending, vec!["InputJoiner"]);
        }
        other => panic!("expected Stalled, got {other:?}"),
    }
}

#[test]
fn fatal_unit_errors_abort_bring_up() {
    let input = filled_f32(4, 2, 0.0);
    let joiner = InputJoiner::new(1, vec![input]).unwrap();

    // Poison the output with an incompatible pre-allocation.
    joiner
        .output()
        .borrow_mut()
        .allocate(Shape::new([1, 1]), ElementType::F32)
        .unwrap();

    let mut workflow = Workflow::new();
    workflow.add_unit(joiner);

    let err = workflow.bring_up(&Backend::Host).unwrap_err();
    assert!(matches!(err, WorkflowError::Unit { unit: "InputJoiner", .. }));
    assert_eq!(workflow.unit(0).unwrap().state(), UnitState::Failed);
}
