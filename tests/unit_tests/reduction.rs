use eyre::eyre;
use meshloop::error::{FailureLog, LoopError};
use meshloop::reduction::{Counter, Max, Reduce, SetUnion};

#[test]
fn counter_join_sums() {
    let mut a = Counter::default();
    a.increment();
    a.add(4);
    let mut b = Counter(10);
    b.join(a);
    assert_eq!(b.get(), 15);
}

#[test]
fn max_join_ignores_neutral_element() {
    let mut a: Max<u32> = Max::default();
    a.join(Max(None));
    assert_eq!(a.get(), None);

    a.update(3);
    a.join(Max(Some(1)));
    assert_eq!(a.get(), Some(3));
    a.join(Max(Some(8)));
    assert_eq!(a.get(), Some(8));
}

#[test]
fn set_union_join_merges_sets() {
    let mut a = SetUnion::default();
    a.insert(1);
    a.insert(3);
    let mut b = SetUnion::default();
    b.insert(3);
    b.insert(4);
    b.insert(5);

    a.join(b);
    assert_eq!(a.len(), 4);
    assert!(a.contains(&4));
    assert_eq!(a.into_inner().into_iter().collect::<Vec<_>>(), vec![1, 3, 4, 5]);
}

#[test]
fn tuple_join_joins_components() {
    let mut a = (Counter(1), Max(Some(2)));
    a.join((Counter(2), Max(Some(1))));
    assert_eq!(a, (Counter(3), Max(Some(2))));
}

#[test]
fn failure_log_keeps_count_and_smallest_entity() {
    let mut a = FailureLog::default();
    assert!(a.is_empty());
    assert!(a.clone().into_error().is_none());

    a.record(12, &eyre!("bad material state"));
    let mut b = FailureLog::default();
    b.record(4, &eyre!("singular matrix"));
    b.record(30, &eyre!("singular matrix"));

    a.join(b);
    assert_eq!(a.count(), 3);
    let first = a.first().unwrap();
    assert_eq!(first.entity, 4);
    assert_eq!(first.message, "singular matrix");

    match a.into_error() {
        Some(LoopError::ComputationFailed {
            failed_entities,
            entity,
            message,
        }) => {
            assert_eq!(failed_entities, 3);
            assert_eq!(entity, 4);
            assert_eq!(message, "singular matrix");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn failure_log_records_cause_chain() {
    use eyre::WrapErr;
    let err = Err::<(), _>(eyre!("negative Jacobian determinant"))
        .wrap_err("object 'solid' failed on element 2 at quadrature point 1")
        .unwrap_err();
    let mut log = FailureLog::default();
    log.record(2, &err);
    let message = &log.first().unwrap().message;
    assert!(message.contains("object 'solid' failed"));
    assert!(message.contains("negative Jacobian determinant"));
}

#[test]
fn loop_error_display() {
    let err = LoopError::ComputationFailed {
        failed_entities: 2,
        entity: 36,
        message: "singular local solve".to_string(),
    };
    assert!(err.is_computation_failure());
    assert_eq!(
        err.to_string(),
        "computation failed on 2 entities (first failure on entity 36: singular local solve)"
    );
    assert!(!LoopError::setup("x").is_computation_failure());
}
