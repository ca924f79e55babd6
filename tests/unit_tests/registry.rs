use meshloop::error::LoopError;
use meshloop::kernels::BodyForce;
use meshloop::objects::{ElementKernel, Restriction};
use meshloop::registry::{WarehouseBuilder, WarehouseKind};
use std::sync::Arc;

fn force(name: &str, restriction: Restriction) -> Arc<dyn ElementKernel<f64>> {
    Arc::new(
        BodyForce::new(0, 1.0)
            .named(name)
            .restricted_to(restriction),
    )
}

fn names(objects: &[Arc<dyn ElementKernel<f64>>]) -> Vec<&str> {
    objects.iter().map(|o| o.name()).collect()
}

#[test]
fn active_objects_follow_restrictions_in_registration_order() {
    let mut builder = WarehouseBuilder::new(WarehouseKind::Block);
    builder
        .add(force("a", Restriction::subdomains([1])))
        .add(force("b", Restriction::Everywhere))
        .add(force("c", Restriction::subdomains([2, 1])));
    assert_eq!(builder.len(), 3);
    let warehouse = builder.build(&[1, 2, 3]).unwrap();

    assert_eq!(warehouse.kind(), WarehouseKind::Block);
    assert_eq!(names(warehouse.active_objects(1)), vec!["a", "b", "c"]);
    assert_eq!(names(warehouse.active_objects(2)), vec!["b", "c"]);
    assert_eq!(names(warehouse.active_objects(3)), vec!["b"]);
    assert!(warehouse.active_objects(4).is_empty());
    assert!(warehouse.has_active_objects(3));
    assert!(!warehouse.has_active_objects(4));
    assert_eq!(names(warehouse.objects()), vec!["a", "b", "c"]);
}

#[test]
fn repeated_queries_return_the_same_objects() {
    let mut builder = WarehouseBuilder::new(WarehouseKind::Boundary);
    builder
        .add(force("left", Restriction::boundaries([0])))
        .add(force("all", Restriction::Everywhere));
    let warehouse = builder.build(&[0, 1]).unwrap();

    let first = warehouse.active_objects(0);
    let second = warehouse.active_objects(0);
    assert_eq!(first.len(), 2);
    assert!(first
        .iter()
        .zip(second)
        .all(|(a, b)| Arc::ptr_eq(a, b)));
}

#[test]
fn duplicate_ids_register_object_once() {
    let mut builder = WarehouseBuilder::new(WarehouseKind::Block);
    builder.add(force("a", Restriction::subdomains([1, 1])));
    let warehouse = builder.build(&[1]).unwrap();
    assert_eq!(warehouse.active_objects(1).len(), 1);
}

#[test]
fn unknown_ids_are_setup_errors() {
    let mut builder = WarehouseBuilder::new(WarehouseKind::Block);
    builder.add(force("a", Restriction::subdomains([5])));
    let err = builder.build(&[0, 1]).unwrap_err();
    assert!(matches!(err, LoopError::Setup(_)));
    assert!(err.to_string().contains("unknown subdomain 5"));

    let mut builder = WarehouseBuilder::new(WarehouseKind::Boundary);
    builder.add(force("b", Restriction::boundaries([9])));
    let err = builder.build(&[0]).unwrap_err();
    assert!(err.to_string().contains("unknown boundary 9"));
}

#[test]
fn restriction_of_wrong_kind_is_setup_error() {
    let mut builder = WarehouseBuilder::new(WarehouseKind::Block);
    builder.add(force("a", Restriction::boundaries([0])));
    assert!(matches!(builder.build(&[0]), Err(LoopError::Setup(_))));

    let mut builder = WarehouseBuilder::new(WarehouseKind::Boundary);
    builder.add(force("b", Restriction::subdomains([0])));
    assert!(matches!(builder.build(&[0]), Err(LoopError::Setup(_))));
}

#[test]
fn empty_warehouse_has_no_objects() {
    let builder = WarehouseBuilder::<dyn ElementKernel<f64>>::new(WarehouseKind::Boundary);
    assert!(builder.is_empty());
    let warehouse = builder.build(&[0, 1]).unwrap();
    assert_eq!(warehouse.kind(), WarehouseKind::Boundary);
    assert!(!warehouse.has_objects());
    assert!(warehouse.active_objects(0).is_empty());
}
