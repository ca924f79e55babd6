use super::{sample_solution, threaded_config};
use meshloop::config::LoopConfig;
use meshloop::dof::{ElementalDofMap, NodalDofMap};
use meshloop::error::LoopError;
use meshloop::fe::LinearSegmentReinit;
use meshloop::kernels::{ConstantAux, VariableValueAux};
use meshloop::mesh::procedural::{create_uniform_line_mesh, RIGHT_BOUNDARY};
use meshloop::mesh::MeshTopology;
use meshloop::objects::Restriction;
use meshloop::problem::ProblemBuilder;
use nalgebra::DVector;
use std::sync::Arc;

#[test]
fn elemental_aux_stores_element_averages_and_boundary_overrides() {
    let mut mesh = create_uniform_line_mesh(4, 1.0);
    mesh.assign_subdomains(|_, x| if x < 0.5 { 0 } else { 1 });
    let fe = LinearSegmentReinit::new(&mesh, 2);
    let dof_map = NodalDofMap::for_mesh(&mesh, 1);
    let aux_dof_map = ElementalDofMap::for_mesh(&mesh, 2);

    let mut builder = ProblemBuilder::new(&mesh, &fe, &dof_map)
        .with_config(threaded_config(2, 1))
        .with_elemental_aux_dof_map(&aux_dof_map);
    builder
        .add_elemental_aux(Arc::new(VariableValueAux::new(0, 0)))
        .add_elemental_aux(Arc::new(ConstantAux::new(1, 5.0).restricted_to(Restriction::subdomains([1]))))
        .add_boundary_elemental_aux(Arc::new(
            ConstantAux::new(0, -1.0).restricted_to(Restriction::boundaries([RIGHT_BOUNDARY])),
        ));
    let problem = builder.build().unwrap();

    // u = x, whose average over element e is its midpoint
    let u = DVector::from_fn(mesh.num_nodes(), |i, _| i as f64 * 0.25);
    let aux = problem.compute_elemental_aux(&u).unwrap();

    for element in 0..4 {
        let expected = if element == 3 { -1.0 } else { (element as f64 + 0.5) * 0.25 };
        let value = aux[aux_dof_map.element_dof(element, 0)];
        assert!((value - expected).abs() < 1e-14, "element {}: {}", element, value);

        let expected = if element >= 2 { 5.0 } else { 0.0 };
        assert_eq!(aux[aux_dof_map.element_dof(element, 1)], expected, "element {}", element);
    }
}

#[test]
fn elemental_aux_is_independent_of_partitioning() {
    let mut mesh = create_uniform_line_mesh(17, 2.0);
    mesh.assign_subdomains(|i, _| (i % 3) as u32);
    let fe = LinearSegmentReinit::new(&mesh, 3);
    let dof_map = NodalDofMap::for_mesh(&mesh, 2);
    let aux_dof_map = ElementalDofMap::for_mesh(&mesh, 2);
    let u = sample_solution(mesh.num_nodes(), 2);

    let compute = |config: LoopConfig| {
        let mut builder = ProblemBuilder::new(&mesh, &fe, &dof_map)
            .with_config(config)
            .with_elemental_aux_dof_map(&aux_dof_map);
        builder
            .add_elemental_aux(Arc::new(VariableValueAux::new(0, 1)))
            .add_elemental_aux(Arc::new(
                VariableValueAux::new(1, 0).restricted_to(Restriction::subdomains([0, 2])),
            ));
        builder.build().unwrap().compute_elemental_aux(&u).unwrap()
    };

    let serial = compute(LoopConfig::serial());
    for (num_threads, grain_size) in [(2, 1), (3, 4), (4, 2)] {
        assert_eq!(compute(threaded_config(num_threads, grain_size)), serial);
    }
}

#[test]
fn elemental_aux_requires_an_elemental_dof_map() {
    let mesh = create_uniform_line_mesh(4, 1.0);
    let fe = LinearSegmentReinit::new(&mesh, 2);
    let dof_map = NodalDofMap::for_mesh(&mesh, 1);

    let mut builder = ProblemBuilder::new(&mesh, &fe, &dof_map);
    builder.add_elemental_aux(Arc::new(ConstantAux::new(0, 1.0)));
    match builder.build() {
        Err(LoopError::Setup(message)) => {
            assert!(message.contains("elemental auxiliary degree-of-freedom map"))
        }
        other => panic!("expected setup error, got {:?}", other.map(|_| ())),
    }

    let wrong_size = ElementalDofMap::new(3, 1);
    let builder = ProblemBuilder::new(&mesh, &fe, &dof_map).with_elemental_aux_dof_map(&wrong_size);
    assert!(matches!(builder.build(), Err(LoopError::Setup(_))));

    let aux_dof_map = ElementalDofMap::for_mesh(&mesh, 1);
    let mut builder = ProblemBuilder::new(&mesh, &fe, &dof_map).with_elemental_aux_dof_map(&aux_dof_map);
    builder.add_elemental_aux(Arc::new(ConstantAux::new(2, 1.0)));
    assert!(matches!(builder.build(), Err(LoopError::Setup(_))));

    let problem = ProblemBuilder::new(&mesh, &fe, &dof_map).build().unwrap();
    assert!(matches!(
        problem.compute_elemental_aux(&DVector::zeros(5)),
        Err(LoopError::Setup(_))
    ));
}
