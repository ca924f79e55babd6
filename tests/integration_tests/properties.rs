use super::{sample_solution, threaded_config};
use crate::mock::MockKernel;
use eyre::eyre;
use matrixcompare::assert_matrix_eq;
use meshloop::config::LoopConfig;
use meshloop::dof::NodalDofMap;
use meshloop::error::FailureLog;
use meshloop::fe::LinearSegmentReinit;
use meshloop::kernels::{BodyForce, Diffusion, NeumannFlux, Reaction};
use meshloop::mesh::procedural::{create_disjoint_segments, create_uniform_line_mesh, LEFT_BOUNDARY, RIGHT_BOUNDARY};
use meshloop::mesh::MeshTopology;
use meshloop::objects::Restriction;
use meshloop::problem::ProblemBuilder;
use meshloop::reduction::{Counter, Max, Reduce, SetUnion};
use meshloop::scatter::GlobalVector;
use nalgebra::DVector;
use proptest::prelude::*;
use rayon::prelude::*;
use std::sync::Arc;

/// Joins the items one by one, left to right.
fn join_sequentially<R: Reduce + Default>(items: Vec<R>) -> R {
    let mut acc = R::default();
    for item in items {
        acc.join(item);
    }
    acc
}

/// Joins the items as a balanced binary tree, with the right half joined first.
fn join_as_tree<R: Reduce + Default>(mut items: Vec<R>) -> R {
    match items.len() {
        0 => R::default(),
        1 => items.pop().unwrap_or_default(),
        n => {
            let right = items.split_off(n / 2);
            let mut right = join_as_tree(right);
            let left = join_as_tree(items);
            right.join(left);
            right
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn residual_is_independent_of_partitioning(
        num_elements in 1usize..60,
        grain_size in 1usize..16,
        num_threads in 2usize..5,
        interface in 0.0..1.0f64,
    ) {
        let mut mesh = create_uniform_line_mesh(num_elements, 1.0);
        mesh.assign_subdomains(|_, x| if x < interface { 0 } else { 1 });
        let fe = LinearSegmentReinit::new(&mesh, 2);
        let dof_map = NodalDofMap::for_mesh(&mesh, 1);
        let u = sample_solution(mesh.num_nodes(), 1);

        let build = |config: LoopConfig| {
            let mut builder = ProblemBuilder::new(&mesh, &fe, &dof_map).with_config(config);
            builder
                .add_kernel(Arc::new(Diffusion::new(0, 2.0)))
                .add_kernel(Arc::new(Reaction::new(0, 0.5)))
                .add_kernel(Arc::new(BodyForce::new(0, 1.0)))
                .add_boundary_kernel(Arc::new(
                    NeumannFlux::new(0, -1.0).restricted_to(Restriction::boundaries([LEFT_BOUNDARY])),
                ));
            builder.build().unwrap()
        };

        let serial = build(LoopConfig::serial()).compute_residual(&u).unwrap();
        let threaded = build(threaded_config(num_threads, grain_size))
            .compute_residual(&u)
            .unwrap();
        assert_matrix_eq!(serial, threaded, comp = abs, tol = 1e-12);
    }

    #[test]
    fn counter_join_is_independent_of_grouping(values in prop::collection::vec(0usize..1000, 0..40)) {
        let counters: Vec<_> = values.iter().map(|&v| Counter(v)).collect();
        let expected: usize = values.iter().sum();
        prop_assert_eq!(join_sequentially(counters.clone()).get(), expected);
        prop_assert_eq!(join_as_tree(counters).get(), expected);
    }

    #[test]
    fn max_join_is_independent_of_grouping(values in prop::collection::vec(prop::option::of(0i64..1000), 0..40)) {
        let maxima: Vec<_> = values.iter().map(|&v| Max(v)).collect();
        let expected = values.iter().flatten().max().copied();
        prop_assert_eq!(join_sequentially(maxima.clone()).get(), expected);
        prop_assert_eq!(join_as_tree(maxima).get(), expected);
    }

    #[test]
    fn set_union_join_is_independent_of_grouping(
        sets in prop::collection::vec(prop::collection::btree_set(0u32..20, 0..6), 0..20)
    ) {
        let unions: Vec<_> = sets.iter().cloned().map(SetUnion).collect();
        let expected: std::collections::BTreeSet<u32> = sets.iter().flatten().copied().collect();
        prop_assert_eq!(join_sequentially(unions.clone()).into_inner(), expected.clone());
        prop_assert_eq!(join_as_tree(unions).into_inner(), expected);
    }

    #[test]
    fn failure_log_join_is_independent_of_grouping(
        entities in prop::collection::btree_set(0usize..500, 0..30)
    ) {
        // Visit in descending order so that the smallest entity is recorded last
        let logs: Vec<_> = entities
            .iter()
            .rev()
            .map(|&entity| {
                let mut log = FailureLog::default();
                log.record(entity, &eyre!("failure on {}", entity));
                log
            })
            .collect();

        let sequential = join_sequentially(logs.clone());
        let tree = join_as_tree(logs);
        prop_assert_eq!(sequential.count(), entities.len());
        prop_assert_eq!(tree.count(), entities.len());
        prop_assert_eq!(
            sequential.first().map(|f| f.entity),
            entities.iter().next().copied()
        );
        prop_assert_eq!(sequential.first(), tree.first());
    }
}

#[test]
fn only_objects_active_on_the_element_subdomain_are_evaluated() {
    let mut mesh = create_disjoint_segments::<f64>(40);
    mesh.assign_subdomains(|i, _| (i * 7 % 3) as u32);
    let fe = LinearSegmentReinit::new(&mesh, 2);
    let dof_map = NodalDofMap::for_mesh(&mesh, 1);

    let on_one = Arc::new(MockKernel::new("one", 1.0).restricted_to(Restriction::subdomains([1])));
    let on_zero_and_two = Arc::new(MockKernel::new("zero_two", 1.0).restricted_to(Restriction::subdomains([0, 2])));
    let everywhere = Arc::new(MockKernel::new("everywhere", 1.0));

    let mut builder = ProblemBuilder::new(&mesh, &fe, &dof_map).with_config(threaded_config(4, 3));
    builder
        .add_kernel(on_one.clone())
        .add_kernel(on_zero_and_two.clone())
        .add_kernel(everywhere.clone());
    let problem = builder.build().unwrap();
    problem
        .compute_residual(&sample_solution(mesh.num_nodes(), 1))
        .unwrap();

    let elements_in = |ids: &[u32]| -> Vec<usize> {
        (0..mesh.num_elements())
            .filter(|&e| ids.contains(&mesh.element_subdomain(e)))
            .collect()
    };
    assert_eq!(on_one.evaluated_elements(), elements_in(&[1]));
    assert_eq!(on_zero_and_two.evaluated_elements(), elements_in(&[0, 2]));
    assert_eq!(everywhere.evaluated_elements(), (0..40).collect::<Vec<_>>());
}

#[test]
fn concurrent_scatter_loses_no_contributions() {
    let target = GlobalVector::<f64>::zeros(10);
    (0..1000usize).into_par_iter().for_each(|i| {
        let dofs = [i % 10, (i + 1) % 10, (i + 5) % 10];
        target.scatter_add(&DVector::from_element(3, 1.0), &dofs);
    });
    // Every entry is hit by 100 items in each of the three positions
    let result = target.into_inner();
    assert!(result.iter().all(|&v| v == 300.0), "{}", result);
}

#[test]
fn body_force_assembles_lumped_load_on_uniform_mesh() {
    let mesh = create_uniform_line_mesh(10, 1.0);
    let fe = LinearSegmentReinit::new(&mesh, 2);
    let dof_map = NodalDofMap::for_mesh(&mesh, 1);

    let mut builder = ProblemBuilder::new(&mesh, &fe, &dof_map).with_config(threaded_config(4, 1));
    builder.add_kernel(Arc::new(BodyForce::new(0, 2.0)));
    let problem = builder.build().unwrap();
    let residual = problem
        .compute_residual(&DVector::zeros(mesh.num_nodes()))
        .unwrap();

    let h = 0.1;
    let mut expected = DVector::from_element(11, -2.0 * h);
    expected[0] = -h;
    expected[10] = -h;
    assert_matrix_eq!(residual, expected, comp = abs, tol = 1e-12);
}

#[test]
fn boundary_objects_see_each_side_and_boundary_pair_once() {
    let mut mesh = create_uniform_line_mesh(6, 1.0);
    mesh.add_side_to_boundary(0, 0, 2);
    let fe = LinearSegmentReinit::new(&mesh, 2);
    let dof_map = NodalDofMap::for_mesh(&mesh, 1);

    let flux = Arc::new(MockKernel::new("flux", 1.0));
    let mut builder = ProblemBuilder::new(&mesh, &fe, &dof_map).with_config(threaded_config(3, 1));
    builder.add_boundary_kernel(flux.clone());
    let problem = builder.build().unwrap();
    let residual = problem
        .compute_residual(&sample_solution(mesh.num_nodes(), 1))
        .unwrap();

    assert_eq!(
        flux.evaluations(),
        vec![
            (0, Some((0, LEFT_BOUNDARY))),
            (0, Some((0, 2))),
            (5, Some((1, RIGHT_BOUNDARY))),
        ]
    );
    // Side 0 of element 0 belongs to two boundaries and receives both contributions
    assert!((residual[0] - 2.0).abs() < 1e-14);
    assert!((residual[6] - 1.0).abs() < 1e-14);
    assert!(residual.rows(1, 5).iter().all(|&v| v == 0.0));
}
