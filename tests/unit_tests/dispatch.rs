use crate::mock::MockKernel;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use meshloop::dispatch::{
    dispatch_jacobian, dispatch_jacobian_diagonal, dispatch_residual, LocalBuffers, QpValues,
};
use meshloop::fe::{FeReinit, FeValues, LinearSegmentReinit};
use meshloop::kernels::{CoupledForce, Diffusion, Reaction};
use meshloop::mesh::procedural::create_uniform_line_mesh;
use meshloop::mesh::ElementHandle;
use meshloop::objects::ElementKernel;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

const ELEMENT: ElementHandle = ElementHandle { id: 1, subdomain: 0 };

/// Values on element 1 of a uniform mesh of [0, 1] with 4 elements, i.e. on [0.25, 0.5].
fn element_values(u_local: &[f64], n_vars: usize) -> (FeValues<f64>, QpValues<f64>) {
    let mesh = create_uniform_line_mesh(4, 1.0);
    let reinit = LinearSegmentReinit::new(&mesh, 2);
    let mut fe = FeValues::default();
    reinit.reinit_element(ELEMENT.id, &mut fe).unwrap();
    let mut values = QpValues::default();
    values.reinit(&fe, u_local, n_vars);
    (fe, values)
}

#[test]
fn qp_values_interpolate_solution() {
    // u(x) = x at the element vertices
    let (fe, values) = element_values(&[0.25, 0.5], 1);
    for qp in 0..fe.n_qp() {
        assert_scalar_eq!(values.u(0, qp), fe.point(qp)[0], comp = abs, tol = 1e-14);
        assert_scalar_eq!(values.grad_u(0, qp)[0], 1.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn qp_values_separate_variables() {
    // Variable 0 is constant 2, variable 1 is u(x) = 4x
    let (fe, values) = element_values(&[2.0, 1.0, 2.0, 2.0], 2);
    for qp in 0..fe.n_qp() {
        assert_scalar_eq!(values.u(0, qp), 2.0, comp = abs, tol = 1e-14);
        assert_scalar_eq!(values.grad_u(0, qp)[0], 0.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(values.u(1, qp), 4.0 * fe.point(qp)[0], comp = abs, tol = 1e-14);
        assert_scalar_eq!(values.grad_u(1, qp)[0], 4.0, comp = abs, tol = 1e-12);
    }
}

#[test]
fn diffusion_residual_and_jacobian() {
    let h = 0.25;
    let (fe, values) = element_values(&[0.25, 0.5], 1);
    let kernels: Vec<Arc<dyn ElementKernel<f64>>> = vec![Arc::new(Diffusion::new(0, 1.0))];
    let mut buffers = LocalBuffers::new(1);

    buffers.reset_residual(2);
    let invoked = dispatch_residual(ELEMENT, None, &kernels, &fe, &values, &mut buffers).unwrap();
    assert_eq!(invoked, 1);
    assert!(buffers.is_touched());
    let expected_residual = DVector::from_column_slice(&[-1.0, 1.0]);
    assert_matrix_eq!(buffers.residual().clone(), expected_residual, comp = abs, tol = 1e-12);

    buffers.reset_jacobian(2);
    dispatch_jacobian(ELEMENT, None, &kernels, &fe, &values, &mut buffers, false).unwrap();
    let expected_jacobian = DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]) / h;
    assert_matrix_eq!(buffers.jacobian().clone(), expected_jacobian, comp = abs, tol = 1e-12);

    buffers.reset_residual(2);
    dispatch_jacobian_diagonal(ELEMENT, None, &kernels, &fe, &values, &mut buffers).unwrap();
    let expected_diagonal = DVector::from_column_slice(&[1.0, 1.0]) / h;
    assert_matrix_eq!(buffers.residual().clone(), expected_diagonal, comp = abs, tol = 1e-12);
}

#[test]
fn contributions_of_several_objects_are_summed() {
    let (fe, values) = element_values(&[0.0, 0.0], 1);
    let kernels: Vec<Arc<dyn ElementKernel<f64>>> = vec![
        Arc::new(MockKernel::new("a", 1.0)),
        Arc::new(MockKernel::new("b", 10.0)),
    ];
    let mut buffers = LocalBuffers::new(1);
    buffers.reset_residual(2);
    let invoked = dispatch_residual(ELEMENT, None, &kernels, &fe, &values, &mut buffers).unwrap();
    assert_eq!(invoked, 2);

    // Each shape function integrates to h / 2
    let expected = DVector::from_column_slice(&[11.0 * 0.125, 11.0 * 0.125]);
    assert_matrix_eq!(buffers.residual().clone(), expected, comp = abs, tol = 1e-12);
}

#[test]
fn local_ordering_is_node_major() {
    let (fe, values) = element_values(&[0.0, 1.0, 0.0, 1.0], 2);
    let kernels: Vec<Arc<dyn ElementKernel<f64>>> = vec![Arc::new(Reaction::new(1, 1.0))];
    let mut buffers = LocalBuffers::new(2);
    assert_eq!(buffers.local_index(1, 0), 2);

    buffers.reset_residual(4);
    dispatch_residual(ELEMENT, None, &kernels, &fe, &values, &mut buffers).unwrap();
    let r = buffers.residual();
    assert_eq!(r[0], 0.0);
    assert_eq!(r[2], 0.0);
    assert_scalar_eq!(r[1], 0.125, comp = abs, tol = 1e-12);
    assert_scalar_eq!(r[3], 0.125, comp = abs, tol = 1e-12);
}

#[test]
fn off_diagonal_blocks_are_only_computed_when_requested() {
    let (fe, values) = element_values(&[0.0, 1.0, 0.0, 1.0], 2);
    let kernels: Vec<Arc<dyn ElementKernel<f64>>> = vec![Arc::new(CoupledForce::new(0, 1, 2.0))];
    let mut buffers = LocalBuffers::new(2);

    buffers.reset_jacobian(4);
    dispatch_jacobian(ELEMENT, None, &kernels, &fe, &values, &mut buffers, false).unwrap();
    assert!(buffers.jacobian().iter().all(|&k| k == 0.0));

    buffers.reset_jacobian(4);
    dispatch_jacobian(ELEMENT, None, &kernels, &fe, &values, &mut buffers, true).unwrap();
    let jacobian = buffers.jacobian();
    // Rows of variable 0, columns of variable 1: -2 * mass matrix
    let h = 0.25;
    assert_scalar_eq!(jacobian[(0, 1)], -2.0 * h / 3.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(jacobian[(0, 3)], -2.0 * h / 6.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(jacobian[(2, 3)], -2.0 * h / 3.0, comp = abs, tol = 1e-12);
    // Nothing in rows of variable 1 or columns of variable 0
    for k in 0..4 {
        assert_eq!(jacobian[(1, k)], 0.0);
        assert_eq!(jacobian[(3, k)], 0.0);
        assert_eq!(jacobian[(k, 0)], 0.0);
        assert_eq!(jacobian[(k, 2)], 0.0);
    }
}

#[test]
fn no_quadrature_points_means_no_evaluation() {
    let fe = FeValues::default();
    let values = QpValues::default();
    let kernel = Arc::new(MockKernel::new("a", 1.0));
    let kernels: Vec<Arc<dyn ElementKernel<f64>>> = vec![kernel.clone()];
    let mut buffers = LocalBuffers::new(1);
    buffers.reset_residual(2);

    let invoked = dispatch_residual(ELEMENT, None, &kernels, &fe, &values, &mut buffers).unwrap();
    assert_eq!(invoked, 0);
    assert!(!buffers.is_touched());
    assert!(kernel.evaluations().is_empty());
}

#[test]
fn errors_name_object_element_and_quadrature_point() {
    let (fe, values) = element_values(&[0.0, 0.0], 1);
    let kernels: Vec<Arc<dyn ElementKernel<f64>>> = vec![Arc::new(MockKernel::new("faulty", 1.0).failing_on(ELEMENT.id))];
    let mut buffers = LocalBuffers::new(1);
    buffers.reset_residual(2);

    let err = dispatch_residual(ELEMENT, None, &kernels, &fe, &values, &mut buffers).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("object 'faulty' failed on element 1 at quadrature point 0"));
    assert!(message.contains("singular local solve"));
}
