use matrixcompare::assert_scalar_eq;
use meshloop::fe::{FeReinit, FeValues, LinearSegmentReinit};
use meshloop::mesh::procedural::create_uniform_line_mesh;
use meshloop::mesh::LineMesh;

#[test]
fn element_values_on_segment() {
    let mesh = create_uniform_line_mesh(2, 1.0);
    let reinit = LinearSegmentReinit::new(&mesh, 2);
    let mut fe = FeValues::default();
    reinit.reinit_element(1, &mut fe).unwrap();

    assert_eq!(fe.n_qp(), 2);
    assert_eq!(fe.n_shape(), 2);
    assert_eq!(fe.dim(), 1);

    let total_weight: f64 = fe.jxw().iter().sum();
    assert_scalar_eq!(total_weight, 0.5, comp = abs, tol = 1e-14);

    for qp in 0..fe.n_qp() {
        // Partition of unity
        assert_scalar_eq!(fe.phi(0, qp) + fe.phi(1, qp), 1.0, comp = abs, tol = 1e-14);
        assert_scalar_eq!(fe.grad_phi(0, qp)[0], -2.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(fe.grad_phi(1, qp)[0], 2.0, comp = abs, tol = 1e-12);

        let x = fe.point(qp)[0];
        assert!(x > 0.5 && x < 1.0);
        // Linear shape functions interpolate the coordinate exactly
        let interpolated = fe.phi(0, qp) * 0.5 + fe.phi(1, qp) * 1.0;
        assert_scalar_eq!(interpolated, x, comp = abs, tol = 1e-14);
    }
}

#[test]
fn quadrature_counts_follow_rule() {
    let mesh = create_uniform_line_mesh(3, 1.0);
    for n in 1..=3 {
        let reinit = LinearSegmentReinit::new(&mesh, n);
        assert_eq!(reinit.element_qp_count(0), n);
        assert_eq!(reinit.side_qp_count(0, 1), 1);
        assert_eq!(reinit.element_shape_count(2), 2);
        assert_eq!(reinit.element_side_count(2), 2);

        let mut fe = FeValues::default();
        reinit.reinit_element(0, &mut fe).unwrap();
        let total_weight: f64 = fe.jxw().iter().sum();
        assert_scalar_eq!(total_weight, 1.0 / 3.0, comp = abs, tol = 1e-14);
    }
}

#[test]
fn three_point_rule_integrates_quadratics_exactly() {
    let mesh = create_uniform_line_mesh(1, 2.0f64);
    let reinit = LinearSegmentReinit::new(&mesh, 3);
    let mut fe = FeValues::default();
    reinit.reinit_element(0, &mut fe).unwrap();

    let integral: f64 = (0..fe.n_qp())
        .map(|qp| fe.point(qp)[0].powi(2) * fe.jxw()[qp])
        .sum();
    assert_scalar_eq!(integral, 8.0 / 3.0, comp = abs, tol = 1e-12);
}

#[test]
fn side_values_select_side_vertex() {
    let mesh = create_uniform_line_mesh(2, 1.0);
    let reinit = LinearSegmentReinit::new(&mesh, 2);
    let mut fe = FeValues::default();

    reinit.reinit_side(1, 1, &mut fe).unwrap();
    assert_eq!(fe.n_qp(), 1);
    assert_eq!(fe.jxw(), &[1.0]);
    assert_eq!(fe.phi(0, 0), 0.0);
    assert_eq!(fe.phi(1, 0), 1.0);
    assert_eq!(fe.point(0), &[1.0]);

    reinit.reinit_side(0, 0, &mut fe).unwrap();
    assert_eq!(fe.phi(0, 0), 1.0);
    assert_eq!(fe.phi(1, 0), 0.0);
    assert_eq!(fe.point(0), &[0.0]);
}

#[test]
fn degenerate_element_is_an_error() {
    let mesh = LineMesh::from_vertices_and_connectivity(vec![0.0, 1.0, 1.0], vec![[0, 1], [1, 2]]);
    let reinit = LinearSegmentReinit::new(&mesh, 2);
    let mut fe = FeValues::default();

    assert!(reinit.reinit_element(0, &mut fe).is_ok());
    let err = reinit.reinit_element(1, &mut fe).unwrap_err();
    assert!(err.to_string().contains("Singular element Jacobian"));
    assert!(reinit.reinit_side(1, 0, &mut fe).is_err());
}

#[test]
#[should_panic]
fn unsupported_quadrature_rule_panics() {
    let mesh = create_uniform_line_mesh(2, 1.0);
    LinearSegmentReinit::new(&mesh, 4);
}
