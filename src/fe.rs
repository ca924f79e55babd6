//! Finite element values at quadrature points.
//!
//! An [`FeReinit`] service fills an [`FeValues`] buffer once per element or side. All
//! callback objects evaluated on that entity then read the same precomputed values.
use crate::mesh::LineMesh;
use crate::Real;
use eyre::eyre;
use itertools::izip;
use nalgebra::DMatrix;

/// Shape function values, gradients and integration weights on one element or side.
///
/// All matrices are stored column-per-quadrature-point, so the data of a single quadrature
/// point is contiguous.
#[derive(Debug, Clone)]
pub struct FeValues<T: Real> {
    dim: usize,
    // n_shape x n_qp
    phi: DMatrix<T>,
    // (n_shape * dim) x n_qp
    grad_phi: DMatrix<T>,
    // dim x n_qp
    points: DMatrix<T>,
    jxw: Vec<T>,
}

impl<T: Real> Default for FeValues<T> {
    fn default() -> Self {
        Self {
            dim: 1,
            phi: DMatrix::zeros(0, 0),
            grad_phi: DMatrix::zeros(0, 0),
            points: DMatrix::zeros(0, 0),
            jxw: Vec::new(),
        }
    }
}

impl<T: Real> FeValues<T> {
    /// Resizes all storage. Contents are unspecified afterwards and must be overwritten.
    pub fn resize(&mut self, dim: usize, n_shape: usize, n_qp: usize) {
        self.dim = dim;
        self.phi.resize_mut(n_shape, n_qp, T::zero());
        self.grad_phi.resize_mut(n_shape * dim, n_qp, T::zero());
        self.points.resize_mut(dim, n_qp, T::zero());
        self.jxw.resize(n_qp, T::zero());
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn n_shape(&self) -> usize {
        self.phi.nrows()
    }

    pub fn n_qp(&self) -> usize {
        self.jxw.len()
    }

    pub fn phi(&self, i: usize, qp: usize) -> T {
        self.phi[(i, qp)]
    }

    /// The gradient of shape function `i` at quadrature point `qp`.
    pub fn grad_phi(&self, i: usize, qp: usize) -> &[T] {
        let nrows = self.grad_phi.nrows();
        let offset = qp * nrows + i * self.dim;
        &self.grad_phi.as_slice()[offset..offset + self.dim]
    }

    pub fn point(&self, qp: usize) -> &[T] {
        let offset = qp * self.dim;
        &self.points.as_slice()[offset..offset + self.dim]
    }

    pub fn jxw(&self) -> &[T] {
        &self.jxw
    }

    pub fn phi_mut(&mut self) -> &mut DMatrix<T> {
        &mut self.phi
    }

    pub fn grad_phi_mut(&mut self) -> &mut DMatrix<T> {
        &mut self.grad_phi
    }

    pub fn points_mut(&mut self) -> &mut DMatrix<T> {
        &mut self.points
    }

    pub fn jxw_mut(&mut self) -> &mut [T] {
        &mut self.jxw
    }
}

/// Computes finite element values on elements and sides.
pub trait FeReinit<T: Real>: Sync {
    fn reinit_element(&self, element: usize, values: &mut FeValues<T>) -> eyre::Result<()>;

    fn reinit_side(&self, element: usize, side: usize, values: &mut FeValues<T>) -> eyre::Result<()>;

    fn element_qp_count(&self, element: usize) -> usize;

    fn side_qp_count(&self, element: usize, side: usize) -> usize;

    fn element_shape_count(&self, element: usize) -> usize;

    fn element_side_count(&self, element: usize) -> usize;
}

/// Linear Lagrange elements on a [`LineMesh`] with Gauss–Legendre quadrature.
#[derive(Debug, Clone)]
pub struct LinearSegmentReinit<'a, T: Real> {
    mesh: &'a LineMesh<T>,
    // Reference element is [-1, 1]
    weights: Vec<T>,
    points: Vec<T>,
}

impl<'a, T: Real> LinearSegmentReinit<'a, T> {
    /// Creates the service with an `n`-point Gauss–Legendre rule.
    ///
    /// # Panics
    ///
    /// Panics unless `1 <= n <= 3`.
    pub fn new(mesh: &'a LineMesh<T>, n: usize) -> Self {
        let (weights, points): (Vec<f64>, Vec<f64>) = match n {
            1 => (vec![2.0], vec![0.0]),
            2 => {
                let x = 1.0 / 3.0f64.sqrt();
                (vec![1.0, 1.0], vec![-x, x])
            }
            3 => {
                let x = (3.0f64 / 5.0).sqrt();
                (vec![5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0], vec![-x, 0.0, x])
            }
            _ => panic!("Only 1, 2 or 3 point Gauss rules are supported"),
        };
        Self {
            mesh,
            weights: weights.into_iter().map(|w| T::from_f64(w).unwrap()).collect(),
            points: points.into_iter().map(|x| T::from_f64(x).unwrap()).collect(),
        }
    }

    fn element_geometry(&self, element: usize) -> eyre::Result<(T, T)> {
        let [a, b] = self.mesh.connectivity()[element];
        let x0 = self.mesh.vertices()[a];
        let x1 = self.mesh.vertices()[b];
        let two = T::one() + T::one();
        let jacobian = (x1 - x0) / two;
        if jacobian == T::zero() {
            return Err(eyre!("Singular element Jacobian encountered on element {}", element));
        }
        Ok((x0, jacobian))
    }

    fn fill_gradients(values: &mut FeValues<T>, jacobian: T) {
        let two = T::one() + T::one();
        let n_qp = values.n_qp();
        let grad = values.grad_phi_mut();
        for qp in 0..n_qp {
            grad[(0, qp)] = -T::one() / (two * jacobian);
            grad[(1, qp)] = T::one() / (two * jacobian);
        }
    }
}

impl<'a, T: Real> FeReinit<T> for LinearSegmentReinit<'a, T> {
    fn reinit_element(&self, element: usize, values: &mut FeValues<T>) -> eyre::Result<()> {
        let (x0, jacobian) = self.element_geometry(element)?;
        let two = T::one() + T::one();
        values.resize(1, 2, self.weights.len());

        for (qp, (&w, &xi)) in izip!(&self.weights, &self.points).enumerate() {
            let phi = values.phi_mut();
            phi[(0, qp)] = (T::one() - xi) / two;
            phi[(1, qp)] = (T::one() + xi) / two;
            values.points_mut()[(0, qp)] = x0 + (xi + T::one()) * jacobian;
            values.jxw_mut()[qp] = w * jacobian.abs();
        }
        Self::fill_gradients(values, jacobian);
        Ok(())
    }

    fn reinit_side(&self, element: usize, side: usize, values: &mut FeValues<T>) -> eyre::Result<()> {
        assert!(side < 2, "Segments only have two sides");
        let (_, jacobian) = self.element_geometry(element)?;
        values.resize(1, 2, 1);

        let node = self.mesh.connectivity()[element][side];
        let phi = values.phi_mut();
        phi[(0, 0)] = if side == 0 { T::one() } else { T::zero() };
        phi[(1, 0)] = if side == 1 { T::one() } else { T::zero() };
        values.points_mut()[(0, 0)] = self.mesh.vertices()[node];
        // The side of a segment is a point: unit weight
        values.jxw_mut()[0] = T::one();
        Self::fill_gradients(values, jacobian);
        Ok(())
    }

    fn element_qp_count(&self, _element: usize) -> usize {
        self.weights.len()
    }

    fn side_qp_count(&self, _element: usize, _side: usize) -> usize {
        1
    }

    fn element_shape_count(&self, _element: usize) -> usize {
        2
    }

    fn element_side_count(&self, _element: usize) -> usize {
        2
    }
}
