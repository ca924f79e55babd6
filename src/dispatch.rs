//! Evaluation of callback objects at quadrature points.
//!
//! For every element (or side) the loops reinitialize the finite element values once,
//! interpolate the solution to the quadrature points once, and then evaluate each active
//! object in order. Contributions are accumulated into [`LocalBuffers`] object by object,
//! and within an object by ascending quadrature point, which keeps the floating-point
//! result reproducible for a fixed partitioning.
use crate::fe::FeValues;
use crate::mesh::ElementHandle;
use crate::objects::{ElementKernel, MeshObject, QpData};
use crate::{BoundaryId, Real};
use eyre::WrapErr;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

/// Solution values and gradients of every variable at the quadrature points.
#[derive(Debug, Clone)]
pub struct QpValues<T: Real> {
    dim: usize,
    // n_vars x n_qp
    u: DMatrix<T>,
    // (n_vars * dim) x n_qp
    grad_u: DMatrix<T>,
}

impl<T: Real> Default for QpValues<T> {
    fn default() -> Self {
        Self {
            dim: 1,
            u: DMatrix::zeros(0, 0),
            grad_u: DMatrix::zeros(0, 0),
        }
    }
}

impl<T: Real> QpValues<T> {
    /// Interpolates the local solution coefficients to the quadrature points of `fe`.
    ///
    /// `u_local` uses the node-major local ordering `i * n_vars + v`.
    pub fn reinit(&mut self, fe: &FeValues<T>, u_local: &[T], n_vars: usize) {
        let n_shape = fe.n_shape();
        let n_qp = fe.n_qp();
        let dim = fe.dim();
        assert_eq!(u_local.len(), n_shape * n_vars, "Local solution has wrong length");

        self.dim = dim;
        self.u.resize_mut(n_vars, n_qp, T::zero());
        self.u.fill(T::zero());
        self.grad_u.resize_mut(n_vars * dim, n_qp, T::zero());
        self.grad_u.fill(T::zero());

        for qp in 0..n_qp {
            for i in 0..n_shape {
                let phi = fe.phi(i, qp);
                let grad_phi = fe.grad_phi(i, qp);
                for v in 0..n_vars {
                    let coeff = u_local[i * n_vars + v];
                    self.u[(v, qp)] += phi * coeff;
                    for d in 0..dim {
                        self.grad_u[(v * dim + d, qp)] += grad_phi[d] * coeff;
                    }
                }
            }
        }
    }

    pub fn u(&self, variable: usize, qp: usize) -> T {
        self.u[(variable, qp)]
    }

    pub fn grad_u(&self, variable: usize, qp: usize) -> &[T] {
        let offset = qp * self.grad_u.nrows() + variable * self.dim;
        &self.grad_u.as_slice()[offset..offset + self.dim]
    }
}

/// Local dense residual and Jacobian of the entity currently being processed.
#[derive(Debug, Clone)]
pub struct LocalBuffers<T: Real> {
    n_vars: usize,
    residual: DVector<T>,
    jacobian: DMatrix<T>,
    touched: bool,
}

impl<T: Real> LocalBuffers<T> {
    pub fn new(n_vars: usize) -> Self {
        Self {
            n_vars,
            residual: DVector::zeros(0),
            jacobian: DMatrix::zeros(0, 0),
            touched: false,
        }
    }

    pub fn n_vars(&self) -> usize {
        self.n_vars
    }

    /// Local index of the degree of freedom of `variable` at local node `i`.
    pub fn local_index(&self, i: usize, variable: usize) -> usize {
        i * self.n_vars + variable
    }

    /// Zeroes the residual buffer and resizes it to `n_local` entries.
    pub fn reset_residual(&mut self, n_local: usize) {
        self.residual.resize_vertically_mut(n_local, T::zero());
        self.residual.fill(T::zero());
        self.touched = false;
    }

    /// Zeroes the Jacobian buffer and resizes it to `n_local x n_local`.
    pub fn reset_jacobian(&mut self, n_local: usize) {
        self.jacobian.resize_mut(n_local, n_local, T::zero());
        self.jacobian.fill(T::zero());
        self.touched = false;
    }

    /// Whether any object contributed since the last reset.
    pub fn is_touched(&self) -> bool {
        self.touched
    }

    pub fn residual(&self) -> &DVector<T> {
        &self.residual
    }

    pub fn jacobian(&self) -> &DMatrix<T> {
        &self.jacobian
    }
}

fn object_error_context<O: ?Sized + MeshObject>(object: &O, element: ElementHandle, qp: usize) -> String {
    format!(
        "object '{}' failed on element {} at quadrature point {}",
        object.name(),
        element.id,
        qp
    )
}

/// Accumulates the residual contributions of `objects` into `buffers`.
///
/// Returns the number of objects evaluated. Objects are skipped when `fe` has no
/// quadrature points.
pub fn dispatch_residual<T: Real>(
    element: ElementHandle,
    side: Option<(usize, BoundaryId)>,
    objects: &[Arc<dyn ElementKernel<T>>],
    fe: &FeValues<T>,
    values: &QpValues<T>,
    buffers: &mut LocalBuffers<T>,
) -> eyre::Result<usize> {
    let n_qp = fe.n_qp();
    let n_shape = fe.n_shape();
    if n_qp == 0 {
        return Ok(0);
    }

    let mut invoked = 0;
    for object in objects {
        let var = object.variable();
        for (qp, &w) in fe.jxw().iter().enumerate() {
            let data = QpData::new(element, side, qp, fe, values);
            for i in 0..n_shape {
                let r = object
                    .compute_qp_residual(&data, i)
                    .wrap_err_with(|| object_error_context(object.as_ref(), element, qp))?;
                let idx = buffers.local_index(i, var);
                buffers.residual[idx] += w * r;
            }
        }
        buffers.touched = true;
        invoked += 1;
    }
    Ok(invoked)
}

/// Accumulates the Jacobian contributions of `objects` into `buffers`.
///
/// With `include_off_diagonal`, blocks coupling each object's variable to its
/// [coupled variables](MeshObject::coupled_variables) are computed too.
pub fn dispatch_jacobian<T: Real>(
    element: ElementHandle,
    side: Option<(usize, BoundaryId)>,
    objects: &[Arc<dyn ElementKernel<T>>],
    fe: &FeValues<T>,
    values: &QpValues<T>,
    buffers: &mut LocalBuffers<T>,
    include_off_diagonal: bool,
) -> eyre::Result<usize> {
    let n_qp = fe.n_qp();
    let n_shape = fe.n_shape();
    if n_qp == 0 {
        return Ok(0);
    }

    let mut invoked = 0;
    for object in objects {
        let var = object.variable();
        for (qp, &w) in fe.jxw().iter().enumerate() {
            let data = QpData::new(element, side, qp, fe, values);
            for i in 0..n_shape {
                let row = buffers.local_index(i, var);
                for j in 0..n_shape {
                    let k = object
                        .compute_qp_jacobian(&data, i, j)
                        .wrap_err_with(|| object_error_context(object.as_ref(), element, qp))?;
                    let col = buffers.local_index(j, var);
                    buffers.jacobian[(row, col)] += w * k;
                }

                if include_off_diagonal {
                    for &jvar in object.coupled_variables() {
                        for j in 0..n_shape {
                            let k = object
                                .compute_qp_off_diagonal_jacobian(&data, i, j, jvar)
                                .wrap_err_with(|| object_error_context(object.as_ref(), element, qp))?;
                            let col = buffers.local_index(j, jvar);
                            buffers.jacobian[(row, col)] += w * k;
                        }
                    }
                }
            }
        }
        buffers.touched = true;
        invoked += 1;
    }
    Ok(invoked)
}

/// Accumulates only the diagonal entries of the Jacobian into the residual buffer.
pub fn dispatch_jacobian_diagonal<T: Real>(
    element: ElementHandle,
    side: Option<(usize, BoundaryId)>,
    objects: &[Arc<dyn ElementKernel<T>>],
    fe: &FeValues<T>,
    values: &QpValues<T>,
    buffers: &mut LocalBuffers<T>,
) -> eyre::Result<usize> {
    let n_qp = fe.n_qp();
    let n_shape = fe.n_shape();
    if n_qp == 0 {
        return Ok(0);
    }

    let mut invoked = 0;
    for object in objects {
        let var = object.variable();
        for (qp, &w) in fe.jxw().iter().enumerate() {
            let data = QpData::new(element, side, qp, fe, values);
            for i in 0..n_shape {
                let k = object
                    .compute_qp_jacobian(&data, i, i)
                    .wrap_err_with(|| object_error_context(object.as_ref(), element, qp))?;
                let idx = buffers.local_index(i, var);
                buffers.residual[idx] += w * k;
            }
        }
        buffers.touched = true;
        invoked += 1;
    }
    Ok(invoked)
}
