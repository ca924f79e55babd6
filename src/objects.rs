//! Callback objects evaluated by the loops.
//!
//! Objects are grouped by capability rather than by physics: an [`ElementKernel`] produces
//! residual and Jacobian contributions at the quadrature points of an element (or of a side,
//! when registered as a boundary object), a [`NodalKernel`] produces one value per node and an
//! [`ElementAux`] one value per element.
//! Where an object applies is declared once through its [`Restriction`].
use crate::dispatch::QpValues;
use crate::fe::FeValues;
use crate::mesh::{ElementHandle, NodeHandle};
use crate::{BoundaryId, Real, SubdomainId};

/// Where an object is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restriction {
    /// Every subdomain (for block objects) or every boundary (for boundary objects).
    Everywhere,
    Subdomains(Vec<SubdomainId>),
    Boundaries(Vec<BoundaryId>),
}

impl Restriction {
    pub fn subdomains(ids: impl IntoIterator<Item = SubdomainId>) -> Self {
        Restriction::Subdomains(ids.into_iter().collect())
    }

    pub fn boundaries(ids: impl IntoIterator<Item = BoundaryId>) -> Self {
        Restriction::Boundaries(ids.into_iter().collect())
    }
}

/// Properties shared by all callback objects.
///
/// Objects are shared by every execution context of a loop, so any state they update
/// during a loop must be synchronized (typically atomics).
pub trait MeshObject: Send + Sync {
    fn name(&self) -> &str;

    /// Index of the variable whose residual the object contributes to.
    fn variable(&self) -> usize;

    fn restriction(&self) -> Restriction;

    /// Variables other than [`variable`](MeshObject::variable) that the object's residual
    /// depends on. Off-diagonal Jacobian blocks are only computed for these.
    fn coupled_variables(&self) -> &[usize] {
        &[]
    }

    /// Called when an execution context enters a subdomain in which the object is active.
    fn subdomain_setup(&self, _subdomain: SubdomainId) {}
}

/// Data available to an [`ElementKernel`] at a single quadrature point.
#[derive(Debug, Clone, Copy)]
pub struct QpData<'a, T: Real> {
    element: ElementHandle,
    side: Option<(usize, BoundaryId)>,
    qp: usize,
    fe: &'a FeValues<T>,
    values: &'a QpValues<T>,
}

impl<'a, T: Real> QpData<'a, T> {
    pub fn new(
        element: ElementHandle,
        side: Option<(usize, BoundaryId)>,
        qp: usize,
        fe: &'a FeValues<T>,
        values: &'a QpValues<T>,
    ) -> Self {
        Self {
            element,
            side,
            qp,
            fe,
            values,
        }
    }

    pub fn element(&self) -> ElementHandle {
        self.element
    }

    /// The side and boundary id, if the point is on a boundary side.
    pub fn side(&self) -> Option<(usize, BoundaryId)> {
        self.side
    }

    pub fn qp(&self) -> usize {
        self.qp
    }

    pub fn n_shape(&self) -> usize {
        self.fe.n_shape()
    }

    /// Value of shape function `i`, used both as test and trial function.
    pub fn phi(&self, i: usize) -> T {
        self.fe.phi(i, self.qp)
    }

    pub fn grad_phi(&self, i: usize) -> &'a [T] {
        self.fe.grad_phi(i, self.qp)
    }

    pub fn point(&self) -> &'a [T] {
        self.fe.point(self.qp)
    }

    /// Value of `variable` at the quadrature point.
    pub fn u(&self, variable: usize) -> T {
        self.values.u(variable, self.qp)
    }

    pub fn grad_u(&self, variable: usize) -> &'a [T] {
        self.values.grad_u(variable, self.qp)
    }
}

/// Contributes to residuals and Jacobians at the quadrature points of elements or sides.
///
/// The loop multiplies every returned value by the integration weight of the quadrature point.
/// An object that does not apply at a point returns zero; errors are reserved for genuine
/// numerical failures.
pub trait ElementKernel<T: Real>: MeshObject {
    /// Integrand of the residual for test function `i`.
    fn compute_qp_residual(&self, data: &QpData<T>, i: usize) -> eyre::Result<T>;

    /// Derivative of the integrand for test function `i` with respect to the coefficient of
    /// trial function `j` of the object's own variable.
    fn compute_qp_jacobian(&self, _data: &QpData<T>, _i: usize, _j: usize) -> eyre::Result<T> {
        Ok(T::zero())
    }

    /// Derivative with respect to trial function `j` of the coupled variable `jvar`.
    fn compute_qp_off_diagonal_jacobian(
        &self,
        _data: &QpData<T>,
        _i: usize,
        _j: usize,
        _jvar: usize,
    ) -> eyre::Result<T> {
        Ok(T::zero())
    }
}

/// Data available to a [`NodalKernel`] at a node.
#[derive(Debug, Clone, Copy)]
pub struct NodeData<'a, T> {
    node: NodeHandle,
    boundary: Option<BoundaryId>,
    solution: &'a [T],
}

impl<'a, T: Real> NodeData<'a, T> {
    pub fn new(node: NodeHandle, boundary: Option<BoundaryId>, solution: &'a [T]) -> Self {
        Self {
            node,
            boundary,
            solution,
        }
    }

    pub fn node(&self) -> NodeHandle {
        self.node
    }

    pub fn boundary(&self) -> Option<BoundaryId> {
        self.boundary
    }

    /// Value of `variable` at the node.
    pub fn u(&self, variable: usize) -> T {
        self.solution[variable]
    }
}

/// Computes a single value per node.
///
/// Registered for auxiliary fields, the value is written into the auxiliary variable. Registered
/// as a nodal kernel, it is added to the residual of the object's variable at the node.
pub trait NodalKernel<T: Real>: MeshObject {
    fn compute_value(&self, data: &NodeData<T>) -> eyre::Result<T>;

    /// Derivative of the value with respect to variable `jvar` at the same node.
    ///
    /// Only called for the object's own variable and its coupled variables.
    fn compute_jacobian(&self, _data: &NodeData<T>, _jvar: usize) -> eyre::Result<T> {
        Ok(T::zero())
    }
}

/// Computes a constant value per element from the values at its quadrature points.
///
/// The loop stores the integration-weighted average of the point values, over the element
/// for block objects and over the side for boundary objects.
pub trait ElementAux<T: Real>: MeshObject {
    fn compute_qp_value(&self, data: &QpData<T>) -> eyre::Result<T>;
}
