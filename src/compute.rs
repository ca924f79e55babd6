//! Concrete loops built on the [engine](crate::engine).
//!
//! Every loop borrows its read-only inputs (mesh, degree-of-freedom map, FE service,
//! warehouses and the current solution) and a shared global destination. Scratch data lives
//! in the per-context workspaces defined here.
use crate::dispatch::{LocalBuffers, QpValues};
use crate::dof::DofMap;
use crate::fe::{FeReinit, FeValues};
use crate::mesh::{ElementHandle, MeshTopology, NodeHandle};
use crate::objects::{ElementKernel, NodalKernel};
use crate::registry::ObjectWarehouse;
use crate::{Real, SubdomainId};
use std::sync::Arc;

mod elemental_aux;
mod jacobian;
mod jacobian_scaling;
mod max_qps;
mod nodal_aux;
mod nodal_kernels;
mod residual;

pub use elemental_aux::*;
pub use jacobian::*;
pub use jacobian_scaling::*;
pub use max_qps::*;
pub use nodal_aux::*;
pub use nodal_kernels::*;
pub use residual::*;

/// Read-only inputs shared by the loops that evaluate element kernels.
#[derive(Clone, Copy)]
pub struct KernelInputs<'a, T: Real> {
    pub mesh: &'a dyn MeshTopology,
    pub dof_map: &'a dyn DofMap,
    pub fe: &'a dyn FeReinit<T>,
    pub kernels: &'a ObjectWarehouse<dyn ElementKernel<T>>,
    pub boundary_kernels: &'a ObjectWarehouse<dyn ElementKernel<T>>,
    /// Global solution, indexed by the degrees of freedom of `dof_map`.
    pub solution: &'a [T],
}

impl<'a, T: Real> KernelInputs<'a, T> {
    fn assert_solution_len(&self) {
        assert_eq!(
            self.solution.len(),
            self.dof_map.n_dofs(),
            "Solution length does not match number of degrees of freedom"
        );
    }
}

/// Scratch data for evaluating kernels on one element at a time.
#[derive(Debug, Clone)]
pub struct ElementWorkspace<T: Real> {
    fe_values: FeValues<T>,
    qp_values: QpValues<T>,
    buffers: LocalBuffers<T>,
    element_dofs: Vec<usize>,
    u_local: Vec<T>,
    dof_permutation: Vec<usize>,
}

impl<T: Real> ElementWorkspace<T> {
    pub fn new(n_vars: usize) -> Self {
        Self {
            fe_values: FeValues::default(),
            qp_values: QpValues::default(),
            buffers: LocalBuffers::new(n_vars),
            element_dofs: Vec::new(),
            u_local: Vec::new(),
            dof_permutation: Vec::new(),
        }
    }

    /// Gathers the degrees of freedom and local solution coefficients of the element.
    fn gather_element(&mut self, inputs: &KernelInputs<T>, element: ElementHandle) {
        self.gather(inputs.mesh, inputs.dof_map, inputs.solution, element);
    }

    fn gather(&mut self, mesh: &dyn MeshTopology, dof_map: &dyn DofMap, solution: &[T], element: ElementHandle) {
        dof_map.element_dofs(mesh, element.id, &mut self.element_dofs);
        self.u_local.clear();
        self.u_local
            .extend(self.element_dofs.iter().map(|&dof| solution[dof]));
    }

    fn reinit_element(&mut self, inputs: &KernelInputs<T>, element: ElementHandle) -> eyre::Result<()> {
        self.reinit(inputs.fe, element, None)
    }

    fn reinit_side(&mut self, inputs: &KernelInputs<T>, element: ElementHandle, side: usize) -> eyre::Result<()> {
        self.reinit(inputs.fe, element, Some(side))
    }

    /// Reinitializes the FE values on the element, or on one of its sides, and interpolates
    /// the gathered solution at the quadrature points.
    fn reinit(&mut self, fe: &dyn FeReinit<T>, element: ElementHandle, side: Option<usize>) -> eyre::Result<()> {
        match side {
            None => fe.reinit_element(element.id, &mut self.fe_values)?,
            Some(side) => fe.reinit_side(element.id, side, &mut self.fe_values)?,
        }
        self.qp_values
            .reinit(&self.fe_values, &self.u_local, self.buffers.n_vars());
        Ok(())
    }
}

/// Read-only inputs shared by the loops that evaluate nodal objects.
#[derive(Clone, Copy)]
pub struct NodalInputs<'a, T: Real> {
    pub dof_map: &'a dyn DofMap,
    pub objects: &'a ObjectWarehouse<dyn NodalKernel<T>>,
    pub boundary_objects: &'a ObjectWarehouse<dyn NodalKernel<T>>,
    pub solution: &'a [T],
}

impl<'a, T: Real> NodalInputs<'a, T> {
    fn assert_solution_len(&self) {
        assert_eq!(
            self.solution.len(),
            self.dof_map.n_dofs(),
            "Solution length does not match number of degrees of freedom"
        );
    }
}

/// Scratch data for evaluating nodal objects on one node at a time.
pub struct NodalWorkspace<T: Real> {
    active: Vec<Arc<dyn NodalKernel<T>>>,
    u_node: Vec<T>,
}

impl<T: Real> NodalWorkspace<T> {
    pub fn new(n_vars: usize) -> Self {
        Self {
            active: Vec::new(),
            u_node: Vec::with_capacity(n_vars),
        }
    }

    /// Activates the objects of all the given subdomains and sets them up.
    ///
    /// An object active on several of the subdomains is activated once, so that a node on a
    /// subdomain interface is not evaluated twice by the same object.
    fn activate(&mut self, objects: &ObjectWarehouse<dyn NodalKernel<T>>, subdomains: &[SubdomainId]) {
        self.active.clear();
        for &subdomain in subdomains {
            for object in objects.active_objects(subdomain) {
                object.subdomain_setup(subdomain);
                if !self.active.iter().any(|a| Arc::ptr_eq(a, object)) {
                    self.active.push(Arc::clone(object));
                }
            }
        }
    }

    /// Gathers the values of all variables at the node.
    fn gather_node(&mut self, inputs: &NodalInputs<T>, node: NodeHandle) {
        let dof_map = inputs.dof_map;
        self.u_node.clear();
        self.u_node.extend(
            (0..dof_map.n_variables()).map(|var| inputs.solution[dof_map.node_dof(node.id, var)]),
        );
    }
}
