use crate::compute::{NodalInputs, NodalWorkspace};
use crate::engine::ThreadedNodeLoop;
use crate::mesh::NodeHandle;
use crate::objects::{NodalKernel, NodeData};
use crate::reduction::{Counter, Reduce};
use crate::scatter::{sort_dof_permutation, GlobalMatrix, GlobalVector};
use crate::{BoundaryId, Real, SubdomainId};
use eyre::WrapErr;
use nalgebra::{DMatrix, DVector};

fn nodal_error_context<T: Real>(object: &dyn NodalKernel<T>, node: NodeHandle) -> String {
    format!("nodal kernel '{}' failed on node {}", object.name(), node.id)
}

/// Adds the residual contributions of nodal kernels.
///
/// On every node, the block kernels active on any subdomain adjacent to the node are
/// evaluated once each, followed by the boundary kernels of every boundary id of the node.
/// Each value is added to the residual of the kernel's variable at the node.
pub struct ComputeNodalKernelsLoop<'a, T: Real> {
    inputs: NodalInputs<'a, T>,
    residual: &'a GlobalVector<T>,
}

pub struct NodalKernelsContext<T: Real> {
    workspace: NodalWorkspace<T>,
    values: Vec<T>,
    dofs: Vec<usize>,
    /// Nodes whose residual contributions were scattered.
    pub scattered: Counter,
}

impl<'a, T: Real> ComputeNodalKernelsLoop<'a, T> {
    pub fn new(inputs: NodalInputs<'a, T>, residual: &'a GlobalVector<T>) -> Self {
        inputs.assert_solution_len();
        assert_eq!(
            residual.len(),
            inputs.dof_map.n_dofs(),
            "Residual length does not match number of degrees of freedom"
        );
        Self { inputs, residual }
    }

    fn evaluate(
        &self,
        values: &mut Vec<T>,
        dofs: &mut Vec<usize>,
        data: &NodeData<T>,
        object: &dyn NodalKernel<T>,
    ) -> eyre::Result<()> {
        let value = object
            .compute_value(data)
            .wrap_err_with(|| nodal_error_context(object, data.node()))?;
        values.push(value);
        dofs.push(
            self.inputs
                .dof_map
                .node_dof(data.node().id, object.variable()),
        );
        Ok(())
    }
}

impl<'a, T: Real> ThreadedNodeLoop for ComputeNodalKernelsLoop<'a, T> {
    type Context = NodalKernelsContext<T>;

    fn create_context(&self) -> Self::Context {
        NodalKernelsContext {
            workspace: NodalWorkspace::new(self.inputs.dof_map.n_variables()),
            values: Vec::new(),
            dofs: Vec::new(),
            scattered: Counter::default(),
        }
    }

    fn subdomain_changed(&self, ctx: &mut Self::Context, subdomains: &[SubdomainId]) -> eyre::Result<()> {
        ctx.workspace.activate(self.inputs.objects, subdomains);
        Ok(())
    }

    fn on_node(&self, ctx: &mut Self::Context, node: NodeHandle) -> eyre::Result<()> {
        let NodalKernelsContext {
            workspace,
            values,
            dofs,
            ..
        } = ctx;
        workspace.gather_node(&self.inputs, node);
        values.clear();
        dofs.clear();

        let data = NodeData::new(node, None, &workspace.u_node);
        for object in &workspace.active {
            self.evaluate(values, dofs, &data, object.as_ref())?;
        }
        Ok(())
    }

    fn on_boundary_node(&self, ctx: &mut Self::Context, node: NodeHandle, boundary: BoundaryId) -> eyre::Result<()> {
        let data = NodeData::new(node, Some(boundary), &ctx.workspace.u_node);
        for object in self.inputs.boundary_objects.active_objects(boundary) {
            self.evaluate(&mut ctx.values, &mut ctx.dofs, &data, object.as_ref())?;
        }
        Ok(())
    }

    fn post_node(&self, ctx: &mut Self::Context, _node: NodeHandle) -> eyre::Result<()> {
        if !ctx.values.is_empty() {
            let local = DVector::from_column_slice(&ctx.values);
            self.residual.scatter_add(&local, &ctx.dofs);
            ctx.scattered.increment();
        }
        Ok(())
    }

    fn join(&self, ctx: &mut Self::Context, other: Self::Context) {
        ctx.scattered.join(other.scattered);
    }
}

/// Where a [`ComputeNodalKernelJacobiansLoop`] adds its contributions.
#[derive(Clone, Copy)]
pub enum NodalJacobianTarget<'a, T: Real> {
    Matrix(&'a GlobalMatrix<T>),
    /// Only the diagonal entries, for computing scaling factors.
    Diagonal(&'a GlobalVector<T>),
}

/// Adds the Jacobian contributions of nodal kernels.
///
/// Nodal kernels only couple degrees of freedom of the same node: the local matrix of a node
/// has one row and one column per variable.
pub struct ComputeNodalKernelJacobiansLoop<'a, T: Real> {
    inputs: NodalInputs<'a, T>,
    target: NodalJacobianTarget<'a, T>,
}

pub struct NodalJacobiansContext<T: Real> {
    workspace: NodalWorkspace<T>,
    local: DMatrix<T>,
    touched: bool,
    node_dofs: Vec<usize>,
    dof_permutation: Vec<usize>,
    /// Nodes whose Jacobian contributions were scattered.
    pub scattered: Counter,
}

impl<'a, T: Real> ComputeNodalKernelJacobiansLoop<'a, T> {
    pub fn new(inputs: NodalInputs<'a, T>, target: NodalJacobianTarget<'a, T>) -> Self {
        inputs.assert_solution_len();
        let size = match target {
            NodalJacobianTarget::Matrix(jacobian) => jacobian.nrows(),
            NodalJacobianTarget::Diagonal(diagonal) => diagonal.len(),
        };
        assert_eq!(
            size,
            inputs.dof_map.n_dofs(),
            "Jacobian size does not match number of degrees of freedom"
        );
        Self { inputs, target }
    }

    fn evaluate(
        &self,
        local: &mut DMatrix<T>,
        data: &NodeData<T>,
        object: &dyn NodalKernel<T>,
    ) -> eyre::Result<()> {
        let row = object.variable();
        for &jvar in std::iter::once(&row).chain(object.coupled_variables()) {
            let value = object
                .compute_jacobian(data, jvar)
                .wrap_err_with(|| nodal_error_context(object, data.node()))?;
            local[(row, jvar)] += value;
        }
        Ok(())
    }
}

impl<'a, T: Real> ThreadedNodeLoop for ComputeNodalKernelJacobiansLoop<'a, T> {
    type Context = NodalJacobiansContext<T>;

    fn create_context(&self) -> Self::Context {
        let n_vars = self.inputs.dof_map.n_variables();
        NodalJacobiansContext {
            workspace: NodalWorkspace::new(n_vars),
            local: DMatrix::zeros(n_vars, n_vars),
            touched: false,
            node_dofs: Vec::with_capacity(n_vars),
            dof_permutation: Vec::with_capacity(n_vars),
            scattered: Counter::default(),
        }
    }

    fn subdomain_changed(&self, ctx: &mut Self::Context, subdomains: &[SubdomainId]) -> eyre::Result<()> {
        ctx.workspace.activate(self.inputs.objects, subdomains);
        Ok(())
    }

    fn on_node(&self, ctx: &mut Self::Context, node: NodeHandle) -> eyre::Result<()> {
        let NodalJacobiansContext {
            workspace,
            local,
            touched,
            ..
        } = ctx;
        workspace.gather_node(&self.inputs, node);
        local.fill(T::zero());
        *touched = !workspace.active.is_empty();

        let data = NodeData::new(node, None, &workspace.u_node);
        for object in &workspace.active {
            self.evaluate(local, &data, object.as_ref())?;
        }
        Ok(())
    }

    fn on_boundary_node(&self, ctx: &mut Self::Context, node: NodeHandle, boundary: BoundaryId) -> eyre::Result<()> {
        let objects = self.inputs.boundary_objects.active_objects(boundary);
        let data = NodeData::new(node, Some(boundary), &ctx.workspace.u_node);
        for object in objects {
            self.evaluate(&mut ctx.local, &data, object.as_ref())?;
        }
        ctx.touched |= !objects.is_empty();
        Ok(())
    }

    fn post_node(&self, ctx: &mut Self::Context, node: NodeHandle) -> eyre::Result<()> {
        if !ctx.touched {
            return Ok(());
        }

        let dof_map = self.inputs.dof_map;
        ctx.node_dofs.clear();
        ctx.node_dofs
            .extend((0..dof_map.n_variables()).map(|var| dof_map.node_dof(node.id, var)));
        match self.target {
            NodalJacobianTarget::Matrix(jacobian) => {
                sort_dof_permutation(&ctx.node_dofs, &mut ctx.dof_permutation);
                jacobian.scatter_add(&ctx.local, &ctx.node_dofs, &ctx.dof_permutation);
            }
            NodalJacobianTarget::Diagonal(diagonal) => {
                diagonal.scatter_add(&ctx.local.diagonal(), &ctx.node_dofs);
            }
        }
        ctx.scattered.increment();
        Ok(())
    }

    fn join(&self, ctx: &mut Self::Context, other: Self::Context) {
        ctx.scattered.join(other.scattered);
    }
}
