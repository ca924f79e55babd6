use crate::compute::{ElementWorkspace, KernelInputs};
use crate::dispatch::dispatch_jacobian;
use crate::engine::ThreadedElementLoop;
use crate::mesh::ElementHandle;
use crate::objects::ElementKernel;
use crate::reduction::{Counter, Reduce};
use crate::scatter::{sort_dof_permutation, GlobalMatrix};
use crate::{BoundaryId, Real, SubdomainId};
use std::sync::Arc;

/// Assembles the Jacobian, including the blocks that couple different variables.
pub struct ComputeJacobianLoop<'a, T: Real> {
    inputs: KernelInputs<'a, T>,
    jacobian: &'a GlobalMatrix<T>,
}

pub struct JacobianContext<'a, T: Real> {
    workspace: ElementWorkspace<T>,
    active: &'a [Arc<dyn ElementKernel<T>>],
    // Whether any active volume kernel couples to other variables
    off_diagonal: bool,
    pub scattered: Counter,
}

impl<'a, T: Real> JacobianContext<'a, T> {
    pub fn has_off_diagonal_coupling(&self) -> bool {
        self.off_diagonal
    }
}

fn has_coupling<T: Real>(objects: &[Arc<dyn ElementKernel<T>>]) -> bool {
    objects
        .iter()
        .any(|object| !object.coupled_variables().is_empty())
}

impl<'a, T: Real> ComputeJacobianLoop<'a, T> {
    pub fn new(inputs: KernelInputs<'a, T>, jacobian: &'a GlobalMatrix<T>) -> Self {
        inputs.assert_solution_len();
        assert_eq!(
            jacobian.nrows(),
            inputs.dof_map.n_dofs(),
            "Jacobian dimensions do not match number of degrees of freedom"
        );
        Self { inputs, jacobian }
    }
}

impl<'a, T: Real> ThreadedElementLoop for ComputeJacobianLoop<'a, T> {
    type Context = JacobianContext<'a, T>;

    fn create_context(&self) -> Self::Context {
        JacobianContext {
            workspace: ElementWorkspace::new(self.inputs.dof_map.n_variables()),
            active: &[],
            off_diagonal: false,
            scattered: Counter::default(),
        }
    }

    fn subdomain_changed(&self, ctx: &mut Self::Context, subdomain: SubdomainId) -> eyre::Result<()> {
        ctx.active = self.inputs.kernels.active_objects(subdomain);
        ctx.off_diagonal = has_coupling(ctx.active);
        for object in ctx.active {
            object.subdomain_setup(subdomain);
        }
        Ok(())
    }

    fn on_element(&self, ctx: &mut Self::Context, element: ElementHandle) -> eyre::Result<()> {
        let ws = &mut ctx.workspace;
        ws.gather_element(&self.inputs, element);
        ws.buffers.reset_jacobian(ws.element_dofs.len());
        if ctx.active.is_empty() {
            return Ok(());
        }

        ws.reinit_element(&self.inputs, element)?;
        dispatch_jacobian(
            element,
            None,
            ctx.active,
            &ws.fe_values,
            &ws.qp_values,
            &mut ws.buffers,
            ctx.off_diagonal,
        )?;
        Ok(())
    }

    fn on_boundary(
        &self,
        ctx: &mut Self::Context,
        element: ElementHandle,
        side: usize,
        boundary: BoundaryId,
    ) -> eyre::Result<()> {
        let objects = self.inputs.boundary_kernels.active_objects(boundary);
        if objects.is_empty() {
            return Ok(());
        }

        let ws = &mut ctx.workspace;
        ws.reinit_side(&self.inputs, element, side)?;
        dispatch_jacobian(
            element,
            Some((side, boundary)),
            objects,
            &ws.fe_values,
            &ws.qp_values,
            &mut ws.buffers,
            has_coupling(objects),
        )?;
        Ok(())
    }

    fn post_element(&self, ctx: &mut Self::Context, _element: ElementHandle) -> eyre::Result<()> {
        let ws = &mut ctx.workspace;
        if ws.buffers.is_touched() {
            sort_dof_permutation(&ws.element_dofs, &mut ws.dof_permutation);
            self.jacobian
                .scatter_add(ws.buffers.jacobian(), &ws.element_dofs, &ws.dof_permutation);
            ctx.scattered.increment();
        }
        Ok(())
    }

    fn join(&self, ctx: &mut Self::Context, other: Self::Context) {
        ctx.scattered.join(other.scattered);
    }
}
