use crate::compute::{ElementWorkspace, KernelInputs};
use crate::dispatch::dispatch_jacobian_diagonal;
use crate::engine::ThreadedElementLoop;
use crate::mesh::ElementHandle;
use crate::objects::ElementKernel;
use crate::scatter::GlobalVector;
use crate::{BoundaryId, Real, SubdomainId};
use std::sync::Arc;

/// Assembles only the diagonal of the Jacobian, for computing variable scaling factors.
///
/// Off-diagonal coupling blocks never contribute to the diagonal and are not evaluated.
pub struct ComputeJacobianForScalingLoop<'a, T: Real> {
    inputs: KernelInputs<'a, T>,
    diagonal: &'a GlobalVector<T>,
}

pub struct JacobianScalingContext<'a, T: Real> {
    workspace: ElementWorkspace<T>,
    active: &'a [Arc<dyn ElementKernel<T>>],
}

impl<'a, T: Real> ComputeJacobianForScalingLoop<'a, T> {
    pub fn new(inputs: KernelInputs<'a, T>, diagonal: &'a GlobalVector<T>) -> Self {
        inputs.assert_solution_len();
        assert_eq!(
            diagonal.len(),
            inputs.dof_map.n_dofs(),
            "Diagonal length does not match number of degrees of freedom"
        );
        Self { inputs, diagonal }
    }
}

impl<'a, T: Real> ThreadedElementLoop for ComputeJacobianForScalingLoop<'a, T> {
    type Context = JacobianScalingContext<'a, T>;

    fn create_context(&self) -> Self::Context {
        JacobianScalingContext {
            workspace: ElementWorkspace::new(self.inputs.dof_map.n_variables()),
            active: &[],
        }
    }

    fn subdomain_changed(&self, ctx: &mut Self::Context, subdomain: SubdomainId) -> eyre::Result<()> {
        ctx.active = self.inputs.kernels.active_objects(subdomain);
        for object in ctx.active {
            object.subdomain_setup(subdomain);
        }
        Ok(())
    }

    fn on_element(&self, ctx: &mut Self::Context, element: ElementHandle) -> eyre::Result<()> {
        let ws = &mut ctx.workspace;
        ws.gather_element(&self.inputs, element);
        ws.buffers.reset_residual(ws.element_dofs.len());
        if ctx.active.is_empty() {
            return Ok(());
        }

        ws.reinit_element(&self.inputs, element)?;
        dispatch_jacobian_diagonal(element, None, ctx.active, &ws.fe_values, &ws.qp_values, &mut ws.buffers)?;
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
        dispatch_jacobian_diagonal(
            element,
            Some((side, boundary)),
            objects,
            &ws.fe_values,
            &ws.qp_values,
            &mut ws.buffers,
        )?;
        Ok(())
    }

    fn post_element(&self, ctx: &mut Self::Context, _element: ElementHandle) -> eyre::Result<()> {
        let ws = &ctx.workspace;
        if ws.buffers.is_touched() {
            self.diagonal
                .scatter_add(ws.buffers.residual(), &ws.element_dofs);
        }
        Ok(())
    }
}
