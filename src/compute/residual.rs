use crate::compute::{ElementWorkspace, KernelInputs};
use crate::dispatch::dispatch_residual;
use crate::engine::ThreadedElementLoop;
use crate::mesh::ElementHandle;
use crate::objects::ElementKernel;
use crate::reduction::{Counter, Reduce};
use crate::scatter::GlobalVector;
use crate::{BoundaryId, Real, SubdomainId};
use std::sync::Arc;

/// Assembles the residual of volume kernels and integrated boundary kernels.
pub struct ComputeResidualLoop<'a, T: Real> {
    inputs: KernelInputs<'a, T>,
    residual: &'a GlobalVector<T>,
}

pub struct ResidualContext<'a, T: Real> {
    workspace: ElementWorkspace<T>,
    active: &'a [Arc<dyn ElementKernel<T>>],
    /// Elements whose residual contributions were scattered.
    pub scattered: Counter,
}

impl<'a, T: Real> ComputeResidualLoop<'a, T> {
    pub fn new(inputs: KernelInputs<'a, T>, residual: &'a GlobalVector<T>) -> Self {
        inputs.assert_solution_len();
        assert_eq!(
            residual.len(),
            inputs.dof_map.n_dofs(),
            "Residual length does not match number of degrees of freedom"
        );
        Self { inputs, residual }
    }
}

impl<'a, T: Real> ThreadedElementLoop for ComputeResidualLoop<'a, T> {
    type Context = ResidualContext<'a, T>;

    fn create_context(&self) -> Self::Context {
        ResidualContext {
            workspace: ElementWorkspace::new(self.inputs.dof_map.n_variables()),
            active: &[],
            scattered: Counter::default(),
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
        dispatch_residual(element, None, ctx.active, &ws.fe_values, &ws.qp_values, &mut ws.buffers)?;
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
        dispatch_residual(
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
            self.residual
                .scatter_add(ws.buffers.residual(), &ws.element_dofs);
            ctx.scattered.increment();
        }
        Ok(())
    }

    fn join(&self, ctx: &mut Self::Context, other: Self::Context) {
        ctx.scattered.join(other.scattered);
    }
}
