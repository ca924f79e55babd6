use crate::compute::ElementWorkspace;
use crate::dof::{DofMap, ElementalDofMap};
use crate::engine::ThreadedElementLoop;
use crate::fe::FeReinit;
use crate::mesh::{ElementHandle, MeshTopology};
use crate::objects::{ElementAux, QpData};
use crate::reduction::{Counter, Reduce};
use crate::registry::ObjectWarehouse;
use crate::scatter::GlobalVector;
use crate::{BoundaryId, Real, SubdomainId};
use eyre::WrapErr;
use std::sync::Arc;

/// Read-only inputs of a [`ComputeElementalAuxLoop`].
#[derive(Clone, Copy)]
pub struct ElementalAuxInputs<'a, T: Real> {
    pub mesh: &'a dyn MeshTopology,
    pub dof_map: &'a dyn DofMap,
    pub fe: &'a dyn FeReinit<T>,
    pub objects: &'a ObjectWarehouse<dyn ElementAux<T>>,
    pub boundary_objects: &'a ObjectWarehouse<dyn ElementAux<T>>,
    pub solution: &'a [T],
}

/// Computes elemental auxiliary values.
///
/// Block objects store the average of their quadrature point values over the element. On
/// boundary sides, boundary objects store the average over the side, overriding a block
/// value of the same auxiliary variable.
pub struct ComputeElementalAuxLoop<'a, T: Real> {
    inputs: ElementalAuxInputs<'a, T>,
    aux_dof_map: &'a ElementalDofMap,
    aux: &'a GlobalVector<T>,
}

pub struct ElementalAuxContext<'a, T: Real> {
    workspace: ElementWorkspace<T>,
    active: &'a [Arc<dyn ElementAux<T>>],
    values: Vec<T>,
    aux_dofs: Vec<usize>,
    /// Elements on which at least one value was written.
    pub written: Counter,
}

impl<'a, T: Real> ComputeElementalAuxLoop<'a, T> {
    pub fn new(inputs: ElementalAuxInputs<'a, T>, aux_dof_map: &'a ElementalDofMap, aux: &'a GlobalVector<T>) -> Self {
        assert_eq!(
            inputs.solution.len(),
            inputs.dof_map.n_dofs(),
            "Solution length does not match number of degrees of freedom"
        );
        assert_eq!(
            aux.len(),
            aux_dof_map.n_dofs(),
            "Auxiliary vector length does not match number of elemental auxiliary degrees of freedom"
        );
        Self {
            inputs,
            aux_dof_map,
            aux,
        }
    }

    /// Evaluates `objects` on the current FE values and queues their averages for writing.
    fn evaluate_averages(
        &self,
        ctx: &mut ElementalAuxContext<'a, T>,
        element: ElementHandle,
        side: Option<(usize, BoundaryId)>,
        objects: &[Arc<dyn ElementAux<T>>],
    ) -> eyre::Result<()> {
        let ws = &ctx.workspace;
        let measure = ws
            .fe_values
            .jxw()
            .iter()
            .fold(T::zero(), |acc, &w| acc + w);
        if measure == T::zero() {
            return Ok(());
        }

        for object in objects {
            let mut integral = T::zero();
            for (qp, &jxw) in ws.fe_values.jxw().iter().enumerate() {
                let data = QpData::new(element, side, qp, &ws.fe_values, &ws.qp_values);
                let value = object.compute_qp_value(&data).wrap_err_with(|| {
                    format!(
                        "auxiliary object '{}' failed on element {} at quadrature point {}",
                        object.name(),
                        element.id,
                        qp
                    )
                })?;
                integral += jxw * value;
            }
            ctx.values.push(integral / measure);
            ctx.aux_dofs
                .push(self.aux_dof_map.element_dof(element.id, object.variable()));
        }
        Ok(())
    }
}

impl<'a, T: Real> ThreadedElementLoop for ComputeElementalAuxLoop<'a, T> {
    type Context = ElementalAuxContext<'a, T>;

    fn create_context(&self) -> Self::Context {
        ElementalAuxContext {
            workspace: ElementWorkspace::new(self.inputs.dof_map.n_variables()),
            active: &[],
            values: Vec::new(),
            aux_dofs: Vec::new(),
            written: Counter::default(),
        }
    }

    fn subdomain_changed(&self, ctx: &mut Self::Context, subdomain: SubdomainId) -> eyre::Result<()> {
        ctx.active = self.inputs.objects.active_objects(subdomain);
        for object in ctx.active {
            object.subdomain_setup(subdomain);
        }
        Ok(())
    }

    fn on_element(&self, ctx: &mut Self::Context, element: ElementHandle) -> eyre::Result<()> {
        let inputs = &self.inputs;
        ctx.workspace
            .gather(inputs.mesh, inputs.dof_map, inputs.solution, element);
        ctx.values.clear();
        ctx.aux_dofs.clear();
        if ctx.active.is_empty() {
            return Ok(());
        }

        ctx.workspace.reinit(inputs.fe, element, None)?;
        let active = ctx.active;
        self.evaluate_averages(ctx, element, None, active)
    }

    fn on_boundary(
        &self,
        ctx: &mut Self::Context,
        element: ElementHandle,
        side: usize,
        boundary: BoundaryId,
    ) -> eyre::Result<()> {
        let objects = self.inputs.boundary_objects.active_objects(boundary);
        if objects.is_empty() {
            return Ok(());
        }

        ctx.workspace
            .reinit(self.inputs.fe, element, Some(side))?;
        self.evaluate_averages(ctx, element, Some((side, boundary)), objects)
    }

    fn post_element(&self, ctx: &mut Self::Context, _element: ElementHandle) -> eyre::Result<()> {
        if !ctx.values.is_empty() {
            self.aux.scatter_set(&ctx.values, &ctx.aux_dofs);
            ctx.written.increment();
        }
        Ok(())
    }

    fn join(&self, ctx: &mut Self::Context, other: Self::Context) {
        ctx.written.join(other.written);
    }
}
