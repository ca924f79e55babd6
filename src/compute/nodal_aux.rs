use crate::compute::{NodalInputs, NodalWorkspace};
use crate::dof::DofMap;
use crate::engine::ThreadedNodeLoop;
use crate::mesh::NodeHandle;
use crate::objects::{NodalKernel, NodeData};
use crate::reduction::{Counter, Reduce};
use crate::scatter::GlobalVector;
use crate::{BoundaryId, Real, SubdomainId};

/// Computes nodal auxiliary values.
///
/// On every node, the block objects active on any subdomain adjacent to the node are
/// evaluated first (each object once), followed by the boundary objects of every boundary
/// id of the node. Values are written, not added, so a boundary object overrides a block
/// object computing the same auxiliary variable.
pub struct ComputeNodalAuxLoop<'a, T: Real> {
    inputs: NodalInputs<'a, T>,
    aux_dof_map: &'a dyn DofMap,
    aux: &'a GlobalVector<T>,
}

pub struct NodalAuxContext<T: Real> {
    workspace: NodalWorkspace<T>,
    values: Vec<T>,
    aux_dofs: Vec<usize>,
    /// Nodes on which at least one value was written.
    pub written: Counter,
}

impl<'a, T: Real> ComputeNodalAuxLoop<'a, T> {
    pub fn new(inputs: NodalInputs<'a, T>, aux_dof_map: &'a dyn DofMap, aux: &'a GlobalVector<T>) -> Self {
        inputs.assert_solution_len();
        assert_eq!(
            aux.len(),
            aux_dof_map.n_dofs(),
            "Auxiliary vector length does not match number of auxiliary degrees of freedom"
        );
        Self {
            inputs,
            aux_dof_map,
            aux,
        }
    }

    fn evaluate(
        &self,
        values: &mut Vec<T>,
        aux_dofs: &mut Vec<usize>,
        data: &NodeData<T>,
        object: &dyn NodalKernel<T>,
    ) -> eyre::Result<()> {
        values.push(object.compute_value(data)?);
        aux_dofs.push(
            self.aux_dof_map
                .node_dof(data.node().id, object.variable()),
        );
        Ok(())
    }
}

impl<'a, T: Real> ThreadedNodeLoop for ComputeNodalAuxLoop<'a, T> {
    type Context = NodalAuxContext<T>;

    fn create_context(&self) -> Self::Context {
        NodalAuxContext {
            workspace: NodalWorkspace::new(self.inputs.dof_map.n_variables()),
            values: Vec::new(),
            aux_dofs: Vec::new(),
            written: Counter::default(),
        }
    }

    fn subdomain_changed(&self, ctx: &mut Self::Context, subdomains: &[SubdomainId]) -> eyre::Result<()> {
        ctx.workspace.activate(self.inputs.objects, subdomains);
        Ok(())
    }

    fn on_node(&self, ctx: &mut Self::Context, node: NodeHandle) -> eyre::Result<()> {
        let NodalAuxContext {
            workspace,
            values,
            aux_dofs,
            ..
        } = ctx;
        workspace.gather_node(&self.inputs, node);
        values.clear();
        aux_dofs.clear();

        let data = NodeData::new(node, None, &workspace.u_node);
        for object in &workspace.active {
            self.evaluate(values, aux_dofs, &data, object.as_ref())?;
        }
        Ok(())
    }

    fn on_boundary_node(&self, ctx: &mut Self::Context, node: NodeHandle, boundary: BoundaryId) -> eyre::Result<()> {
        let data = NodeData::new(node, Some(boundary), &ctx.workspace.u_node);
        for object in self.inputs.boundary_objects.active_objects(boundary) {
            self.evaluate(&mut ctx.values, &mut ctx.aux_dofs, &data, object.as_ref())?;
        }
        Ok(())
    }

    fn post_node(&self, ctx: &mut Self::Context, _node: NodeHandle) -> eyre::Result<()> {
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
