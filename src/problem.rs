//! The problem facade: owns the object warehouses and the loop driver, and runs the loops.
//!
//! Everything that can be misconfigured is checked by [`ProblemBuilder::build`], so the
//! loops themselves only ever fail with numerical errors raised by the objects.
use crate::compute::{
    ComputeElementalAuxLoop, ComputeJacobianForScalingLoop, ComputeJacobianLoop, ComputeNodalAuxLoop,
    ComputeNodalKernelJacobiansLoop, ComputeNodalKernelsLoop, ComputeResidualLoop, ElementalAuxInputs, KernelInputs,
    MaxQpsLoop, MaxQpsReport, NodalInputs, NodalJacobianTarget,
};
use crate::config::LoopConfig;
use crate::dof::{DofMap, ElementalDofMap};
use crate::engine::LoopDriver;
use crate::error::LoopError;
use crate::fe::FeReinit;
use crate::mesh::MeshTopology;
use crate::objects::{ElementAux, ElementKernel, MeshObject, NodalKernel};
use crate::registry::{ObjectWarehouse, WarehouseBuilder, WarehouseKind};
use crate::scatter::{assemble_pattern, GlobalMatrix, GlobalVector};
use crate::Real;
use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::sync::Arc;

pub struct ProblemBuilder<'a, T: Real> {
    mesh: &'a dyn MeshTopology,
    fe: &'a dyn FeReinit<T>,
    dof_map: &'a dyn DofMap,
    aux_dof_map: Option<&'a dyn DofMap>,
    elemental_aux_dof_map: Option<&'a ElementalDofMap>,
    config: LoopConfig,
    kernels: WarehouseBuilder<dyn ElementKernel<T>>,
    boundary_kernels: WarehouseBuilder<dyn ElementKernel<T>>,
    nodal_kernels: WarehouseBuilder<dyn NodalKernel<T>>,
    boundary_nodal_kernels: WarehouseBuilder<dyn NodalKernel<T>>,
    nodal_aux: WarehouseBuilder<dyn NodalKernel<T>>,
    boundary_nodal_aux: WarehouseBuilder<dyn NodalKernel<T>>,
    elemental_aux: WarehouseBuilder<dyn ElementAux<T>>,
    boundary_elemental_aux: WarehouseBuilder<dyn ElementAux<T>>,
}

impl<'a, T: Real> ProblemBuilder<'a, T> {
    pub fn new(mesh: &'a dyn MeshTopology, fe: &'a dyn FeReinit<T>, dof_map: &'a dyn DofMap) -> Self {
        Self {
            mesh,
            fe,
            dof_map,
            aux_dof_map: None,
            elemental_aux_dof_map: None,
            config: LoopConfig::default(),
            kernels: WarehouseBuilder::new(WarehouseKind::Block),
            boundary_kernels: WarehouseBuilder::new(WarehouseKind::Boundary),
            nodal_kernels: WarehouseBuilder::new(WarehouseKind::Block),
            boundary_nodal_kernels: WarehouseBuilder::new(WarehouseKind::Boundary),
            nodal_aux: WarehouseBuilder::new(WarehouseKind::Block),
            boundary_nodal_aux: WarehouseBuilder::new(WarehouseKind::Boundary),
            elemental_aux: WarehouseBuilder::new(WarehouseKind::Block),
            boundary_elemental_aux: WarehouseBuilder::new(WarehouseKind::Boundary),
        }
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the degree-of-freedom map of the auxiliary variables.
    pub fn with_aux_dof_map(mut self, aux_dof_map: &'a dyn DofMap) -> Self {
        self.aux_dof_map = Some(aux_dof_map);
        self
    }

    /// Sets the degree-of-freedom map of the elemental auxiliary variables.
    pub fn with_elemental_aux_dof_map(mut self, dof_map: &'a ElementalDofMap) -> Self {
        self.elemental_aux_dof_map = Some(dof_map);
        self
    }

    /// Adds a kernel integrated over the elements of its subdomains.
    pub fn add_kernel(&mut self, kernel: Arc<dyn ElementKernel<T>>) -> &mut Self {
        self.kernels.add(kernel);
        self
    }

    /// Adds a kernel integrated over the boundary sides of its boundaries.
    pub fn add_boundary_kernel(&mut self, kernel: Arc<dyn ElementKernel<T>>) -> &mut Self {
        self.boundary_kernels.add(kernel);
        self
    }

    /// Adds a kernel whose nodal values are added to the residual at every node of its
    /// subdomains.
    pub fn add_nodal_kernel(&mut self, kernel: Arc<dyn NodalKernel<T>>) -> &mut Self {
        self.nodal_kernels.add(kernel);
        self
    }

    /// Adds a nodal kernel evaluated on the nodes of its boundaries.
    pub fn add_boundary_nodal_kernel(&mut self, kernel: Arc<dyn NodalKernel<T>>) -> &mut Self {
        self.boundary_nodal_kernels.add(kernel);
        self
    }

    pub fn add_nodal_aux(&mut self, object: Arc<dyn NodalKernel<T>>) -> &mut Self {
        self.nodal_aux.add(object);
        self
    }

    pub fn add_boundary_nodal_aux(&mut self, object: Arc<dyn NodalKernel<T>>) -> &mut Self {
        self.boundary_nodal_aux.add(object);
        self
    }

    pub fn add_elemental_aux(&mut self, object: Arc<dyn ElementAux<T>>) -> &mut Self {
        self.elemental_aux.add(object);
        self
    }

    pub fn add_boundary_elemental_aux(&mut self, object: Arc<dyn ElementAux<T>>) -> &mut Self {
        self.boundary_elemental_aux.add(object);
        self
    }

    /// Validates the setup and constructs the warehouses, the Jacobian sparsity pattern and
    /// the loop driver.
    pub fn build(self) -> Result<Problem<'a, T>, LoopError> {
        let n_vars = self.dof_map.n_variables();
        let expected_dofs = self.mesh.num_nodes() * n_vars;
        if self.dof_map.n_dofs() != expected_dofs {
            return Err(LoopError::setup(format!(
                "degree-of-freedom map has {} entries, expected {} for {} nodes and {} variables",
                self.dof_map.n_dofs(),
                expected_dofs,
                self.mesh.num_nodes(),
                n_vars
            )));
        }

        for kernel in self
            .kernels
            .objects()
            .iter()
            .chain(self.boundary_kernels.objects())
        {
            check_variables(kernel.as_ref(), n_vars, n_vars)?;
        }
        for kernel in self
            .nodal_kernels
            .objects()
            .iter()
            .chain(self.boundary_nodal_kernels.objects())
        {
            check_variables(kernel.as_ref(), n_vars, n_vars)?;
        }

        let n_aux = self.aux_dof_map.map(|map| map.n_variables()).unwrap_or(0);
        let has_aux_objects = !self.nodal_aux.is_empty() || !self.boundary_nodal_aux.is_empty();
        if has_aux_objects && self.aux_dof_map.is_none() {
            return Err(LoopError::setup(
                "nodal auxiliary objects require an auxiliary degree-of-freedom map",
            ));
        }
        for object in self
            .nodal_aux
            .objects()
            .iter()
            .chain(self.boundary_nodal_aux.objects())
        {
            check_variables(object.as_ref(), n_aux, n_vars)?;
        }

        let n_elemental_aux = match self.elemental_aux_dof_map {
            Some(map) => {
                let expected = self.mesh.num_elements() * map.n_variables();
                if map.n_dofs() != expected {
                    return Err(LoopError::setup(format!(
                        "elemental auxiliary degree-of-freedom map has {} entries, expected {} for {} elements",
                        map.n_dofs(),
                        expected,
                        self.mesh.num_elements()
                    )));
                }
                map.n_variables()
            }
            None => 0,
        };
        let has_elemental_aux = !self.elemental_aux.is_empty() || !self.boundary_elemental_aux.is_empty();
        if has_elemental_aux && self.elemental_aux_dof_map.is_none() {
            return Err(LoopError::setup(
                "elemental auxiliary objects require an elemental auxiliary degree-of-freedom map",
            ));
        }
        for object in self
            .elemental_aux
            .objects()
            .iter()
            .chain(self.boundary_elemental_aux.objects())
        {
            check_variables(object.as_ref(), n_elemental_aux, n_vars)?;
        }

        let subdomain_ids = self.mesh.subdomain_ids();
        let boundary_ids = self.mesh.boundary_ids();
        let kernels = self.kernels.build(&subdomain_ids)?;
        let boundary_kernels = self.boundary_kernels.build(&boundary_ids)?;
        let nodal_kernels = self.nodal_kernels.build(&subdomain_ids)?;
        let boundary_nodal_kernels = self.boundary_nodal_kernels.build(&boundary_ids)?;
        let nodal_aux = self.nodal_aux.build(&subdomain_ids)?;
        let boundary_nodal_aux = self.boundary_nodal_aux.build(&boundary_ids)?;
        let elemental_aux = self.elemental_aux.build(&subdomain_ids)?;
        let boundary_elemental_aux = self.boundary_elemental_aux.build(&boundary_ids)?;

        let pattern = assemble_pattern(self.mesh, self.dof_map);
        let driver = LoopDriver::new(self.config)?;
        debug!(
            "Built problem with {} kernels, {} nodal kernels, {} nodal aux objects and {} elemental aux objects",
            kernels.objects().len() + boundary_kernels.objects().len(),
            nodal_kernels.objects().len() + boundary_nodal_kernels.objects().len(),
            nodal_aux.objects().len() + boundary_nodal_aux.objects().len(),
            elemental_aux.objects().len() + boundary_elemental_aux.objects().len()
        );

        Ok(Problem {
            mesh: self.mesh,
            fe: self.fe,
            dof_map: self.dof_map,
            aux_dof_map: self.aux_dof_map,
            elemental_aux_dof_map: self.elemental_aux_dof_map,
            kernels,
            boundary_kernels,
            nodal_kernels,
            boundary_nodal_kernels,
            nodal_aux,
            boundary_nodal_aux,
            elemental_aux,
            boundary_elemental_aux,
            pattern,
            driver,
        })
    }
}

fn check_variables<O: ?Sized + MeshObject>(object: &O, n_vars: usize, n_coupled: usize) -> Result<(), LoopError> {
    if object.variable() >= n_vars {
        return Err(LoopError::setup(format!(
            "object '{}' acts on variable {}, but only {} variables exist",
            object.name(),
            object.variable(),
            n_vars
        )));
    }
    if let Some(&coupled) = object
        .coupled_variables()
        .iter()
        .find(|&&var| var >= n_coupled)
    {
        return Err(LoopError::setup(format!(
            "object '{}' couples to variable {}, but only {} variables exist",
            object.name(),
            coupled,
            n_coupled
        )));
    }
    Ok(())
}

/// A configured problem, ready to evaluate residuals, Jacobians and auxiliary fields.
pub struct Problem<'a, T: Real> {
    mesh: &'a dyn MeshTopology,
    fe: &'a dyn FeReinit<T>,
    dof_map: &'a dyn DofMap,
    aux_dof_map: Option<&'a dyn DofMap>,
    elemental_aux_dof_map: Option<&'a ElementalDofMap>,
    kernels: ObjectWarehouse<dyn ElementKernel<T>>,
    boundary_kernels: ObjectWarehouse<dyn ElementKernel<T>>,
    nodal_kernels: ObjectWarehouse<dyn NodalKernel<T>>,
    boundary_nodal_kernels: ObjectWarehouse<dyn NodalKernel<T>>,
    nodal_aux: ObjectWarehouse<dyn NodalKernel<T>>,
    boundary_nodal_aux: ObjectWarehouse<dyn NodalKernel<T>>,
    elemental_aux: ObjectWarehouse<dyn ElementAux<T>>,
    boundary_elemental_aux: ObjectWarehouse<dyn ElementAux<T>>,
    pattern: SparsityPattern,
    driver: LoopDriver,
}

impl<'a, T: Real> Problem<'a, T> {
    pub fn mesh(&self) -> &'a dyn MeshTopology {
        self.mesh
    }

    pub fn dof_map(&self) -> &'a dyn DofMap {
        self.dof_map
    }

    pub fn driver(&self) -> &LoopDriver {
        &self.driver
    }

    pub fn config(&self) -> &LoopConfig {
        self.driver.config()
    }

    pub fn kernels(&self) -> &ObjectWarehouse<dyn ElementKernel<T>> {
        &self.kernels
    }

    pub fn boundary_kernels(&self) -> &ObjectWarehouse<dyn ElementKernel<T>> {
        &self.boundary_kernels
    }

    /// The sparsity pattern of the Jacobian, coupling all degrees of freedom of each element.
    pub fn jacobian_pattern(&self) -> &SparsityPattern {
        &self.pattern
    }

    fn kernel_inputs<'b>(&'b self, solution: &'b DVector<T>) -> Result<KernelInputs<'b, T>, LoopError> {
        self.check_solution(solution)?;
        Ok(KernelInputs {
            mesh: self.mesh,
            dof_map: self.dof_map,
            fe: self.fe,
            kernels: &self.kernels,
            boundary_kernels: &self.boundary_kernels,
            solution: solution.as_slice(),
        })
    }

    fn nodal_kernel_inputs<'b>(&'b self, solution: &'b DVector<T>) -> NodalInputs<'b, T> {
        NodalInputs {
            dof_map: self.dof_map,
            objects: &self.nodal_kernels,
            boundary_objects: &self.boundary_nodal_kernels,
            solution: solution.as_slice(),
        }
    }

    fn has_nodal_kernels(&self) -> bool {
        self.nodal_kernels.has_objects() || self.boundary_nodal_kernels.has_objects()
    }

    fn check_solution(&self, solution: &DVector<T>) -> Result<(), LoopError> {
        if solution.len() != self.dof_map.n_dofs() {
            return Err(LoopError::setup(format!(
                "solution has {} entries, expected {}",
                solution.len(),
                self.dof_map.n_dofs()
            )));
        }
        Ok(())
    }

    /// Adds the residual at `solution` to `residual`.
    ///
    /// The element loop runs first, followed by the node loop of the nodal kernels. If some
    /// entities fail, the contributions of all other entities are still added before the
    /// aggregated failure is returned, the element failure taking precedence.
    pub fn compute_residual_into(&self, solution: &DVector<T>, residual: &GlobalVector<T>) -> Result<(), LoopError> {
        let inputs = self.kernel_inputs(solution)?;
        let body = ComputeResidualLoop::new(inputs, residual);
        let range = self.mesh.active_element_range();
        let elements = self
            .driver
            .run_elements(self.mesh, &range, &body)
            .into_result()
            .map(|_| ());
        let nodes = if self.has_nodal_kernels() {
            self.compute_nodal_kernel_residual_into(solution, residual)
        } else {
            Ok(())
        };
        elements.and(nodes)
    }

    /// Adds only the residual contributions of the nodal kernels to `residual`.
    pub fn compute_nodal_kernel_residual_into(
        &self,
        solution: &DVector<T>,
        residual: &GlobalVector<T>,
    ) -> Result<(), LoopError> {
        self.check_solution(solution)?;
        let body = ComputeNodalKernelsLoop::new(self.nodal_kernel_inputs(solution), residual);
        let range = self.mesh.local_node_range();
        self.driver
            .run_nodes(self.mesh, &range, &body)
            .into_result()?;
        Ok(())
    }

    fn compute_nodal_kernel_jacobian_into(
        &self,
        solution: &DVector<T>,
        target: NodalJacobianTarget<T>,
    ) -> Result<(), LoopError> {
        if !self.has_nodal_kernels() {
            return Ok(());
        }
        let body = ComputeNodalKernelJacobiansLoop::new(self.nodal_kernel_inputs(solution), target);
        let range = self.mesh.local_node_range();
        self.driver
            .run_nodes(self.mesh, &range, &body)
            .into_result()?;
        Ok(())
    }

    pub fn compute_residual(&self, solution: &DVector<T>) -> Result<DVector<T>, LoopError> {
        let residual = GlobalVector::zeros(self.dof_map.n_dofs()).with_owned_range(self.dof_map.owned_dofs());
        self.compute_residual_into(solution, &residual)?;
        Ok(residual.into_inner())
    }

    /// Adds the Jacobian at `solution` to `jacobian`, which must contain the
    /// [Jacobian pattern](Self::jacobian_pattern).
    pub fn compute_jacobian_into(&self, solution: &DVector<T>, jacobian: &GlobalMatrix<T>) -> Result<(), LoopError> {
        let inputs = self.kernel_inputs(solution)?;
        let body = ComputeJacobianLoop::new(inputs, jacobian);
        let range = self.mesh.active_element_range();
        let elements = self
            .driver
            .run_elements(self.mesh, &range, &body)
            .into_result()
            .map(|_| ());
        let nodes = self.compute_nodal_kernel_jacobian_into(solution, NodalJacobianTarget::Matrix(jacobian));
        elements.and(nodes)
    }

    pub fn compute_jacobian(&self, solution: &DVector<T>) -> Result<CsrMatrix<T>, LoopError> {
        let jacobian = GlobalMatrix::from_pattern(self.pattern.clone()).with_owned_rows(self.dof_map.owned_dofs());
        self.compute_jacobian_into(solution, &jacobian)?;
        Ok(jacobian.into_inner())
    }

    /// Computes only the diagonal of the Jacobian.
    pub fn compute_jacobian_diagonal(&self, solution: &DVector<T>) -> Result<DVector<T>, LoopError> {
        let inputs = self.kernel_inputs(solution)?;
        let diagonal = GlobalVector::zeros(self.dof_map.n_dofs()).with_owned_range(self.dof_map.owned_dofs());
        let body = ComputeJacobianForScalingLoop::new(inputs, &diagonal);
        let range = self.mesh.active_element_range();
        self.driver
            .run_elements(self.mesh, &range, &body)
            .into_result()?;
        self.compute_nodal_kernel_jacobian_into(solution, NodalJacobianTarget::Diagonal(&diagonal))?;
        Ok(diagonal.into_inner())
    }

    /// Computes one scaling factor per variable: the reciprocal of the largest absolute
    /// diagonal Jacobian entry of the variable, or one if all those entries are zero.
    pub fn compute_scaling_factors(&self, solution: &DVector<T>) -> Result<Vec<T>, LoopError> {
        let diagonal = self.compute_jacobian_diagonal(solution)?;
        let factors = (0..self.dof_map.n_variables())
            .map(|var| {
                let max = (0..self.mesh.num_nodes())
                    .map(|node| diagonal[self.dof_map.node_dof(node, var)].abs())
                    .fold(T::zero(), |a, b| a.max(b));
                if max == T::zero() {
                    T::one()
                } else {
                    T::one() / max
                }
            })
            .collect();
        Ok(factors)
    }

    /// Writes the nodal auxiliary values computed from `solution` into `aux`.
    pub fn compute_nodal_aux_into(&self, solution: &DVector<T>, aux: &GlobalVector<T>) -> Result<(), LoopError> {
        self.check_solution(solution)?;
        let aux_dof_map = self
            .aux_dof_map
            .ok_or_else(|| LoopError::setup("no auxiliary degree-of-freedom map was provided"))?;
        let inputs = NodalInputs {
            dof_map: self.dof_map,
            objects: &self.nodal_aux,
            boundary_objects: &self.boundary_nodal_aux,
            solution: solution.as_slice(),
        };
        let body = ComputeNodalAuxLoop::new(inputs, aux_dof_map, aux);
        let range = self.mesh.local_node_range();
        self.driver
            .run_nodes(self.mesh, &range, &body)
            .into_result()?;
        Ok(())
    }

    /// Computes the nodal auxiliary values. Entries no object writes to are zero.
    pub fn compute_nodal_aux(&self, solution: &DVector<T>) -> Result<DVector<T>, LoopError> {
        let aux_dof_map = self
            .aux_dof_map
            .ok_or_else(|| LoopError::setup("no auxiliary degree-of-freedom map was provided"))?;
        let aux = GlobalVector::zeros(aux_dof_map.n_dofs()).with_owned_range(aux_dof_map.owned_dofs());
        self.compute_nodal_aux_into(solution, &aux)?;
        Ok(aux.into_inner())
    }

    /// Writes the elemental auxiliary values computed from `solution` into `aux`, indexed by
    /// the elemental auxiliary degree-of-freedom map.
    pub fn compute_elemental_aux_into(&self, solution: &DVector<T>, aux: &GlobalVector<T>) -> Result<(), LoopError> {
        self.check_solution(solution)?;
        let aux_dof_map = self.elemental_aux_dof_map.ok_or_else(|| {
            LoopError::setup("no elemental auxiliary degree-of-freedom map was provided")
        })?;
        let inputs = ElementalAuxInputs {
            mesh: self.mesh,
            dof_map: self.dof_map,
            fe: self.fe,
            objects: &self.elemental_aux,
            boundary_objects: &self.boundary_elemental_aux,
            solution: solution.as_slice(),
        };
        let body = ComputeElementalAuxLoop::new(inputs, aux_dof_map, aux);
        let range = self.mesh.active_element_range();
        self.driver
            .run_elements(self.mesh, &range, &body)
            .into_result()?;
        Ok(())
    }

    /// Computes the elemental auxiliary values. Entries no object writes to are zero.
    pub fn compute_elemental_aux(&self, solution: &DVector<T>) -> Result<DVector<T>, LoopError> {
        let aux_dof_map = self.elemental_aux_dof_map.ok_or_else(|| {
            LoopError::setup("no elemental auxiliary degree-of-freedom map was provided")
        })?;
        let aux = GlobalVector::zeros(aux_dof_map.n_dofs());
        self.compute_elemental_aux_into(solution, &aux)?;
        Ok(aux.into_inner())
    }

    /// Determines the largest quadrature rule and element used on the mesh.
    pub fn max_qps(&self) -> Result<MaxQpsReport, LoopError> {
        let body = MaxQpsLoop::new(self.fe);
        let range = self.mesh.active_element_range();
        let context = self
            .driver
            .run_elements(self.mesh, &range, &body)
            .into_result()?;
        Ok(context.into())
    }
}
