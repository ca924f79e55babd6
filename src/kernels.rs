//! A small set of ready-made callback objects.
//!
//! Each object contributes to a single variable and is active everywhere unless restricted
//! with `restricted_to`.
use crate::objects::{ElementAux, ElementKernel, MeshObject, NodalKernel, NodeData, QpData, Restriction};
use crate::Real;

fn dot<T: Real>(a: &[T], b: &[T]) -> T {
    a.iter()
        .zip(b)
        .fold(T::zero(), |acc, (&x, &y)| acc + x * y)
}

macro_rules! impl_mesh_object {
    ($type:ident) => {
        impl<T: Real> MeshObject for $type<T> {
            fn name(&self) -> &str {
                &self.name
            }

            fn variable(&self) -> usize {
                self.variable
            }

            fn restriction(&self) -> Restriction {
                self.restriction.clone()
            }
        }

        impl<T: Real> $type<T> {
            pub fn named(mut self, name: impl Into<String>) -> Self {
                self.name = name.into();
                self
            }

            pub fn restricted_to(mut self, restriction: Restriction) -> Self {
                self.restriction = restriction;
                self
            }
        }
    };
}

/// The weak Laplacian `k ∇u · ∇φ_i`.
#[derive(Debug, Clone)]
pub struct Diffusion<T> {
    name: String,
    variable: usize,
    coefficient: T,
    restriction: Restriction,
}

impl<T: Real> Diffusion<T> {
    pub fn new(variable: usize, coefficient: T) -> Self {
        Self {
            name: "diffusion".to_string(),
            variable,
            coefficient,
            restriction: Restriction::Everywhere,
        }
    }
}

impl_mesh_object!(Diffusion);

impl<T: Real> ElementKernel<T> for Diffusion<T> {
    fn compute_qp_residual(&self, data: &QpData<T>, i: usize) -> eyre::Result<T> {
        Ok(self.coefficient * dot(data.grad_u(self.variable), data.grad_phi(i)))
    }

    fn compute_qp_jacobian(&self, data: &QpData<T>, i: usize, j: usize) -> eyre::Result<T> {
        Ok(self.coefficient * dot(data.grad_phi(j), data.grad_phi(i)))
    }
}

/// A constant source term `-f φ_i`.
#[derive(Debug, Clone)]
pub struct BodyForce<T> {
    name: String,
    variable: usize,
    value: T,
    restriction: Restriction,
}

impl<T: Real> BodyForce<T> {
    pub fn new(variable: usize, value: T) -> Self {
        Self {
            name: "body_force".to_string(),
            variable,
            value,
            restriction: Restriction::Everywhere,
        }
    }
}

impl_mesh_object!(BodyForce);

impl<T: Real> ElementKernel<T> for BodyForce<T> {
    fn compute_qp_residual(&self, data: &QpData<T>, i: usize) -> eyre::Result<T> {
        Ok(-self.value * data.phi(i))
    }
}

/// Linear reaction `λ u φ_i`.
#[derive(Debug, Clone)]
pub struct Reaction<T> {
    name: String,
    variable: usize,
    rate: T,
    restriction: Restriction,
}

impl<T: Real> Reaction<T> {
    pub fn new(variable: usize, rate: T) -> Self {
        Self {
            name: "reaction".to_string(),
            variable,
            rate,
            restriction: Restriction::Everywhere,
        }
    }
}

impl_mesh_object!(Reaction);

impl<T: Real> ElementKernel<T> for Reaction<T> {
    fn compute_qp_residual(&self, data: &QpData<T>, i: usize) -> eyre::Result<T> {
        Ok(self.rate * data.u(self.variable) * data.phi(i))
    }

    fn compute_qp_jacobian(&self, data: &QpData<T>, i: usize, j: usize) -> eyre::Result<T> {
        Ok(self.rate * data.phi(j) * data.phi(i))
    }
}

/// A source proportional to another variable, `-σ v φ_i`.
#[derive(Debug, Clone)]
pub struct CoupledForce<T> {
    name: String,
    variable: usize,
    // Always a single entry
    coupled: Vec<usize>,
    coefficient: T,
    restriction: Restriction,
}

impl<T: Real> CoupledForce<T> {
    pub fn new(variable: usize, coupled_variable: usize, coefficient: T) -> Self {
        Self {
            name: "coupled_force".to_string(),
            variable,
            coupled: vec![coupled_variable],
            coefficient,
            restriction: Restriction::Everywhere,
        }
    }

    pub fn coupled_variable(&self) -> usize {
        self.coupled[0]
    }
}

impl<T: Real> MeshObject for CoupledForce<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn variable(&self) -> usize {
        self.variable
    }

    fn restriction(&self) -> Restriction {
        self.restriction.clone()
    }

    fn coupled_variables(&self) -> &[usize] {
        &self.coupled
    }
}

impl<T: Real> CoupledForce<T> {
    pub fn restricted_to(mut self, restriction: Restriction) -> Self {
        self.restriction = restriction;
        self
    }
}

impl<T: Real> ElementKernel<T> for CoupledForce<T> {
    fn compute_qp_residual(&self, data: &QpData<T>, i: usize) -> eyre::Result<T> {
        Ok(-self.coefficient * data.u(self.coupled_variable()) * data.phi(i))
    }

    fn compute_qp_off_diagonal_jacobian(&self, data: &QpData<T>, i: usize, j: usize, jvar: usize) -> eyre::Result<T> {
        if jvar == self.coupled_variable() {
            Ok(-self.coefficient * data.phi(j) * data.phi(i))
        } else {
            Ok(T::zero())
        }
    }
}

/// A prescribed outward flux `-g φ_i` on boundary sides.
#[derive(Debug, Clone)]
pub struct NeumannFlux<T> {
    name: String,
    variable: usize,
    flux: T,
    restriction: Restriction,
}

impl<T: Real> NeumannFlux<T> {
    pub fn new(variable: usize, flux: T) -> Self {
        Self {
            name: "neumann_flux".to_string(),
            variable,
            flux,
            restriction: Restriction::Everywhere,
        }
    }
}

impl_mesh_object!(NeumannFlux);

impl<T: Real> ElementKernel<T> for NeumannFlux<T> {
    fn compute_qp_residual(&self, data: &QpData<T>, i: usize) -> eyre::Result<T> {
        Ok(-self.flux * data.phi(i))
    }
}

/// Sets an auxiliary variable to a constant.
#[derive(Debug, Clone)]
pub struct ConstantAux<T> {
    name: String,
    variable: usize,
    value: T,
    restriction: Restriction,
}

impl<T: Real> ConstantAux<T> {
    pub fn new(variable: usize, value: T) -> Self {
        Self {
            name: "constant_aux".to_string(),
            variable,
            value,
            restriction: Restriction::Everywhere,
        }
    }
}

impl_mesh_object!(ConstantAux);

impl<T: Real> NodalKernel<T> for ConstantAux<T> {
    fn compute_value(&self, _data: &NodeData<T>) -> eyre::Result<T> {
        Ok(self.value)
    }
}

impl<T: Real> ElementAux<T> for ConstantAux<T> {
    fn compute_qp_value(&self, _data: &QpData<T>) -> eyre::Result<T> {
        Ok(self.value)
    }
}

/// Copies a solution variable into an auxiliary variable.
///
/// As an elemental auxiliary object it stores the average of the variable over the element.
#[derive(Debug, Clone)]
pub struct VariableValueAux<T> {
    name: String,
    variable: usize,
    source: Vec<usize>,
    restriction: Restriction,
    marker: std::marker::PhantomData<T>,
}

impl<T: Real> VariableValueAux<T> {
    /// Writes solution variable `source` into auxiliary variable `variable`.
    pub fn new(variable: usize, source: usize) -> Self {
        Self {
            name: "variable_value_aux".to_string(),
            variable,
            source: vec![source],
            restriction: Restriction::Everywhere,
            marker: Default::default(),
        }
    }

    pub fn restricted_to(mut self, restriction: Restriction) -> Self {
        self.restriction = restriction;
        self
    }
}

impl<T: Real> MeshObject for VariableValueAux<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn variable(&self) -> usize {
        self.variable
    }

    fn restriction(&self) -> Restriction {
        self.restriction.clone()
    }

    fn coupled_variables(&self) -> &[usize] {
        &self.source
    }
}

impl<T: Real> NodalKernel<T> for VariableValueAux<T> {
    fn compute_value(&self, data: &NodeData<T>) -> eyre::Result<T> {
        Ok(data.u(self.source[0]))
    }
}

impl<T: Real> ElementAux<T> for VariableValueAux<T> {
    fn compute_qp_value(&self, data: &QpData<T>) -> eyre::Result<T> {
        Ok(data.u(self.source[0]))
    }
}

/// Linear reaction `λ u` lumped at the nodes.
#[derive(Debug, Clone)]
pub struct NodalReaction<T> {
    name: String,
    variable: usize,
    rate: T,
    restriction: Restriction,
}

impl<T: Real> NodalReaction<T> {
    pub fn new(variable: usize, rate: T) -> Self {
        Self {
            name: "nodal_reaction".to_string(),
            variable,
            rate,
            restriction: Restriction::Everywhere,
        }
    }
}

impl_mesh_object!(NodalReaction);

impl<T: Real> NodalKernel<T> for NodalReaction<T> {
    fn compute_value(&self, data: &NodeData<T>) -> eyre::Result<T> {
        Ok(self.rate * data.u(self.variable))
    }

    fn compute_jacobian(&self, _data: &NodeData<T>, jvar: usize) -> eyre::Result<T> {
        if jvar == self.variable {
            Ok(self.rate)
        } else {
            Ok(T::zero())
        }
    }
}

/// A nodal source proportional to another variable, `-σ v`.
#[derive(Debug, Clone)]
pub struct NodalCoupledForce<T> {
    name: String,
    variable: usize,
    coupled: Vec<usize>,
    coefficient: T,
    restriction: Restriction,
}

impl<T: Real> NodalCoupledForce<T> {
    pub fn new(variable: usize, coupled_variable: usize, coefficient: T) -> Self {
        Self {
            name: "nodal_coupled_force".to_string(),
            variable,
            coupled: vec![coupled_variable],
            coefficient,
            restriction: Restriction::Everywhere,
        }
    }

    pub fn restricted_to(mut self, restriction: Restriction) -> Self {
        self.restriction = restriction;
        self
    }
}

impl<T: Real> MeshObject for NodalCoupledForce<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn variable(&self) -> usize {
        self.variable
    }

    fn restriction(&self) -> Restriction {
        self.restriction.clone()
    }

    fn coupled_variables(&self) -> &[usize] {
        &self.coupled
    }
}

impl<T: Real> NodalKernel<T> for NodalCoupledForce<T> {
    fn compute_value(&self, data: &NodeData<T>) -> eyre::Result<T> {
        Ok(-self.coefficient * data.u(self.coupled[0]))
    }

    fn compute_jacobian(&self, _data: &NodeData<T>, jvar: usize) -> eyre::Result<T> {
        if jvar == self.coupled[0] {
            Ok(-self.coefficient)
        } else {
            Ok(T::zero())
        }
    }
}
