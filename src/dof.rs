//! Degree-of-freedom maps.
use crate::mesh::MeshTopology;
use std::ops::Range;

/// Maps mesh entities and variables to indices into global vectors and matrices.
///
/// The local ordering produced by [`element_dofs`](DofMap::element_dofs) is node-major:
/// the degree of freedom of variable `v` at the `i`-th node of the element is at local
/// index `i * n_variables + v`. Local element buffers use the same ordering.
pub trait DofMap: Sync {
    fn n_dofs(&self) -> usize;

    fn n_variables(&self) -> usize;

    fn node_dof(&self, node: usize, variable: usize) -> usize;

    /// Writes the global indices of all variables on the element into `dofs`.
    fn element_dofs(&self, mesh: &dyn MeshTopology, element: usize, dofs: &mut Vec<usize>) {
        let nv = self.n_variables();
        let nodes = mesh.element_nodes(element);
        dofs.clear();
        dofs.reserve(nv * nodes.len());
        for &node in nodes {
            for v in 0..nv {
                dofs.push(self.node_dof(node, v));
            }
        }
    }

    /// The contiguous range of global indices owned by this map.
    fn owned_dofs(&self) -> Range<usize> {
        0..self.n_dofs()
    }
}

/// Nodal (Lagrange) degrees of freedom, numbered `n_variables * node + variable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodalDofMap {
    num_nodes: usize,
    num_variables: usize,
}

impl NodalDofMap {
    pub fn new(num_nodes: usize, num_variables: usize) -> Self {
        Self {
            num_nodes,
            num_variables,
        }
    }

    pub fn for_mesh(mesh: &dyn MeshTopology, num_variables: usize) -> Self {
        Self::new(mesh.num_nodes(), num_variables)
    }

    /// The global indices of one variable, in node order.
    pub fn variable_dofs(&self, variable: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_nodes).map(move |node| self.node_dof(node, variable))
    }
}

impl DofMap for NodalDofMap {
    fn n_dofs(&self) -> usize {
        self.num_nodes * self.num_variables
    }

    fn n_variables(&self) -> usize {
        self.num_variables
    }

    fn node_dof(&self, node: usize, variable: usize) -> usize {
        debug_assert!(variable < self.num_variables);
        self.num_variables * node + variable
    }
}

/// Elemental (constant per element) degrees of freedom, numbered
/// `n_variables * element + variable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementalDofMap {
    num_elements: usize,
    num_variables: usize,
}

impl ElementalDofMap {
    pub fn new(num_elements: usize, num_variables: usize) -> Self {
        Self {
            num_elements,
            num_variables,
        }
    }

    pub fn for_mesh(mesh: &dyn MeshTopology, num_variables: usize) -> Self {
        Self::new(mesh.num_elements(), num_variables)
    }

    pub fn n_dofs(&self) -> usize {
        self.num_elements * self.num_variables
    }

    pub fn n_variables(&self) -> usize {
        self.num_variables
    }

    pub fn element_dof(&self, element: usize, variable: usize) -> usize {
        debug_assert!(variable < self.num_variables);
        self.num_variables * element + variable
    }
}
