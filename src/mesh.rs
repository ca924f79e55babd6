//! Mesh topology as seen by the loops.
//!
//! The loops never create or destroy mesh entities; they only visit handles produced from a
//! [`MeshTopology`]. [`LineMesh`] is a small in-memory implementation for one-dimensional
//! problems.
use crate::{BoundaryId, Real, StoredRange, SubdomainId};
use std::collections::BTreeSet;

pub mod procedural;

/// Handle to an element, carrying its subdomain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle {
    pub id: usize,
    pub subdomain: SubdomainId,
}

/// Handle to a node. Its subdomains and boundary ids are looked up in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle {
    pub id: usize,
}

/// Topological queries the loops need from a mesh.
pub trait MeshTopology: Sync {
    fn num_elements(&self) -> usize;

    fn num_nodes(&self) -> usize;

    fn element_nodes(&self, element: usize) -> &[usize];

    fn element_subdomain(&self, element: usize) -> SubdomainId;

    /// The `(side, boundary id)` pairs of the element, sorted by side and then boundary id.
    ///
    /// A side belonging to several side sets appears once per boundary id.
    fn element_boundary_sides(&self, element: usize) -> &[(usize, BoundaryId)];

    /// The sorted, distinct subdomains of the elements adjacent to the node.
    fn node_subdomains(&self, node: usize) -> &[SubdomainId];

    /// The sorted, distinct boundary ids of the node.
    fn node_boundaries(&self, node: usize) -> &[BoundaryId];

    /// Sorted, distinct subdomain ids present in the mesh.
    fn subdomain_ids(&self) -> Vec<SubdomainId> {
        let ids: BTreeSet<_> = (0..self.num_elements())
            .map(|e| self.element_subdomain(e))
            .collect();
        ids.into_iter().collect()
    }

    /// Sorted, distinct boundary ids present on element sides or nodes.
    fn boundary_ids(&self) -> Vec<BoundaryId> {
        let mut ids = BTreeSet::new();
        for e in 0..self.num_elements() {
            ids.extend(self.element_boundary_sides(e).iter().map(|&(_, b)| b));
        }
        for n in 0..self.num_nodes() {
            ids.extend(self.node_boundaries(n).iter().copied());
        }
        ids.into_iter().collect()
    }

    /// A range over all elements in index order.
    fn active_element_range(&self) -> StoredRange<ElementHandle> {
        let handles = (0..self.num_elements())
            .map(|id| ElementHandle {
                id,
                subdomain: self.element_subdomain(id),
            })
            .collect::<Vec<_>>();
        StoredRange::new(handles)
    }

    /// A range over all nodes in index order.
    fn local_node_range(&self) -> StoredRange<NodeHandle> {
        let handles = (0..self.num_nodes())
            .map(|id| NodeHandle { id })
            .collect::<Vec<_>>();
        StoredRange::new(handles)
    }

    /// A range over the elements that have at least one boundary side.
    fn boundary_element_range(&self) -> StoredRange<ElementHandle> {
        let handles = (0..self.num_elements())
            .filter(|&id| !self.element_boundary_sides(id).is_empty())
            .map(|id| ElementHandle {
                id,
                subdomain: self.element_subdomain(id),
            })
            .collect::<Vec<_>>();
        StoredRange::new(handles)
    }
}

/// A mesh of two-node segments on the real line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineMesh<T> {
    vertices: Vec<T>,
    connectivity: Vec<[usize; 2]>,
    subdomains: Vec<SubdomainId>,
    side_sets: Vec<Vec<(usize, BoundaryId)>>,
    node_sets: Vec<Vec<BoundaryId>>,
    node_subdomains: Vec<Vec<SubdomainId>>,
}

impl<T: Real> LineMesh<T> {
    /// Creates a mesh with every element in subdomain 0 and no boundaries.
    ///
    /// # Panics
    ///
    /// Panics if an element refers to a vertex that does not exist.
    pub fn from_vertices_and_connectivity(vertices: Vec<T>, connectivity: Vec<[usize; 2]>) -> Self {
        for conn in &connectivity {
            assert!(
                conn.iter().all(|&v| v < vertices.len()),
                "Element connectivity refers to vertex out of bounds"
            );
        }
        let num_elements = connectivity.len();
        let num_nodes = vertices.len();
        let mut mesh = Self {
            vertices,
            connectivity,
            subdomains: vec![0; num_elements],
            side_sets: vec![Vec::new(); num_elements],
            node_sets: vec![Vec::new(); num_nodes],
            node_subdomains: Vec::new(),
        };
        mesh.update_node_subdomains();
        mesh
    }

    pub fn vertices(&self) -> &[T] {
        &self.vertices
    }

    pub fn connectivity(&self) -> &[[usize; 2]] {
        &self.connectivity
    }

    /// Assigns subdomains with a function of the element index and element midpoint.
    pub fn assign_subdomains(&mut self, mut f: impl FnMut(usize, T) -> SubdomainId) {
        for (i, [a, b]) in self.connectivity.iter().enumerate() {
            let two = T::one() + T::one();
            let midpoint = (self.vertices[*a] + self.vertices[*b]) / two;
            self.subdomains[i] = f(i, midpoint);
        }
        self.update_node_subdomains();
    }

    pub fn set_element_subdomain(&mut self, element: usize, subdomain: SubdomainId) {
        self.subdomains[element] = subdomain;
        self.update_node_subdomains();
    }

    /// Adds an element side to a side set. Adding the same pair twice has no effect.
    ///
    /// Side `i` of a segment is the side at its `i`-th vertex.
    pub fn add_side_to_boundary(&mut self, element: usize, side: usize, boundary: BoundaryId) {
        assert!(side < 2, "Segments only have two sides");
        let sides = &mut self.side_sets[element];
        if !sides.contains(&(side, boundary)) {
            sides.push((side, boundary));
            sides.sort_unstable();
        }
    }

    /// Adds a node to a node set. Adding the same pair twice has no effect.
    pub fn add_node_to_boundary(&mut self, node: usize, boundary: BoundaryId) {
        let ids = &mut self.node_sets[node];
        if let Err(pos) = ids.binary_search(&boundary) {
            ids.insert(pos, boundary);
        }
    }

    /// Adds a side and the node on that side to the same boundary.
    pub fn add_side_and_node_to_boundary(&mut self, element: usize, side: usize, boundary: BoundaryId) {
        self.add_side_to_boundary(element, side, boundary);
        let node = self.connectivity[element][side];
        self.add_node_to_boundary(node, boundary);
    }

    fn update_node_subdomains(&mut self) {
        let mut node_subdomains = vec![Vec::new(); self.vertices.len()];
        for (conn, &subdomain) in self.connectivity.iter().zip(&self.subdomains) {
            for &node in conn {
                let ids: &mut Vec<SubdomainId> = &mut node_subdomains[node];
                if let Err(pos) = ids.binary_search(&subdomain) {
                    ids.insert(pos, subdomain);
                }
            }
        }
        self.node_subdomains = node_subdomains;
    }
}

impl<T: Real> MeshTopology for LineMesh<T> {
    fn num_elements(&self) -> usize {
        self.connectivity.len()
    }

    fn num_nodes(&self) -> usize {
        self.vertices.len()
    }

    fn element_nodes(&self, element: usize) -> &[usize] {
        &self.connectivity[element]
    }

    fn element_subdomain(&self, element: usize) -> SubdomainId {
        self.subdomains[element]
    }

    fn element_boundary_sides(&self, element: usize) -> &[(usize, BoundaryId)] {
        &self.side_sets[element]
    }

    fn node_subdomains(&self, node: usize) -> &[SubdomainId] {
        &self.node_subdomains[node]
    }

    fn node_boundaries(&self, node: usize) -> &[BoundaryId] {
        &self.node_sets[node]
    }
}
