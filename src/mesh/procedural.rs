//! Basic procedural mesh generation routines.
use crate::mesh::LineMesh;
use crate::{BoundaryId, Real};

/// Boundary id of the left end of meshes created in this module.
pub const LEFT_BOUNDARY: BoundaryId = 0;
/// Boundary id of the right end of meshes created in this module.
pub const RIGHT_BOUNDARY: BoundaryId = 1;

/// Creates a uniform mesh of the interval `[0, length]` with `num_elements` segments.
///
/// All elements are in subdomain 0. The left end (side 0 of the first element and node 0)
/// is tagged with [`LEFT_BOUNDARY`], the right end with [`RIGHT_BOUNDARY`].
pub fn create_uniform_line_mesh<T: Real>(num_elements: usize, length: T) -> LineMesh<T> {
    if num_elements == 0 {
        return LineMesh::from_vertices_and_connectivity(Vec::new(), Vec::new());
    }

    let h = length / T::from_usize(num_elements).unwrap();
    let vertices = (0..=num_elements)
        .map(|i| T::from_usize(i).unwrap() * h)
        .collect();
    let connectivity = (0..num_elements).map(|i| [i, i + 1]).collect();

    let mut mesh = LineMesh::from_vertices_and_connectivity(vertices, connectivity);
    mesh.add_side_and_node_to_boundary(0, 0, LEFT_BOUNDARY);
    mesh.add_side_and_node_to_boundary(num_elements - 1, 1, RIGHT_BOUNDARY);
    mesh
}

/// Creates `num_elements` unit segments that share no vertices.
///
/// Element `i` covers `[i, i + 1]` with its own two vertices `2i` and `2i + 1`, so the
/// degrees of freedom of different elements never overlap. No boundaries are tagged.
pub fn create_disjoint_segments<T: Real>(num_elements: usize) -> LineMesh<T> {
    let mut vertices = Vec::with_capacity(2 * num_elements);
    let mut connectivity = Vec::with_capacity(num_elements);
    for i in 0..num_elements {
        let x0 = T::from_usize(i).unwrap();
        vertices.push(x0);
        vertices.push(x0 + T::one());
        connectivity.push([2 * i, 2 * i + 1]);
    }
    LineMesh::from_vertices_and_connectivity(vertices, connectivity)
}
