use meshloop::dof::{DofMap, ElementalDofMap, NodalDofMap};
use meshloop::mesh::procedural::create_uniform_line_mesh;

#[test]
fn nodal_dof_map_numbers_variables_within_nodes() {
    let map = NodalDofMap::new(4, 2);
    assert_eq!(map.n_dofs(), 8);
    assert_eq!(map.n_variables(), 2);
    assert_eq!(map.node_dof(0, 0), 0);
    assert_eq!(map.node_dof(0, 1), 1);
    assert_eq!(map.node_dof(3, 1), 7);
    assert_eq!(map.owned_dofs(), 0..8);
    assert_eq!(map.variable_dofs(1).collect::<Vec<_>>(), vec![1, 3, 5, 7]);
}

#[test]
fn element_dofs_are_node_major() {
    let mesh = create_uniform_line_mesh(3, 1.0);
    let map = NodalDofMap::for_mesh(&mesh, 2);
    assert_eq!(map.n_dofs(), 8);

    let mut dofs = vec![100, 200];
    map.element_dofs(&mesh, 1, &mut dofs);
    assert_eq!(dofs, vec![2, 3, 4, 5]);

    map.element_dofs(&mesh, 2, &mut dofs);
    assert_eq!(dofs, vec![4, 5, 6, 7]);
}

#[test]
fn single_variable_element_dofs_are_node_indices() {
    let mesh = create_uniform_line_mesh(3, 1.0);
    let map = NodalDofMap::for_mesh(&mesh, 1);
    let mut dofs = Vec::new();
    map.element_dofs(&mesh, 0, &mut dofs);
    assert_eq!(dofs, vec![0, 1]);
}

#[test]
fn elemental_dof_map_numbers_variables_within_elements() {
    let mesh = create_uniform_line_mesh(3, 1.0);
    let map = ElementalDofMap::for_mesh(&mesh, 2);
    assert_eq!(map.n_dofs(), 6);
    assert_eq!(map.n_variables(), 2);
    assert_eq!(map.element_dof(0, 1), 1);
    assert_eq!(map.element_dof(2, 0), 4);
}
