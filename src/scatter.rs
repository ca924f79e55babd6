//! Global vectors and matrices shared by all execution contexts.
//!
//! Contexts add their local contributions through `scatter_*` methods. Each call takes the
//! lock for exactly the duration of the scatter, so that local computations on different
//! threads overlap freely while concurrent additions to the same global entry serialize.
//!
//! Scattering into an index that is not owned by the destination is a setup bug and panics.
use crate::dof::DofMap;
use crate::mesh::MeshTopology;
use crate::Real;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::ops::Range;

/// A global vector guarded by a scatter lock.
#[derive(Debug)]
pub struct GlobalVector<T: Real> {
    values: Mutex<DVector<T>>,
    owned: Range<usize>,
}

impl<T: Real> GlobalVector<T> {
    pub fn zeros(len: usize) -> Self {
        Self::from_vector(DVector::zeros(len))
    }

    /// Wraps an existing vector. All entries are owned.
    pub fn from_vector(vector: DVector<T>) -> Self {
        let owned = 0..vector.len();
        Self {
            values: Mutex::new(vector),
            owned,
        }
    }

    /// Restricts the entries that may be scattered into.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the length of the vector.
    pub fn with_owned_range(mut self, owned: Range<usize>) -> Self {
        assert!(owned.end <= self.len(), "Owned range exceeds vector length");
        self.owned = owned;
        self
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn owned_range(&self) -> Range<usize> {
        self.owned.clone()
    }

    fn assert_owned(&self, dofs: &[usize]) {
        for &dof in dofs {
            assert!(
                self.owned.contains(&dof),
                "Scatter into degree of freedom {} outside of owned range {:?}",
                dof,
                self.owned
            );
        }
    }

    /// Adds `local[k]` to entry `dofs[k]` for every `k`.
    pub fn scatter_add(&self, local: &DVector<T>, dofs: &[usize]) {
        assert_eq!(local.len(), dofs.len(), "Local vector and dof indices must have same length");
        self.assert_owned(dofs);

        let mut values = self.values.lock();
        for (&dof, &value) in dofs.iter().zip(local.iter()) {
            values[dof] += value;
        }
    }

    /// Overwrites entry `dofs[k]` with `local[k]` for every `k`.
    pub fn scatter_set(&self, local: &[T], dofs: &[usize]) {
        assert_eq!(local.len(), dofs.len(), "Local values and dof indices must have same length");
        self.assert_owned(dofs);

        let mut values = self.values.lock();
        for (&dof, &value) in dofs.iter().zip(local) {
            values[dof] = value;
        }
    }

    pub fn get(&self, index: usize) -> T {
        self.values.lock()[index]
    }

    /// Sets every entry to zero.
    pub fn zero(&self) {
        self.values.lock().fill(T::zero());
    }

    /// Copies the current values.
    pub fn to_vector(&self) -> DVector<T> {
        self.values.lock().clone()
    }

    pub fn into_inner(self) -> DVector<T> {
        self.values.into_inner()
    }
}

/// A global CSR matrix guarded by a scatter lock.
///
/// The sparsity pattern is fixed at construction. Every entry a scatter touches must be
/// present in the pattern.
#[derive(Debug)]
pub struct GlobalMatrix<T: Real> {
    matrix: Mutex<CsrMatrix<T>>,
    owned_rows: Range<usize>,
}

impl<T: Real> GlobalMatrix<T> {
    pub fn from_pattern(pattern: SparsityPattern) -> Self {
        let nnz = pattern.nnz();
        let matrix = CsrMatrix::try_from_pattern_and_values(pattern, vec![T::zero(); nnz])
            .expect("CSR data must be valid by definition");
        Self::from_csr(matrix)
    }

    pub fn from_csr(matrix: CsrMatrix<T>) -> Self {
        let owned_rows = 0..matrix.nrows();
        Self {
            matrix: Mutex::new(matrix),
            owned_rows,
        }
    }

    /// Restricts the rows that may be scattered into.
    pub fn with_owned_rows(mut self, owned_rows: Range<usize>) -> Self {
        assert!(owned_rows.end <= self.nrows(), "Owned rows exceed matrix dimensions");
        self.owned_rows = owned_rows;
        self
    }

    pub fn nrows(&self) -> usize {
        self.matrix.lock().nrows()
    }

    /// Adds the local matrix to the global matrix.
    ///
    /// Local row/column `k` corresponds to global row/column `dofs[k]`.
    /// `sorted_permutation` must list the local indices ordered by global index, as
    /// produced by [`sort_dof_permutation`]. Computing it is left to the caller so that it
    /// happens outside the lock.
    pub fn scatter_add(&self, local: &DMatrix<T>, dofs: &[usize], sorted_permutation: &[usize]) {
        assert_eq!(local.nrows(), dofs.len(), "Local matrix and dof indices must have same length");
        assert_eq!(local.ncols(), dofs.len(), "Local matrix must be square");
        assert_eq!(sorted_permutation.len(), dofs.len());
        for &dof in dofs {
            assert!(
                self.owned_rows.contains(&dof),
                "Scatter into row {} outside of owned rows {:?}",
                dof,
                self.owned_rows
            );
        }

        let mut matrix = self.matrix.lock();
        for (local_row, &global_row) in dofs.iter().enumerate() {
            let mut csr_row = matrix.row_mut(global_row);
            let (cols, values) = csr_row.cols_and_values_mut();
            let mut csr_col_iter = cols.iter().copied().enumerate();

            for &local_col in sorted_permutation {
                let global_col = dofs[local_col];
                // Columns are visited in ascending order, so the search resumes where the
                // previous one ended
                let (csr_idx, _) = csr_col_iter
                    .find(|&(_, col)| col == global_col)
                    .expect("Could not find column index associated with dof in CSR row");
                values[csr_idx] += local[(local_row, local_col)];
            }
        }
    }

    /// Sets all stored values to zero, keeping the pattern.
    pub fn zero(&self) {
        self.matrix
            .lock()
            .values_mut()
            .iter_mut()
            .for_each(|v| *v = T::zero());
    }

    pub fn to_csr(&self) -> CsrMatrix<T> {
        self.matrix.lock().clone()
    }

    pub fn into_inner(self) -> CsrMatrix<T> {
        self.matrix.into_inner()
    }
}

/// Fills `permutation` with the local indices `0..dofs.len()` sorted by global index.
///
/// # Panics
///
/// Panics in debug builds if `dofs` contains duplicates.
pub fn sort_dof_permutation(dofs: &[usize], permutation: &mut Vec<usize>) {
    permutation.clear();
    permutation.extend(0..dofs.len());
    permutation.sort_unstable_by_key(|&i| dofs[i]);
    debug_assert!(
        permutation.windows(2).all(|w| dofs[w[0]] != dofs[w[1]]),
        "Element dof indices must be distinct"
    );
}

/// Computes the sparsity pattern coupling all degrees of freedom of each element.
pub fn assemble_pattern(mesh: &dyn MeshTopology, dof_map: &dyn DofMap) -> SparsityPattern {
    // Collecting into a BTreeSet stores each matrix entry exactly once, even though
    // neighboring elements produce many duplicates
    let mut matrix_entries = BTreeSet::new();
    let mut element_dofs = Vec::new();
    for e in 0..mesh.num_elements() {
        dof_map.element_dofs(mesh, e, &mut element_dofs);
        for &i in &element_dofs {
            for &j in &element_dofs {
                matrix_entries.insert((i, j));
            }
        }
    }

    let num_rows = dof_map.n_dofs();
    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(matrix_entries.len());

    offsets.push(0);
    for (i, j) in matrix_entries {
        while i + 1 > offsets.len() {
            // Reached a new row. Loop to handle consecutive empty rows
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }

    // Remaining trailing rows are empty
    while offsets.len() < num_rows + 1 {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
        .expect("Pattern data must be valid by definition")
}
