use crate::assembly::local::{ElementConnectivityAssembler, ElementMatrixAssembler, ElementVectorAssembler};
use eyre::eyre;
use nalgebra::base::storage::RawStorage;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut, Dyn, Matrix, U1};
use nalgebra_sparse::csr::CsrRowMut;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;
use std::cell::RefCell;
use std::collections::BTreeSet;

/// An assembler for CSR matrices.
///
/// Element matrices can be computed in parallel, but they are always added to the global
/// matrix serially in element order, so the result does not depend on the number of threads.
#[derive(Debug, Clone, Default)]
pub struct CsrAssembler {
    // Buffers that help prevent unnecessary allocations
    // when assembling multiple matrices with the same assembler
    workspace: RefCell<CsrAssemblerWorkspace>,
}

#[derive(Debug, Clone)]
struct CsrAssemblerWorkspace {
    connectivity_permutation: Vec<usize>,
    element_global_nodes: Vec<usize>,
    element_matrix: DMatrix<f64>,
}

impl Default for CsrAssemblerWorkspace {
    fn default() -> Self {
        Self {
            connectivity_permutation: Vec::new(),
            element_global_nodes: Vec::new(),
            element_matrix: DMatrix::zeros(0, 0),
        }
    }
}

impl CsrAssembler {
    pub fn assemble_pattern<A>(&self, element_assembler: &A) -> eyre::Result<SparsityPattern>
    where
        A: ElementConnectivityAssembler + ?Sized,
    {
        // Collecting into a BTreeSet stores each matrix entry exactly once, sorted by row
        let mut matrix_entries = BTreeSet::new();
        let mut element_global_nodes = Vec::new();
        for i in 0..element_assembler.num_elements() {
            let element_node_count = element_assembler.element_node_count(i);
            element_global_nodes.resize(element_node_count, usize::MAX);
            element_assembler.populate_element_nodes(&mut element_global_nodes, i);

            for &node_i in &element_global_nodes {
                for &node_j in &element_global_nodes {
                    matrix_entries.insert((node_i, node_j));
                }
            }
        }

        let num_rows = element_assembler.num_nodes();
        let mut offsets = Vec::with_capacity(num_rows + 1);
        let mut column_indices = Vec::with_capacity(matrix_entries.len());

        offsets.push(0);
        for (i, j) in matrix_entries {
            while i + 1 > offsets.len() {
                // A while loop correctly handles consecutive empty rows
                offsets.push(column_indices.len());
            }
            column_indices.push(j);
        }

        // Fill out the remaining offsets if the last rows are empty
        while offsets.len() < (num_rows + 1) {
            offsets.push(column_indices.len());
        }

        SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
            .map_err(|err| eyre!("invalid sparsity pattern: {}", err))
    }

    pub fn assemble(
        &self,
        element_assembler: &(dyn ElementMatrixAssembler + Sync),
        parallel: bool,
    ) -> eyre::Result<CsrMatrix<f64>> {
        let pattern = self.assemble_pattern(element_assembler)?;
        let initial_matrix_values = vec![0.0; pattern.nnz()];
        let mut matrix = CsrMatrix::try_from_pattern_and_values(pattern, initial_matrix_values)
            .map_err(|err| eyre!("invalid CSR matrix: {}", err))?;
        self.assemble_into_csr(&mut matrix, element_assembler, parallel)?;
        Ok(matrix)
    }

    /// Adds the element contributions to a matrix whose pattern already holds every entry.
    pub fn assemble_into_csr(
        &self,
        csr: &mut CsrMatrix<f64>,
        element_assembler: &(dyn ElementMatrixAssembler + Sync),
        parallel: bool,
    ) -> eyre::Result<()> {
        if parallel {
            let element_matrices = (0..element_assembler.num_elements())
                .into_par_iter()
                .map(|i| {
                    let n = element_assembler.element_node_count(i);
                    let mut nodes = vec![0; n];
                    let mut matrix = DMatrix::zeros(n, n);
                    element_assembler.populate_element_nodes(&mut nodes, i);
                    element_assembler.assemble_element_matrix_into(i, DMatrixViewMut::from(&mut matrix))?;
                    Ok((nodes, matrix))
                })
                .collect::<eyre::Result<Vec<_>>>()?;

            let mut ws = self.workspace.borrow_mut();
            for (nodes, matrix) in &element_matrices {
                scatter_element_matrix(csr, nodes, matrix, &mut ws.connectivity_permutation)?;
            }
            return Ok(());
        }

        // Reuse previously allocated buffers
        let ws = &mut *self.workspace.borrow_mut();
        let connectivity_permutation = &mut ws.connectivity_permutation;
        let element_global_nodes = &mut ws.element_global_nodes;
        let element_matrix = &mut ws.element_matrix;

        for i in 0..element_assembler.num_elements() {
            let element_node_count = element_assembler.element_node_count(i);
            element_global_nodes.resize(element_node_count, 0);
            element_matrix.resize_mut(element_node_count, element_node_count, 0.0);
            element_matrix.fill(0.0);

            let matrix_view = DMatrixViewMut::from(&mut *element_matrix);
            element_assembler.assemble_element_matrix_into(i, matrix_view)?;
            element_assembler.populate_element_nodes(element_global_nodes, i);

            scatter_element_matrix(csr, element_global_nodes, element_matrix, connectivity_permutation)?;
        }

        Ok(())
    }
}

fn scatter_element_matrix(
    csr: &mut CsrMatrix<f64>,
    element_global_nodes: &[usize],
    element_matrix: &DMatrix<f64>,
    connectivity_permutation: &mut Vec<usize>,
) -> eyre::Result<()> {
    connectivity_permutation.clear();
    connectivity_permutation.extend(0..element_global_nodes.len());
    connectivity_permutation.sort_unstable_by_key(|i| element_global_nodes[*i]);

    for (local_row_index, &global_row_index) in element_global_nodes.iter().enumerate() {
        let mut csr_row = csr.row_mut(global_row_index);
        let a_row = element_matrix.row(local_row_index);
        add_element_row_to_csr_row(&mut csr_row, element_global_nodes, connectivity_permutation, &a_row)?;
    }
    Ok(())
}

/// Add a row of a local element matrix to the provided row of a CSR matrix.
///
/// `element_nodes`: The global indices of the element unknowns.
/// `sorted_permutation`: The local indices ordered such that the corresponding global indices
///    are sorted.
/// `local_row`: The local row of the element matrix that should be added to the CSR matrix.
fn add_element_row_to_csr_row<S>(
    row: &mut CsrRowMut<f64>,
    element_nodes: &[usize],
    sorted_permutation: &[usize],
    local_row: &Matrix<f64, U1, Dyn, S>,
) -> eyre::Result<()>
where
    S: RawStorage<f64, U1, Dyn>,
{
    assert_eq!(element_nodes.len(), sorted_permutation.len());
    assert_eq!(element_nodes.len(), local_row.ncols());

    let (column_indices, values) = row.cols_and_values_mut();
    let mut csr_col_idx_iter = column_indices.iter().copied().enumerate();

    for &local_col_index in sorted_permutation {
        let global_col_index = element_nodes[local_col_index];
        let (local_csr_col_idx, _) = csr_col_idx_iter
            .find(|(_, csr_col_idx)| *csr_col_idx == global_col_index)
            .ok_or_else(|| eyre!("column {} is missing from the CSR pattern", global_col_index))?;
        values[local_csr_col_idx] += local_row[local_col_index];
    }
    Ok(())
}

/// Assembles a global vector from element vectors, accumulating in element order.
pub fn assemble_vector(element_assembler: &(dyn ElementVectorAssembler + Sync), parallel: bool) -> eyre::Result<DVector<f64>> {
    let assemble_element = |i: usize| -> eyre::Result<(Vec<usize>, DVector<f64>)> {
        let n = element_assembler.element_node_count(i);
        let mut nodes = vec![0; n];
        let mut vector = DVector::zeros(n);
        element_assembler.populate_element_nodes(&mut nodes, i);
        element_assembler.assemble_element_vector_into(i, DVectorViewMut::from(&mut vector))?;
        Ok((nodes, vector))
    };

    let num_elements = element_assembler.num_elements();
    let mut result = DVector::zeros(element_assembler.num_nodes());
    let mut scatter = |nodes: &[usize], vector: &DVector<f64>| {
        for (&node, value) in nodes.iter().zip(vector.iter()) {
            result[node] += *value;
        }
    };

    if parallel {
        let element_vectors = (0..num_elements)
            .into_par_iter()
            .map(assemble_element)
            .collect::<eyre::Result<Vec<_>>>()?;
        for (nodes, vector) in &element_vectors {
            scatter(nodes, vector);
        }
    } else {
        for i in 0..num_elements {
            let (nodes, vector) = assemble_element(i)?;
            scatter(&nodes, &vector);
        }
    }
    Ok(result)
}

/// Largest absolute value on the diagonal of a CSR matrix.
pub fn max_abs_diagonal(matrix: &CsrMatrix<f64>) -> f64 {
    matrix
        .diagonal_as_csr()
        .values()
        .iter()
        .fold(0.0, |max, value| f64::max(max, value.abs()))
}
