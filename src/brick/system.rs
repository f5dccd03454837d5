use crate::assembly::global::{assemble_vector, max_abs_diagonal, CsrAssembler};
use crate::assembly::local::{ElementMatrixAssembler, ElementVectorAssembler};
use crate::brick::{BrickNode, ConstrainedDofs, FieldInfo};
use crate::error::{ModelError, Result};
use log::{log, Level};
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::collections::BTreeMap;
use std::ops::Range;

/// Tangent matrix, residual and eliminated dofs of a brick chain at a given state.
#[derive(Debug, Clone)]
pub struct AssembledSystem {
    pub tangent: CsrMatrix<f64>,
    pub residual: DVector<f64>,
    /// Prescribed values of the dofs removed from the solved system.
    pub eliminated: BTreeMap<usize, f64>,
}

/// What a layer of the chain sees while contributing to the global system.
pub(crate) struct AssemblyContext<'c, 'a> {
    pub layout: &'c [FieldInfo],
    pub origin: &'c BrickNode<'a>,
    pub state: &'c DVector<f64>,
    pub depth: usize,
    /// Dofs constrained by the layers below this one.
    pub constrained_below: &'c ConstrainedDofs,
    pub parallel: bool,
}

impl<'c, 'a> AssemblyContext<'c, 'a> {
    pub fn field_range(&self, name: &str) -> Result<Range<usize>> {
        self.layout
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.range.clone())
            .ok_or_else(|| ModelError::InvalidBrickChain(format!("field '{}' is not part of the chain", name)))
    }

    pub fn offset(&self, name: &str) -> Result<usize> {
        Ok(self.field_range(name)?.start)
    }

    /// Total number of unknowns of the chain.
    pub fn layout_size(&self) -> usize {
        self.layout.last().map(|field| field.range.end).unwrap_or(0)
    }
}

/// Accumulates the contributions of all layers of a chain.
pub(crate) struct SystemBuilder {
    assembler: CsrAssembler,
    tangent: CsrMatrix<f64>,
    entries: CooMatrix<f64>,
    residual: DVector<f64>,
    eliminated: BTreeMap<usize, f64>,
    level: Level,
}

impl SystemBuilder {
    pub fn new(size: usize, level: Level) -> Self {
        Self {
            assembler: CsrAssembler::default(),
            tangent: CsrMatrix::zeros(size, size),
            entries: CooMatrix::new(size, size),
            residual: DVector::zeros(size),
            eliminated: BTreeMap::new(),
            level,
        }
    }

    pub fn assemble_matrix(
        &self,
        name: &str,
        element_assembler: &(dyn ElementMatrixAssembler + Sync),
        parallel: bool,
    ) -> Result<CsrMatrix<f64>> {
        let matrix = self
            .assembler
            .assemble(element_assembler, parallel)
            .map_err(ModelError::from_report)?;
        log!(self.level, "Assembled {} ({} nonzeros)", name, matrix.nnz());
        Ok(matrix)
    }

    /// Adds a linear term: the tangent gains `K` and the residual gains `K u`.
    pub fn add_linear_term(
        &mut self,
        name: &str,
        element_assembler: &(dyn ElementMatrixAssembler + Sync),
        state: &DVector<f64>,
        parallel: bool,
    ) -> Result<()> {
        let matrix = self.assemble_matrix(name, element_assembler, parallel)?;
        self.residual += &matrix * state;
        self.add_tangent(&matrix);
        Ok(())
    }

    pub fn add_tangent(&mut self, matrix: &CsrMatrix<f64>) {
        self.tangent = &self.tangent + matrix;
    }

    /// Adds an assembled vector to the residual, scaled by `sign`.
    pub fn add_residual(
        &mut self,
        name: &str,
        element_assembler: &(dyn ElementVectorAssembler + Sync),
        sign: f64,
        parallel: bool,
    ) -> Result<()> {
        let vector = assemble_vector(element_assembler, parallel).map_err(ModelError::from_report)?;
        log!(self.level, "Assembled {} (norm {:e})", name, vector.norm());
        self.residual.axpy(sign, &vector, 1.0);
        Ok(())
    }

    pub fn add_entry(&mut self, row: usize, col: usize, value: f64) {
        self.entries.push(row, col, value);
    }

    pub fn add_to_residual(&mut self, row: usize, value: f64) {
        self.residual[row] += value;
    }

    pub fn eliminate(&mut self, dof: usize, value: f64) {
        self.eliminated.insert(dof, value);
    }

    /// Largest diagonal magnitude of the tangent assembled so far, or 1 if it is zero.
    pub fn diagonal_scale(&self) -> f64 {
        let total = &self.tangent + &CsrMatrix::from(&self.entries);
        let scale = max_abs_diagonal(&total);
        if scale > 0.0 {
            scale
        } else {
            1.0
        }
    }

    pub fn finish(self) -> AssembledSystem {
        AssembledSystem {
            tangent: &self.tangent + &CsrMatrix::from(&self.entries),
            residual: self.residual,
            eliminated: self.eliminated,
        }
    }
}
