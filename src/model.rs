use crate::brick::{Brick, BrickNode, FieldInfo};
use crate::error::{ModelError, Result};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Results of the last successful solve of a brick chain.
///
/// The state remembers the bricks and field layout of the chain it was solved for, and a later
/// nonlinear solve only starts from it if the chain still has that shape.
#[derive(Debug, Clone, Default)]
pub struct ModelState {
    bricks: Vec<&'static str>,
    fields: Vec<FieldInfo>,
    state: Option<DVector<f64>>,
    tangent: Option<CsrMatrix<f64>>,
    residual: Option<DVector<f64>>,
    iterations: usize,
}

impl ModelState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The solution vector, laid out like the fields of the solved chain.
    pub fn state(&self) -> Result<&DVector<f64>> {
        self.state.as_ref().ok_or(ModelError::NotSolved)
    }

    pub fn is_solved(&self) -> bool {
        self.state.is_some()
    }

    /// Field layout of the chain of the last solve.
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Whether the stored state was solved for a chain with the same bricks and layout as `brick`.
    pub fn is_solution_of(&self, brick: &Brick) -> bool {
        let same_bricks = self
            .bricks
            .iter()
            .copied()
            .eq(brick.layers().into_iter().map(BrickNode::name));
        self.is_solved() && same_bricks && self.fields == brick.fields()
    }

    /// Tangent matrix assembled at the solution.
    pub fn tangent_matrix(&self) -> Option<&CsrMatrix<f64>> {
        self.tangent.as_ref()
    }

    /// Residual assembled at the solution.
    pub fn residual(&self) -> Option<&DVector<f64>> {
        self.residual.as_ref()
    }

    /// Newton iterations of the last solve.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn store(
        &mut self,
        brick: &Brick,
        state: DVector<f64>,
        tangent: CsrMatrix<f64>,
        residual: DVector<f64>,
        iterations: usize,
    ) {
        self.bricks = brick.layers().into_iter().map(BrickNode::name).collect();
        self.fields = brick.fields();
        self.state = Some(state);
        self.tangent = Some(tangent);
        self.residual = Some(residual);
        self.iterations = iterations;
    }
}
