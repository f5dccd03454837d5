//! Linear solvers for the assembled tangent systems.
use crate::error::{ModelError, Result};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CscMatrix, CsrMatrix};
use std::fmt::Debug;

/// Relative size below which a pivot of the LU factorization is considered zero.
const PIVOT_TOLERANCE: f64 = 1e-15;

/// Solves `A x = b` for a square sparse matrix `A`.
pub trait LinearSolver: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>>;
}

fn check_dimensions(matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> Result<()> {
    if matrix.nrows() != matrix.ncols() || matrix.nrows() != rhs.len() {
        return Err(ModelError::InvalidArgument(format!(
            "cannot solve a {}x{} system with a right-hand side of length {}",
            matrix.nrows(),
            matrix.ncols(),
            rhs.len()
        )));
    }
    Ok(())
}

fn check_finite(solution: DVector<f64>, solver: &str) -> Result<DVector<f64>> {
    if solution.iter().all(|x| x.is_finite()) {
        Ok(solution)
    } else {
        Err(ModelError::SingularMatrix(format!("{} produced a non-finite solution", solver)))
    }
}

/// Dense LU factorization with partial pivoting. Works for any non-singular system, including
/// the indefinite saddle-point systems of augmented constraints.
#[derive(Debug, Copy, Clone, Default)]
pub struct DenseLu;

impl LinearSolver for DenseLu {
    fn name(&self) -> &str {
        "dense_lu"
    }

    fn solve(&self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        check_dimensions(matrix, rhs)?;
        if rhs.is_empty() {
            return Ok(DVector::zeros(0));
        }
        let lu = DMatrix::from(matrix).lu();

        let u = lu.u();
        let diagonal = u.diagonal().abs();
        let scale = diagonal.max();
        if scale == 0.0 || diagonal.min() <= PIVOT_TOLERANCE * scale {
            return Err(ModelError::SingularMatrix(format!(
                "LU factorization has a vanishing pivot (min {:e}, max {:e})",
                diagonal.min(),
                scale
            )));
        }

        let solution = lu
            .solve(rhs)
            .ok_or_else(|| ModelError::SingularMatrix("LU factorization is not invertible".to_string()))?;
        check_finite(solution, self.name())
    }
}

/// Sparse Cholesky factorization, for symmetric positive definite systems.
#[derive(Debug, Copy, Clone, Default)]
pub struct SparseCholesky;

impl LinearSolver for SparseCholesky {
    fn name(&self) -> &str {
        "cholesky"
    }

    fn solve(&self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        check_dimensions(matrix, rhs)?;
        let csc = CscMatrix::from(matrix);
        let cholesky = CscCholesky::factor(&csc)
            .map_err(|err| ModelError::SingularMatrix(format!("Cholesky factorization failed: {:?}", err)))?;
        let b = DMatrix::from_column_slice(rhs.len(), 1, rhs.as_slice());
        let x = cholesky.solve(&b);
        check_finite(x.column(0).into_owned(), self.name())
    }
}

/// Jacobi-preconditioned conjugate gradient, for symmetric positive definite systems.
#[derive(Debug, Copy, Clone)]
pub struct ConjugateGradient {
    pub max_iterations: usize,
    /// Convergence threshold on the residual norm, relative to the right-hand side.
    pub tolerance: f64,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-12,
        }
    }
}

impl LinearSolver for ConjugateGradient {
    fn name(&self) -> &str {
        "cg"
    }

    fn solve(&self, matrix: &CsrMatrix<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        check_dimensions(matrix, rhs)?;
        let n = rhs.len();
        let mut inverse_diagonal = DVector::zeros(n);
        for (i, row) in matrix.row_iter().enumerate() {
            let d = row
                .col_indices()
                .iter()
                .zip(row.values())
                .find(|(&j, _)| j == i)
                .map(|(_, &v)| v)
                .unwrap_or(0.0);
            if d <= 0.0 {
                return Err(ModelError::SingularMatrix(format!(
                    "conjugate gradient needs a positive diagonal, row {} has {}",
                    i, d
                )));
            }
            inverse_diagonal[i] = 1.0 / d;
        }

        let threshold = self.tolerance * rhs.norm();
        let mut x = DVector::zeros(n);
        let mut r = rhs.clone();
        if r.norm() <= threshold {
            return Ok(x);
        }
        let mut z = r.component_mul(&inverse_diagonal);
        let mut p = z.clone();
        let mut rz = r.dot(&z);

        for _ in 0..self.max_iterations {
            let ap = matrix * &p;
            let pap = p.dot(&ap);
            if pap <= 0.0 {
                return Err(ModelError::SingularMatrix(
                    "matrix is not positive definite".to_string(),
                ));
            }
            let alpha = rz / pap;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &ap, 1.0);
            if r.norm() <= threshold {
                return check_finite(x, self.name());
            }
            z = r.component_mul(&inverse_diagonal);
            let rz_next = r.dot(&z);
            p = &z + (rz_next / rz) * &p;
            rz = rz_next;
        }

        Err(ModelError::Convergence {
            iterations: self.max_iterations,
            residual: r.norm(),
        })
    }
}

/// Looks up a linear solver by name.
///
/// `superlu`, `mumps`, `lu` and `dense_lu` all select [`DenseLu`], `cholesky` selects
/// [`SparseCholesky`] and `cg` selects [`ConjugateGradient`].
///
/// [`DenseLu`] converts the matrix to dense storage, so it takes `O(n^2)` memory and `O(n^3)`
/// time in the number of unknowns. For large symmetric positive definite systems prefer
/// `cholesky` or `cg`; indefinite systems such as those with multipliers need `superlu`.
pub fn linear_solver_by_name(name: &str) -> Result<Box<dyn LinearSolver>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "superlu" | "mumps" | "lu" | "dense_lu" => Ok(Box::new(DenseLu)),
        "cholesky" => Ok(Box::new(SparseCholesky)),
        "cg" => Ok(Box::new(ConjugateGradient::default())),
        _ => Err(ModelError::UnknownSolver(name.to_string())),
    }
}
