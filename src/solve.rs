//! Solution of brick chains.
use crate::brick::{AssembledSystem, Brick};
use crate::error::{ModelError, Result};
use crate::linsolve::{linear_solver_by_name, LinearSolver};
use crate::model::ModelState;
use brickfem_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use brickfem_optimize::newton::{newton, BacktrackingLineSearch, NewtonError, NewtonSettings};
use log::{log, Level};
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::str::FromStr;

/// Options of [`Brick::solve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Report assembly and solver progress at `info` level instead of `debug`.
    pub noisy: bool,
    /// Name of the linear solver, see [`linear_solver_by_name`].
    pub lsolver: String,
    /// Maximum number of Newton iterations for nonlinear chains.
    pub max_iter: usize,
    /// Newton tolerance, relative to the residual norm at the zero state.
    pub residual: f64,
    /// Compute element matrices in parallel.
    pub parallel_assembly: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            noisy: false,
            lsolver: "superlu".to_string(),
            max_iter: 40,
            residual: 1e-8,
            parallel_assembly: false,
        }
    }
}

fn option_value<'s>(args: &mut std::slice::Iter<'_, &'s str>, option: &str) -> Result<&'s str> {
    args.next()
        .copied()
        .ok_or_else(|| ModelError::InvalidArgument(format!("option '{}' needs a value", option)))
}

fn parse_value<T: FromStr>(value: &str, option: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ModelError::InvalidArgument(format!("invalid value '{}' for option '{}'", value, option)))
}

impl SolveOptions {
    /// Parses a flat option list such as `["noisy", "max_iter", "20", "lsolver", "cg"]`.
    pub fn from_args(args: &[&str]) -> Result<Self> {
        let mut options = Self::default();
        let mut args = args.iter();
        while let Some(arg) = args.next() {
            let option = arg.trim().to_ascii_lowercase().replace(' ', "_");
            match option.as_str() {
                "noisy" | "very_noisy" => options.noisy = true,
                "parallel" | "parallel_assembly" => options.parallel_assembly = true,
                "lsolver" => options.lsolver = option_value(&mut args, &option)?.trim().to_string(),
                "max_iter" => options.max_iter = parse_value(option_value(&mut args, &option)?, &option)?,
                "residual" => options.residual = parse_value(option_value(&mut args, &option)?, &option)?,
                _ => {
                    return Err(ModelError::InvalidArgument(format!("unknown solve option '{}'", arg)));
                }
            }
        }
        Ok(options)
    }

    pub fn log_level(&self) -> Level {
        if self.noisy {
            Level::Info
        } else {
            Level::Debug
        }
    }
}

/// Solves `K sol = rhs` with the eliminated dofs of `system` fixed to `sol_i = rhs_i`.
fn solve_reduced(system: &AssembledSystem, rhs: &DVector<f64>, solver: &dyn LinearSolver) -> Result<DVector<f64>> {
    if system.eliminated.is_empty() {
        return solver.solve(&system.tangent, rhs);
    }

    let n = rhs.len();
    let mut reduced_index = vec![None; n];
    let mut free = Vec::with_capacity(n - system.eliminated.len());
    for i in (0..n).filter(|i| !system.eliminated.contains_key(i)) {
        reduced_index[i] = Some(free.len());
        free.push(i);
    }

    let mut sol = DVector::zeros(n);
    for &i in system.eliminated.keys() {
        sol[i] = rhs[i];
    }

    let mut reduced_rhs = DVector::from_iterator(free.len(), free.iter().map(|&i| rhs[i]));
    let mut coo = CooMatrix::new(free.len(), free.len());
    for (i, j, &v) in system.tangent.triplet_iter() {
        if let Some(row) = reduced_index[i] {
            match reduced_index[j] {
                Some(col) => coo.push(row, col, v),
                None => reduced_rhs[row] -= v * sol[j],
            }
        }
    }

    let reduced_sol = solver.solve(&CsrMatrix::from(&coo), &reduced_rhs)?;
    for (&i, value) in free.iter().zip(reduced_sol.iter()) {
        sol[i] = *value;
    }
    Ok(sol)
}

/// The discrete equations `F(U) = 0` of a chain, with `F_i = U_i - r_i` on eliminated dofs.
struct ChainSystem<'b, 'a> {
    brick: &'b Brick<'a>,
    solver: &'b dyn LinearSolver,
    dimension: usize,
    level: Level,
    parallel: bool,
    /// System assembled at the most recent evaluation point.
    last: Option<AssembledSystem>,
    /// Error of the most recent evaluation, reported by the next Jacobian solve.
    error: Option<ModelError>,
}

impl<'b, 'a> ChainSystem<'b, 'a> {
    fn new(brick: &'b Brick<'a>, solver: &'b dyn LinearSolver, level: Level, parallel: bool) -> Self {
        Self {
            brick,
            solver,
            dimension: brick.nb_dof(),
            level,
            parallel,
            last: None,
            error: None,
        }
    }

    fn evaluate(&mut self, x: &DVector<f64>) -> Result<DVector<f64>> {
        let system = self.brick.assemble_logged(x, self.level, self.parallel)?;
        let mut f = system.residual.clone();
        for (&i, &value) in &system.eliminated {
            f[i] = x[i] - value;
        }
        self.last = Some(system);
        Ok(f)
    }

    fn solve_jacobian(&mut self, x: &DVector<f64>, rhs: &DVector<f64>) -> Result<DVector<f64>> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        if self.last.is_none() {
            self.evaluate(x)?;
        }
        match &self.last {
            Some(system) => solve_reduced(system, rhs, self.solver),
            None => Err(ModelError::NotSolved),
        }
    }
}

impl<'b, 'a> VectorFunction<f64> for ChainSystem<'b, 'a> {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        match self.evaluate(&x.clone_owned()) {
            Ok(value) => f.copy_from(&value),
            Err(error) => {
                self.last = None;
                self.error = Some(error);
                f.fill(f64::INFINITY);
            }
        }
    }
}

impl<'b, 'a> DifferentiableVectorFunction<f64> for ChainSystem<'b, 'a> {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> std::result::Result<(), Box<dyn Error>> {
        let solution = self.solve_jacobian(&x.clone_owned(), &rhs.clone_owned())?;
        sol.copy_from(&solution);
        Ok(())
    }
}

fn model_error(error: Box<dyn Error>) -> ModelError {
    match error.downcast::<ModelError>() {
        Ok(error) => *error,
        Err(error) => ModelError::SingularMatrix(error.to_string()),
    }
}

impl<'a> Brick<'a> {
    /// Solves the chain with the linear solver named in `options`.
    pub fn solve(&self, model: &mut ModelState, options: &SolveOptions) -> Result<()> {
        let solver = linear_solver_by_name(&options.lsolver)?;
        self.solve_with(model, options, solver.as_ref())
    }

    /// Solves the chain with the given linear solver.
    ///
    /// Linear chains take a single Newton step from the zero state. Nonlinear chains iterate from
    /// the previous solution when `model` was last solved for a chain of the same shape, see
    /// [`ModelState::is_solution_of`]. On failure `model` is left as it was.
    pub fn solve_with(&self, model: &mut ModelState, options: &SolveOptions, solver: &dyn LinearSolver) -> Result<()> {
        let level = options.log_level();
        let n = self.nb_dof();
        log!(
            level,
            "Solving chain '{}' with {} unknowns ({} effective) using {}",
            self.name(),
            n,
            self.nb_effective_dof(),
            solver.name()
        );

        let mut system = ChainSystem::new(self, solver, level, options.parallel_assembly);
        let zero = DVector::zeros(n);
        let f_zero = system.evaluate(&zero)?;

        let (x, iterations) = if self.is_linear() {
            let step = system.solve_jacobian(&zero, &f_zero)?;
            (-step, 1)
        } else {
            let reference = f_zero.norm();
            let tolerance = if reference > 0.0 {
                options.residual * reference
            } else {
                options.residual
            };
            let mut x = match model.state() {
                Ok(previous) if model.is_solution_of(self) => previous.clone(),
                _ => zero,
            };
            let mut f = DVector::zeros(n);
            let mut dx = DVector::zeros(n);
            let settings = NewtonSettings {
                max_iterations: options.max_iter,
                tolerance,
                log_level: level,
            };
            let result = newton(
                &mut system,
                DVectorViewMut::from(&mut x),
                DVectorViewMut::from(&mut f),
                DVectorViewMut::from(&mut dx),
                settings,
                &mut BacktrackingLineSearch::default(),
            );
            if let Some(error) = system.error.take() {
                return Err(error);
            }
            let iterations = match result {
                Ok(outcome) => outcome.iterations,
                Err(NewtonError::NotConverged {
                    iterations,
                    residual_norm,
                }) => {
                    return Err(ModelError::Convergence {
                        iterations,
                        residual: residual_norm,
                    })
                }
                Err(NewtonError::NonFiniteResidual { iterations }) => {
                    return Err(ModelError::Convergence {
                        iterations,
                        residual: f64::INFINITY,
                    })
                }
                Err(NewtonError::Jacobian(error)) | Err(NewtonError::LineSearch(error)) => return Err(model_error(error)),
            };
            (x, iterations)
        };

        // Leaves the tangent and residual of the solution in `system.last`
        let f = system.evaluate(&x)?;
        log!(level, "Solved in {} iteration(s), residual {:e}", iterations, f.norm());
        let assembled = system.last.take().ok_or(ModelError::NotSolved)?;
        model.store(self, x, assembled.tangent, assembled.residual, iterations);
        Ok(())
    }
}
