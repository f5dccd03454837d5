use crate::calculus::{DifferentiableVectorFunction, VectorFunction};
use itertools::iterate;
use log::{log, Level};
use nalgebra::{DVectorView, DVectorViewMut, RealField, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonSettings<T> {
    pub max_iterations: usize,
    /// Absolute tolerance on the Euclidean norm of the residual.
    pub tolerance: T,
    /// Level of the per-iteration progress messages.
    pub log_level: Level,
}

/// Summary of a converged Newton solve.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonOutcome<T> {
    pub iterations: usize,
    pub residual_norm: T,
}

#[derive(Debug)]
pub enum NewtonError<T> {
    /// The residual was still above the tolerance after the maximum number of iterations.
    NotConverged { iterations: usize, residual_norm: T },
    /// The function returned a residual that is infinite or NaN.
    NonFiniteResidual { iterations: usize },
    Jacobian(Box<dyn Error>),
    LineSearch(Box<dyn Error>),
}

impl<T: Display> Display for NewtonError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConverged {
                iterations,
                residual_norm,
            } => write!(
                f,
                "no convergence after {} iteration(s), residual norm {}",
                iterations, residual_norm
            ),
            Self::NonFiniteResidual { iterations } => {
                write!(f, "residual is not finite after {} iteration(s)", iterations)
            }
            Self::Jacobian(err) => write!(f, "failed to solve the Jacobian system: {}", err),
            Self::LineSearch(err) => write!(f, "line search failed: {}", err),
        }
    }
}

impl<T: fmt::Debug + Display> Error for NewtonError<T> {}

/// Solves `F(x) = 0` starting from the initial guess stored in `x`.
///
/// Each iteration solves `J(x) dx = -F(x)` and lets the line search pick the step along `dx`.
/// The iteration stops once `|F(x)|_2 <= tolerance`; a starting point that already satisfies this
/// takes zero iterations. On return `f` holds the residual at the final `x`.
pub fn newton<'a, T, F>(
    mut function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
    line_search: &mut impl LineSearch<T, F>,
) -> Result<NewtonOutcome<T>, NewtonError<T>>
where
    T: RealField + Copy,
    F: DifferentiableVectorFunction<T>,
{
    let mut x = x.into();
    let mut f = f.into();
    let mut dx = dx.into();
    assert_eq!(x.nrows(), f.nrows());
    assert_eq!(dx.nrows(), f.nrows());

    function.eval_into(&mut f, &DVectorView::from(&x));
    let mut iterations = 0;
    loop {
        let residual_norm = f.norm();
        if !residual_norm.is_finite() {
            return Err(NewtonError::NonFiniteResidual { iterations });
        }
        log!(settings.log_level, "Newton iteration {}: residual norm {}", iterations, residual_norm);
        if residual_norm <= settings.tolerance {
            return Ok(NewtonOutcome {
                iterations,
                residual_norm,
            });
        }
        if iterations == settings.max_iterations {
            return Err(NewtonError::NotConverged {
                iterations,
                residual_norm,
            });
        }

        // J (-dx) = F
        function
            .solve_jacobian_system(&mut dx, &DVectorView::from(&x), &DVectorView::from(&f))
            .map_err(NewtonError::Jacobian)?;
        dx.neg_mut();

        let step = line_search
            .step(
                &mut function,
                DVectorViewMut::from(&mut f),
                DVectorViewMut::from(&mut x),
                DVectorView::from(&dx),
            )
            .map_err(NewtonError::LineSearch)?;
        iterations += 1;
        if step != T::one() {
            log!(settings.log_level, "Newton iteration {}: damped step {}", iterations, step);
        }
    }
}

pub trait LineSearch<T: Scalar, F: VectorFunction<T>> {
    /// Moves `x` along `direction`, leaves the new residual in `f` and returns the step length.
    fn step(
        &mut self,
        function: &mut F,
        f: DVectorViewMut<T>,
        x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>>;
}

/// Backtracking on `g(x) = |F(x)|^2 / 2` with the Armijo condition.
///
/// Tries the full step first and shrinks it by `shrink` until the residual decreases enough.
#[derive(Copy, Clone, Debug)]
pub struct BacktrackingLineSearch<T> {
    /// Armijo constant.
    pub sufficient_decrease: T,
    pub shrink: T,
    pub min_step: T,
}

impl<T: RealField + Copy> Default for BacktrackingLineSearch<T> {
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn default() -> Self {
        Self {
            sufficient_decrease: 1e-4,
            shrink: 0.5,
            min_step: 1e-6,
        }
    }
}

impl<T, F> LineSearch<T, F> for BacktrackingLineSearch<T>
where
    T: RealField + Copy,
    F: VectorFunction<T>,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        // For a Newton direction p, grad g . p = -2 g, so sufficient decrease reads
        // g(x + alpha p) <= (1 - 2 c alpha) g(x)
        let g_initial = 0.5 * f.magnitude_squared();
        let shrink = self.shrink;
        let mut taken = 0.0;
        for alpha in iterate(1.0, |alpha| *alpha * shrink) {
            x.axpy(alpha - taken, &direction, 1.0);
            taken = alpha;
            function.eval_into(&mut f, &DVectorView::from(&x));

            let g = 0.5 * f.magnitude_squared();
            if g <= (1.0 - 2.0 * self.sufficient_decrease * alpha) * g_initial {
                return Ok(alpha);
            }
            if alpha < self.min_step {
                break;
            }
        }
        Err(Box::from(format!(
            "no sufficient decrease for steps down to {}",
            self.min_step
        )))
    }
}
