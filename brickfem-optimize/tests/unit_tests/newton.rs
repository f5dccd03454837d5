use brickfem_optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use brickfem_optimize::newton::*;
use log::Level;
use nalgebra::{DVector, DVectorView, DVectorViewMut, Matrix3, Vector3};
use numeric_literals::replace_numeric_literals;
use std::error::Error;

struct MockLinearVectorFunction;

impl VectorFunction<f64> for MockLinearVectorFunction {
    fn dimension(&self) -> usize {
        3
    }

    #[replace_numeric_literals(f64::from(literal))]
    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        let a = Matrix3::new(5, 1, 2, 1, 4, 2, 2, 2, 4);
        let b = Vector3::new(1, 2, 3);
        let r = a * x - b;
        f.copy_from(&r);
    }
}

impl DifferentiableVectorFunction<f64> for MockLinearVectorFunction {
    #[replace_numeric_literals(f64::from(literal))]
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        _x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> Result<(), Box<dyn Error>> {
        let a = Matrix3::new(5, 1, 2, 1, 4, 2, 2, 2, 4);
        let a_inv = a.try_inverse().unwrap();
        sol.copy_from(&(a_inv * rhs));
        Ok(())
    }
}

/// F(x) = x^3 - 8 componentwise, with root x = 2.
struct Cubic;

impl VectorFunction<f64> for Cubic {
    fn dimension(&self) -> usize {
        2
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        for i in 0..2 {
            f[i] = x[i] * x[i] * x[i] - 8.0;
        }
    }
}

impl DifferentiableVectorFunction<f64> for Cubic {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> Result<(), Box<dyn Error>> {
        for i in 0..2 {
            let d = 3.0 * x[i] * x[i];
            if d == 0.0 {
                return Err(Box::from("singular Jacobian"));
            }
            sol[i] = rhs[i] / d;
        }
        Ok(())
    }
}

fn settings(max_iterations: usize, tolerance: f64) -> NewtonSettings<f64> {
    NewtonSettings {
        max_iterations,
        tolerance,
        log_level: Level::Debug,
    }
}

#[test]
fn newton_converges_in_single_iteration_for_linear_system() {
    let expected_solution = Vector3::new(-0.125, 0.16666667, 0.72916667);
    let settings = settings(2, Vector3::new(1.0, 2.0, 3.0).norm() * 1e-6);

    let mut f = DVector::zeros(3);
    let mut x = DVector::zeros(3);
    let mut dx = DVector::zeros(3);

    let outcome = newton(
        MockLinearVectorFunction,
        &mut x,
        &mut f,
        &mut dx,
        settings,
        &mut BacktrackingLineSearch::default(),
    )
    .expect("Newton iterations must succeed");
    let diff = x - expected_solution;
    assert!(diff.norm() < 1e-6);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.residual_norm, f.norm());
}

#[test]
fn newton_converges_for_cubic() {
    let mut f = DVector::zeros(2);
    let mut x = DVector::from_column_slice(&[1.0, 5.0]);
    let mut dx = DVector::zeros(2);

    let outcome = newton(
        Cubic,
        &mut x,
        &mut f,
        &mut dx,
        settings(50, 1e-10),
        &mut BacktrackingLineSearch::default(),
    )
    .unwrap();
    assert!(outcome.iterations > 1);
    assert!(outcome.residual_norm <= 1e-10);
    assert!((x[0] - 2.0).abs() < 1e-8);
    assert!((x[1] - 2.0).abs() < 1e-8);
}

#[test]
fn newton_takes_no_step_at_a_root() {
    let mut f = DVector::zeros(2);
    let mut x = DVector::from_column_slice(&[2.0, 2.0]);
    let mut dx = DVector::zeros(2);

    let outcome = newton(Cubic, &mut x, &mut f, &mut dx, settings(0, 1e-12), &mut BacktrackingLineSearch::default())
        .unwrap();
    assert_eq!(outcome.iterations, 0);
    assert_eq!(x, DVector::from_column_slice(&[2.0, 2.0]));
}

#[test]
fn newton_reports_missed_convergence() {
    let mut f = DVector::zeros(2);
    let mut x = DVector::from_column_slice(&[1.0, 5.0]);
    let mut dx = DVector::zeros(2);

    let result = newton(Cubic, &mut x, &mut f, &mut dx, settings(1, 1e-12), &mut BacktrackingLineSearch::default());
    match result {
        Err(NewtonError::NotConverged {
            iterations,
            residual_norm,
        }) => {
            assert_eq!(iterations, 1);
            assert_eq!(residual_norm, f.norm());
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn newton_propagates_jacobian_error() {
    let mut f = DVector::zeros(2);
    let mut x = DVector::zeros(2);
    let mut dx = DVector::zeros(2);

    let result = newton(Cubic, &mut x, &mut f, &mut dx, settings(10, 1e-12), &mut BacktrackingLineSearch::default());
    assert!(matches!(result, Err(NewtonError::Jacobian(_))));
}

/// Like `Cubic`, but the residual is NaN for negative arguments.
struct CubicOnPositives;

impl VectorFunction<f64> for CubicOnPositives {
    fn dimension(&self) -> usize {
        1
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        f[0] = if x[0] < 0.0 { f64::NAN } else { x[0] * x[0] * x[0] - 8.0 };
    }
}

impl DifferentiableVectorFunction<f64> for CubicOnPositives {
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> Result<(), Box<dyn Error>> {
        sol[0] = rhs[0] / (3.0 * x[0] * x[0]);
        Ok(())
    }
}

#[test]
fn non_finite_residuals_stop_the_iteration() {
    let mut f = DVector::zeros(1);
    let mut x = DVector::from_element(1, -1.0);
    let mut dx = DVector::zeros(1);

    let result = newton(
        CubicOnPositives,
        &mut x,
        &mut f,
        &mut dx,
        settings(10, 1e-12),
        &mut BacktrackingLineSearch::default(),
    );
    assert!(matches!(result, Err(NewtonError::NonFiniteResidual { iterations: 0 })));
}

#[test]
fn backtracking_damps_steps_that_overshoot() {
    // From x = 0.1 the full Newton step overshoots to x > 266, far past the root
    let mut f = DVector::zeros(1);
    let mut x = DVector::from_element(1, 0.1);
    let mut dx = DVector::zeros(1);
    let mut line_search = BacktrackingLineSearch::default();

    newton(CubicOnPositives, &mut x, &mut f, &mut dx, settings(1, 0.0), &mut line_search).unwrap_err();
    assert!(x[0] > 0.1);
    assert!(x[0] < 266.0);

    let mut x = DVector::from_element(1, 0.1);
    newton(CubicOnPositives, &mut x, &mut f, &mut dx, settings(100, 1e-10), &mut line_search).unwrap();
    assert!((x[0] - 2.0).abs() < 1e-8);
}
