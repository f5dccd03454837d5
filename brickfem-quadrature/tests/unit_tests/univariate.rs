use brickfem_quadrature::integrate;
use brickfem_quadrature::univariate::{gauss, unit_interval_gauss};

use matrixcompare::assert_scalar_eq;

#[test]
fn gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=60 {
        let expected_polynomial_degree = 2 * n - 1;
        let rule = gauss(n);

        assert!(rule.0.iter().all(|&w| w > 0.0));

        for alpha in 0..=expected_polynomial_degree as i32 {
            let monomial_integral = (1.0 - (-1.0f64).powi(alpha + 1)) / (alpha as f64 + 1.0);
            let estimated_integral = integrate(&rule, |x| x[0].powi(alpha));

            assert_scalar_eq!(estimated_integral, monomial_integral, comp = abs, tol = 1e-13);
        }
    }
}

#[test]
fn unit_interval_rules_integrate_monomials() {
    for n in 1..=10 {
        let rule = unit_interval_gauss(n);
        assert!(rule.1.iter().all(|&[x]| x > 0.0 && x < 1.0));
        for alpha in 0..=(2 * n - 1) as i32 {
            let estimated_integral = integrate(&rule, |x| x[0].powi(alpha));
            assert_scalar_eq!(estimated_integral, 1.0 / (alpha as f64 + 1.0), comp = abs, tol = 1e-14);
        }
    }
}
