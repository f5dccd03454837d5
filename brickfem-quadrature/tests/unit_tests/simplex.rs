use brickfem_quadrature::simplex::{triangle, MAX_TRIANGLE_STRENGTH};
use brickfem_quadrature::{integrate, Error};
use matrixcompare::assert_scalar_eq;

fn factorial(n: i32) -> f64 {
    (1..=n).map(|i| i as f64).product()
}

/// Exact integral of x^a y^b over the unit triangle: a! b! / (a + b + 2)!
fn monomial_integral(a: i32, b: i32) -> f64 {
    factorial(a) * factorial(b) / factorial(a + b + 2)
}

#[test]
fn triangle_rules_integrate_monomials_exactly() {
    for strength in 0..=13 {
        let rule = triangle(strength).unwrap();
        assert!(rule.0.iter().all(|&w| w > 0.0));
        assert!(rule
            .1
            .iter()
            .all(|&[x, y]| x >= 0.0 && y >= 0.0 && x + y <= 1.0));

        for a in 0..=strength as i32 {
            for b in 0..=(strength as i32 - a) {
                let estimated = integrate(&rule, |&[x, y]| x.powi(a) * y.powi(b));
                assert_scalar_eq!(estimated, monomial_integral(a, b), comp = abs, tol = 1e-14);
            }
        }
    }
}

#[test]
fn triangle_rule_rejects_excessive_strength() {
    assert_eq!(triangle(MAX_TRIANGLE_STRENGTH + 1), Err(Error::NoRuleAvailable));
}
