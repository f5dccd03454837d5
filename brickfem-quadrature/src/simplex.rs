//! Quadrature rules for the unit triangle.
//!
//! The rules are obtained by collapsing a tensor Gauss rule on the unit square onto the
//! triangle with the map `(u, v) -> (u, v (1 - u))`, whose Jacobian determinant is `1 - u`.
//! A polynomial of total degree `k` on the triangle pulls back to a polynomial of degree at most
//! `k + 1` in `u` and `k` in `v`, so a rule with `n` points per direction is exact whenever
//! `2 n - 1 >= k + 1`.

use crate::univariate::unit_interval_gauss;
use crate::{gauss_points_for_strength, Error, Rule};

/// Largest strength for which a triangle rule is generated.
pub const MAX_TRIANGLE_STRENGTH: usize = 40;

/// A collapsed Gauss rule on the unit triangle integrating all polynomials of total degree
/// `strength` exactly.
pub fn triangle(strength: usize) -> Result<Rule<2>, Error> {
    if strength > MAX_TRIANGLE_STRENGTH {
        return Err(Error::NoRuleAvailable);
    }

    let n = gauss_points_for_strength(strength + 1);
    let (weights1d, points1d) = unit_interval_gauss(n);

    let mut weights = Vec::with_capacity(n * n);
    let mut points = Vec::with_capacity(n * n);
    for (&wu, &[u]) in weights1d.iter().zip(&points1d) {
        for (&wv, &[v]) in weights1d.iter().zip(&points1d) {
            weights.push(wu * wv * (1.0 - u));
            points.push([u, v * (1.0 - u)]);
        }
    }

    Ok((weights, points))
}
