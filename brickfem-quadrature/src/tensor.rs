//! 2D quadrature rules formed by tensor products of 1D rules.

use crate::univariate::{gauss, unit_interval_gauss};
use crate::Rule;

fn tensor_product(rule1d: Rule<1>) -> Rule<2> {
    let (weights1d, points1d) = rule1d;
    let n = weights1d.len();
    let mut weights2d = Vec::with_capacity(n * n);
    let mut points2d = Vec::with_capacity(n * n);

    let rule1d_iter = || weights1d.iter().zip(&points1d);

    for (&wx, &[x]) in rule1d_iter() {
        for (&wy, &[y]) in rule1d_iter() {
            weights2d.push(wx * wy);
            points2d.push([x, y]);
        }
    }

    (weights2d, points2d)
}

/// A Gauss quadrature rule for the quadrilateral `[-1, 1]^2`, with the provided number of
/// points per dimension.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    tensor_product(gauss(num_points_per_dim))
}

/// A Gauss quadrature rule for the unit square `[0, 1]^2`, with the provided number of
/// points per dimension.
pub fn unit_square_gauss(num_points_per_dim: usize) -> Rule<2> {
    tensor_product(unit_interval_gauss(num_points_per_dim))
}
