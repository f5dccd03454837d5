//! Quadrature rules for finite element reference domains.
//!
//! Rules are returned as plain `f64` weights and points so that the crate can be used without
//! any linear algebra library. Two families of reference domains are supported:
//!
//! - the symmetric domains `[-1, 1]^d` used by the classic Gauss tables, and
//! - the unit domains `[0, 1]`, `[0, 1]^2` and the unit triangle with corners
//!   `(0, 0)`, `(1, 0)`, `(0, 1)`, which are the reference convexes of `brickfem`.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod simplex;
pub mod tensor;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates that a rule satisfying the given requirements is not available.
    NoRuleAvailable,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleAvailable => {
                write!(f, "There is no quadrature rule satisfying the requirements available")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A two-dimensional point.
pub type Point2 = Point<2>;

/// A D-dimensional rule.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional quadrature rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// Approximates the integral of `f` with the given rule.
pub fn integrate<const D: usize, F>(rule: &Rule<D>, f: F) -> f64
where
    F: Fn(&Point<D>) -> f64,
{
    let (weights, points) = rule;
    weights
        .iter()
        .zip(points)
        .map(|(w, p)| w * f(p))
        .sum()
}

/// Number of Gauss points needed to integrate univariate polynomials of the given degree exactly.
pub fn gauss_points_for_strength(strength: usize) -> usize {
    // n Gauss points are exact up to degree 2n - 1
    (strength + 2) / 2
}
