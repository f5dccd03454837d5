use crate::element::{DofLocation, ReferenceFiniteElement};
use nalgebra::{Point2, Vector2};

/// Tensor-product Lagrange element of degree `k` on the reference square `[0, 1]^2`.
///
/// Nodes are ordered as vertices (counter-clockwise from the origin), then face interiors,
/// then the element interior in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadrilateralLagrange {
    degree: usize,
    // Lattice indices (i, j) of each node, with coordinates (i / k, j / k)
    lattice: Vec<[usize; 2]>,
    nodes: Vec<Point2<f64>>,
    locations: Vec<DofLocation>,
}

impl QuadrilateralLagrange {
    /// # Panics
    ///
    /// Panics if `degree == 0`.
    pub fn new(degree: usize) -> Self {
        assert!(degree >= 1, "Quadrilateral Lagrange elements need degree at least 1");
        let k = degree;
        let mut lattice = Vec::new();
        let mut locations = Vec::new();

        for (vertex, corner) in [[0, 0], [k, 0], [k, k], [0, k]].into_iter().enumerate() {
            lattice.push(corner);
            locations.push(DofLocation::Vertex(vertex));
        }
        for face in 0..4 {
            for position in 1..k {
                let index = match face {
                    0 => [position, 0],
                    1 => [k, position],
                    2 => [k - position, k],
                    _ => [0, k - position],
                };
                lattice.push(index);
                locations.push(DofLocation::Edge { face, position });
            }
        }
        for j in 1..k {
            for i in 1..k {
                lattice.push([i, j]);
                locations.push(DofLocation::Interior);
            }
        }

        let nodes = lattice
            .iter()
            .map(|&[i, j]| Point2::new(i as f64 / k as f64, j as f64 / k as f64))
            .collect();

        Self {
            degree,
            lattice,
            nodes,
            locations,
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn nodes(&self) -> &[Point2<f64>] {
        &self.nodes
    }

    pub fn dof_locations(&self) -> &[DofLocation] {
        &self.locations
    }

    /// Value and derivative of the 1D Lagrange polynomial attached to node `i / k`.
    fn lagrange_1d(&self, i: usize, t: f64) -> (f64, f64) {
        let k = self.degree;
        let ti = i as f64 / k as f64;
        let mut value = 1.0;
        let mut derivative = 0.0;
        for m in (0..=k).filter(|&m| m != i) {
            let tm = m as f64 / k as f64;
            let denom = ti - tm;
            derivative = derivative * (t - tm) / denom + value / denom;
            value *= (t - tm) / denom;
        }
        (value, derivative)
    }
}

impl ReferenceFiniteElement for QuadrilateralLagrange {
    fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn populate_basis(&self, basis_values: &mut [f64], xi: &Point2<f64>) {
        assert_eq!(basis_values.len(), self.num_nodes());
        for (phi, &[i, j]) in basis_values.iter_mut().zip(&self.lattice) {
            *phi = self.lagrange_1d(i, xi.x).0 * self.lagrange_1d(j, xi.y).0;
        }
    }

    fn populate_basis_gradients(&self, basis_gradients: &mut [Vector2<f64>], xi: &Point2<f64>) {
        assert_eq!(basis_gradients.len(), self.num_nodes());
        for (grad, &[i, j]) in basis_gradients.iter_mut().zip(&self.lattice) {
            let (lx, dx) = self.lagrange_1d(i, xi.x);
            let (ly, dy) = self.lagrange_1d(j, xi.y);
            *grad = Vector2::new(dx * ly, lx * dy);
        }
    }
}
