use crate::element::{barycentric_factor, DofLocation, ReferenceFiniteElement};
use nalgebra::{Point2, Vector2};

/// Lagrange element of total degree `k` on the reference triangle `(0, 0)`, `(1, 0)`, `(0, 1)`.
///
/// Nodes are the equispaced lattice points, ordered as vertices, then face interiors (face by
/// face, from the first to the second vertex of each face), then the element interior.
/// For `k = 0` the single node is the centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleLagrange {
    degree: usize,
    // Barycentric multi-indices (a0, a1, a2) with a0 + a1 + a2 = degree
    multi_indices: Vec<[usize; 3]>,
    nodes: Vec<Point2<f64>>,
    locations: Vec<DofLocation>,
}

impl TriangleLagrange {
    pub fn new(degree: usize) -> Self {
        let k = degree;
        let mut multi_indices = Vec::new();
        let mut locations = Vec::new();

        if k == 0 {
            multi_indices.push([0, 0, 0]);
            locations.push(DofLocation::Interior);
        } else {
            for vertex in 0..3 {
                let mut a = [0; 3];
                a[vertex] = k;
                multi_indices.push(a);
                locations.push(DofLocation::Vertex(vertex));
            }
            for face in 0..3 {
                let (start, end) = ((face + 1) % 3, (face + 2) % 3);
                for position in 1..k {
                    let mut a = [0; 3];
                    a[start] = k - position;
                    a[end] = position;
                    multi_indices.push(a);
                    locations.push(DofLocation::Edge { face, position });
                }
            }
            for a1 in 1..k {
                for a2 in 1..k {
                    if a1 + a2 < k {
                        multi_indices.push([k - a1 - a2, a1, a2]);
                        locations.push(DofLocation::Interior);
                    }
                }
            }
        }

        let nodes = if k == 0 {
            vec![Point2::new(1.0 / 3.0, 1.0 / 3.0)]
        } else {
            multi_indices
                .iter()
                .map(|a| Point2::new(a[1] as f64 / k as f64, a[2] as f64 / k as f64))
                .collect()
        };

        Self {
            degree,
            multi_indices,
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

    fn barycentric(xi: &Point2<f64>) -> [f64; 3] {
        [1.0 - xi.x - xi.y, xi.x, xi.y]
    }
}

impl ReferenceFiniteElement for TriangleLagrange {
    fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn populate_basis(&self, basis_values: &mut [f64], xi: &Point2<f64>) {
        assert_eq!(basis_values.len(), self.num_nodes());
        let lambda = Self::barycentric(xi);
        for (phi, a) in basis_values.iter_mut().zip(&self.multi_indices) {
            *phi = (0..3)
                .map(|m| barycentric_factor(a[m], self.degree, lambda[m]).0)
                .product();
        }
    }

    fn populate_basis_gradients(&self, basis_gradients: &mut [Vector2<f64>], xi: &Point2<f64>) {
        assert_eq!(basis_gradients.len(), self.num_nodes());
        let lambda = Self::barycentric(xi);
        for (grad, a) in basis_gradients.iter_mut().zip(&self.multi_indices) {
            let factors: [(f64, f64); 3] = [0, 1, 2].map(|m| barycentric_factor(a[m], self.degree, lambda[m]));
            let (g0, d0) = factors[0];
            let (g1, d1) = factors[1];
            let (g2, d2) = factors[2];
            // Derivatives with respect to each barycentric coordinate
            let dl0 = d0 * g1 * g2;
            let dl1 = g0 * d1 * g2;
            let dl2 = g0 * g1 * d2;
            // lambda0 = 1 - x - y, lambda1 = x, lambda2 = y
            *grad = Vector2::new(dl1 - dl0, dl2 - dl0);
        }
    }
}
