//! Geometric transformations from reference convexes to the physical mesh.
use crate::error::{ModelError, Result};
use crate::mesh::{ConvexKind, Mesh};
use nalgebra::{Matrix2, Point2, Vector2};

/// The reference-to-physical map of a single convex.
///
/// Triangles are mapped affinely and quadrilaterals bilinearly.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexGeometry {
    kind: ConvexKind,
    vertices: Vec<Point2<f64>>,
}

impl ConvexGeometry {
    pub fn new(kind: ConvexKind, vertices: Vec<Point2<f64>>) -> Self {
        assert_eq!(vertices.len(), kind.num_vertices());
        Self { kind, vertices }
    }

    pub fn from_mesh(mesh: &Mesh, convex: usize) -> Result<Self> {
        let kind = mesh.convex(convex)?.kind();
        Ok(Self::new(kind, mesh.convex_points(convex)?))
    }

    pub fn kind(&self) -> ConvexKind {
        self.kind
    }

    pub fn vertices(&self) -> &[Point2<f64>] {
        &self.vertices
    }

    pub fn map_reference_coords(&self, xi: &Point2<f64>) -> Point2<f64> {
        let v = &self.vertices;
        match self.kind {
            ConvexKind::Triangle => v[0] + (v[1] - v[0]) * xi.x + (v[2] - v[0]) * xi.y,
            ConvexKind::Quadrilateral => {
                let (s, t) = (xi.x, xi.y);
                let coords = v[0].coords * ((1.0 - s) * (1.0 - t))
                    + v[1].coords * (s * (1.0 - t))
                    + v[2].coords * (s * t)
                    + v[3].coords * ((1.0 - s) * t);
                Point2::from(coords)
            }
        }
    }

    /// Jacobian of the reference-to-physical map at `xi`.
    pub fn reference_jacobian(&self, xi: &Point2<f64>) -> Matrix2<f64> {
        let v = &self.vertices;
        match self.kind {
            ConvexKind::Triangle => Matrix2::from_columns(&[v[1] - v[0], v[2] - v[0]]),
            ConvexKind::Quadrilateral => {
                let (s, t) = (xi.x, xi.y);
                let d_ds = (v[1] - v[0]) * (1.0 - t) + (v[2] - v[3]) * t;
                let d_dt = (v[3] - v[0]) * (1.0 - s) + (v[2] - v[1]) * s;
                Matrix2::from_columns(&[d_ds, d_dt])
            }
        }
    }

    /// Reference coordinates of the point on `face` at parameter `t` in `[0, 1]`, together with
    /// the reference tangent `d xi / dt`.
    pub fn reference_face_point(&self, face: usize, t: f64) -> (Point2<f64>, Vector2<f64>) {
        let [a, b] = self.kind.face_local_vertices(face);
        let reference = self.kind.reference_vertices();
        let tangent = reference[b] - reference[a];
        (reference[a] + tangent * t, tangent)
    }

    /// Finds the reference coordinates of the physical point `x` with Newton's method.
    pub fn inverse_map(&self, x: &Point2<f64>) -> Result<Point2<f64>> {
        let mut xi = match self.kind {
            ConvexKind::Triangle => Point2::new(1.0 / 3.0, 1.0 / 3.0),
            ConvexKind::Quadrilateral => Point2::new(0.5, 0.5),
        };
        let scale = (self.vertices[1] - self.vertices[0]).norm().max(f64::MIN_POSITIVE);
        for _ in 0..25 {
            let r = self.map_reference_coords(&xi) - x;
            if r.norm() <= 1e-13 * scale {
                return Ok(xi);
            }
            let j = self.reference_jacobian(&xi);
            let step = j
                .lu()
                .solve(&r)
                .ok_or_else(|| ModelError::InvalidEntity("degenerate convex geometry".to_string()))?;
            xi -= step;
        }
        Err(ModelError::InvalidArgument(format!(
            "failed to locate point {:?} in reference coordinates",
            x
        )))
    }
}

/// Physical gradients `J^{-T} grad_ref` for all reference gradients, written back in place.
///
/// Returns `|det J|`.
pub(crate) fn transform_gradients(jacobian: &Matrix2<f64>, gradients: &mut [Vector2<f64>]) -> eyre::Result<f64> {
    let det = jacobian.determinant();
    if det == 0.0 || !det.is_finite() {
        return Err(eyre::eyre!("singular reference Jacobian (det = {})", det));
    }
    let j_inv_t = jacobian
        .try_inverse()
        .ok_or_else(|| eyre::eyre!("singular reference Jacobian"))?
        .transpose();
    for grad in gradients.iter_mut() {
        *grad = j_inv_t * *grad;
    }
    Ok(det.abs())
}
