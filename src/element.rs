//! Finite element descriptors and Lagrange reference elements.
use crate::error::{ModelError, Result};
use crate::mesh::ConvexKind;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

mod quadrilateral;
mod triangle;

pub use quadrilateral::QuadrilateralLagrange;
pub use triangle::TriangleLagrange;

pub const MAX_PK_DEGREE: usize = 4;
pub const MAX_QK_DEGREE: usize = 3;

/// Splits a descriptor such as `FEM_PK(2, 1)` into its upper-cased name and integer arguments.
pub(crate) fn parse_descriptor(descriptor: &str) -> Option<(String, Vec<usize>)> {
    let compact: String = descriptor.chars().filter(|c| !c.is_whitespace()).collect();
    let open = compact.find('(')?;
    let args = compact[open..].strip_prefix('(')?.strip_suffix(')')?;
    let name = compact[..open].to_ascii_uppercase();
    let args = if args.is_empty() {
        Vec::new()
    } else {
        args.split(',')
            .map(|arg| arg.parse::<usize>().ok())
            .collect::<Option<Vec<_>>>()?
    };
    Some((name, args))
}

/// Identifies a finite element family and its parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FemDescriptor {
    /// Continuous Lagrange element of total degree `k` on triangles, `FEM_PK(2,k)`.
    Pk(usize),
    /// Discontinuous Lagrange element of total degree `k` on triangles, `FEM_PK_DISCONTINUOUS(2,k)`.
    PkDiscontinuous(usize),
    /// Continuous tensor-product Lagrange element of degree `k` on quadrilaterals, `FEM_QK(2,k)`.
    Qk(usize),
}

impl FemDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let unknown = || ModelError::UnknownFamily(descriptor.to_string());
        let (name, args) = parse_descriptor(descriptor).ok_or_else(unknown)?;
        match (name.as_str(), args.as_slice()) {
            ("FEM_PK", &[2, k]) if k <= MAX_PK_DEGREE => Ok(Self::Pk(k)),
            ("FEM_PK_DISCONTINUOUS", &[2, k]) if k <= MAX_PK_DEGREE => Ok(Self::PkDiscontinuous(k)),
            ("FEM_QK", &[2, k]) if (1..=MAX_QK_DEGREE).contains(&k) => Ok(Self::Qk(k)),
            _ => Err(unknown()),
        }
    }

    pub fn degree(&self) -> usize {
        match *self {
            Self::Pk(k) | Self::PkDiscontinuous(k) | Self::Qk(k) => k,
        }
    }

    pub fn convex_kind(&self) -> ConvexKind {
        match self {
            Self::Pk(_) | Self::PkDiscontinuous(_) => ConvexKind::Triangle,
            Self::Qk(_) => ConvexKind::Quadrilateral,
        }
    }

    /// Whether every dof of the element is private to its convex.
    pub fn is_discontinuous(&self) -> bool {
        matches!(self, Self::PkDiscontinuous(_))
    }

    pub fn reference_element(&self) -> LagrangeElement {
        match *self {
            Self::Pk(k) | Self::PkDiscontinuous(k) => LagrangeElement::Triangle(TriangleLagrange::new(k)),
            Self::Qk(k) => LagrangeElement::Quadrilateral(QuadrilateralLagrange::new(k)),
        }
    }
}

impl Display for FemDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pk(k) => write!(f, "FEM_PK(2,{})", k),
            Self::PkDiscontinuous(k) => write!(f, "FEM_PK_DISCONTINUOUS(2,{})", k),
            Self::Qk(k) => write!(f, "FEM_QK(2,{})", k),
        }
    }
}

impl FromStr for FemDescriptor {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FemDescriptor {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<FemDescriptor> for String {
    fn from(desc: FemDescriptor) -> Self {
        desc.to_string()
    }
}

/// Topological entity of the reference convex that carries a local dof.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DofLocation {
    /// The dof sits on the given local vertex.
    Vertex(usize),
    /// The dof sits strictly inside the given local face, `position` steps of `1/degree` away
    /// from the first vertex of the face.
    Edge { face: usize, position: usize },
    Interior,
}

/// A reference finite element with nodal basis functions.
pub trait ReferenceFiniteElement {
    fn num_nodes(&self) -> usize;

    /// Evaluates all basis functions at the reference point `xi`.
    fn populate_basis(&self, basis_values: &mut [f64], xi: &Point2<f64>);

    /// Evaluates the reference gradients of all basis functions at `xi`.
    fn populate_basis_gradients(&self, basis_gradients: &mut [Vector2<f64>], xi: &Point2<f64>);
}

/// Lagrange element on one of the supported reference convexes.
#[derive(Debug, Clone, PartialEq)]
pub enum LagrangeElement {
    Triangle(TriangleLagrange),
    Quadrilateral(QuadrilateralLagrange),
}

impl LagrangeElement {
    pub fn convex_kind(&self) -> ConvexKind {
        match self {
            Self::Triangle(_) => ConvexKind::Triangle,
            Self::Quadrilateral(_) => ConvexKind::Quadrilateral,
        }
    }

    pub fn degree(&self) -> usize {
        match self {
            Self::Triangle(element) => element.degree(),
            Self::Quadrilateral(element) => element.degree(),
        }
    }

    /// Reference coordinates of the nodes, in the local dof order.
    pub fn nodes(&self) -> &[Point2<f64>] {
        match self {
            Self::Triangle(element) => element.nodes(),
            Self::Quadrilateral(element) => element.nodes(),
        }
    }

    pub fn dof_locations(&self) -> &[DofLocation] {
        match self {
            Self::Triangle(element) => element.dof_locations(),
            Self::Quadrilateral(element) => element.dof_locations(),
        }
    }

    /// Local indices of the nodes lying on the given face, including its vertices.
    pub fn nodes_on_face(&self, face: usize) -> Vec<usize> {
        let [a, b] = self.convex_kind().face_local_vertices(face);
        self.dof_locations()
            .iter()
            .enumerate()
            .filter(|(_, location)| match **location {
                DofLocation::Vertex(v) => v == a || v == b,
                DofLocation::Edge { face: f, .. } => f == face,
                DofLocation::Interior => false,
            })
            .map(|(i, _)| i)
            .collect()
    }
}

impl ReferenceFiniteElement for LagrangeElement {
    fn num_nodes(&self) -> usize {
        self.nodes().len()
    }

    fn populate_basis(&self, basis_values: &mut [f64], xi: &Point2<f64>) {
        match self {
            Self::Triangle(element) => element.populate_basis(basis_values, xi),
            Self::Quadrilateral(element) => element.populate_basis(basis_values, xi),
        }
    }

    fn populate_basis_gradients(&self, basis_gradients: &mut [Vector2<f64>], xi: &Point2<f64>) {
        match self {
            Self::Triangle(element) => element.populate_basis_gradients(basis_gradients, xi),
            Self::Quadrilateral(element) => element.populate_basis_gradients(basis_gradients, xi),
        }
    }
}

/// Evaluates `prod_{l < a} (k t - l) / (l + 1)` and its derivative with respect to `t`.
///
/// This is the one-dimensional factor of the barycentric Lagrange basis of degree `k`.
pub(crate) fn barycentric_factor(a: usize, k: usize, t: f64) -> (f64, f64) {
    let k = k as f64;
    let mut value = 1.0;
    let mut derivative = 0.0;
    for l in 0..a {
        let l = l as f64;
        let factor = (k * t - l) / (l + 1.0);
        let factor_derivative = k / (l + 1.0);
        derivative = derivative * factor + value * factor_derivative;
        value *= factor;
    }
    (value, derivative)
}
