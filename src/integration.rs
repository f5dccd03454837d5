//! Integration methods: per-convex quadrature descriptors and cached rules.
use crate::element::parse_descriptor;
use crate::error::{ModelError, Result};
use crate::mesh::{ConvexKind, Mesh};
use brickfem_quadrature::{gauss_points_for_strength, simplex, tensor, univariate};
use nalgebra::Point2;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

/// Identifies a quadrature family and its exactness degree.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum IntegrationDescriptor {
    /// Rule on the reference triangle exact for polynomials of total degree `k`, `IM_TRIANGLE(k)`.
    Triangle(usize),
    /// Tensor Gauss rule on the reference square exact to degree `k` in each direction,
    /// `IM_GAUSS_PARALLELEPIPED(2,k)`.
    GaussParallelepiped(usize),
    /// Gauss rule on a segment exact to degree `k`, `IM_GAUSS1D(k)`. Only usable on faces.
    Gauss1d(usize),
}

impl IntegrationDescriptor {
    pub fn parse(descriptor: &str) -> Result<Self> {
        let unknown = || ModelError::UnknownFamily(descriptor.to_string());
        let (name, args) = parse_descriptor(descriptor).ok_or_else(unknown)?;
        match (name.as_str(), args.as_slice()) {
            ("IM_TRIANGLE", &[k]) if k <= simplex::MAX_TRIANGLE_STRENGTH => Ok(Self::Triangle(k)),
            ("IM_GAUSS_PARALLELEPIPED", &[2, k]) => Ok(Self::GaussParallelepiped(k)),
            ("IM_GAUSS1D", &[k]) => Ok(Self::Gauss1d(k)),
            _ => Err(unknown()),
        }
    }

    pub fn degree(&self) -> usize {
        match *self {
            Self::Triangle(k) | Self::GaussParallelepiped(k) | Self::Gauss1d(k) => k,
        }
    }

    /// The reference convex the rule is defined on, or `None` for segment rules.
    pub fn convex_kind(&self) -> Option<ConvexKind> {
        match self {
            Self::Triangle(_) => Some(ConvexKind::Triangle),
            Self::GaussParallelepiped(_) => Some(ConvexKind::Quadrilateral),
            Self::Gauss1d(_) => None,
        }
    }

    fn build_rule(&self) -> Result<QuadratureRule> {
        let (weights, points) = match *self {
            Self::Triangle(k) => simplex::triangle(k)
                .map_err(|err| ModelError::UnknownFamily(format!("{}: {}", self, err)))?,
            Self::GaussParallelepiped(k) => tensor::unit_square_gauss(gauss_points_for_strength(k)),
            Self::Gauss1d(_) => {
                return Err(ModelError::IncompatibleElement(format!(
                    "{} cannot integrate over a two-dimensional convex",
                    self
                )))
            }
        };
        let (face_weights, face_points) = univariate::unit_interval_gauss(gauss_points_for_strength(self.degree()));
        Ok(QuadratureRule {
            weights,
            points: points.into_iter().map(|[x, y]| Point2::new(x, y)).collect(),
            face_weights,
            face_points: face_points.into_iter().map(|[t]| t).collect(),
        })
    }
}

impl Display for IntegrationDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Triangle(k) => write!(f, "IM_TRIANGLE({})", k),
            Self::GaussParallelepiped(k) => write!(f, "IM_GAUSS_PARALLELEPIPED(2,{})", k),
            Self::Gauss1d(k) => write!(f, "IM_GAUSS1D({})", k),
        }
    }
}

impl FromStr for IntegrationDescriptor {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for IntegrationDescriptor {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<IntegrationDescriptor> for String {
    fn from(desc: IntegrationDescriptor) -> Self {
        desc.to_string()
    }
}

/// Volume and face quadrature on a reference convex.
///
/// The face rule is a Gauss rule on `[0, 1]` with the same exactness degree as the volume rule.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule {
    weights: Vec<f64>,
    points: Vec<Point2<f64>>,
    face_weights: Vec<f64>,
    face_points: Vec<f64>,
}

impl QuadratureRule {
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    /// Weights of the face rule on the parameter interval `[0, 1]`.
    pub fn face_weights(&self) -> &[f64] {
        &self.face_weights
    }

    /// Points of the face rule on the parameter interval `[0, 1]`.
    pub fn face_parameters(&self) -> &[f64] {
        &self.face_points
    }
}

/// Integration methods assigned to the convexes of a mesh.
#[derive(Debug, Clone)]
pub struct MeshIm<'m> {
    mesh: &'m Mesh,
    methods: Vec<Option<IntegrationDescriptor>>,
    rules: FxHashMap<IntegrationDescriptor, Arc<QuadratureRule>>,
}

impl<'m> MeshIm<'m> {
    pub fn new(mesh: &'m Mesh) -> Self {
        Self {
            mesh,
            methods: vec![None; mesh.num_convexes()],
            rules: FxHashMap::default(),
        }
    }

    /// Creates an integration method with the same rule on every convex.
    pub fn with_method(mesh: &'m Mesh, method: IntegrationDescriptor) -> Result<Self> {
        let mut mim = Self::new(mesh);
        mim.set_integ(method)?;
        Ok(mim)
    }

    pub fn mesh(&self) -> &'m Mesh {
        self.mesh
    }

    pub fn set_integ(&mut self, method: IntegrationDescriptor) -> Result<()> {
        let convexes: Vec<_> = (0..self.mesh.num_convexes()).collect();
        self.set_integ_on(&convexes, method)
    }

    /// Assigns the rule to the given convexes.
    ///
    /// No check is made that the rule is accurate enough for the elements it will integrate.
    pub fn set_integ_on(&mut self, convexes: &[usize], method: IntegrationDescriptor) -> Result<()> {
        for &convex in convexes {
            let kind = self.mesh.convex(convex)?.kind();
            if method.convex_kind() != Some(kind) {
                return Err(ModelError::IncompatibleElement(format!(
                    "{} cannot be used on convex {} of kind {:?}",
                    method, convex, kind
                )));
            }
        }
        if !self.rules.contains_key(&method) {
            self.rules.insert(method, Arc::new(method.build_rule()?));
        }
        for &convex in convexes {
            self.methods[convex] = Some(method);
        }
        Ok(())
    }

    pub fn integration_of_convex(&self, convex: usize) -> Option<IntegrationDescriptor> {
        self.methods.get(convex).copied().flatten()
    }

    /// The quadrature rule of a convex.
    pub fn rule_of_convex(&self, convex: usize) -> Result<&QuadratureRule> {
        self.integration_of_convex(convex)
            .and_then(|method| self.rules.get(&method))
            .map(|rule| rule.as_ref())
            .ok_or(ModelError::MissingIntegrationMethod { convex })
    }

    /// Number of distinct rules in use.
    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }
}
