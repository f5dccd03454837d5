//! Finite element spaces on meshes and their dof numbering.
use crate::element::{DofLocation, FemDescriptor, LagrangeElement, ReferenceFiniteElement};
use crate::error::{ModelError, Result};
use crate::geometry::ConvexGeometry;
use crate::mesh::{Mesh, RegionId};
use nalgebra::{DVector, Point2};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Identifies a basic dof independently of the convex it is seen from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum DofKey {
    Vertex(usize),
    /// Edge dof between global vertices `a < b`, `position` steps of `1/divisions` from `a`.
    Edge {
        a: usize,
        b: usize,
        position: usize,
        divisions: usize,
    },
    Interior {
        convex: usize,
        index: usize,
    },
}

/// A finite element space on a mesh.
///
/// Every convex carries at most one finite element. Basic dofs are numbered by visiting
/// convexes in index order and the local dofs of each element in their intrinsic order; dofs on
/// shared vertices and edges are merged. A space of field dimension `qdim` has
/// `qdim * nb_basic_dof()` dofs, and component `c` of basic dof `b` is dof `qdim * b + c`.
#[derive(Debug, Clone)]
pub struct MeshFem<'m> {
    mesh: &'m Mesh,
    qdim: usize,
    fems: Vec<Option<FemDescriptor>>,
    elements: Vec<Option<Arc<LagrangeElement>>>,
    convex_dofs: Vec<Vec<usize>>,
    dof_points: Vec<Point2<f64>>,
}

impl<'m> MeshFem<'m> {
    /// Creates a space without any element.
    ///
    /// # Panics
    ///
    /// Panics if `qdim == 0`.
    pub fn new(mesh: &'m Mesh, qdim: usize) -> Self {
        assert!(qdim >= 1, "Field dimension must be at least 1");
        let n = mesh.num_convexes();
        Self {
            mesh,
            qdim,
            fems: vec![None; n],
            elements: vec![None; n],
            convex_dofs: vec![Vec::new(); n],
            dof_points: Vec::new(),
        }
    }

    /// Creates a space with the same element on every convex.
    pub fn with_fem(mesh: &'m Mesh, qdim: usize, fem: FemDescriptor) -> Result<Self> {
        let mut mf = Self::new(mesh, qdim);
        mf.set_fem(fem)?;
        Ok(mf)
    }

    pub fn mesh(&self) -> &'m Mesh {
        self.mesh
    }

    pub fn qdim(&self) -> usize {
        self.qdim
    }

    /// Assigns the element to every convex of the mesh.
    pub fn set_fem(&mut self, fem: FemDescriptor) -> Result<()> {
        let convexes: Vec<_> = (0..self.mesh.num_convexes()).collect();
        self.set_fem_on(&convexes, fem)
    }

    /// Assigns the element to the given convexes.
    ///
    /// Nothing is changed if any convex is invalid or incompatible with the element.
    pub fn set_fem_on(&mut self, convexes: &[usize], fem: FemDescriptor) -> Result<()> {
        for &convex in convexes {
            let kind = self.mesh.convex(convex)?.kind();
            if kind != fem.convex_kind() {
                return Err(ModelError::IncompatibleElement(format!(
                    "{} cannot be used on convex {} of kind {:?}",
                    fem, convex, kind
                )));
            }
        }

        let element = self
            .elements
            .iter()
            .zip(&self.fems)
            .find(|(_, existing)| **existing == Some(fem))
            .and_then(|(element, _)| element.clone())
            .unwrap_or_else(|| Arc::new(fem.reference_element()));
        for &convex in convexes {
            self.fems[convex] = Some(fem);
            self.elements[convex] = Some(element.clone());
        }
        self.enumerate_dofs()
    }

    fn enumerate_dofs(&mut self) -> Result<()> {
        let mut keys: FxHashMap<DofKey, usize> = FxHashMap::default();
        let mut dof_points = Vec::new();
        let mut convex_dofs = Vec::with_capacity(self.elements.len());

        for (convex_index, (element, fem)) in self.elements.iter().zip(&self.fems).enumerate() {
            let (element, fem) = match (element, fem) {
                (Some(element), Some(fem)) => (element, fem),
                _ => {
                    convex_dofs.push(Vec::new());
                    continue;
                }
            };
            let convex = self.mesh.convex(convex_index)?;
            let geometry = ConvexGeometry::from_mesh(self.mesh, convex_index)?;
            let k = element.degree();

            let mut dofs = Vec::with_capacity(element.num_nodes());
            for (local, (location, node)) in element.dof_locations().iter().zip(element.nodes()).enumerate() {
                let key = match *location {
                    _ if fem.is_discontinuous() => DofKey::Interior {
                        convex: convex_index,
                        index: local,
                    },
                    DofLocation::Vertex(v) => DofKey::Vertex(convex.vertices()[v]),
                    DofLocation::Edge { face, position } => {
                        let [a, b] = convex.face_vertices(face);
                        if a < b {
                            DofKey::Edge {
                                a,
                                b,
                                position,
                                divisions: k,
                            }
                        } else {
                            DofKey::Edge {
                                a: b,
                                b: a,
                                position: k - position,
                                divisions: k,
                            }
                        }
                    }
                    DofLocation::Interior => DofKey::Interior {
                        convex: convex_index,
                        index: local,
                    },
                };
                let next_index = dof_points.len();
                let dof = *keys.entry(key).or_insert_with(|| {
                    dof_points.push(geometry.map_reference_coords(node));
                    next_index
                });
                dofs.push(dof);
            }
            convex_dofs.push(dofs);
        }

        self.convex_dofs = convex_dofs;
        self.dof_points = dof_points;
        Ok(())
    }

    pub fn nb_basic_dof(&self) -> usize {
        self.dof_points.len()
    }

    pub fn nb_dof(&self) -> usize {
        self.qdim * self.nb_basic_dof()
    }

    pub fn fem_of_convex(&self, convex: usize) -> Option<FemDescriptor> {
        self.fems.get(convex).copied().flatten()
    }

    pub fn element_of_convex(&self, convex: usize) -> Option<&LagrangeElement> {
        self.elements.get(convex).and_then(|element| element.as_deref())
    }

    /// Convexes that carry an element, in index order.
    pub fn convexes_with_element(&self) -> impl Iterator<Item = usize> + '_ {
        self.fems
            .iter()
            .enumerate()
            .filter_map(|(i, fem)| fem.map(|_| i))
    }

    /// Basic dofs of a convex in the local order of its element. Empty if the convex has no element.
    pub fn basic_dofs_of_convex(&self, convex: usize) -> &[usize] {
        self.convex_dofs.get(convex).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Dofs of a convex, node by node with components innermost.
    pub fn dofs_of_convex(&self, convex: usize) -> Vec<usize> {
        let q = self.qdim;
        self.basic_dofs_of_convex(convex)
            .iter()
            .flat_map(|&b| (0..q).map(move |c| q * b + c))
            .collect()
    }

    pub fn point_of_basic_dof(&self, dof: usize) -> Result<Point2<f64>> {
        self.dof_points.get(dof).copied().ok_or_else(|| {
            ModelError::InvalidEntity(format!(
                "basic dof {} does not exist (space has {})",
                dof,
                self.nb_basic_dof()
            ))
        })
    }

    pub fn basic_dof_points(&self) -> &[Point2<f64>] {
        &self.dof_points
    }

    /// Sorted basic dofs lying on the faces of the region or belonging to its convexes.
    pub fn basic_dofs_on_region(&self, region: RegionId) -> Result<Vec<usize>> {
        Ok(self
            .basic_dof_witnesses_on_region(region)?
            .into_iter()
            .map(|(dof, _, _)| dof)
            .collect())
    }

    /// Sorted dofs (all components) lying on the region.
    pub fn dofs_on_region(&self, region: RegionId) -> Result<Vec<usize>> {
        let q = self.qdim;
        Ok(self
            .basic_dofs_on_region(region)?
            .into_iter()
            .flat_map(|b| (0..q).map(move |c| q * b + c))
            .collect())
    }

    /// Basic dofs on the region, each with a convex and local node index where it appears.
    pub(crate) fn basic_dof_witnesses_on_region(&self, region: RegionId) -> Result<Vec<(usize, usize, usize)>> {
        let region = self.mesh.region(region)?;
        let mut witnesses = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut visit = |dof: usize, convex: usize, local: usize| {
            if seen.insert(dof) {
                witnesses.insert((dof, convex, local));
            }
        };

        for face in region.faces() {
            if let Some(element) = self.element_of_convex(face.convex) {
                let dofs = self.basic_dofs_of_convex(face.convex);
                for local in element.nodes_on_face(face.face) {
                    visit(dofs[local], face.convex, local);
                }
            }
        }
        for &convex in region.convexes() {
            for (local, &dof) in self.basic_dofs_of_convex(convex).iter().enumerate() {
                visit(dof, convex, local);
            }
        }
        Ok(witnesses.into_iter().collect())
    }

    /// Interpolates `f` at the dof points.
    ///
    /// `f` must return `qdim` components, which are stored at the dofs of each basic dof.
    pub fn eval<F, R>(&self, f: F) -> Result<DVector<f64>>
    where
        F: Fn(&Point2<f64>) -> R,
        R: AsRef<[f64]>,
    {
        let q = self.qdim;
        let mut values = DVector::zeros(self.nb_dof());
        for (b, point) in self.dof_points.iter().enumerate() {
            let value = f(point);
            let value = value.as_ref();
            if value.len() != q {
                return Err(ModelError::InvalidArgument(format!(
                    "expression returned {} components, expected {}",
                    value.len(),
                    q
                )));
            }
            values.rows_mut(q * b, q).copy_from_slice(value);
        }
        Ok(values)
    }

    /// Evaluates the field with the given dof values at the reference point `xi` of a convex.
    ///
    /// `values` may hold any number `n` of components per basic dof; the result has `n` entries.
    pub fn evaluate_reference(&self, values: &DVector<f64>, convex: usize, xi: &Point2<f64>) -> Result<DVector<f64>> {
        let n = self.components_of(values)?;
        let element = self
            .element_of_convex(convex)
            .ok_or_else(|| ModelError::InvalidEntity(format!("convex {} has no finite element", convex)))?;
        let mut phi = vec![0.0; element.num_nodes()];
        element.populate_basis(&mut phi, xi);
        let mut result = DVector::zeros(n);
        for (&b, phi_i) in self.basic_dofs_of_convex(convex).iter().zip(&phi) {
            result += values.rows(n * b, n) * *phi_i;
        }
        Ok(result)
    }

    /// Evaluates the field with the given dof values at a physical point inside `convex`.
    pub fn interpolate_at(&self, values: &DVector<f64>, convex: usize, point: &Point2<f64>) -> Result<DVector<f64>> {
        let geometry = ConvexGeometry::from_mesh(self.mesh, convex)?;
        let xi = geometry.inverse_map(point)?;
        self.evaluate_reference(values, convex, &xi)
    }

    fn components_of(&self, values: &DVector<f64>) -> Result<usize> {
        let nb = self.nb_basic_dof();
        if nb == 0 || values.len() % nb != 0 || values.len() == 0 {
            return Err(ModelError::InvalidArgument(format!(
                "{} values do not match a space with {} basic dofs",
                values.len(),
                nb
            )));
        }
        Ok(values.len() / nb)
    }
}
