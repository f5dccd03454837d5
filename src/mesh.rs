//! Two-dimensional meshes made of triangles and quadrilaterals, with named regions.
use crate::error::{ModelError, Result};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub mod procedural;

/// Caller-chosen identifier of a mesh region.
pub type RegionId = usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConvexKind {
    Triangle,
    Quadrilateral,
}

impl ConvexKind {
    pub fn num_vertices(&self) -> usize {
        match self {
            Self::Triangle => 3,
            Self::Quadrilateral => 4,
        }
    }

    pub fn num_faces(&self) -> usize {
        self.num_vertices()
    }

    /// Local vertex indices of the given face, ordered counter-clockwise.
    ///
    /// Face `i` of a triangle is the edge opposite vertex `i`. Face `i` of a quadrilateral
    /// joins vertices `i` and `i + 1`.
    ///
    /// # Panics
    ///
    /// Panics if the face index is out of bounds.
    pub fn face_local_vertices(&self, face: usize) -> [usize; 2] {
        assert!(face < self.num_faces(), "Face index out of bounds");
        match self {
            Self::Triangle => [(face + 1) % 3, (face + 2) % 3],
            Self::Quadrilateral => [face, (face + 1) % 4],
        }
    }

    /// Vertices of the reference convex.
    pub fn reference_vertices(&self) -> &'static [Point2<f64>] {
        match self {
            Self::Triangle => &TRIANGLE_REFERENCE_VERTICES,
            Self::Quadrilateral => &QUADRILATERAL_REFERENCE_VERTICES,
        }
    }
}

static TRIANGLE_REFERENCE_VERTICES: [Point2<f64>; 3] = [
    Point2::new(0.0, 0.0),
    Point2::new(1.0, 0.0),
    Point2::new(0.0, 1.0),
];

static QUADRILATERAL_REFERENCE_VERTICES: [Point2<f64>; 4] = [
    Point2::new(0.0, 0.0),
    Point2::new(1.0, 0.0),
    Point2::new(1.0, 1.0),
    Point2::new(0.0, 1.0),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Convex {
    kind: ConvexKind,
    vertices: Vec<usize>,
}

impl Convex {
    pub fn kind(&self) -> ConvexKind {
        self.kind
    }

    pub fn vertices(&self) -> &[usize] {
        &self.vertices
    }

    /// Global vertex indices of the given face, in the orientation of this convex.
    pub fn face_vertices(&self, face: usize) -> [usize; 2] {
        let [a, b] = self.kind.face_local_vertices(face);
        [self.vertices[a], self.vertices[b]]
    }
}

/// A face of the mesh, identified by its convex and its local index within that convex.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FaceRef {
    pub convex: usize,
    pub face: usize,
}

impl FaceRef {
    pub fn new(convex: usize, face: usize) -> Self {
        Self { convex, face }
    }
}

/// A set of faces and convexes of a mesh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshRegion {
    faces: BTreeSet<FaceRef>,
    convexes: BTreeSet<usize>,
}

impl MeshRegion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_faces(faces: impl IntoIterator<Item = FaceRef>) -> Self {
        Self {
            faces: faces.into_iter().collect(),
            convexes: BTreeSet::new(),
        }
    }

    pub fn from_convexes(convexes: impl IntoIterator<Item = usize>) -> Self {
        Self {
            faces: BTreeSet::new(),
            convexes: convexes.into_iter().collect(),
        }
    }

    pub fn add_face(&mut self, face: FaceRef) {
        self.faces.insert(face);
    }

    pub fn add_convex(&mut self, convex: usize) {
        self.convexes.insert(convex);
    }

    /// Faces of the region in sorted order.
    pub fn faces(&self) -> impl Iterator<Item = &FaceRef> {
        self.faces.iter()
    }

    /// Convexes of the region in sorted order.
    pub fn convexes(&self) -> impl Iterator<Item = &usize> {
        self.convexes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty() && self.convexes.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    points: Vec<Point2<f64>>,
    convexes: Vec<Convex>,
    regions: BTreeMap<RegionId, MeshRegion>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mesh from points and `(kind, vertices)` pairs describing its convexes.
    pub fn from_points_and_convexes(
        points: Vec<Point2<f64>>,
        convexes: impl IntoIterator<Item = (ConvexKind, Vec<usize>)>,
    ) -> Result<Self> {
        let mut mesh = Self {
            points,
            ..Self::default()
        };
        for (kind, vertices) in convexes {
            mesh.add_convex(kind, &vertices)?;
        }
        Ok(mesh)
    }

    pub fn add_point(&mut self, point: Point2<f64>) -> usize {
        self.points.push(point);
        self.points.len() - 1
    }

    /// Adds a convex with vertices given in counter-clockwise order and returns its index.
    pub fn add_convex(&mut self, kind: ConvexKind, vertices: &[usize]) -> Result<usize> {
        if vertices.len() != kind.num_vertices() {
            return Err(ModelError::InvalidEntity(format!(
                "{:?} requires {} vertices, got {}",
                kind,
                kind.num_vertices(),
                vertices.len()
            )));
        }
        if let Some(v) = vertices.iter().find(|&&v| v >= self.points.len()) {
            return Err(ModelError::InvalidEntity(format!(
                "vertex {} does not exist (mesh has {} points)",
                v,
                self.points.len()
            )));
        }
        let distinct: BTreeSet<_> = vertices.iter().collect();
        if distinct.len() != vertices.len() {
            return Err(ModelError::InvalidEntity(format!("convex has repeated vertices {:?}", vertices)));
        }
        self.convexes.push(Convex {
            kind,
            vertices: vertices.to_vec(),
        });
        Ok(self.convexes.len() - 1)
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_convexes(&self) -> usize {
        self.convexes.len()
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    pub fn convexes(&self) -> &[Convex] {
        &self.convexes
    }

    pub fn convex(&self, index: usize) -> Result<&Convex> {
        self.convexes
            .get(index)
            .ok_or_else(|| ModelError::InvalidEntity(format!("convex {} does not exist", index)))
    }

    /// Coordinates of the vertices of a convex.
    pub fn convex_points(&self, index: usize) -> Result<Vec<Point2<f64>>> {
        let convex = self.convex(index)?;
        Ok(convex.vertices.iter().map(|&v| self.points[v]).collect())
    }

    /// Global vertex indices of a face, in the orientation of its convex.
    pub fn face_vertices(&self, face: FaceRef) -> Result<[usize; 2]> {
        let convex = self.convex(face.convex)?;
        if face.face >= convex.kind.num_faces() {
            return Err(ModelError::InvalidEntity(format!(
                "convex {} has no face {}",
                face.convex, face.face
            )));
        }
        Ok(convex.face_vertices(face.face))
    }

    /// Faces that belong to exactly one convex, in sorted order.
    pub fn outer_faces(&self) -> Vec<FaceRef> {
        // Count the number of occurrences of faces with the same (sorted) vertex indices.
        // A BTreeMap keeps the result independent of hashing.
        let mut counts: BTreeMap<[usize; 2], (FaceRef, usize)> = BTreeMap::new();
        for (convex_index, convex) in self.convexes.iter().enumerate() {
            for face in 0..convex.kind.num_faces() {
                let [a, b] = convex.face_vertices(face);
                let key = [a.min(b), a.max(b)];
                counts
                    .entry(key)
                    .and_modify(|(_, count)| *count += 1)
                    .or_insert((FaceRef::new(convex_index, face), 1));
            }
        }

        let mut faces: Vec<_> = counts
            .into_values()
            .filter(|&(_, count)| count == 1)
            .map(|(face, _)| face)
            .collect();
        faces.sort_unstable();
        faces
    }

    /// Outward unit normal of a face.
    pub fn normal_of_face(&self, face: FaceRef) -> Result<Vector2<f64>> {
        let [a, b] = self.face_vertices(face)?;
        let (pa, pb) = (self.points[a], self.points[b]);
        let tangent = pb - pa;
        let length = tangent.norm();
        if length == 0.0 {
            return Err(ModelError::InvalidEntity(format!("face {:?} is degenerate", face)));
        }
        let mut normal = Vector2::new(tangent.y, -tangent.x) / length;

        // Orient away from the centroid so that clockwise convexes are handled too
        let points = self.convex_points(face.convex)?;
        let centroid = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / points.len() as f64;
        let midpoint = (pa.coords + pb.coords) * 0.5;
        if normal.dot(&(midpoint - centroid)) < 0.0 {
            normal = -normal;
        }
        Ok(normal)
    }

    pub fn normal_of_faces(&self, faces: &[FaceRef]) -> Result<Vec<Vector2<f64>>> {
        faces.iter().map(|&face| self.normal_of_face(face)).collect()
    }

    /// Selects the faces whose outward normal is within `tol` of `normal`.
    pub fn faces_with_normal(&self, faces: &[FaceRef], normal: &Vector2<f64>, tol: f64) -> Result<Vec<FaceRef>> {
        let target = normal.normalize();
        let mut selected = Vec::new();
        for &face in faces {
            if (self.normal_of_face(face)? - target).norm() <= tol {
                selected.push(face);
            }
        }
        Ok(selected)
    }

    /// Stores a region, replacing any region with the same id.
    pub fn set_region(&mut self, id: RegionId, region: MeshRegion) -> Result<()> {
        for &face in region.faces() {
            self.face_vertices(face)?;
        }
        for &convex in region.convexes() {
            self.convex(convex)?;
        }
        self.regions.insert(id, region);
        Ok(())
    }

    pub fn region(&self, id: RegionId) -> Result<&MeshRegion> {
        self.regions.get(&id).ok_or(ModelError::UndefinedRegion(id))
    }

    pub fn has_region(&self, id: RegionId) -> bool {
        self.regions.contains_key(&id)
    }

    pub fn region_ids(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions.keys().copied()
    }
}
