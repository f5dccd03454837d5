//! Element-local assembly: connectivity, quadrature loops and integrands.
use crate::element::ReferenceFiniteElement;
use crate::geometry::{transform_gradients, ConvexGeometry};
use crate::integration::MeshIm;
use crate::mesh::FaceRef;
use crate::space::MeshFem;
use itertools::izip;
use nalgebra::{DMatrixViewMut, DVectorViewMut, Point2, Vector2};

pub trait ElementConnectivityAssembler {
    fn num_elements(&self) -> usize;

    /// Size of the global system the element contributions are scattered into.
    fn num_nodes(&self) -> usize;

    fn element_node_count(&self, element_index: usize) -> usize;

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize);
}

pub trait ElementMatrixAssembler: ElementConnectivityAssembler {
    fn assemble_element_matrix_into(&self, element_index: usize, output: DMatrixViewMut<f64>) -> eyre::Result<()>;
}

pub trait ElementVectorAssembler: ElementConnectivityAssembler {
    fn assemble_element_vector_into(&self, element_index: usize, output: DVectorViewMut<f64>) -> eyre::Result<()>;
}

/// Where an element contribution is integrated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntegrationSite {
    Convex(usize),
    Face(FaceRef),
}

impl IntegrationSite {
    pub fn convex(&self) -> usize {
        match self {
            Self::Convex(convex) => *convex,
            Self::Face(face) => face.convex,
        }
    }
}

/// A finite element space placed at `offset` in the global unknown vector.
#[derive(Debug, Copy, Clone)]
pub struct FieldBlock<'a> {
    pub space: &'a MeshFem<'a>,
    pub offset: usize,
}

impl<'a> FieldBlock<'a> {
    pub fn new(space: &'a MeshFem<'a>, offset: usize) -> Self {
        Self { space, offset }
    }
}

/// Basis functions of one field block evaluated at a quadrature point.
#[derive(Debug, Clone, Default)]
pub struct BlockBasis {
    qdim: usize,
    local_offset: usize,
    values: Vec<f64>,
    gradients: Vec<Vector2<f64>>,
}

impl BlockBasis {
    pub fn qdim(&self) -> usize {
        self.qdim
    }

    pub fn num_nodes(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Physical gradients of the basis functions.
    pub fn gradients(&self) -> &[Vector2<f64>] {
        &self.gradients
    }

    /// Row of component `component` of node `node` in the element matrix.
    pub fn local_index(&self, node: usize, component: usize) -> usize {
        self.local_offset + self.qdim * node + component
    }
}

/// Everything an integrand sees at a single quadrature point.
#[derive(Debug)]
pub struct PointData<'b> {
    pub convex: usize,
    pub reference: Point2<f64>,
    /// Quadrature weight times the volume or length element.
    pub weight: f64,
    pub blocks: &'b [BlockBasis],
    /// Global indices of the element unknowns, block by block.
    pub element_dofs: &'b [usize],
}

pub trait MatrixIntegrand: Sync {
    fn accumulate(&self, point: &PointData, output: &mut DMatrixViewMut<f64>) -> eyre::Result<()>;
}

pub trait VectorIntegrand: Sync {
    fn accumulate(&self, point: &PointData, output: &mut DVectorViewMut<f64>) -> eyre::Result<()>;
}

/// Quadrature loop over a list of integration sites for a set of field blocks.
#[derive(Debug, Clone)]
pub struct ElementIntegrator<'a> {
    mim: &'a MeshIm<'a>,
    blocks: Vec<FieldBlock<'a>>,
    sites: Vec<IntegrationSite>,
    num_dofs: usize,
}

impl<'a> ElementIntegrator<'a> {
    pub fn new(mim: &'a MeshIm<'a>, blocks: Vec<FieldBlock<'a>>, sites: Vec<IntegrationSite>, num_dofs: usize) -> Self {
        Self {
            mim,
            blocks,
            sites,
            num_dofs,
        }
    }

    /// Calls `f` for every quadrature point of the given element.
    pub fn for_each_point<F>(&self, element_index: usize, mut f: F) -> eyre::Result<()>
    where
        F: FnMut(&PointData) -> eyre::Result<()>,
    {
        let site = self.sites[element_index];
        let convex = site.convex();
        let rule = self.mim.rule_of_convex(convex)?;
        let geometry = ConvexGeometry::from_mesh(self.mim.mesh(), convex)?;

        let mut element_dofs = vec![0; self.element_node_count(element_index)];
        self.populate_element_nodes(&mut element_dofs, element_index);

        let mut blocks = Vec::with_capacity(self.blocks.len());
        let mut local_offset = 0;
        for block in &self.blocks {
            let n = block
                .space
                .element_of_convex(convex)
                .map(|element| element.num_nodes())
                .unwrap_or(0);
            blocks.push(BlockBasis {
                qdim: block.space.qdim(),
                local_offset,
                values: vec![0.0; n],
                gradients: vec![Vector2::zeros(); n],
            });
            local_offset += n * block.space.qdim();
        }

        let points: Vec<(f64, Point2<f64>, Option<Vector2<f64>>)> = match site {
            IntegrationSite::Convex(_) => izip!(rule.weights(), rule.points())
                .map(|(&w, &xi)| (w, xi, None))
                .collect(),
            IntegrationSite::Face(face) => izip!(rule.face_weights(), rule.face_parameters())
                .map(|(&w, &t)| {
                    let (xi, tangent) = geometry.reference_face_point(face.face, t);
                    (w, xi, Some(tangent))
                })
                .collect(),
        };

        for (w, xi, face_tangent) in points {
            let jacobian = geometry.reference_jacobian(&xi);
            let mut det = 0.0;
            for (block, basis) in self.blocks.iter().zip(&mut blocks) {
                if let Some(element) = block.space.element_of_convex(convex) {
                    element.populate_basis(&mut basis.values, &xi);
                    element.populate_basis_gradients(&mut basis.gradients, &xi);
                    det = transform_gradients(&jacobian, &mut basis.gradients)?;
                }
            }
            let measure = match face_tangent {
                Some(tangent) => (jacobian * tangent).norm(),
                None if det > 0.0 => det,
                None => jacobian.determinant().abs(),
            };
            f(&PointData {
                convex,
                reference: xi,
                weight: w * measure,
                blocks: &blocks,
                element_dofs: &element_dofs,
            })?;
        }
        Ok(())
    }
}

impl<'a> ElementConnectivityAssembler for ElementIntegrator<'a> {
    fn num_elements(&self) -> usize {
        self.sites.len()
    }

    fn num_nodes(&self) -> usize {
        self.num_dofs
    }

    fn element_node_count(&self, element_index: usize) -> usize {
        let convex = self.sites[element_index].convex();
        self.blocks
            .iter()
            .map(|block| block.space.qdim() * block.space.basic_dofs_of_convex(convex).len())
            .sum()
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        let convex = self.sites[element_index].convex();
        let mut i = 0;
        for block in &self.blocks {
            for dof in block.space.dofs_of_convex(convex) {
                output[i] = block.offset + dof;
                i += 1;
            }
        }
        assert_eq!(i, output.len(), "Output slice must match the element node count");
    }
}

/// Assembles the element matrices of a bilinear form given by an integrand.
#[derive(Debug, Clone)]
pub struct FormAssembler<'a, I> {
    integrator: ElementIntegrator<'a>,
    integrand: I,
}

impl<'a, I> FormAssembler<'a, I> {
    pub fn new(integrator: ElementIntegrator<'a>, integrand: I) -> Self {
        Self { integrator, integrand }
    }
}

impl<'a, I> ElementConnectivityAssembler for FormAssembler<'a, I> {
    fn num_elements(&self) -> usize {
        self.integrator.num_elements()
    }

    fn num_nodes(&self) -> usize {
        self.integrator.num_nodes()
    }

    fn element_node_count(&self, element_index: usize) -> usize {
        self.integrator.element_node_count(element_index)
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        self.integrator.populate_element_nodes(output, element_index)
    }
}

impl<'a, I: MatrixIntegrand> ElementMatrixAssembler for FormAssembler<'a, I> {
    fn assemble_element_matrix_into(&self, element_index: usize, mut output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        output.fill(0.0);
        self.integrator
            .for_each_point(element_index, |point| self.integrand.accumulate(point, &mut output))
    }
}

/// Assembles the element vectors of a linear form given by an integrand.
#[derive(Debug, Clone)]
pub struct LoadAssembler<'a, I> {
    integrator: ElementIntegrator<'a>,
    integrand: I,
}

impl<'a, I> LoadAssembler<'a, I> {
    pub fn new(integrator: ElementIntegrator<'a>, integrand: I) -> Self {
        Self { integrator, integrand }
    }
}

impl<'a, I> ElementConnectivityAssembler for LoadAssembler<'a, I> {
    fn num_elements(&self) -> usize {
        self.integrator.num_elements()
    }

    fn num_nodes(&self) -> usize {
        self.integrator.num_nodes()
    }

    fn element_node_count(&self, element_index: usize) -> usize {
        self.integrator.element_node_count(element_index)
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        self.integrator.populate_element_nodes(output, element_index)
    }
}

impl<'a, I: VectorIntegrand> ElementVectorAssembler for LoadAssembler<'a, I> {
    fn assemble_element_vector_into(&self, element_index: usize, mut output: DVectorViewMut<f64>) -> eyre::Result<()> {
        output.fill(0.0);
        self.integrator
            .for_each_point(element_index, |point| self.integrand.accumulate(point, &mut output))
    }
}

/// Accumulates `factor * (lambda div u div v + 2 mu eps(u) : eps(v))` for a two-component block.
pub fn accumulate_isotropic_form(
    output: &mut DMatrixViewMut<f64>,
    basis: &BlockBasis,
    factor: f64,
    lambda: f64,
    mu: f64,
) {
    debug_assert_eq!(basis.qdim(), 2);
    let grads = basis.gradients();
    for (i, grad_i) in grads.iter().enumerate() {
        for (j, grad_j) in grads.iter().enumerate() {
            let dot = grad_i.dot(grad_j);
            for a in 0..2 {
                for b in 0..2 {
                    let delta = if a == b { dot } else { 0.0 };
                    let value = lambda * grad_i[a] * grad_j[b] + mu * (delta + grad_i[b] * grad_j[a]);
                    output[(basis.local_index(i, a), basis.local_index(j, b))] += factor * value;
                }
            }
        }
    }
}
