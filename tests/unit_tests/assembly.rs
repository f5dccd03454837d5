use super::unit_square_triangles;
use brickfem::assembly::global::{assemble_vector, max_abs_diagonal, CsrAssembler};
use brickfem::assembly::local::{ElementConnectivityAssembler, ElementMatrixAssembler, ElementVectorAssembler};
use brickfem::brick::Brick;
use brickfem::element::FemDescriptor;
use brickfem::integration::{IntegrationDescriptor, MeshIm};
use brickfem::space::MeshFem;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorViewMut};

/// Two-node elements on a line, each contributing the stiffness of a unit spring.
struct Springs {
    elements: Vec<[usize; 2]>,
    num_nodes: usize,
}

impl ElementConnectivityAssembler for Springs {
    fn num_elements(&self) -> usize {
        self.elements.len()
    }

    fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    fn element_node_count(&self, _element_index: usize) -> usize {
        2
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(&self.elements[element_index]);
    }
}

impl ElementMatrixAssembler for Springs {
    fn assemble_element_matrix_into(&self, _element_index: usize, mut output: DMatrixViewMut<f64>) -> eyre::Result<()> {
        output.copy_from(&DMatrix::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]));
        Ok(())
    }
}

impl ElementVectorAssembler for Springs {
    fn assemble_element_vector_into(&self, element_index: usize, mut output: DVectorViewMut<f64>) -> eyre::Result<()> {
        output.fill(element_index as f64 + 1.0);
        Ok(())
    }
}

fn springs() -> Springs {
    Springs {
        elements: vec![[0, 1], [1, 2]],
        num_nodes: 3,
    }
}

#[test]
fn csr_assembly_of_springs() {
    let assembler = CsrAssembler::default();
    let expected = DMatrix::from_row_slice(3, 3, &[1.0, -1.0, 0.0, -1.0, 2.0, -1.0, 0.0, -1.0, 1.0]);

    for parallel in [false, true] {
        let matrix = assembler.assemble(&springs(), parallel).unwrap();
        assert_eq!(matrix.nnz(), 7);
        assert_matrix_eq!(DMatrix::from(&matrix), expected, comp = float);
    }

    let matrix = assembler.assemble(&springs(), false).unwrap();
    assert_eq!(max_abs_diagonal(&matrix), 2.0);
    let product = &matrix * &DVector::from_column_slice(&[1.0, 2.0, 4.0]);
    assert_matrix_eq!(product, DVector::from_column_slice(&[-1.0, -1.0, 2.0]), comp = float);
}

#[test]
fn pattern_keeps_empty_rows() {
    let assembler = Springs {
        elements: vec![[0, 2]],
        num_nodes: 4,
    };
    let pattern = CsrAssembler::default().assemble_pattern(&assembler).unwrap();
    assert_eq!(pattern.major_dim(), 4);
    assert_eq!(pattern.nnz(), 4);
    assert_eq!(pattern.lane(1).len(), 0);
    assert_eq!(pattern.lane(3).len(), 0);
    assert_eq!(pattern.lane(2), &[0, 2]);
}

#[test]
fn vector_assembly_accumulates_in_element_order() {
    let expected = DVector::from_column_slice(&[1.0, 3.0, 2.0]);
    assert_eq!(assemble_vector(&springs(), false).unwrap(), expected);
    assert_eq!(assemble_vector(&springs(), true).unwrap(), expected);
}

#[test]
fn laplace_stiffness_properties() {
    let mesh = unit_square_triangles(4);
    let mf = MeshFem::with_fem(&mesh, 1, FemDescriptor::Pk(1)).unwrap();
    let mim = MeshIm::with_method(&mesh, IntegrationDescriptor::Triangle(2)).unwrap();
    let brick = Brick::generic_elliptic(&mim, &mf, 1.0).unwrap();

    let zeros = DVector::zeros(brick.nb_dof());
    let system = brick.assemble(&zeros, false).unwrap();
    assert!(system.eliminated.is_empty());
    assert_scalar_eq!(system.residual.norm(), 0.0, comp = abs, tol = 1e-14);

    let stiffness = DMatrix::from(&system.tangent);
    assert_matrix_eq!(stiffness, stiffness.transpose(), comp = abs, tol = 1e-12);
    for row in stiffness.row_iter() {
        assert_scalar_eq!(row.sum(), 0.0, comp = abs, tol = 1e-12);
    }
    // The P1 Laplacian on right triangles has 4 on interior diagonals
    let center = mf
        .basic_dof_points()
        .iter()
        .position(|p| (p.x - 0.5).abs() < 1e-12 && (p.y - 0.5).abs() < 1e-12)
        .unwrap();
    assert_scalar_eq!(stiffness[(center, center)], 4.0, comp = abs, tol = 1e-12);

    let parallel = brick.assemble(&zeros, true).unwrap();
    assert_eq!(parallel.tangent, system.tangent);
    assert_eq!(parallel.residual, system.residual);
}

#[test]
fn quadrilateral_laplace_is_symmetric_and_singular() {
    let mesh = super::unit_square_quadrilaterals(3);
    let mf = MeshFem::with_fem(&mesh, 2, FemDescriptor::Qk(2)).unwrap();
    let mim = MeshIm::with_method(&mesh, IntegrationDescriptor::GaussParallelepiped(4)).unwrap();
    let brick = Brick::generic_elliptic(&mim, &mf, 2.5).unwrap();

    let system = brick.assemble(&DVector::zeros(brick.nb_dof()), false).unwrap();
    let stiffness = DMatrix::from(&system.tangent);
    assert_matrix_eq!(stiffness, stiffness.transpose(), comp = abs, tol = 1e-12);

    // Constant fields in each component are in the kernel
    let ones = DVector::repeat(brick.nb_dof(), 1.0);
    assert_scalar_eq!((&stiffness * ones).norm(), 0.0, comp = abs, tol = 1e-11);
}
