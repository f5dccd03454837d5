use super::{unit_square_quadrilaterals, unit_square_triangles, BOUNDARY, LEFT};
use brickfem::element::{FemDescriptor, ReferenceFiniteElement};
use brickfem::error::ModelError;
use brickfem::space::MeshFem;
use matrixcompare::assert_scalar_eq;
use nalgebra::{DVector, Point2};
use proptest::prelude::*;

fn pk(k: usize) -> FemDescriptor {
    FemDescriptor::Pk(k)
}

#[test]
fn fem_descriptor_parsing() {
    assert_eq!(FemDescriptor::parse("FEM_PK(2,2)").unwrap(), FemDescriptor::Pk(2));
    assert_eq!(
        "FEM_PK_DISCONTINUOUS(2, 0)".parse::<FemDescriptor>().unwrap(),
        FemDescriptor::PkDiscontinuous(0)
    );
    assert_eq!(FemDescriptor::parse("FEM_QK(2,3)").unwrap(), FemDescriptor::Qk(3));
    assert_eq!(FemDescriptor::Qk(2).to_string(), "FEM_QK(2,2)");

    for bad in ["FEM_PK(2,7)", "FEM_PK(3,1)", "FEM_QK(2,0)", "FEM_HERMITE(2,3)", "FEM_PK(2", ""] {
        assert!(
            matches!(FemDescriptor::parse(bad), Err(ModelError::UnknownFamily(_))),
            "{} should be rejected",
            bad
        );
    }
}

#[test]
fn fem_descriptor_serializes_as_string() {
    let json = serde_json::to_string(&FemDescriptor::Pk(1)).unwrap();
    assert_eq!(json, "\"FEM_PK(2,1)\"");
    let parsed: FemDescriptor = serde_json::from_str("\"FEM_QK(2,2)\"").unwrap();
    assert_eq!(parsed, FemDescriptor::Qk(2));
    assert!(serde_json::from_str::<FemDescriptor>("\"FEM_XYZ(1)\"").is_err());
}

#[test]
fn nb_dof_counts_shared_dofs_once() {
    let mesh = unit_square_triangles(2);

    // 9 vertices, 16 edges, no interior nodes
    let p1 = MeshFem::with_fem(&mesh, 1, pk(1)).unwrap();
    assert_eq!(p1.nb_dof(), 9);
    let p2 = MeshFem::with_fem(&mesh, 1, pk(2)).unwrap();
    assert_eq!(p2.nb_dof(), 9 + 16);
    let p3 = MeshFem::with_fem(&mesh, 1, pk(3)).unwrap();
    assert_eq!(p3.nb_dof(), 9 + 2 * 16 + 8);

    let vector_p2 = MeshFem::with_fem(&mesh, 2, pk(2)).unwrap();
    assert_eq!(vector_p2.nb_basic_dof(), 25);
    assert_eq!(vector_p2.nb_dof(), 50);

    let discontinuous = MeshFem::with_fem(&mesh, 1, FemDescriptor::PkDiscontinuous(1)).unwrap();
    assert_eq!(discontinuous.nb_dof(), 8 * 3);

    let quads = unit_square_quadrilaterals(2);
    let q2 = MeshFem::with_fem(&quads, 1, FemDescriptor::Qk(2)).unwrap();
    assert_eq!(q2.nb_dof(), 25);
}

#[test]
fn set_fem_is_idempotent() {
    let mesh = unit_square_triangles(3);
    let mut mf = MeshFem::with_fem(&mesh, 2, pk(2)).unwrap();
    let nb_dof = mf.nb_dof();
    let numbering: Vec<Vec<usize>> = (0..mesh.num_convexes())
        .map(|c| mf.basic_dofs_of_convex(c).to_vec())
        .collect();

    mf.set_fem(pk(2)).unwrap();
    assert_eq!(mf.nb_dof(), nb_dof);
    for (c, dofs) in numbering.iter().enumerate() {
        assert_eq!(mf.basic_dofs_of_convex(c), dofs.as_slice());
    }
}

#[test]
fn incompatible_or_invalid_assignments_are_rejected() {
    let mesh = unit_square_triangles(1);
    let mut mf = MeshFem::new(&mesh, 1);
    assert!(matches!(
        mf.set_fem(FemDescriptor::Qk(1)),
        Err(ModelError::IncompatibleElement(_))
    ));
    assert!(matches!(mf.set_fem_on(&[0, 5], pk(1)), Err(ModelError::InvalidEntity(_))));
    assert_eq!(mf.nb_dof(), 0);

    mf.set_fem_on(&[0], pk(1)).unwrap();
    assert_eq!(mf.nb_dof(), 3);
    assert_eq!(mf.fem_of_convex(0), Some(pk(1)));
    assert_eq!(mf.fem_of_convex(1), None);
    assert!(mf.basic_dofs_of_convex(1).is_empty());
}

#[test]
fn dofs_of_convex_expand_components() {
    let mesh = unit_square_triangles(1);
    let mf = MeshFem::with_fem(&mesh, 2, pk(1)).unwrap();
    let basic = mf.basic_dofs_of_convex(0).to_vec();
    let expected: Vec<usize> = basic.iter().flat_map(|&b| [2 * b, 2 * b + 1]).collect();
    assert_eq!(mf.dofs_of_convex(0), expected);
}

#[test]
fn dofs_on_region() {
    let mesh = unit_square_triangles(4);
    let p1 = MeshFem::with_fem(&mesh, 1, pk(1)).unwrap();
    assert_eq!(p1.basic_dofs_on_region(BOUNDARY).unwrap().len(), 16);
    let left = p1.basic_dofs_on_region(LEFT).unwrap();
    assert_eq!(left.len(), 5);
    for dof in left {
        assert_eq!(p1.point_of_basic_dof(dof).unwrap().x, 0.0);
    }

    let p2 = MeshFem::with_fem(&mesh, 2, pk(2)).unwrap();
    assert_eq!(p2.dofs_on_region(LEFT).unwrap().len(), 2 * 9);
    assert!(matches!(p2.dofs_on_region(42), Err(ModelError::UndefinedRegion(42))));
}

#[test]
fn interpolation_reproduces_polynomials() {
    let mesh = unit_square_triangles(3);
    let mf = MeshFem::with_fem(&mesh, 1, pk(2)).unwrap();
    let f = |p: &Point2<f64>| 1.0 + 2.0 * p.x - p.y + 3.0 * p.x * p.y;
    let values = mf.eval(|p| [f(p)]).unwrap();

    let point = Point2::new(0.4, 0.3);
    for convex in 0..mesh.num_convexes() {
        let vertices = mesh.convex_points(convex).unwrap();
        let centroid = vertices.iter().fold(Point2::origin(), |acc, p| acc + p.coords / 3.0);
        let value = mf.interpolate_at(&values, convex, &centroid).unwrap();
        assert_scalar_eq!(value[0], f(&centroid), comp = abs, tol = 1e-12);
    }
    // Evaluating outside of a convex extrapolates its polynomial, which is still exact
    let value = mf.interpolate_at(&values, 0, &point).unwrap();
    assert_scalar_eq!(value[0], f(&point), comp = abs, tol = 1e-12);
}

#[test]
fn eval_checks_component_count() {
    let mesh = unit_square_triangles(1);
    let mf = MeshFem::with_fem(&mesh, 2, pk(1)).unwrap();
    assert!(matches!(mf.eval(|_| [1.0]), Err(ModelError::InvalidArgument(_))));
    let values = mf.eval(|p| [p.x, p.y]).unwrap();
    assert_eq!(values.len(), 8);
}

proptest! {
    #[test]
    fn basis_functions_form_partition_of_unity(k in 0usize..=4, x in 0.0..1.0, t in 0.0..1.0) {
        let element = FemDescriptor::Pk(k).reference_element();
        let xi = Point2::new(x, t * (1.0 - x));
        let mut phi = vec![0.0; element.num_nodes()];
        element.populate_basis(&mut phi, &xi);
        prop_assert!((phi.iter().sum::<f64>() - 1.0).abs() < 1e-10);

        let mesh = unit_square_triangles(2);
        let mf = MeshFem::with_fem(&mesh, 1, FemDescriptor::Pk(k)).unwrap();
        let ones = DVector::repeat(mf.nb_dof(), 1.0);
        let value = mf.evaluate_reference(&ones, 3, &xi).unwrap();
        prop_assert!((value[0] - 1.0).abs() < 1e-10);
    }
}
