use super::{unit_square_triangles, BOTTOM, LEFT, RIGHT};
use brickfem::brick::{Brick, ConstraintMode, ParamValue};
use brickfem::element::FemDescriptor;
use brickfem::integration::{IntegrationDescriptor, MeshIm};
use brickfem::mesh::Mesh;
use brickfem::model::ModelState;
use brickfem::solve::SolveOptions;
use brickfem::space::MeshFem;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::DVector;

struct Plate<'m> {
    mim: MeshIm<'m>,
    mim_subint: MeshIm<'m>,
    mf_ut: MeshFem<'m>,
    mf_u3: MeshFem<'m>,
    mf_theta: MeshFem<'m>,
}

impl<'m> Plate<'m> {
    fn new(mesh: &'m Mesh, degree: usize) -> Self {
        Self {
            mim: MeshIm::with_method(mesh, IntegrationDescriptor::Triangle(6)).unwrap(),
            mim_subint: MeshIm::with_method(mesh, IntegrationDescriptor::Triangle(1)).unwrap(),
            mf_ut: MeshFem::with_fem(mesh, 2, FemDescriptor::Pk(1)).unwrap(),
            mf_u3: MeshFem::with_fem(mesh, 1, FemDescriptor::Pk(degree)).unwrap(),
            mf_theta: MeshFem::with_fem(mesh, 2, FemDescriptor::Pk(degree)).unwrap(),
        }
    }

    /// Plate clamped on the left edge under a uniform transverse load.
    fn cantilever(&self, thickness: f64, mode: ConstraintMode) -> Brick<'_> {
        let plate = Brick::isotropic_linearized_plate(
            &self.mim,
            &self.mim_subint,
            &self.mf_ut,
            &self.mf_u3,
            &self.mf_theta,
            thickness,
        )
        .unwrap();
        let mut loaded = Brick::plate_source_term(plate, None).unwrap();
        loaded.set_param("B", [0.0, 0.0, -1.0]).unwrap();
        Brick::plate_clamped_support(loaded, LEFT, mode).unwrap()
    }

    /// Mean deflection over the dofs of `u3` on the vertical line `x`.
    fn mean_deflection_at(&self, u3: &DVector<f64>, x: f64) -> f64 {
        let values: Vec<f64> = self
            .mf_u3
            .basic_dof_points()
            .iter()
            .enumerate()
            .filter(|(_, p)| (p.x - x).abs() < 1e-10)
            .map(|(i, _)| u3[i])
            .collect();
        assert!(!values.is_empty());
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn solve(brick: &Brick, options: &SolveOptions) -> DVector<f64> {
    let mut model = ModelState::new();
    brick.solve(&mut model, options).unwrap();
    let state = model.state().unwrap().clone();
    assert_eq!(state.len(), brick.nb_dof());
    assert!(state.iter().all(|x| x.is_finite()));
    state
}

fn field(brick: &Brick, state: &DVector<f64>, name: &str) -> DVector<f64> {
    let range = brick.field_range(name).unwrap();
    state.rows(range.start, range.len()).into_owned()
}

#[test]
fn clamped_plate_deflects_downwards() {
    let mesh = unit_square_triangles(4);
    let plate = Plate::new(&mesh, 1);
    let brick = plate.cantilever(0.1, ConstraintMode::Augmented);
    let state = solve(&brick, &SolveOptions::default());

    let u3 = field(&brick, &state, "u3");
    for dof in plate.mf_u3.dofs_on_region(LEFT).unwrap() {
        assert_scalar_eq!(u3[dof], 0.0, comp = abs, tol = 1e-12);
    }
    let middle = plate.mean_deflection_at(&u3, 0.5);
    let tip = plate.mean_deflection_at(&u3, 1.0);
    assert!(middle < 0.0);
    assert!(tip < middle);

    // A transverse load does not stretch the mid-surface
    let ut = field(&brick, &state, "ut");
    assert_scalar_eq!(ut.amax(), 0.0, comp = abs, tol = 1e-10);
}

#[test]
fn thinner_plates_deflect_more() {
    let mesh = unit_square_triangles(4);
    let plate = Plate::new(&mesh, 1);
    let thick = plate.cantilever(0.2, ConstraintMode::Eliminated);
    let thin = plate.cantilever(0.1, ConstraintMode::Eliminated);
    let options = SolveOptions::default();

    let tip_thick = plate.mean_deflection_at(&field(&thick, &solve(&thick, &options), "u3"), 1.0);
    let tip_thin = plate.mean_deflection_at(&field(&thin, &solve(&thin, &options), "u3"), 1.0);
    assert!(tip_thin < tip_thick);
}

#[test]
fn constraint_modes_agree() {
    let mesh = unit_square_triangles(3);
    let plate = Plate::new(&mesh, 1);
    let options = SolveOptions::default();

    let augmented = plate.cantilever(0.1, ConstraintMode::Augmented);
    let eliminated = plate.cantilever(0.1, ConstraintMode::Eliminated);
    let mut penalized = plate.cantilever(0.1, ConstraintMode::Penalized);
    penalized.set_param("penalization", 1e6).unwrap();

    let reference = solve(&augmented, &options);
    let primal = augmented.field_range("mult_2").unwrap().start;
    let reference = reference.rows(0, primal).into_owned();
    let scale = reference.amax();
    assert!(scale > 0.0);

    let eliminated_state = solve(&eliminated, &options);
    assert_eq!(eliminated_state.len(), primal);
    assert_matrix_eq!(eliminated_state, reference, comp = abs, tol = 1e-9 * scale);

    let penalized_state = solve(&penalized, &options);
    assert_matrix_eq!(penalized_state, reference, comp = abs, tol = 1e-6 * scale);
}

#[test]
fn repeated_and_parallel_solves_are_identical() {
    let mesh = unit_square_triangles(4);
    let plate = Plate::new(&mesh, 2);
    let brick = plate.cantilever(0.1, ConstraintMode::Augmented);

    let serial = SolveOptions::default();
    let parallel = SolveOptions {
        parallel_assembly: true,
        ..SolveOptions::default()
    };

    let first = solve(&brick, &serial);
    assert_eq!(solve(&brick, &serial), first);
    assert_eq!(solve(&brick, &parallel), first);
}

#[test]
fn mixed_plate_with_edge_load() {
    let mesh = unit_square_triangles(3);
    let plate = Plate::new(&mesh, 2);

    let mixed = Brick::mixed_isotropic_linearized_plate(&plate.mim, &plate.mf_ut, &plate.mf_u3, &plate.mf_theta, 0.1)
        .unwrap();
    let mut loaded = Brick::plate_source_term(mixed, Some(RIGHT)).unwrap();
    loaded.set_param("B", [0.0, 0.0, -1.0]).unwrap();
    let clamped = Brick::plate_clamped_support(loaded, LEFT, ConstraintMode::Eliminated).unwrap();
    let closed = Brick::plate_closing(clamped).unwrap();
    assert!(closed.is_linear());

    let state = solve(&closed, &SolveOptions::default());
    let u3 = field(&closed, &state, "u3");
    let tip = plate.mean_deflection_at(&u3, 1.0);
    assert!(tip < plate.mean_deflection_at(&u3, 0.5));
    assert!(tip < 0.0);

    let q = field(&closed, &state, "q");
    assert!(q.amax() > 0.0);
}

#[test]
fn edge_load_resultant() {
    let mesh = unit_square_triangles(2);
    let plate = Plate::new(&mesh, 1);
    let brick = Brick::isotropic_linearized_plate(
        &plate.mim,
        &plate.mim_subint,
        &plate.mf_ut,
        &plate.mf_u3,
        &plate.mf_theta,
        0.1,
    )
    .unwrap();
    let mut loaded = Brick::plate_source_term(brick, Some(RIGHT)).unwrap();
    loaded.set_param("B", [0.0, 0.0, -2.0]).unwrap();

    // At the zero state the residual is minus the load vector
    let system = loaded.assemble(&DVector::zeros(loaded.nb_dof()), false).unwrap();
    let u3 = loaded.field_range("u3").unwrap();
    let total: f64 = system.residual.rows(u3.start, u3.len()).sum();
    assert_scalar_eq!(total, 2.0, comp = abs, tol = 1e-12);

    let ut = loaded.field_range("ut").unwrap();
    assert_scalar_eq!(system.residual.rows(ut.start, ut.len()).amax(), 0.0);
}

/// Quadratic membrane, linear deflection and quadratic rotations, clamped at `y = 0` and simply
/// supported at `x = 1`, under a transverse load and a distributed moment.
fn supported_plate<'a>(
    plate: &'a Plate<'a>,
    mf_data: &'a MeshFem<'a>,
    mixed: bool,
    mode: ConstraintMode,
) -> Brick<'a> {
    let brick = if mixed {
        Brick::mixed_isotropic_linearized_plate(&plate.mim, &plate.mf_ut, &plate.mf_u3, &plate.mf_theta, 0.1)
    } else {
        Brick::isotropic_linearized_plate(
            &plate.mim,
            &plate.mim_subint,
            &plate.mf_ut,
            &plate.mf_u3,
            &plate.mf_theta,
            0.1,
        )
    }
    .unwrap();
    let mut loaded = Brick::plate_source_term(brick, None).unwrap();
    loaded.set_param("B", [0.0, 0.0, -1.0]).unwrap();
    let moment = mf_data.eval(|p| [p.y, -p.x]).unwrap();
    loaded.set_param("M", ParamValue::field(mf_data, moment)).unwrap();
    let clamped = Brick::plate_clamped_support(loaded, BOTTOM, mode).unwrap();
    let supported = Brick::plate_simple_support(clamped, RIGHT, mode).unwrap();
    if mixed {
        Brick::plate_closing(supported).unwrap()
    } else {
        supported
    }
}

#[test]
fn clamped_and_simply_supported_edges() {
    let mesh = unit_square_triangles(4);
    let plate = Plate {
        mim: MeshIm::with_method(&mesh, IntegrationDescriptor::Triangle(6)).unwrap(),
        mim_subint: MeshIm::with_method(&mesh, IntegrationDescriptor::Triangle(1)).unwrap(),
        mf_ut: MeshFem::with_fem(&mesh, 2, FemDescriptor::Pk(2)).unwrap(),
        mf_u3: MeshFem::with_fem(&mesh, 1, FemDescriptor::Pk(1)).unwrap(),
        mf_theta: MeshFem::with_fem(&mesh, 2, FemDescriptor::Pk(2)).unwrap(),
    };
    let mf_data = MeshFem::with_fem(&mesh, 2, FemDescriptor::Pk(2)).unwrap();
    let options = SolveOptions::default();

    for mixed in [false, true] {
        let augmented = supported_plate(&plate, &mf_data, mixed, ConstraintMode::Augmented);
        let eliminated = supported_plate(&plate, &mf_data, mixed, ConstraintMode::Eliminated);
        assert_eq!(augmented.field_range("q").is_ok(), mixed);

        let state = solve(&augmented, &options);
        let (ut, u3) = (field(&augmented, &state, "ut"), field(&augmented, &state, "u3"));
        assert!(u3.min() < 0.0);
        let tol = 1e-12 * state.amax();
        for dof in plate.mf_u3.dofs_on_region(BOTTOM).unwrap() {
            assert_scalar_eq!(u3[dof], 0.0, comp = abs, tol = tol);
        }
        for dof in plate.mf_u3.dofs_on_region(RIGHT).unwrap() {
            assert_scalar_eq!(u3[dof], 0.0, comp = abs, tol = tol);
        }
        for dof in plate.mf_ut.dofs_on_region(RIGHT).unwrap() {
            assert_scalar_eq!(ut[dof], 0.0, comp = abs, tol = tol);
        }

        let reference = solve(&eliminated, &options);
        for name in ["ut", "u3", "theta"] {
            let expected = field(&augmented, &state, name);
            let scale = expected.amax().max(1.0);
            let actual = field(&eliminated, &reference, name);
            assert_matrix_eq!(actual, expected, comp = abs, tol = 1e-8 * scale);
        }
    }
}
