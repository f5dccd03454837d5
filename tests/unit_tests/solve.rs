use super::{unit_square_triangles, BOUNDARY};
use brickfem::brick::{Brick, ConstraintMode, ParamValue};
use brickfem::element::FemDescriptor;
use brickfem::error::ModelError;
use brickfem::integration::{IntegrationDescriptor, MeshIm};
use brickfem::mesh::Mesh;
use brickfem::model::ModelState;
use brickfem::solve::SolveOptions;
use brickfem::space::MeshFem;
use brickfem_optimize::calculus::{approximate_jacobian, VectorFunction};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};

#[test]
fn default_options() {
    let options = SolveOptions::default();
    assert!(!options.noisy);
    assert!(!options.parallel_assembly);
    assert_eq!(options.lsolver, "superlu");
    assert_eq!(options.max_iter, 40);
    assert_eq!(options.residual, 1e-8);
    assert_eq!(options.log_level(), log::Level::Debug);
}

#[test]
fn options_from_args() {
    let options = SolveOptions::from_args(&["very noisy", "max_iter", "12", "residual", "1e-10", "lsolver", "cg"]).unwrap();
    assert!(options.noisy);
    assert_eq!(options.log_level(), log::Level::Info);
    assert_eq!(options.max_iter, 12);
    assert_eq!(options.residual, 1e-10);
    assert_eq!(options.lsolver, "cg");

    assert!(SolveOptions::from_args(&["parallel"]).unwrap().parallel_assembly);
    assert_eq!(SolveOptions::from_args(&[]).unwrap(), SolveOptions::default());

    let bad_args: [&[&str]; 4] = [&["max_iter"], &["max_iter", "many"], &["residual", "-"], &["quiet"]];
    for bad in bad_args {
        assert!(
            matches!(SolveOptions::from_args(bad), Err(ModelError::InvalidArgument(_))),
            "{:?} should be rejected",
            bad
        );
    }
}

#[test]
fn options_deserialize_with_defaults() {
    let options: SolveOptions = serde_json::from_str(r#"{ "lsolver": "cholesky", "max_iter": 5 }"#).unwrap();
    assert_eq!(options.lsolver, "cholesky");
    assert_eq!(options.max_iter, 5);
    assert_eq!(options.residual, 1e-8);

    let json = serde_json::to_string(&options).unwrap();
    let parsed: SolveOptions = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, options);
}

struct Poisson<'m> {
    mim: MeshIm<'m>,
    mf: MeshFem<'m>,
}

impl<'m> Poisson<'m> {
    fn new(mesh: &'m Mesh) -> Self {
        Self {
            mim: MeshIm::with_method(mesh, IntegrationDescriptor::Triangle(4)).unwrap(),
            mf: MeshFem::with_fem(mesh, 1, FemDescriptor::Pk(1)).unwrap(),
        }
    }

    /// `-div(a0 (1 + c u^2) grad u) = 1` with `u = 0` on the boundary.
    fn nonlinear(&self, c: f64, mode: ConstraintMode) -> Brick<'_> {
        let elliptic = Brick::nonlinear_elliptic(&self.mim, &self.mf, 1.0, c).unwrap();
        let mut loaded = Brick::source_term(elliptic, None).unwrap();
        loaded.set_param("F", 1.0).unwrap();
        Brick::dirichlet(loaded, BOUNDARY, mode).unwrap()
    }

    fn linear(&self, mode: ConstraintMode) -> Brick<'_> {
        let elliptic = Brick::generic_elliptic(&self.mim, &self.mf, 1.0).unwrap();
        let mut loaded = Brick::source_term(elliptic, None).unwrap();
        loaded.set_param("F", 1.0).unwrap();
        Brick::dirichlet(loaded, BOUNDARY, mode).unwrap()
    }
}

#[test]
fn nonlinear_elliptic_converges() {
    let mesh = unit_square_triangles(6);
    let poisson = Poisson::new(&mesh);
    let brick = poisson.nonlinear(50.0, ConstraintMode::Eliminated);
    assert!(!brick.is_linear());

    let mut model = ModelState::new();
    brick.solve(&mut model, &SolveOptions::default()).unwrap();
    assert!(model.iterations() > 1);
    assert!(model.iterations() <= 40);

    let u = model.state().unwrap();
    assert!(u.max() > 0.0);
    for dof in poisson.mf.dofs_on_region(BOUNDARY).unwrap() {
        assert_eq!(u[dof], 0.0);
    }

    // The nonlinearity stiffens the problem, so the solution is below the linear one
    let mut linear = ModelState::new();
    poisson
        .linear(ConstraintMode::Eliminated)
        .solve(&mut linear, &SolveOptions::default())
        .unwrap();
    assert!(u.max() < linear.state().unwrap().max());

    // Solving again starts from the converged state
    brick.solve(&mut model, &SolveOptions::default()).unwrap();
    assert_eq!(model.iterations(), 0);
}

/// The residual of a chain as a function of its state.
struct ChainResidual<'b, 'a> {
    brick: &'b Brick<'a>,
}

impl<'b, 'a> VectorFunction<f64> for ChainResidual<'b, 'a> {
    fn dimension(&self) -> usize {
        self.brick.nb_dof()
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) {
        let system = self.brick.assemble(&x.clone_owned(), false).unwrap();
        f.copy_from(&system.residual);
    }
}

#[test]
fn nonlinear_elliptic_tangent_matches_finite_differences() {
    let mesh = unit_square_triangles(3);
    let poisson = Poisson::new(&mesh);
    let brick = poisson.nonlinear(5.0, ConstraintMode::Augmented);

    let u = poisson.mf.eval(|p| [p.x * (1.0 - p.y) + 0.5 * p.y]).unwrap();
    let mut state = DVector::from_fn(brick.nb_dof(), |i, _| 0.1 * (i % 3) as f64);
    state.rows_mut(0, u.len()).copy_from(&u);

    let tangent = DMatrix::from(&brick.assemble(&state, false).unwrap().tangent);
    let approximate = approximate_jacobian(ChainResidual { brick: &brick }, &state, &1e-6);
    let tol = 1e-6 * tangent.amax();
    assert_matrix_eq!(tangent, approximate, comp = abs, tol = tol);
}

#[test]
fn nonlinear_elliptic_reports_missed_convergence() {
    let mesh = unit_square_triangles(6);
    let poisson = Poisson::new(&mesh);
    let brick = poisson.nonlinear(50.0, ConstraintMode::Augmented);

    let mut model = ModelState::new();
    let options = SolveOptions::from_args(&["max_iter", "1"]).unwrap();
    assert!(matches!(
        brick.solve(&mut model, &options),
        Err(ModelError::Convergence { iterations: 1, .. })
    ));
    assert!(!model.is_solved());
}

#[test]
fn vanishing_nonlinearity_matches_the_linear_chain() {
    let mesh = unit_square_triangles(5);
    let poisson = Poisson::new(&mesh);

    let mut nonlinear = ModelState::new();
    poisson
        .nonlinear(0.0, ConstraintMode::Augmented)
        .solve(&mut nonlinear, &SolveOptions::default())
        .unwrap();
    assert_eq!(nonlinear.iterations(), 1);

    let mut linear = ModelState::new();
    poisson
        .linear(ConstraintMode::Augmented)
        .solve(&mut linear, &SolveOptions::default())
        .unwrap();

    let (nonlinear, linear) = (nonlinear.state().unwrap().clone(), linear.state().unwrap().clone());
    assert_matrix_eq!(nonlinear, linear, comp = abs, tol = 1e-12);
}

#[test]
fn dirichlet_data_reproduces_affine_solutions() {
    let mesh = unit_square_triangles(4);
    let poisson = Poisson::new(&mesh);
    let exact = poisson.mf.eval(|p| [1.0 + p.x + 2.0 * p.y]).unwrap();

    for mode in [ConstraintMode::Augmented, ConstraintMode::Eliminated, ConstraintMode::Penalized] {
        let elliptic = Brick::generic_elliptic(&poisson.mim, &poisson.mf, 3.0).unwrap();
        let mut brick = Brick::dirichlet(elliptic, BOUNDARY, mode).unwrap();
        brick
            .set_param("R", ParamValue::field(&poisson.mf, exact.clone()))
            .unwrap();

        let mut model = ModelState::new();
        brick.solve(&mut model, &SolveOptions::default()).unwrap();
        let u = model.state().unwrap().rows(0, poisson.mf.nb_dof()).into_owned();
        assert_matrix_eq!(u, exact, comp = abs, tol = 1e-8);
    }
}

#[test]
fn linear_solvers_agree_on_a_symmetric_chain() {
    let mesh = unit_square_triangles(5);
    let poisson = Poisson::new(&mesh);
    let brick = poisson.linear(ConstraintMode::Eliminated);

    let mut reference = ModelState::new();
    brick.solve(&mut reference, &SolveOptions::default()).unwrap();
    let reference = reference.state().unwrap().clone();
    assert!(reference.max() > 0.0);

    for lsolver in ["cholesky", "cg", "mumps"] {
        let options = SolveOptions::from_args(&["lsolver", lsolver]).unwrap();
        let mut model = ModelState::new();
        brick.solve(&mut model, &options).unwrap();
        let state = model.state().unwrap().clone();
        assert_matrix_eq!(state, reference, comp = abs, tol = 1e-10);
    }
}
