//! Error types shared by all modelling operations.
use crate::mesh::RegionId;
use thiserror::Error;

/// Errors raised while building or solving a model.
///
/// Configuration errors surface at the call that introduces them (for example `set_fem` or a
/// brick constructor), while numerical errors surface from `solve`.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A convex, face, point or dof index does not refer to an entity of the mesh or space.
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),
    /// An element or integration method does not match the reference shape of a convex.
    #[error("Incompatible element: {0}")]
    IncompatibleElement(String),
    /// A convex carrying a finite element has no integration method.
    #[error("Convex {convex} has a finite element but no integration method")]
    MissingIntegrationMethod { convex: usize },
    #[error("Region {0} is not defined on the mesh")]
    UndefinedRegion(RegionId),
    /// A finite element or integration descriptor could not be recognized.
    #[error("Unknown family: {0}")]
    UnknownFamily(String),
    #[error("Unknown brick: {0}")]
    UnknownBrick(String),
    #[error("Unknown linear solver: {0}")]
    UnknownSolver(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A brick was stacked on a chain it cannot decorate.
    #[error("Invalid brick chain: {0}")]
    InvalidBrickChain(String),
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),
    #[error("Failed to converge after {iterations} iterations (residual {residual:e})")]
    Convergence { iterations: usize, residual: f64 },
    #[error("The model state has not been solved")]
    NotSolved,
    /// An element assembler reported an error.
    #[error("Assembly failed: {0}")]
    Assembly(eyre::Report),
}

impl ModelError {
    /// Recovers a `ModelError` that was propagated through an element assembler as a report.
    pub(crate) fn from_report(report: eyre::Report) -> Self {
        match report.downcast::<ModelError>() {
            Ok(err) => err,
            Err(report) => ModelError::Assembly(report),
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
