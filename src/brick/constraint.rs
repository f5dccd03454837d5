//! Dirichlet-type conditions on the dofs of a region.
use crate::brick::params::{ParamSet, ParamValue};
use crate::brick::system::{AssemblyContext, SystemBuilder};
use crate::brick::{BrickNode, ConstrainedDofs, FieldInfo, Layer};
use crate::error::{ModelError, Result};
use crate::mesh::RegionId;
use crate::space::MeshFem;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

pub const DEFAULT_PENALIZATION: f64 = 1e10;

/// How a constraint brick enforces its condition.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintMode {
    /// One Lagrange multiplier per constrained dof, appended to the unknowns.
    #[default]
    Augmented,
    /// Constrained dofs are removed from the solved system and set to their prescribed value.
    Eliminated,
    /// A large diagonal term pulls the constrained dofs to their prescribed value.
    Penalized,
}

impl FromStr for ConstraintMode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "augmented" | "augmentation" => Ok(Self::Augmented),
            "eliminated" | "elimination" => Ok(Self::Eliminated),
            "penalized" | "penalization" => Ok(Self::Penalized),
            other => Err(ModelError::InvalidArgument(format!("unknown constraint mode '{}'", other))),
        }
    }
}

impl Display for ConstraintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Augmented => "augmented",
            Self::Eliminated => "eliminated",
            Self::Penalized => "penalized",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    /// `ut = 0`, `u3 = 0` and `theta = 0`.
    ClampedSupport,
    /// `ut = 0` and `u3 = 0`.
    SimpleSupport,
    /// The main field equals the parameter `R`.
    Dirichlet,
}

/// A single constrained unknown, local to its field.
#[derive(Debug, Copy, Clone)]
struct ConstrainedDof {
    field: &'static str,
    dof: usize,
    convex: usize,
    node: usize,
    component: usize,
}

#[derive(Debug, Clone)]
pub struct ConstraintBrick<'a> {
    kind: ConstraintKind,
    mode: ConstraintMode,
    region: RegionId,
    main_space: Option<&'a MeshFem<'a>>,
    targets: Vec<ConstrainedDof>,
    params: ParamSet<'a>,
}

fn collect_targets(field: &'static str, space: &MeshFem, region: RegionId, targets: &mut Vec<ConstrainedDof>) -> Result<()> {
    let q = space.qdim();
    for (basic, convex, node) in space.basic_dof_witnesses_on_region(region)? {
        for component in 0..q {
            targets.push(ConstrainedDof {
                field,
                dof: q * basic + component,
                convex,
                node,
                component,
            });
        }
    }
    Ok(())
}

impl<'a> ConstraintBrick<'a> {
    pub(crate) fn new(
        origin: &BrickNode<'a>,
        kind: ConstraintKind,
        region: RegionId,
        mode: ConstraintMode,
    ) -> Result<Self> {
        let mut targets = Vec::new();
        let mut params = ParamSet::new().declare("penalization", 1, ParamValue::scalar(DEFAULT_PENALIZATION));
        let mut main_space = None;

        match (kind, origin) {
            (ConstraintKind::ClampedSupport, BrickNode::Plate(plate)) => {
                collect_targets("ut", plate.mf_ut(), region, &mut targets)?;
                collect_targets("u3", plate.mf_u3(), region, &mut targets)?;
                collect_targets("theta", plate.mf_theta(), region, &mut targets)?;
            }
            (ConstraintKind::SimpleSupport, BrickNode::Plate(plate)) => {
                collect_targets("ut", plate.mf_ut(), region, &mut targets)?;
                collect_targets("u3", plate.mf_u3(), region, &mut targets)?;
            }
            (ConstraintKind::Dirichlet, origin) => {
                let (field, _, space) = origin.main_field().ok_or_else(|| {
                    ModelError::InvalidBrickChain("a Dirichlet condition needs an origin brick".to_string())
                })?;
                collect_targets(field, space, region, &mut targets)?;
                params = params.declare("R", space.qdim(), ParamValue::Constant(vec![0.0; space.qdim()]));
                main_space = Some(space);
            }
            _ => {
                return Err(ModelError::InvalidBrickChain(
                    "plate supports need a plate origin".to_string(),
                ))
            }
        }

        Ok(Self {
            kind,
            mode,
            region,
            main_space,
            targets,
            params,
        })
    }

    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    pub fn mode(&self) -> ConstraintMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ConstraintMode) {
        self.mode = mode;
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    /// Number of constrained unknowns.
    pub fn num_constrained(&self) -> usize {
        self.targets.len()
    }

    /// Prescribed value of a target.
    fn prescribed(&self, target: &ConstrainedDof) -> Result<f64> {
        let space = match self.main_space {
            Some(space) => space,
            None => return Ok(0.0),
        };
        let xi = space
            .element_of_convex(target.convex)
            .map(|element| element.nodes()[target.node])
            .ok_or_else(|| ModelError::InvalidEntity(format!("convex {} has no finite element", target.convex)))?;
        let mut value = vec![0.0; space.qdim()];
        self.params.vector_at("R", target.convex, &xi, &mut value)?;
        Ok(value[target.component])
    }

    /// Targets not already constrained lower in the chain.
    ///
    /// On dofs shared with a lower constraint, such as the corner between two supported edges,
    /// the lower condition is the one enforced.
    fn active_targets<'s>(&'s self, below: &'s ConstrainedDofs) -> impl Iterator<Item = &'s ConstrainedDof> + 's {
        self.targets
            .iter()
            .filter(move |target| !below.contains(&(target.field, target.dof)))
    }

    fn global_index(target: &ConstrainedDof, layout: &[FieldInfo]) -> Option<usize> {
        layout
            .iter()
            .find(|field| field.name == target.field)
            .map(|field| field.range.start + target.dof)
    }
}

impl<'a> Layer<'a> for ConstraintBrick<'a> {
    fn name(&self) -> &'static str {
        match self.kind {
            ConstraintKind::ClampedSupport => "plate clamped support",
            ConstraintKind::SimpleSupport => "plate simple support",
            ConstraintKind::Dirichlet => "dirichlet",
        }
    }

    fn params(&self) -> Option<&ParamSet<'a>> {
        Some(&self.params)
    }

    fn params_mut(&mut self) -> Option<&mut ParamSet<'a>> {
        Some(&mut self.params)
    }

    fn fields(&self, depth: usize, below: &ConstrainedDofs) -> Vec<(String, usize)> {
        match self.mode {
            ConstraintMode::Augmented => vec![(format!("mult_{}", depth), self.active_targets(below).count())],
            _ => Vec::new(),
        }
    }

    fn constrained(&self) -> Vec<(&'static str, usize)> {
        self.targets.iter().map(|target| (target.field, target.dof)).collect()
    }

    fn eliminated_dofs(&self, layout: &[FieldInfo], below: &ConstrainedDofs) -> Vec<usize> {
        match self.mode {
            ConstraintMode::Eliminated => self
                .active_targets(below)
                .filter_map(|target| Self::global_index(target, layout))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn contribute(&self, ctx: &AssemblyContext<'_, 'a>, builder: &mut SystemBuilder) -> Result<()> {
        let mut rows = Vec::with_capacity(self.targets.len());
        for target in self.active_targets(ctx.constrained_below) {
            let row = ctx.offset(target.field)? + target.dof;
            rows.push((row, self.prescribed(target)?));
        }

        match self.mode {
            ConstraintMode::Augmented => {
                let multipliers = ctx.field_range(&format!("mult_{}", ctx.depth))?;
                for ((row, value), mult) in rows.into_iter().zip(multipliers) {
                    builder.add_entry(row, mult, 1.0);
                    builder.add_entry(mult, row, 1.0);
                    builder.add_to_residual(row, ctx.state[mult]);
                    builder.add_to_residual(mult, ctx.state[row] - value);
                }
            }
            ConstraintMode::Penalized => {
                let factor = self.params.scalar_at("penalization", 0, &Point2::origin())?;
                let penalty = factor * builder.diagonal_scale();
                for (row, value) in rows {
                    builder.add_entry(row, row, penalty);
                    builder.add_to_residual(row, penalty * (ctx.state[row] - value));
                }
            }
            ConstraintMode::Eliminated => {
                for (row, value) in rows {
                    builder.eliminate(row, value);
                }
            }
        }
        Ok(())
    }
}
