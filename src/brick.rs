//! Composable model terms.
//!
//! A model is a chain of bricks: an origin brick owns the primary fields and their operator,
//! and every further brick decorates its parent with a load, a constraint or a coupling term.
//! Decorators take ownership of their parent, so a chain is a single linked list from the most
//! recently added brick down to its origin. Assembly walks the chain root-first, so the unknown
//! vector starts with the origin's fields followed by the extra fields of the decorators in the
//! order they were stacked.
use crate::error::{ModelError, Result};
use crate::integration::MeshIm;
use crate::mesh::{Mesh, RegionId};
use crate::space::MeshFem;
use log::{log, Level};
use nalgebra::DVector;
use std::collections::BTreeSet;
use std::ops::Range;

mod constraint;
mod elasticity;
mod elliptic;
mod factory;
mod params;
mod plate;
mod source;
mod system;

pub use constraint::{ConstraintBrick, ConstraintKind, ConstraintMode, DEFAULT_PENALIZATION};
pub use elasticity::ElasticityBrick;
pub use elliptic::{GenericEllipticBrick, NonlinearEllipticBrick};
pub use factory::{create, BrickArg};
pub use params::{ParamSet, ParamValue};
pub use plate::{PlateBrick, PlateClosingBrick, DEFAULT_SHEAR_CORRECTION};
pub use source::{PlateSourceBrick, SourceBrick};
pub use system::AssembledSystem;

use system::{AssemblyContext, SystemBuilder};

/// A named block of the unknown vector of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub range: Range<usize>,
}

/// Unknowns constrained by the layers of a chain, as field name and dof index within the field.
pub(crate) type ConstrainedDofs = BTreeSet<(&'static str, usize)>;

/// Behavior shared by all brick variants.
pub(crate) trait Layer<'a> {
    fn name(&self) -> &'static str;

    fn params(&self) -> Option<&ParamSet<'a>> {
        None
    }

    fn params_mut(&mut self) -> Option<&mut ParamSet<'a>> {
        None
    }

    /// Fields this layer adds to the unknowns when it sits at `depth` in the chain,
    /// above layers that already constrain the dofs in `below`.
    fn fields(&self, _depth: usize, _below: &ConstrainedDofs) -> Vec<(String, usize)> {
        Vec::new()
    }

    /// Dofs this layer constrains.
    fn constrained(&self) -> Vec<(&'static str, usize)> {
        Vec::new()
    }

    fn is_linear(&self) -> bool {
        true
    }

    /// Global indices this layer removes from the solved system.
    fn eliminated_dofs(&self, _layout: &[FieldInfo], _below: &ConstrainedDofs) -> Vec<usize> {
        Vec::new()
    }

    /// Adds the tangent and residual contributions of this layer.
    fn contribute(&self, ctx: &AssemblyContext<'_, 'a>, builder: &mut SystemBuilder) -> Result<()>;
}

/// Fails unless the integration method and all spaces live on the same mesh.
pub(crate) fn check_same_mesh(mim: &MeshIm, spaces: &[&MeshFem]) -> Result<()> {
    if spaces.iter().all(|space| std::ptr::eq(space.mesh(), mim.mesh())) {
        Ok(())
    } else {
        Err(ModelError::InvalidArgument(
            "integration method and finite element spaces must share the same mesh".to_string(),
        ))
    }
}

/// The variant stored at each position of a chain.
#[derive(Debug, Clone)]
pub enum BrickNode<'a> {
    Plate(PlateBrick<'a>),
    Elasticity(ElasticityBrick<'a>),
    GenericElliptic(GenericEllipticBrick<'a>),
    NonlinearElliptic(NonlinearEllipticBrick<'a>),
    Source(SourceBrick<'a>),
    PlateSource(PlateSourceBrick<'a>),
    Constraint(ConstraintBrick<'a>),
    PlateClosing(PlateClosingBrick<'a>),
}

impl<'a> BrickNode<'a> {
    pub(crate) fn as_layer(&self) -> &dyn Layer<'a> {
        match self {
            Self::Plate(brick) => brick,
            Self::Elasticity(brick) => brick,
            Self::GenericElliptic(brick) => brick,
            Self::NonlinearElliptic(brick) => brick,
            Self::Source(brick) => brick,
            Self::PlateSource(brick) => brick,
            Self::Constraint(brick) => brick,
            Self::PlateClosing(brick) => brick,
        }
    }

    pub(crate) fn as_layer_mut(&mut self) -> &mut dyn Layer<'a> {
        match self {
            Self::Plate(brick) => brick,
            Self::Elasticity(brick) => brick,
            Self::GenericElliptic(brick) => brick,
            Self::NonlinearElliptic(brick) => brick,
            Self::Source(brick) => brick,
            Self::PlateSource(brick) => brick,
            Self::Constraint(brick) => brick,
            Self::PlateClosing(brick) => brick,
        }
    }

    pub fn name(&self) -> &'static str {
        self.as_layer().name()
    }

    pub fn is_origin(&self) -> bool {
        self.main_field().is_some()
    }

    /// Name, integration method and space of the primary field of an origin brick.
    pub fn main_field(&self) -> Option<(&'static str, &'a MeshIm<'a>, &'a MeshFem<'a>)> {
        match self {
            Self::Plate(brick) => Some(("ut", brick.mim(), brick.mf_ut())),
            Self::Elasticity(brick) => Some(("u", brick.mim(), brick.mf_u())),
            Self::GenericElliptic(brick) => Some(("u", brick.mim(), brick.mf_u())),
            Self::NonlinearElliptic(brick) => Some(("u", brick.mim(), brick.mf_u())),
            _ => None,
        }
    }

    pub fn params(&self) -> Option<&ParamSet<'a>> {
        self.as_layer().params()
    }

    /// Sets a parameter declared by this brick.
    pub fn set_param(&mut self, name: &str, value: impl Into<ParamValue<'a>>) -> Result<()> {
        let brick = self.name();
        match self.as_layer_mut().params_mut() {
            Some(params) => params.set(name, value.into()),
            None => Err(ModelError::InvalidArgument(format!(
                "brick '{}' has no parameter '{}'",
                brick, name
            ))),
        }
    }
}

/// A brick together with the chain below it.
#[derive(Debug, Clone)]
pub struct Brick<'a> {
    node: BrickNode<'a>,
    parent: Option<Box<Brick<'a>>>,
}

impl<'a> Brick<'a> {
    fn origin_brick(node: BrickNode<'a>) -> Self {
        Self { node, parent: None }
    }

    fn decorate(parent: Brick<'a>, node: BrickNode<'a>) -> Self {
        Self {
            node,
            parent: Some(Box::new(parent)),
        }
    }

    /// Reissner-Mindlin plate with membrane, bending and transverse shear terms.
    ///
    /// The shear term is integrated with `mim_subint`, typically a reduced rule to avoid locking.
    pub fn isotropic_linearized_plate(
        mim: &'a MeshIm<'a>,
        mim_subint: &'a MeshIm<'a>,
        mf_ut: &'a MeshFem<'a>,
        mf_u3: &'a MeshFem<'a>,
        mf_theta: &'a MeshFem<'a>,
        thickness: f64,
    ) -> Result<Self> {
        let plate = PlateBrick::new(false, mim, mim_subint, mf_ut, mf_u3, mf_theta, thickness)?;
        Ok(Self::origin_brick(BrickNode::Plate(plate)))
    }

    /// Plate with membrane and bending terms only. Must be closed with [`Brick::plate_closing`].
    pub fn mixed_isotropic_linearized_plate(
        mim: &'a MeshIm<'a>,
        mf_ut: &'a MeshFem<'a>,
        mf_u3: &'a MeshFem<'a>,
        mf_theta: &'a MeshFem<'a>,
        thickness: f64,
    ) -> Result<Self> {
        let plate = PlateBrick::new(true, mim, mim, mf_ut, mf_u3, mf_theta, thickness)?;
        Ok(Self::origin_brick(BrickNode::Plate(plate)))
    }

    pub fn isotropic_linearized_elasticity(
        mim: &'a MeshIm<'a>,
        mf_u: &'a MeshFem<'a>,
        lambda: f64,
        mu: f64,
    ) -> Result<Self> {
        let brick = ElasticityBrick::new(mim, mf_u, lambda, mu)?;
        Ok(Self::origin_brick(BrickNode::Elasticity(brick)))
    }

    pub fn generic_elliptic(mim: &'a MeshIm<'a>, mf_u: &'a MeshFem<'a>, coeff: f64) -> Result<Self> {
        let brick = GenericEllipticBrick::new(mim, mf_u, coeff)?;
        Ok(Self::origin_brick(BrickNode::GenericElliptic(brick)))
    }

    pub fn nonlinear_elliptic(mim: &'a MeshIm<'a>, mf_u: &'a MeshFem<'a>, a0: f64, c: f64) -> Result<Self> {
        let brick = NonlinearEllipticBrick::new(mim, mf_u, a0, c)?;
        Ok(Self::origin_brick(BrickNode::NonlinearElliptic(brick)))
    }

    /// Adds the load `F` on the main field, over the whole domain or over a region.
    pub fn source_term(parent: Brick<'a>, region: Option<RegionId>) -> Result<Self> {
        let brick = SourceBrick::new(parent.origin(), region)?;
        Ok(Self::decorate(parent, BrickNode::Source(brick)))
    }

    pub fn plate_source_term(parent: Brick<'a>, region: Option<RegionId>) -> Result<Self> {
        let brick = PlateSourceBrick::new(parent.origin(), region)?;
        Ok(Self::decorate(parent, BrickNode::PlateSource(brick)))
    }

    pub fn plate_clamped_support(parent: Brick<'a>, region: RegionId, mode: ConstraintMode) -> Result<Self> {
        Self::constraint(parent, ConstraintKind::ClampedSupport, region, mode)
    }

    pub fn plate_simple_support(parent: Brick<'a>, region: RegionId, mode: ConstraintMode) -> Result<Self> {
        Self::constraint(parent, ConstraintKind::SimpleSupport, region, mode)
    }

    /// Prescribes the main field to the parameter `R` (zero by default) on a region.
    pub fn dirichlet(parent: Brick<'a>, region: RegionId, mode: ConstraintMode) -> Result<Self> {
        Self::constraint(parent, ConstraintKind::Dirichlet, region, mode)
    }

    fn constraint(parent: Brick<'a>, kind: ConstraintKind, region: RegionId, mode: ConstraintMode) -> Result<Self> {
        let brick = ConstraintBrick::new(parent.origin(), kind, region, mode)?;
        Ok(Self::decorate(parent, BrickNode::Constraint(brick)))
    }

    /// Adds the shear resultant of a mixed plate.
    pub fn plate_closing(parent: Brick<'a>) -> Result<Self> {
        if parent
            .layers()
            .iter()
            .any(|node| matches!(node, BrickNode::PlateClosing(_)))
        {
            return Err(ModelError::InvalidBrickChain(
                "the plate is already closed".to_string(),
            ));
        }
        let brick = PlateClosingBrick::new(parent.origin())?;
        Ok(Self::decorate(parent, BrickNode::PlateClosing(brick)))
    }

    pub fn node(&self) -> &BrickNode<'a> {
        &self.node
    }

    pub fn name(&self) -> &'static str {
        self.node.name()
    }

    pub fn parent(&self) -> Option<&Brick<'a>> {
        self.parent.as_deref()
    }

    /// Position of this brick in its chain; the origin has depth 0.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(parent) = current.parent() {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// The nodes of the chain, origin first.
    pub fn layers(&self) -> Vec<&BrickNode<'a>> {
        let mut layers = vec![&self.node];
        let mut current = self;
        while let Some(parent) = current.parent() {
            layers.push(&parent.node);
            current = parent;
        }
        layers.reverse();
        layers
    }

    /// The node at the given depth.
    pub fn layer_mut(&mut self, depth: usize) -> Result<&mut BrickNode<'a>> {
        let own_depth = self.depth();
        if depth > own_depth {
            return Err(ModelError::InvalidArgument(format!(
                "depth {} exceeds the chain depth {}",
                depth, own_depth
            )));
        }
        let mut current = self;
        for _ in depth..own_depth {
            current = match current.parent.as_deref_mut() {
                Some(parent) => parent,
                None => break,
            };
        }
        Ok(&mut current.node)
    }

    pub fn origin(&self) -> &BrickNode<'a> {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        &current.node
    }

    pub fn mesh(&self) -> Option<&'a Mesh> {
        self.origin().main_field().map(|(_, mim, _)| mim.mesh())
    }

    /// Named blocks of the unknown vector, in layout order.
    pub fn fields(&self) -> Vec<FieldInfo> {
        let mut fields = Vec::new();
        let mut offset = 0;
        let mut constrained = ConstrainedDofs::new();
        for (depth, node) in self.layers().into_iter().enumerate() {
            for (name, size) in node.as_layer().fields(depth, &constrained) {
                fields.push(FieldInfo {
                    name,
                    range: offset..offset + size,
                });
                offset += size;
            }
            constrained.extend(node.as_layer().constrained());
        }
        fields
    }

    pub fn field_range(&self, name: &str) -> Result<Range<usize>> {
        self.fields()
            .into_iter()
            .find(|field| field.name == name)
            .map(|field| field.range)
            .ok_or_else(|| ModelError::InvalidArgument(format!("the chain has no field '{}'", name)))
    }

    /// Length of the state vector.
    pub fn nb_dof(&self) -> usize {
        self.fields().last().map(|field| field.range.end).unwrap_or(0)
    }

    /// Global indices removed from the solved system by eliminated constraints.
    pub fn eliminated_dofs(&self) -> BTreeSet<usize> {
        let layout = self.fields();
        let mut eliminated = BTreeSet::new();
        let mut constrained = ConstrainedDofs::new();
        for node in self.layers() {
            eliminated.extend(node.as_layer().eliminated_dofs(&layout, &constrained));
            constrained.extend(node.as_layer().constrained());
        }
        eliminated
    }

    /// Number of unknowns actually solved for.
    pub fn nb_effective_dof(&self) -> usize {
        self.nb_dof() - self.eliminated_dofs().len()
    }

    pub fn is_linear(&self) -> bool {
        self.layers().into_iter().all(|node| node.as_layer().is_linear())
    }

    /// Sets a parameter on the topmost brick of the chain that declares it.
    pub fn set_param(&mut self, name: &str, value: impl Into<ParamValue<'a>>) -> Result<()> {
        let value = value.into();
        if let ParamValue::Field { space, .. } = &value {
            let same_mesh = self.mesh().map_or(false, |mesh| std::ptr::eq(mesh, space.mesh()));
            if !same_mesh {
                return Err(ModelError::InvalidArgument(format!(
                    "parameter '{}' is defined on a different mesh",
                    name
                )));
            }
        }

        let mut current = self;
        loop {
            let declares = current
                .node
                .params()
                .map_or(false, |params| params.contains(name));
            if declares {
                return current.node.set_param(name, value);
            }
            current = match current.parent.as_deref_mut() {
                Some(parent) => parent,
                None => {
                    return Err(ModelError::InvalidArgument(format!(
                        "no brick of the chain has a parameter '{}'",
                        name
                    )))
                }
            };
        }
    }

    /// Current value of a parameter, looked up like [`Brick::set_param`].
    pub fn param(&self, name: &str) -> Option<&ParamValue<'a>> {
        let mut current = Some(self);
        while let Some(brick) = current {
            if let Some(value) = brick.node.params().and_then(|params| params.get(name)) {
                return Some(value);
            }
            current = brick.parent();
        }
        None
    }

    /// Changes the enforcement mode of the constraint at the top of the chain.
    pub fn set_constraint_mode(&mut self, mode: ConstraintMode) -> Result<()> {
        match &mut self.node {
            BrickNode::Constraint(constraint) => {
                constraint.set_mode(mode);
                Ok(())
            }
            node => Err(ModelError::InvalidArgument(format!(
                "brick '{}' is not a constraint",
                node.name()
            ))),
        }
    }

    /// Assembles the tangent matrix and residual of the whole chain at `state`.
    pub fn assemble(&self, state: &DVector<f64>, parallel: bool) -> Result<AssembledSystem> {
        self.assemble_logged(state, Level::Debug, parallel)
    }

    pub(crate) fn assemble_logged(&self, state: &DVector<f64>, level: Level, parallel: bool) -> Result<AssembledSystem> {
        let layout = self.fields();
        let size = layout.last().map(|field| field.range.end).unwrap_or(0);
        if state.len() != size {
            return Err(ModelError::InvalidArgument(format!(
                "state has length {}, the chain has {} unknowns",
                state.len(),
                size
            )));
        }

        let layers = self.layers();
        let origin = layers[0];
        let mut builder = SystemBuilder::new(size, level);
        let mut constrained = ConstrainedDofs::new();
        for (depth, node) in layers.into_iter().enumerate() {
            log!(level, "Assembling brick {} ({})", depth, node.name());
            let ctx = AssemblyContext {
                layout: &layout,
                origin,
                state,
                depth,
                constrained_below: &constrained,
                parallel,
            };
            node.as_layer().contribute(&ctx, &mut builder)?;
            constrained.extend(node.as_layer().constrained());
        }
        Ok(builder.finish())
    }
}
