//! Construction of bricks from a name and a positional argument list.
use crate::brick::{Brick, ConstraintMode};
use crate::error::{ModelError, Result};
use crate::integration::MeshIm;
use crate::mesh::RegionId;
use crate::space::MeshFem;
use std::iter::Peekable;
use std::vec::IntoIter;

/// A positional argument of [`create`].
#[derive(Debug)]
pub enum BrickArg<'a> {
    Parent(Brick<'a>),
    Im(&'a MeshIm<'a>),
    Fem(&'a MeshFem<'a>),
    Real(f64),
    Region(RegionId),
    Str(String),
}

impl<'a> BrickArg<'a> {
    fn kind(&self) -> &'static str {
        match self {
            Self::Parent(_) => "brick",
            Self::Im(_) => "integration method",
            Self::Fem(_) => "finite element space",
            Self::Real(_) => "real",
            Self::Region(_) => "region",
            Self::Str(_) => "string",
        }
    }
}

impl<'a> From<Brick<'a>> for BrickArg<'a> {
    fn from(brick: Brick<'a>) -> Self {
        Self::Parent(brick)
    }
}

impl<'a> From<&'a MeshIm<'a>> for BrickArg<'a> {
    fn from(mim: &'a MeshIm<'a>) -> Self {
        Self::Im(mim)
    }
}

impl<'a> From<&'a MeshFem<'a>> for BrickArg<'a> {
    fn from(mf: &'a MeshFem<'a>) -> Self {
        Self::Fem(mf)
    }
}

impl<'a> From<f64> for BrickArg<'a> {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl<'a> From<&str> for BrickArg<'a> {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// Cursor over the arguments of a single `create` call.
struct Args<'a> {
    brick: String,
    position: usize,
    args: Peekable<IntoIter<BrickArg<'a>>>,
}

macro_rules! expect_arg {
    ($args:expr, $variant:ident, $what:expr) => {{
        let position = $args.position;
        match $args.next()? {
            BrickArg::$variant(value) => Ok(value),
            other => Err($args.mismatch(position, $what, &other)),
        }
    }};
}

impl<'a> Args<'a> {
    fn next(&mut self) -> Result<BrickArg<'a>> {
        self.position += 1;
        self.args.next().ok_or_else(|| {
            ModelError::InvalidArgument(format!(
                "brick '{}' expects more than {} argument(s)",
                self.brick,
                self.position - 1
            ))
        })
    }

    fn mismatch(&self, position: usize, expected: &str, found: &BrickArg) -> ModelError {
        ModelError::InvalidArgument(format!(
            "argument {} of brick '{}' must be a {}, got a {}",
            position,
            self.brick,
            expected,
            found.kind()
        ))
    }

    fn parent(&mut self) -> Result<Brick<'a>> {
        expect_arg!(self, Parent, "brick")
    }

    fn im(&mut self) -> Result<&'a MeshIm<'a>> {
        expect_arg!(self, Im, "integration method")
    }

    fn fem(&mut self) -> Result<&'a MeshFem<'a>> {
        expect_arg!(self, Fem, "finite element space")
    }

    fn real(&mut self) -> Result<f64> {
        expect_arg!(self, Real, "real")
    }

    fn region(&mut self) -> Result<RegionId> {
        expect_arg!(self, Region, "region")
    }

    fn optional_real(&mut self) -> Result<Option<f64>> {
        match self.args.peek() {
            Some(BrickArg::Real(_)) => self.real().map(Some),
            _ => Ok(None),
        }
    }

    fn optional_region(&mut self) -> Result<Option<RegionId>> {
        match self.args.peek() {
            Some(BrickArg::Region(_)) => self.region().map(Some),
            _ => Ok(None),
        }
    }

    fn optional_mode(&mut self) -> Result<ConstraintMode> {
        match self.args.peek() {
            Some(BrickArg::Str(_)) => expect_arg!(self, Str, "string")?.parse(),
            _ => Ok(ConstraintMode::default()),
        }
    }

    fn finish(mut self) -> Result<()> {
        match self.args.next() {
            None => Ok(()),
            Some(extra) => Err(ModelError::InvalidArgument(format!(
                "brick '{}' got an unexpected {} as argument {}",
                self.brick,
                extra.kind(),
                self.position + 1
            ))),
        }
    }
}

/// Canonical form of a brick name: lowercase with words separated by underscores.
fn normalize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Creates a brick from its name, as in `"plate clamped support"`, and its arguments.
///
/// Names are case-insensitive and spaces, dashes and underscores are interchangeable.
pub fn create<'a>(name: &str, args: Vec<BrickArg<'a>>) -> Result<Brick<'a>> {
    let brick = normalize(name);
    let mut args = Args {
        brick: brick.clone(),
        position: 0,
        args: args.into_iter().peekable(),
    };

    let created = match brick.as_str() {
        "isotropic_linearized_plate" => Brick::isotropic_linearized_plate(
            args.im()?,
            args.im()?,
            args.fem()?,
            args.fem()?,
            args.fem()?,
            args.real()?,
        )?,
        "mixed_isotropic_linearized_plate" => {
            Brick::mixed_isotropic_linearized_plate(args.im()?, args.fem()?, args.fem()?, args.fem()?, args.real()?)?
        }
        "isotropic_linearized_elasticity" => {
            Brick::isotropic_linearized_elasticity(args.im()?, args.fem()?, args.real()?, args.real()?)?
        }
        "generic_elliptic" => {
            let (mim, mf_u) = (args.im()?, args.fem()?);
            Brick::generic_elliptic(mim, mf_u, args.optional_real()?.unwrap_or(1.0))?
        }
        "nonlinear_elliptic" => Brick::nonlinear_elliptic(args.im()?, args.fem()?, args.real()?, args.real()?)?,
        "source_term" => {
            let parent = args.parent()?;
            Brick::source_term(parent, args.optional_region()?)?
        }
        "plate_source_term" => {
            let parent = args.parent()?;
            Brick::plate_source_term(parent, args.optional_region()?)?
        }
        "plate_clamped_support" | "plate_simple_support" | "dirichlet" => {
            let (parent, region) = (args.parent()?, args.region()?);
            let mode = args.optional_mode()?;
            match brick.as_str() {
                "plate_clamped_support" => Brick::plate_clamped_support(parent, region, mode)?,
                "plate_simple_support" => Brick::plate_simple_support(parent, region, mode)?,
                _ => Brick::dirichlet(parent, region, mode)?,
            }
        }
        "plate_closing" => Brick::plate_closing(args.parent()?)?,
        _ => return Err(ModelError::UnknownBrick(name.to_string())),
    };

    args.finish()?;
    Ok(created)
}
