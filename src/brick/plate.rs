//! Reissner-Mindlin plate model: membrane, bending and transverse shear.
use crate::assembly::local::{
    BlockBasis, ElementIntegrator, FieldBlock, FormAssembler, IntegrationSite, MatrixIntegrand, PointData,
};
use crate::brick::elasticity::{IsotropicIntegrand, IsotropicScaling};
use crate::brick::params::{ParamSet, ParamValue};
use crate::brick::system::{AssemblyContext, SystemBuilder};
use crate::brick::{check_same_mesh, BrickNode, ConstrainedDofs, Layer};
use crate::error::{ModelError, Result};
use crate::integration::MeshIm;
use crate::space::MeshFem;
use eyre::eyre;
use nalgebra::{DMatrixViewMut, Vector2};

pub const DEFAULT_SHEAR_CORRECTION: f64 = 5.0 / 6.0;

/// Isotropic linearized plate on the fields `ut` (in-plane displacement), `u3` (transverse
/// displacement) and `theta` (rotation).
///
/// The mixed variant only carries membrane and bending terms; its transverse shear is supplied
/// by a [`PlateClosingBrick`] on top of it.
#[derive(Debug, Clone)]
pub struct PlateBrick<'a> {
    mixed: bool,
    mim: &'a MeshIm<'a>,
    mim_subint: &'a MeshIm<'a>,
    mf_ut: &'a MeshFem<'a>,
    mf_u3: &'a MeshFem<'a>,
    mf_theta: &'a MeshFem<'a>,
    params: ParamSet<'a>,
}

impl<'a> PlateBrick<'a> {
    pub(crate) fn new(
        mixed: bool,
        mim: &'a MeshIm<'a>,
        mim_subint: &'a MeshIm<'a>,
        mf_ut: &'a MeshFem<'a>,
        mf_u3: &'a MeshFem<'a>,
        mf_theta: &'a MeshFem<'a>,
        thickness: f64,
    ) -> Result<Self> {
        for (name, space, qdim) in [("ut", mf_ut, 2), ("u3", mf_u3, 1), ("theta", mf_theta, 2)] {
            if space.qdim() != qdim {
                return Err(ModelError::InvalidArgument(format!(
                    "plate field '{}' must have dimension {}, got {}",
                    name,
                    qdim,
                    space.qdim()
                )));
            }
        }
        if !(thickness > 0.0) {
            return Err(ModelError::InvalidArgument(format!(
                "plate thickness must be positive, got {}",
                thickness
            )));
        }
        check_same_mesh(mim, &[mf_ut, mf_u3, mf_theta])?;
        check_same_mesh(mim_subint, &[mf_ut])?;

        Ok(Self {
            mixed,
            mim,
            mim_subint,
            mf_ut,
            mf_u3,
            mf_theta,
            params: ParamSet::new()
                .declare("lambda", 1, ParamValue::scalar(0.0))
                .declare("mu", 1, ParamValue::scalar(1.0))
                .declare("thickness", 1, ParamValue::scalar(thickness))
                .declare("kappa", 1, ParamValue::scalar(DEFAULT_SHEAR_CORRECTION)),
        })
    }

    pub fn is_mixed(&self) -> bool {
        self.mixed
    }

    pub fn mim(&self) -> &'a MeshIm<'a> {
        self.mim
    }

    pub fn mf_ut(&self) -> &'a MeshFem<'a> {
        self.mf_ut
    }

    pub fn mf_u3(&self) -> &'a MeshFem<'a> {
        self.mf_u3
    }

    pub fn mf_theta(&self) -> &'a MeshFem<'a> {
        self.mf_theta
    }

    pub(crate) fn plate_params(&self) -> &ParamSet<'a> {
        &self.params
    }
}

impl<'a> Layer<'a> for PlateBrick<'a> {
    fn name(&self) -> &'static str {
        if self.mixed {
            "mixed isotropic linearized plate"
        } else {
            "isotropic linearized plate"
        }
    }

    fn params(&self) -> Option<&ParamSet<'a>> {
        Some(&self.params)
    }

    fn params_mut(&mut self) -> Option<&mut ParamSet<'a>> {
        Some(&mut self.params)
    }

    fn fields(&self, _depth: usize, _below: &ConstrainedDofs) -> Vec<(String, usize)> {
        vec![
            ("ut".to_string(), self.mf_ut.nb_dof()),
            ("u3".to_string(), self.mf_u3.nb_dof()),
            ("theta".to_string(), self.mf_theta.nb_dof()),
        ]
    }

    fn contribute(&self, ctx: &AssemblyContext<'_, 'a>, builder: &mut SystemBuilder) -> Result<()> {
        let n = ctx.layout_size();
        let ut = FieldBlock::new(self.mf_ut, ctx.offset("ut")?);
        let u3 = FieldBlock::new(self.mf_u3, ctx.offset("u3")?);
        let theta = FieldBlock::new(self.mf_theta, ctx.offset("theta")?);
        let sites: Vec<_> = self
            .mf_ut
            .convexes_with_element()
            .map(IntegrationSite::Convex)
            .collect();

        let membrane = FormAssembler::new(
            ElementIntegrator::new(self.mim, vec![ut], sites.clone(), n),
            IsotropicIntegrand {
                params: &self.params,
                scaling: IsotropicScaling::Membrane,
            },
        );
        builder.add_linear_term("plate membrane", &membrane, ctx.state, ctx.parallel)?;

        let bending = FormAssembler::new(
            ElementIntegrator::new(self.mim, vec![theta], sites.clone(), n),
            IsotropicIntegrand {
                params: &self.params,
                scaling: IsotropicScaling::Bending,
            },
        );
        builder.add_linear_term("plate bending", &bending, ctx.state, ctx.parallel)?;

        if !self.mixed {
            let shear = FormAssembler::new(
                ElementIntegrator::new(self.mim_subint, vec![u3, theta], sites, n),
                ShearIntegrand { params: &self.params },
            );
            builder.add_linear_term("plate transverse shear", &shear, ctx.state, ctx.parallel)?;
        }
        Ok(())
    }
}

/// Shear strain `grad v3 - psi` of every local test function of the `u3` and `theta` blocks.
fn shear_strains(u3: &BlockBasis, theta: &BlockBasis) -> Vec<(usize, Vector2<f64>)> {
    let mut strains = Vec::with_capacity(u3.num_nodes() + 2 * theta.num_nodes());
    for (i, grad) in u3.gradients().iter().enumerate() {
        strains.push((u3.local_index(i, 0), *grad));
    }
    for (j, phi) in theta.values().iter().enumerate() {
        for a in 0..2 {
            let mut strain = Vector2::zeros();
            strain[a] = -phi;
            strains.push((theta.local_index(j, a), strain));
        }
    }
    strains
}

/// `kappa mu h`, the transverse shear stiffness.
fn shear_stiffness(params: &ParamSet, point: &PointData) -> eyre::Result<f64> {
    let (convex, xi) = (point.convex, &point.reference);
    let kappa = params.scalar_at("kappa", convex, xi)?;
    let mu = params.scalar_at("mu", convex, xi)?;
    let h = params.scalar_at("thickness", convex, xi)?;
    Ok(kappa * mu * h)
}

struct ShearIntegrand<'p, 'a> {
    params: &'p ParamSet<'a>,
}

impl<'p, 'a> MatrixIntegrand for ShearIntegrand<'p, 'a> {
    fn accumulate(&self, point: &PointData, output: &mut DMatrixViewMut<f64>) -> eyre::Result<()> {
        let stiffness = shear_stiffness(self.params, point)?;
        let strains = shear_strains(&point.blocks[0], &point.blocks[1]);
        for (row, s_row) in &strains {
            for (col, s_col) in &strains {
                output[(*row, *col)] += point.weight * stiffness * s_row.dot(s_col);
            }
        }
        Ok(())
    }
}

/// Introduces the shear resultant `q` of a mixed plate, with
/// `int q . (grad v3 - psi)` and `int (grad u3 - theta) . r - 1 / (kappa mu h) int q . r = 0`.
#[derive(Debug, Clone)]
pub struct PlateClosingBrick<'a> {
    mim: &'a MeshIm<'a>,
    mf_u3: &'a MeshFem<'a>,
    mf_theta: &'a MeshFem<'a>,
}

impl<'a> PlateClosingBrick<'a> {
    pub(crate) fn new(origin: &BrickNode<'a>) -> Result<Self> {
        match origin {
            BrickNode::Plate(plate) if plate.is_mixed() => Ok(Self {
                mim: plate.mim(),
                mf_u3: plate.mf_u3(),
                mf_theta: plate.mf_theta(),
            }),
            _ => Err(ModelError::InvalidBrickChain(
                "plate closing requires a mixed isotropic linearized plate".to_string(),
            )),
        }
    }
}

struct ClosingIntegrand<'p, 'a> {
    params: &'p ParamSet<'a>,
}

impl<'p, 'a> MatrixIntegrand for ClosingIntegrand<'p, 'a> {
    fn accumulate(&self, point: &PointData, output: &mut DMatrixViewMut<f64>) -> eyre::Result<()> {
        let stiffness = shear_stiffness(self.params, point)?;
        if stiffness == 0.0 {
            return Err(eyre!("vanishing shear stiffness in convex {}", point.convex));
        }
        let strains = shear_strains(&point.blocks[0], &point.blocks[1]);
        let q = &point.blocks[2];
        let w = point.weight;

        for (j, phi_j) in q.values().iter().enumerate() {
            for a in 0..2 {
                let q_col = q.local_index(j, a);
                for (row, s_row) in &strains {
                    let value = w * s_row[a] * phi_j;
                    output[(*row, q_col)] += value;
                    output[(q_col, *row)] += value;
                }
                for (i, phi_i) in q.values().iter().enumerate() {
                    output[(q.local_index(i, a), q_col)] -= w * phi_i * phi_j / stiffness;
                }
            }
        }
        Ok(())
    }
}

impl<'a> Layer<'a> for PlateClosingBrick<'a> {
    fn name(&self) -> &'static str {
        "plate closing"
    }

    fn fields(&self, _depth: usize, _below: &ConstrainedDofs) -> Vec<(String, usize)> {
        vec![("q".to_string(), self.mf_theta.nb_dof())]
    }

    fn contribute(&self, ctx: &AssemblyContext<'_, 'a>, builder: &mut SystemBuilder) -> Result<()> {
        let params = match ctx.origin {
            BrickNode::Plate(plate) => plate.plate_params(),
            _ => {
                return Err(ModelError::InvalidBrickChain(
                    "plate closing requires a mixed isotropic linearized plate".to_string(),
                ))
            }
        };
        let blocks = vec![
            FieldBlock::new(self.mf_u3, ctx.offset("u3")?),
            FieldBlock::new(self.mf_theta, ctx.offset("theta")?),
            FieldBlock::new(self.mf_theta, ctx.offset("q")?),
        ];
        let sites = self
            .mf_u3
            .convexes_with_element()
            .map(IntegrationSite::Convex)
            .collect();
        let closing = FormAssembler::new(
            ElementIntegrator::new(self.mim, blocks, sites, ctx.layout_size()),
            ClosingIntegrand { params },
        );
        builder.add_linear_term("plate closing", &closing, ctx.state, ctx.parallel)
    }
}
