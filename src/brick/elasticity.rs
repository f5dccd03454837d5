use crate::assembly::local::{
    accumulate_isotropic_form, ElementIntegrator, FieldBlock, FormAssembler, IntegrationSite, MatrixIntegrand,
    PointData,
};
use crate::brick::params::{ParamSet, ParamValue};
use crate::brick::system::{AssemblyContext, SystemBuilder};
use crate::brick::{check_same_mesh, ConstrainedDofs, Layer};
use crate::error::{ModelError, Result};
use crate::integration::MeshIm;
use crate::space::MeshFem;
use eyre::eyre;
use nalgebra::DMatrixViewMut;

/// How the isotropic form `lambda div u div v + 2 mu eps(u) : eps(v)` is scaled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum IsotropicScaling {
    /// Plane strain: unit factor and the Lamé coefficient `lambda` as given.
    PlaneStrain,
    /// Plate membrane: factor `h` and the plane-stress coefficient `2 lambda mu / (lambda + 2 mu)`.
    Membrane,
    /// Plate bending: factor `h^3 / 12` and the plane-stress coefficient.
    Bending,
}

pub(crate) struct IsotropicIntegrand<'p, 'a> {
    pub params: &'p ParamSet<'a>,
    pub scaling: IsotropicScaling,
}

impl<'p, 'a> MatrixIntegrand for IsotropicIntegrand<'p, 'a> {
    fn accumulate(&self, point: &PointData, output: &mut DMatrixViewMut<f64>) -> eyre::Result<()> {
        let (convex, xi) = (point.convex, &point.reference);
        let lambda = self.params.scalar_at("lambda", convex, xi)?;
        let mu = self.params.scalar_at("mu", convex, xi)?;

        let (factor, lambda) = match self.scaling {
            IsotropicScaling::PlaneStrain => (1.0, lambda),
            IsotropicScaling::Membrane | IsotropicScaling::Bending => {
                let h = self.params.scalar_at("thickness", convex, xi)?;
                let denominator = lambda + 2.0 * mu;
                if denominator == 0.0 {
                    return Err(eyre!("lambda + 2 mu vanishes in convex {}", convex));
                }
                let lambda_star = 2.0 * lambda * mu / denominator;
                match self.scaling {
                    IsotropicScaling::Bending => (h * h * h / 12.0, lambda_star),
                    _ => (h, lambda_star),
                }
            }
        };

        accumulate_isotropic_form(output, &point.blocks[0], point.weight * factor, lambda, mu);
        Ok(())
    }
}

/// Plane-strain isotropic linear elasticity on a two-component field `u`.
#[derive(Debug, Clone)]
pub struct ElasticityBrick<'a> {
    mim: &'a MeshIm<'a>,
    mf_u: &'a MeshFem<'a>,
    params: ParamSet<'a>,
}

impl<'a> ElasticityBrick<'a> {
    pub(crate) fn new(mim: &'a MeshIm<'a>, mf_u: &'a MeshFem<'a>, lambda: f64, mu: f64) -> Result<Self> {
        if mf_u.qdim() != 2 {
            return Err(ModelError::InvalidArgument(format!(
                "linearized elasticity needs a field of dimension 2, got {}",
                mf_u.qdim()
            )));
        }
        check_same_mesh(mim, &[mf_u])?;
        Ok(Self {
            mim,
            mf_u,
            params: ParamSet::new()
                .declare("lambda", 1, ParamValue::scalar(lambda))
                .declare("mu", 1, ParamValue::scalar(mu)),
        })
    }

    pub fn mim(&self) -> &'a MeshIm<'a> {
        self.mim
    }

    pub fn mf_u(&self) -> &'a MeshFem<'a> {
        self.mf_u
    }
}

impl<'a> Layer<'a> for ElasticityBrick<'a> {
    fn name(&self) -> &'static str {
        "isotropic linearized elasticity"
    }

    fn params(&self) -> Option<&ParamSet<'a>> {
        Some(&self.params)
    }

    fn params_mut(&mut self) -> Option<&mut ParamSet<'a>> {
        Some(&mut self.params)
    }

    fn fields(&self, _depth: usize, _below: &ConstrainedDofs) -> Vec<(String, usize)> {
        vec![("u".to_string(), self.mf_u.nb_dof())]
    }

    fn contribute(&self, ctx: &AssemblyContext<'_, 'a>, builder: &mut SystemBuilder) -> Result<()> {
        let block = FieldBlock::new(self.mf_u, ctx.offset("u")?);
        let sites = self.mf_u.convexes_with_element().map(IntegrationSite::Convex).collect();
        let integrator = ElementIntegrator::new(self.mim, vec![block], sites, ctx.layout_size());
        let integrand = IsotropicIntegrand {
            params: &self.params,
            scaling: IsotropicScaling::PlaneStrain,
        };
        builder.add_linear_term(
            "elasticity stiffness",
            &FormAssembler::new(integrator, integrand),
            ctx.state,
            ctx.parallel,
        )
    }
}
