use crate::assembly::local::{
    ElementIntegrator, FieldBlock, FormAssembler, IntegrationSite, LoadAssembler, MatrixIntegrand, PointData,
    VectorIntegrand,
};
use crate::brick::params::{ParamSet, ParamValue};
use crate::brick::system::{AssemblyContext, SystemBuilder};
use crate::brick::{check_same_mesh, ConstrainedDofs, Layer};
use crate::error::{ModelError, Result};
use crate::integration::MeshIm;
use crate::space::MeshFem;
use itertools::izip;
use nalgebra::{DMatrixViewMut, DVector, DVectorViewMut, Vector2};

/// `int a grad u : grad v`, applied to each component of `u`.
#[derive(Debug, Clone)]
pub struct GenericEllipticBrick<'a> {
    mim: &'a MeshIm<'a>,
    mf_u: &'a MeshFem<'a>,
    params: ParamSet<'a>,
}

impl<'a> GenericEllipticBrick<'a> {
    pub(crate) fn new(mim: &'a MeshIm<'a>, mf_u: &'a MeshFem<'a>, coeff: f64) -> Result<Self> {
        check_same_mesh(mim, &[mf_u])?;
        Ok(Self {
            mim,
            mf_u,
            params: ParamSet::new().declare("coeff", 1, ParamValue::scalar(coeff)),
        })
    }

    pub fn mim(&self) -> &'a MeshIm<'a> {
        self.mim
    }

    pub fn mf_u(&self) -> &'a MeshFem<'a> {
        self.mf_u
    }
}

struct LaplaceIntegrand<'p, 'a> {
    params: &'p ParamSet<'a>,
}

impl<'p, 'a> MatrixIntegrand for LaplaceIntegrand<'p, 'a> {
    fn accumulate(&self, point: &PointData, output: &mut DMatrixViewMut<f64>) -> eyre::Result<()> {
        let a = self.params.scalar_at("coeff", point.convex, &point.reference)?;
        let basis = &point.blocks[0];
        let grads = basis.gradients();
        for (i, grad_i) in grads.iter().enumerate() {
            for (j, grad_j) in grads.iter().enumerate() {
                let value = point.weight * a * grad_i.dot(grad_j);
                for c in 0..basis.qdim() {
                    output[(basis.local_index(i, c), basis.local_index(j, c))] += value;
                }
            }
        }
        Ok(())
    }
}

impl<'a> Layer<'a> for GenericEllipticBrick<'a> {
    fn name(&self) -> &'static str {
        "generic elliptic"
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
        let integrand = LaplaceIntegrand { params: &self.params };
        builder.add_linear_term(
            "elliptic stiffness",
            &FormAssembler::new(integrator, integrand),
            ctx.state,
            ctx.parallel,
        )
    }
}

/// The nonlinear diffusion operator `-div(a0 (1 + c u^2) grad u)` on a scalar field `u`.
#[derive(Debug, Clone)]
pub struct NonlinearEllipticBrick<'a> {
    mim: &'a MeshIm<'a>,
    mf_u: &'a MeshFem<'a>,
    params: ParamSet<'a>,
}

impl<'a> NonlinearEllipticBrick<'a> {
    pub(crate) fn new(mim: &'a MeshIm<'a>, mf_u: &'a MeshFem<'a>, a0: f64, c: f64) -> Result<Self> {
        if mf_u.qdim() != 1 {
            return Err(ModelError::InvalidArgument(format!(
                "the nonlinear elliptic brick needs a scalar field, got dimension {}",
                mf_u.qdim()
            )));
        }
        check_same_mesh(mim, &[mf_u])?;
        Ok(Self {
            mim,
            mf_u,
            params: ParamSet::new()
                .declare("a0", 1, ParamValue::scalar(a0))
                .declare("c", 1, ParamValue::scalar(c)),
        })
    }

    pub fn mim(&self) -> &'a MeshIm<'a> {
        self.mim
    }

    pub fn mf_u(&self) -> &'a MeshFem<'a> {
        self.mf_u
    }
}

/// Value and gradient of the current solution at a quadrature point.
fn interpolate_state(point: &PointData, state: &DVector<f64>) -> (f64, Vector2<f64>) {
    let basis = &point.blocks[0];
    let mut u = 0.0;
    let mut grad_u = Vector2::zeros();
    for (i, (phi, grad)) in izip!(basis.values(), basis.gradients()).enumerate() {
        let u_i = state[point.element_dofs[basis.local_index(i, 0)]];
        u += phi * u_i;
        grad_u += grad * u_i;
    }
    (u, grad_u)
}

struct NonlinearTangentIntegrand<'p, 'a> {
    params: &'p ParamSet<'a>,
    state: &'p DVector<f64>,
}

impl<'p, 'a> MatrixIntegrand for NonlinearTangentIntegrand<'p, 'a> {
    fn accumulate(&self, point: &PointData, output: &mut DMatrixViewMut<f64>) -> eyre::Result<()> {
        let a0 = self.params.scalar_at("a0", point.convex, &point.reference)?;
        let c = self.params.scalar_at("c", point.convex, &point.reference)?;
        let (u, grad_u) = interpolate_state(point, self.state);
        let diffusivity = a0 * (1.0 + c * u * u);
        let basis = &point.blocks[0];
        let (phi, grads) = (basis.values(), basis.gradients());
        for i in 0..basis.num_nodes() {
            let flux_i = grad_u.dot(&grads[i]);
            for j in 0..basis.num_nodes() {
                let value = diffusivity * grads[j].dot(&grads[i]) + 2.0 * a0 * c * u * phi[j] * flux_i;
                output[(basis.local_index(i, 0), basis.local_index(j, 0))] += point.weight * value;
            }
        }
        Ok(())
    }
}

struct NonlinearResidualIntegrand<'p, 'a> {
    params: &'p ParamSet<'a>,
    state: &'p DVector<f64>,
}

impl<'p, 'a> VectorIntegrand for NonlinearResidualIntegrand<'p, 'a> {
    fn accumulate(&self, point: &PointData, output: &mut DVectorViewMut<f64>) -> eyre::Result<()> {
        let a0 = self.params.scalar_at("a0", point.convex, &point.reference)?;
        let c = self.params.scalar_at("c", point.convex, &point.reference)?;
        let (u, grad_u) = interpolate_state(point, self.state);
        let diffusivity = a0 * (1.0 + c * u * u);
        let basis = &point.blocks[0];
        for (i, grad) in basis.gradients().iter().enumerate() {
            output[basis.local_index(i, 0)] += point.weight * diffusivity * grad_u.dot(grad);
        }
        Ok(())
    }
}

impl<'a> Layer<'a> for NonlinearEllipticBrick<'a> {
    fn name(&self) -> &'static str {
        "nonlinear elliptic"
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

    fn is_linear(&self) -> bool {
        false
    }

    fn contribute(&self, ctx: &AssemblyContext<'_, 'a>, builder: &mut SystemBuilder) -> Result<()> {
        let block = FieldBlock::new(self.mf_u, ctx.offset("u")?);
        let sites: Vec<_> = self.mf_u.convexes_with_element().map(IntegrationSite::Convex).collect();
        let integrator = ElementIntegrator::new(self.mim, vec![block], sites, ctx.layout_size());

        let tangent = FormAssembler::new(
            integrator.clone(),
            NonlinearTangentIntegrand {
                params: &self.params,
                state: ctx.state,
            },
        );
        let matrix = builder.assemble_matrix("nonlinear elliptic tangent", &tangent, ctx.parallel)?;
        builder.add_tangent(&matrix);

        let residual = LoadAssembler::new(
            integrator,
            NonlinearResidualIntegrand {
                params: &self.params,
                state: ctx.state,
            },
        );
        builder.add_residual("nonlinear elliptic residual", &residual, 1.0, ctx.parallel)
    }
}
