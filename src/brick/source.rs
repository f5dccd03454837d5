//! Volume and boundary loads.
use crate::assembly::local::{ElementIntegrator, FieldBlock, IntegrationSite, LoadAssembler, PointData, VectorIntegrand};
use crate::brick::params::{ParamSet, ParamValue};
use crate::brick::system::{AssemblyContext, SystemBuilder};
use crate::brick::{BrickNode, Layer};
use crate::error::{ModelError, Result};
use crate::integration::MeshIm;
use crate::mesh::RegionId;
use crate::space::MeshFem;
use nalgebra::DVectorViewMut;

/// Integration sites of a load: every convex of the space, or the faces and convexes of a region.
fn load_sites(space: &MeshFem, region: Option<RegionId>) -> Result<Vec<IntegrationSite>> {
    match region {
        None => Ok(space.convexes_with_element().map(IntegrationSite::Convex).collect()),
        Some(id) => {
            let region = space.mesh().region(id)?;
            let faces = region.faces().copied().map(IntegrationSite::Face);
            let convexes = region.convexes().copied().map(IntegrationSite::Convex);
            Ok(faces
                .chain(convexes)
                .filter(|site| space.element_of_convex(site.convex()).is_some())
                .collect())
        }
    }
}

/// Adds `- int F . v` on the main field of the chain.
#[derive(Debug, Clone)]
pub struct SourceBrick<'a> {
    mim: &'a MeshIm<'a>,
    field: &'static str,
    mf_u: &'a MeshFem<'a>,
    region: Option<RegionId>,
    params: ParamSet<'a>,
}

impl<'a> SourceBrick<'a> {
    pub(crate) fn new(origin: &BrickNode<'a>, region: Option<RegionId>) -> Result<Self> {
        let (field, mim, mf_u) = origin
            .main_field()
            .ok_or_else(|| ModelError::InvalidBrickChain("a source term needs an origin brick".to_string()))?;
        if let Some(id) = region {
            mf_u.mesh().region(id)?;
        }
        let qdim = mf_u.qdim();
        Ok(Self {
            mim,
            field,
            mf_u,
            region,
            params: ParamSet::new().declare("F", qdim, ParamValue::Constant(vec![0.0; qdim])),
        })
    }

    pub fn region(&self) -> Option<RegionId> {
        self.region
    }
}

struct SourceIntegrand<'p, 'a> {
    params: &'p ParamSet<'a>,
}

impl<'p, 'a> VectorIntegrand for SourceIntegrand<'p, 'a> {
    fn accumulate(&self, point: &PointData, output: &mut DVectorViewMut<f64>) -> eyre::Result<()> {
        let basis = &point.blocks[0];
        let mut load = vec![0.0; basis.qdim()];
        self.params.vector_at("F", point.convex, &point.reference, &mut load)?;
        for (i, phi) in basis.values().iter().enumerate() {
            for (c, f) in load.iter().enumerate() {
                output[basis.local_index(i, c)] += point.weight * f * phi;
            }
        }
        Ok(())
    }
}

impl<'a> Layer<'a> for SourceBrick<'a> {
    fn name(&self) -> &'static str {
        "source term"
    }

    fn params(&self) -> Option<&ParamSet<'a>> {
        Some(&self.params)
    }

    fn params_mut(&mut self) -> Option<&mut ParamSet<'a>> {
        Some(&mut self.params)
    }

    fn contribute(&self, ctx: &AssemblyContext<'_, 'a>, builder: &mut SystemBuilder) -> Result<()> {
        let block = FieldBlock::new(self.mf_u, ctx.offset(self.field)?);
        let sites = load_sites(self.mf_u, self.region)?;
        let load = LoadAssembler::new(
            ElementIntegrator::new(self.mim, vec![block], sites, ctx.layout_size()),
            SourceIntegrand { params: &self.params },
        );
        builder.add_residual("source term", &load, -1.0, ctx.parallel)
    }
}

/// Plate loads: `B` (in-plane force and transverse load) and the distributed moment `M`.
#[derive(Debug, Clone)]
pub struct PlateSourceBrick<'a> {
    mim: &'a MeshIm<'a>,
    mf_ut: &'a MeshFem<'a>,
    mf_u3: &'a MeshFem<'a>,
    mf_theta: &'a MeshFem<'a>,
    region: Option<RegionId>,
    params: ParamSet<'a>,
}

impl<'a> PlateSourceBrick<'a> {
    pub(crate) fn new(origin: &BrickNode<'a>, region: Option<RegionId>) -> Result<Self> {
        let plate = match origin {
            BrickNode::Plate(plate) => plate,
            _ => {
                return Err(ModelError::InvalidBrickChain(
                    "a plate source term needs a plate origin".to_string(),
                ))
            }
        };
        if let Some(id) = region {
            plate.mf_ut().mesh().region(id)?;
        }
        Ok(Self {
            mim: plate.mim(),
            mf_ut: plate.mf_ut(),
            mf_u3: plate.mf_u3(),
            mf_theta: plate.mf_theta(),
            region,
            params: ParamSet::new()
                .declare("B", 3, ParamValue::from([0.0; 3]))
                .declare("M", 2, ParamValue::from([0.0; 2])),
        })
    }

    pub fn region(&self) -> Option<RegionId> {
        self.region
    }
}

struct PlateSourceIntegrand<'p, 'a> {
    params: &'p ParamSet<'a>,
}

impl<'p, 'a> VectorIntegrand for PlateSourceIntegrand<'p, 'a> {
    fn accumulate(&self, point: &PointData, output: &mut DVectorViewMut<f64>) -> eyre::Result<()> {
        let (mut force, mut moment) = ([0.0; 3], [0.0; 2]);
        self.params.vector_at("B", point.convex, &point.reference, &mut force)?;
        self.params.vector_at("M", point.convex, &point.reference, &mut moment)?;
        let (ut, u3, theta) = (&point.blocks[0], &point.blocks[1], &point.blocks[2]);
        let w = point.weight;

        for (i, phi) in ut.values().iter().enumerate() {
            output[ut.local_index(i, 0)] += w * force[0] * phi;
            output[ut.local_index(i, 1)] += w * force[1] * phi;
        }
        for (i, phi) in u3.values().iter().enumerate() {
            output[u3.local_index(i, 0)] += w * force[2] * phi;
        }
        for (i, phi) in theta.values().iter().enumerate() {
            output[theta.local_index(i, 0)] += w * moment[0] * phi;
            output[theta.local_index(i, 1)] += w * moment[1] * phi;
        }
        Ok(())
    }
}

impl<'a> Layer<'a> for PlateSourceBrick<'a> {
    fn name(&self) -> &'static str {
        "plate source term"
    }

    fn params(&self) -> Option<&ParamSet<'a>> {
        Some(&self.params)
    }

    fn params_mut(&mut self) -> Option<&mut ParamSet<'a>> {
        Some(&mut self.params)
    }

    fn contribute(&self, ctx: &AssemblyContext<'_, 'a>, builder: &mut SystemBuilder) -> Result<()> {
        let blocks = vec![
            FieldBlock::new(self.mf_ut, ctx.offset("ut")?),
            FieldBlock::new(self.mf_u3, ctx.offset("u3")?),
            FieldBlock::new(self.mf_theta, ctx.offset("theta")?),
        ];
        let sites = load_sites(self.mf_ut, self.region)?;
        let load = LoadAssembler::new(
            ElementIntegrator::new(self.mim, blocks, sites, ctx.layout_size()),
            PlateSourceIntegrand { params: &self.params },
        );
        builder.add_residual("plate source term", &load, -1.0, ctx.parallel)
    }
}
