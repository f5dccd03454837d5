use crate::error::{ModelError, Result};
use crate::space::MeshFem;
use nalgebra::{DVector, Point2};

/// Value of a brick parameter.
#[derive(Debug, Clone)]
pub enum ParamValue<'a> {
    /// The same components everywhere.
    Constant(Vec<f64>),
    /// A field on a data space, with `n` components stored at entries `n * b .. n * b + n` for
    /// every basic dof `b` of the space.
    Field { space: &'a MeshFem<'a>, values: DVector<f64> },
}

impl<'a> ParamValue<'a> {
    pub fn scalar(value: f64) -> Self {
        Self::Constant(vec![value])
    }

    pub fn field(space: &'a MeshFem<'a>, values: DVector<f64>) -> Self {
        Self::Field { space, values }
    }

    /// Number of components, or `None` if a field's values do not match its space.
    pub fn num_components(&self) -> Option<usize> {
        match self {
            Self::Constant(values) => Some(values.len()),
            Self::Field { space, values } => {
                let nb = space.nb_basic_dof();
                (nb > 0 && values.len() % nb == 0).then(|| values.len() / nb)
            }
        }
    }

    /// Evaluates the parameter at the reference point `xi` of a convex.
    pub fn evaluate(&self, convex: usize, xi: &Point2<f64>, output: &mut [f64]) -> Result<()> {
        match self {
            Self::Constant(values) => output.copy_from_slice(values),
            Self::Field { space, values } => {
                let value = space.evaluate_reference(values, convex, xi)?;
                output.copy_from_slice(value.as_slice());
            }
        }
        Ok(())
    }
}

impl<'a> From<f64> for ParamValue<'a> {
    fn from(value: f64) -> Self {
        Self::scalar(value)
    }
}

impl<'a> From<Vec<f64>> for ParamValue<'a> {
    fn from(values: Vec<f64>) -> Self {
        Self::Constant(values)
    }
}

impl<'a, const N: usize> From<[f64; N]> for ParamValue<'a> {
    fn from(values: [f64; N]) -> Self {
        Self::Constant(values.to_vec())
    }
}

#[derive(Debug, Clone)]
struct Param<'a> {
    name: &'static str,
    components: usize,
    value: ParamValue<'a>,
}

/// The named parameters declared by a brick.
#[derive(Debug, Clone, Default)]
pub struct ParamSet<'a> {
    params: Vec<Param<'a>>,
}

impl<'a> ParamSet<'a> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn declare(mut self, name: &'static str, components: usize, default: ParamValue<'a>) -> Self {
        self.params.push(Param {
            name,
            components,
            value: default,
        });
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.params.iter().map(|param| param.name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|param| param.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue<'a>> {
        self.params
            .iter()
            .find(|param| param.name == name)
            .map(|param| &param.value)
    }

    pub(crate) fn set(&mut self, name: &str, value: ParamValue<'a>) -> Result<()> {
        let param = self
            .params
            .iter_mut()
            .find(|param| param.name == name)
            .ok_or_else(|| ModelError::InvalidArgument(format!("unknown parameter '{}'", name)))?;
        if value.num_components() != Some(param.components) {
            return Err(ModelError::InvalidArgument(format!(
                "parameter '{}' expects {} component(s) per point",
                name, param.components
            )));
        }
        param.value = value;
        Ok(())
    }

    fn require(&self, name: &str) -> Result<&Param<'a>> {
        self.params
            .iter()
            .find(|param| param.name == name)
            .ok_or_else(|| ModelError::InvalidArgument(format!("unknown parameter '{}'", name)))
    }

    /// Evaluates a single-component parameter at the reference point `xi` of a convex.
    pub(crate) fn scalar_at(&self, name: &str, convex: usize, xi: &Point2<f64>) -> Result<f64> {
        let mut value = [0.0];
        self.require(name)?.value.evaluate(convex, xi, &mut value)?;
        Ok(value[0])
    }

    /// Evaluates a parameter at the reference point `xi` of a convex into `output`.
    pub(crate) fn vector_at(&self, name: &str, convex: usize, xi: &Point2<f64>, output: &mut [f64]) -> Result<()> {
        let param = self.require(name)?;
        assert_eq!(output.len(), param.components);
        param.value.evaluate(convex, xi, output)
    }
}
