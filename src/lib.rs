//! Finite element assembly and solving with composable model bricks.
//!
//! A typical model is built bottom-up: a [`mesh::Mesh`] with its regions, finite element
//! spaces ([`space::MeshFem`]) and integration methods ([`integration::MeshIm`]) on that mesh,
//! and a chain of [`brick::Brick`]s describing the equations. Solving the chain stores the
//! solution in a [`model::ModelState`].

pub mod assembly;
pub mod brick;
pub mod element;
pub mod error;
pub mod geometry;
pub mod integration;
pub mod linsolve;
pub mod mesh;
pub mod model;
pub mod solve;
pub mod space;

pub mod optimize {
    pub use brickfem_optimize::*;
}

pub mod quadrature {
    pub use brickfem_quadrature::*;
}

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
